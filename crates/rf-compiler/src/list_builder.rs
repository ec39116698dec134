//! Rules list compilation: filter list text to a stored rules list buffer.

use rf_core::storage::{serialize_rules_list, FilterRule, RulesList};

use crate::optimizer::{optimize_rules, OptimizeStats};
use crate::parser::parse_filter_list;

/// A compiled rules list ready to be written to disk.
#[derive(Debug, Clone)]
pub struct CompiledRulesList {
    pub list: RulesList,
    /// Version header followed by the encoded list
    pub bytes: Vec<u8>,
    pub checksum: String,
    pub stats: OptimizeStats,
    pub skipped_lines: usize,
}

/// Accumulates filter list text of one rule source.
#[derive(Debug, Default)]
pub struct RulesListBuilder {
    list: RulesList,
    badfilters: Vec<FilterRule>,
    skipped_lines: usize,
}

impl RulesListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and append a chunk of filter list text.
    pub fn add_text(&mut self, text: &str) -> &mut Self {
        let parsed = parse_filter_list(text);
        self.list.filter_rules.extend(parsed.rules.filter_rules);
        self.list.cosmetic_rules.extend(parsed.rules.cosmetic_rules);
        self.list.scriptlet_rules.extend(parsed.rules.scriptlet_rules);
        self.badfilters.extend(parsed.badfilters);
        self.skipped_lines += parsed.skipped_lines;
        self
    }

    /// Apply `$badfilter`, drop duplicates and serialize.
    pub fn finish(self) -> CompiledRulesList {
        let mut list = self.list;
        let stats = optimize_rules(&mut list, &self.badfilters);
        let (bytes, checksum) = serialize_rules_list(&list);

        log::debug!(
            "Compiled rules list: {} filter, {} cosmetic, {} scriptlet rules ({} duplicates, {} badfiltered, {} skipped lines)",
            list.filter_rules.len(),
            list.cosmetic_rules.len(),
            list.scriptlet_rules.len(),
            stats.deduped,
            stats.badfiltered_rules,
            self.skipped_lines,
        );

        CompiledRulesList {
            list,
            bytes,
            checksum,
            stats,
            skipped_lines: self.skipped_lines,
        }
    }
}

/// Compile a whole filter list in one go.
pub fn compile_filter_list(text: &str) -> CompiledRulesList {
    let mut builder = RulesListBuilder::new();
    builder.add_text(text);
    builder.finish()
}

#[cfg(test)]
mod tests {
    use rf_core::RuleBufferHolder;

    use super::*;

    #[test]
    fn compiled_list_loads_with_its_checksum() {
        let compiled = compile_filter_list("||ads.com^\n##.banner\n! comment\n||bad.com^$nonsense");
        assert_eq!(compiled.skipped_lines, 1);

        let holder = RuleBufferHolder::from_file_bytes(&compiled.bytes, Some(&compiled.checksum))
            .expect("list should load");
        assert_eq!(holder.rules_list(), &compiled.list);
        assert_eq!(holder.rules_list().rule_count(), 2);
    }

    #[test]
    fn badfilter_applies_across_chunks() {
        let mut builder = RulesListBuilder::new();
        builder.add_text("||ads.com^").add_text("||ads.com^$badfilter");
        let compiled = builder.finish();
        assert!(compiled.list.is_empty());
        assert_eq!(compiled.stats.badfiltered_rules, 1);
    }

    #[test]
    fn identical_text_gives_identical_checksum() {
        let a = compile_filter_list("||a.com^\n##.x");
        let b = compile_filter_list("||a.com^\n##.x");
        assert_eq!(a.checksum, b.checksum);
        assert_ne!(a.checksum, compile_filter_list("||b.com^").checksum);
    }
}
