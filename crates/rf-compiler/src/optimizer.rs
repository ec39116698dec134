use std::collections::HashSet;
use std::hash::Hash;

use rf_core::storage::{FilterRule, RulesList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
    pub badfilter_rules: usize,
    pub badfiltered_rules: usize,
}

/// Drop rules cancelled by `$badfilter` and exact duplicates. The first
/// occurrence of a duplicate is kept, so rule order stays stable.
pub fn optimize_rules(list: &mut RulesList, badfilters: &[FilterRule]) -> OptimizeStats {
    let before = list.rule_count();

    let badfilter_keys: HashSet<&FilterRule> = badfilters.iter().collect();
    let mut badfiltered_rules = 0usize;
    if !badfilter_keys.is_empty() {
        list.filter_rules.retain(|rule| {
            if badfilter_keys.contains(rule) {
                badfiltered_rules += 1;
                return false;
            }
            true
        });
    }

    let deduped = dedupe(&mut list.filter_rules) + dedupe(&mut list.cosmetic_rules) + dedupe(&mut list.scriptlet_rules);

    OptimizeStats {
        before,
        after: list.rule_count(),
        deduped,
        badfilter_rules: badfilters.len(),
        badfiltered_rules,
    }
}

fn dedupe<T: Clone + Eq + Hash>(rules: &mut Vec<T>) -> usize {
    let mut seen: HashSet<T> = HashSet::with_capacity(rules.len());
    let before = rules.len();
    rules.retain(|rule| seen.insert(rule.clone()));
    before - rules.len()
}
