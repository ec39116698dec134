//! Rules list: the per-source rule buffer
//!
//! A rules list holds every rule parsed from one rule source. Rules are
//! immutable once decoded and are addressed by their position in the list
//! (`RuleId::rule_nr`), so the list acts as an append-only arena.

use regex::{Regex, RegexBuilder};

use super::format::*;
use crate::hash::checksum;
use crate::types::{
    ActivationTypes, AnchorType, Decision, Modifier, PartyFlags, PatternType, ResourceTypes,
};

// =============================================================================
// Rule records
// =============================================================================

/// A network request filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FilterRule {
    pub decision: Decision,
    /// Rule also blocks (or passes) the request in the before-request phase
    pub modify_block: bool,
    pub modifier: Modifier,
    /// Values of the modifier (CSP text, redirect resource, trigger params)
    pub modifier_values: Vec<String>,
    pub party: PartyFlags,
    pub resource_types: ResourceTypes,
    pub activation_types: ActivationTypes,
    pub pattern_type: PatternType,
    pub anchor_type: AnchorType,
    pub is_case_sensitive: bool,
    /// Host the request URL must belong to, if any
    pub host: Option<String>,
    /// Sorted by length descending, then alphabetically
    pub domains_included: Vec<String>,
    /// Sorted by length descending, then alphabetically
    pub domains_excluded: Vec<String>,
    pub pattern: String,
    /// Text the index extracts n-grams from (empty for regex rules)
    pub ngram_search_string: String,
}

/// Domain scoping shared by cosmetic and scriptlet rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ContentInjectionRuleCore {
    pub is_allow_rule: bool,
    pub domains_included: Vec<String>,
    pub domains_excluded: Vec<String>,
}

/// Element hiding rule (`domain##selector`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CosmeticRule {
    pub core: ContentInjectionRuleCore,
    pub selector: String,
}

/// Scriptlet injection rule (`domain##+js(name, args...)`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ScriptletInjectionRule {
    pub core: ContentInjectionRuleCore,
    pub scriptlet_name: String,
    pub arguments: Vec<String>,
}

/// All rules of one source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RulesList {
    pub filter_rules: Vec<FilterRule>,
    pub cosmetic_rules: Vec<CosmeticRule>,
    pub scriptlet_rules: Vec<ScriptletInjectionRule>,
}

impl RulesList {
    pub fn is_empty(&self) -> bool {
        self.filter_rules.is_empty()
            && self.cosmetic_rules.is_empty()
            && self.scriptlet_rules.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.filter_rules.len() + self.cosmetic_rules.len() + self.scriptlet_rules.len()
    }
}

/// Sort a domain list the way every rule stores it: longest first, then
/// alphabetically. Lookups rely on the first super-domain hit being the
/// longest one.
pub fn sort_domains(domains: &mut Vec<String>) {
    domains.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    domains.dedup();
}

// =============================================================================
// Encoding
// =============================================================================

fn write_filter_rule(w: &mut ByteWriter, rule: &FilterRule) {
    w.u8(rule.decision as u8);
    w.bool(rule.modify_block);
    w.u8(rule.modifier as u8);
    w.strings(&rule.modifier_values);
    w.u8(rule.party.bits());
    w.u16(rule.resource_types.bits());
    w.u8(rule.activation_types.bits());
    w.u8(rule.pattern_type as u8);
    w.u8(rule.anchor_type.bits());
    w.bool(rule.is_case_sensitive);
    match &rule.host {
        Some(host) => {
            w.bool(true);
            w.str(host);
        }
        None => w.bool(false),
    }
    w.strings(&rule.domains_included);
    w.strings(&rule.domains_excluded);
    w.str(&rule.pattern);
    w.str(&rule.ngram_search_string);
}

fn write_core(w: &mut ByteWriter, core: &ContentInjectionRuleCore) {
    w.bool(core.is_allow_rule);
    w.strings(&core.domains_included);
    w.strings(&core.domains_excluded);
}

/// Encode a rules list payload (without version header).
pub fn encode_rules_list(list: &RulesList) -> Vec<u8> {
    let mut w = ByteWriter::new();

    w.count(list.filter_rules.len());
    for rule in &list.filter_rules {
        write_filter_rule(&mut w, rule);
    }

    w.count(list.cosmetic_rules.len());
    for rule in &list.cosmetic_rules {
        write_core(&mut w, &rule.core);
        w.str(&rule.selector);
    }

    w.count(list.scriptlet_rules.len());
    for rule in &list.scriptlet_rules {
        write_core(&mut w, &rule.core);
        w.str(&rule.scriptlet_name);
        w.strings(&rule.arguments);
    }

    w.finish()
}

/// Serialize a rules list to file bytes. Returns the bytes and the checksum
/// of the payload.
pub fn serialize_rules_list(list: &RulesList) -> (Vec<u8>, String) {
    let payload = encode_rules_list(list);
    let sum = checksum(&payload);
    (with_header(&rules_list_header(), &payload), sum)
}

// =============================================================================
// Decoding
// =============================================================================

fn read_enum<T: TryFrom<u8>>(r: &mut ByteReader<'_>, field: &'static str) -> Result<T, FormatError> {
    let raw = r.u8()?;
    T::try_from(raw).map_err(|_| FormatError::InvalidValue {
        field,
        value: raw as u32,
    })
}

fn read_filter_rule(r: &mut ByteReader<'_>) -> Result<FilterRule, FormatError> {
    let decision = read_enum(r, "decision")?;
    let modify_block = r.bool()?;
    let modifier = read_enum(r, "modifier")?;
    let modifier_values = r.strings()?;
    let party = PartyFlags::from_bits_truncate(r.u8()?);
    let resource_types = ResourceTypes::from_bits_truncate(r.u16()?);
    let activation_types = ActivationTypes::from_bits_truncate(r.u8()?);
    let pattern_type = read_enum(r, "pattern_type")?;
    let anchor_type = AnchorType::from_bits_truncate(r.u8()?);
    let is_case_sensitive = r.bool()?;
    let host = if r.bool()? { Some(r.string()?) } else { None };
    let domains_included = r.strings()?;
    let domains_excluded = r.strings()?;
    let pattern = r.string()?;
    let ngram_search_string = r.string()?;

    Ok(FilterRule {
        decision,
        modify_block,
        modifier,
        modifier_values,
        party,
        resource_types,
        activation_types,
        pattern_type,
        anchor_type,
        is_case_sensitive,
        host,
        domains_included,
        domains_excluded,
        pattern,
        ngram_search_string,
    })
}

fn read_core(r: &mut ByteReader<'_>) -> Result<ContentInjectionRuleCore, FormatError> {
    Ok(ContentInjectionRuleCore {
        is_allow_rule: r.bool()?,
        domains_included: r.strings()?,
        domains_excluded: r.strings()?,
    })
}

/// Decode a rules list payload (without version header).
pub fn decode_rules_list(payload: &[u8]) -> Result<RulesList, FormatError> {
    let mut r = ByteReader::new(payload);

    let count = r.count(1)?;
    let mut filter_rules = Vec::with_capacity(count);
    for _ in 0..count {
        filter_rules.push(read_filter_rule(&mut r)?);
    }

    let count = r.count(1)?;
    let mut cosmetic_rules = Vec::with_capacity(count);
    for _ in 0..count {
        let core = read_core(&mut r)?;
        let selector = r.string()?;
        cosmetic_rules.push(CosmeticRule { core, selector });
    }

    let count = r.count(1)?;
    let mut scriptlet_rules = Vec::with_capacity(count);
    for _ in 0..count {
        let core = read_core(&mut r)?;
        let scriptlet_name = r.string()?;
        let arguments = r.strings()?;
        scriptlet_rules.push(ScriptletInjectionRule {
            core,
            scriptlet_name,
            arguments,
        });
    }

    r.finish()?;

    Ok(RulesList {
        filter_rules,
        cosmetic_rules,
        scriptlet_rules,
    })
}

// =============================================================================
// Rule Buffer Holder
// =============================================================================

/// Owns one decoded rules list plus its checksum.
///
/// Regex patterns are compiled once here so that queries never compile.
/// A holder is replaced wholesale when its source changes.
#[derive(Debug)]
pub struct RuleBufferHolder {
    checksum: String,
    rules_list: RulesList,
    regexes: Vec<Option<Regex>>,
}

impl RuleBufferHolder {
    /// Wrap an already decoded list.
    pub fn new(rules_list: RulesList, checksum: String) -> Self {
        let regexes = rules_list.filter_rules.iter().map(compile_rule_regex).collect();
        Self {
            checksum,
            rules_list,
            regexes,
        }
    }

    /// Decode a rules list file. When `expected_checksum` is given the
    /// payload must hash to exactly that value.
    pub fn from_file_bytes(data: &[u8], expected_checksum: Option<&str>) -> Result<Self, FormatError> {
        let payload = strip_header(data, &rules_list_header())?;
        let computed = checksum(payload);
        if let Some(expected) = expected_checksum {
            if expected != computed {
                return Err(FormatError::ChecksumMismatch {
                    expected: expected.to_string(),
                    computed,
                });
            }
        }
        let rules_list = decode_rules_list(payload)?;
        Ok(Self::new(rules_list, computed))
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn rules_list(&self) -> &RulesList {
        &self.rules_list
    }

    pub fn filter_rule(&self, rule_nr: u32) -> Option<&FilterRule> {
        self.rules_list.filter_rules.get(rule_nr as usize)
    }

    pub fn regex(&self, rule_nr: u32) -> Option<&Regex> {
        self.regexes.get(rule_nr as usize).and_then(Option::as_ref)
    }

    pub fn cosmetic_rule(&self, rule_nr: u32) -> Option<&CosmeticRule> {
        self.rules_list.cosmetic_rules.get(rule_nr as usize)
    }

    pub fn scriptlet_rule(&self, rule_nr: u32) -> Option<&ScriptletInjectionRule> {
        self.rules_list.scriptlet_rules.get(rule_nr as usize)
    }
}

/// A regex that fails to compile leaves the rule without a matcher; such a
/// rule simply never matches.
fn compile_rule_regex(rule: &FilterRule) -> Option<Regex> {
    if rule.pattern_type != PatternType::Regexp {
        return None;
    }
    match RegexBuilder::new(&rule.pattern)
        .case_insensitive(!rule.is_case_sensitive)
        .build()
    {
        Ok(regex) => Some(regex),
        Err(e) => {
            log::debug!("Ignoring invalid regex rule {:?}: {}", rule.pattern, e);
            None
        }
    }
}
