//! Filter list text parser
//!
//! Parses the ABP/uBO syntax subset the rules index understands into a
//! `RulesList`. Lines using syntax outside that subset are skipped and
//! counted; they never abort parsing.

use std::net::IpAddr;

use rf_core::storage::{
    sort_domains, ContentInjectionRuleCore, CosmeticRule, FilterRule, RulesList, ScriptletInjectionRule,
};
use rf_core::types::{ActivationTypes, AnchorType, Decision, Modifier, PartyFlags, PatternType, ResourceTypes};

/// Result of parsing one filter list.
#[derive(Debug, Clone, Default)]
pub struct ParsedList {
    pub rules: RulesList,
    /// Rules carrying `$badfilter`, with that option removed
    pub badfilters: Vec<FilterRule>,
    /// Non-comment lines that could not be parsed
    pub skipped_lines: usize,
}

pub fn parse_filter_list(text: &str) -> ParsedList {
    let mut parsed = ParsedList::default();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || is_comment_line(line) {
            continue;
        }

        if let Some(injection) = split_content_injection(line) {
            match parse_content_injection(injection) {
                Some(InjectionRule::Cosmetic(rule)) => parsed.rules.cosmetic_rules.push(rule),
                Some(InjectionRule::Scriptlet(rule)) => parsed.rules.scriptlet_rules.push(rule),
                None => parsed.skipped_lines += 1,
            }
            continue;
        }

        if let Some(host) = hosts_file_host(line) {
            if let Some(domain) = blockable_host(host) {
                parsed.rules.filter_rules.push(host_block_rule(domain));
            }
            continue;
        }

        match parse_network_rule(line) {
            Some((rule, false)) => parsed.rules.filter_rules.push(rule),
            Some((rule, true)) => parsed.badfilters.push(rule),
            None => parsed.skipped_lines += 1,
        }
    }

    parsed
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!')
        || line.starts_with('[')
        || (line.starts_with('#') && !line.starts_with("##") && !line.starts_with("#@#"))
}

// =============================================================================
// Network rules
// =============================================================================

/// Parse a network rule. The flag tells whether it carried `$badfilter`.
fn parse_network_rule(line: &str) -> Option<(FilterRule, bool)> {
    let (is_allow, line) = match line.strip_prefix("@@") {
        Some(rest) => (true, rest.trim_start()),
        None => (false, line),
    };

    let (pattern_part, options_text) = split_rule_options(line);
    let options = match options_text {
        Some(options_text) => parse_options(options_text)?,
        None => ParsedOptions::default(),
    };

    let pattern_part = pattern_part.trim();
    if pattern_part.contains(char::is_whitespace) {
        return None;
    }
    // A bare option list only makes sense when the options narrow the rule
    if (pattern_part.is_empty() || pattern_part == "*") && options_text.is_none() {
        return None;
    }
    let parsed = parse_pattern(pattern_part, options.match_case)?;

    let decision = if is_allow {
        Decision::Pass
    } else if options.important {
        Decision::ModifyImportant
    } else {
        Decision::Modify
    };

    let explicit_types = !options.types_include.is_empty() || !options.types_exclude.is_empty();
    let include = if options.types_include.is_empty() {
        ResourceTypes::ALL
    } else {
        options.types_include
    };
    let resource_types = include - options.types_exclude;
    if explicit_types && resource_types.is_empty() {
        return None;
    }

    let party_include = if options.party_include.is_empty() {
        PartyFlags::ALL
    } else {
        options.party_include
    };
    let party = party_include - options.party_exclude;
    if party.is_empty() {
        return None;
    }

    let modify_block = match options.modifier {
        Modifier::None => explicit_types || options.activation_types.is_empty(),
        Modifier::Redirect => !options.redirect_rule_only,
        Modifier::Csp | Modifier::AdQueryTrigger => false,
    };

    let mut domains_included = options.domains_included;
    let mut domains_excluded = options.domains_excluded;
    sort_domains(&mut domains_included);
    sort_domains(&mut domains_excluded);

    let rule = FilterRule {
        decision,
        modify_block,
        modifier: options.modifier,
        modifier_values: options.modifier_values,
        party,
        resource_types: if modify_block || options.modifier != Modifier::None {
            resource_types
        } else {
            ResourceTypes::empty()
        },
        activation_types: options.activation_types,
        pattern_type: parsed.pattern_type,
        anchor_type: parsed.anchor_type,
        is_case_sensitive: options.match_case,
        host: None,
        domains_included,
        domains_excluded,
        ngram_search_string: parsed.ngram_search_string,
        pattern: parsed.pattern,
    };

    Some((rule, options.badfilter))
}

fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    // A regex pattern may contain `$`; options only start after its closing slash
    let search_from = if line.starts_with('/') {
        line.rfind('/').unwrap_or(0)
    } else {
        0
    };
    match line[search_from..].rfind('$') {
        Some(pos) => {
            let pos = search_from + pos;
            (&line[..pos], Some(&line[pos + 1..]))
        }
        None => (line, None),
    }
}

struct ParsedPattern {
    pattern: String,
    pattern_type: PatternType,
    anchor_type: AnchorType,
    ngram_search_string: String,
}

fn parse_pattern(text: &str, match_case: bool) -> Option<ParsedPattern> {
    if text.len() > 2 && text.starts_with('/') && text.ends_with('/') {
        return Some(ParsedPattern {
            pattern: text[1..text.len() - 1].to_string(),
            pattern_type: PatternType::Regexp,
            anchor_type: AnchorType::empty(),
            ngram_search_string: String::new(),
        });
    }

    let mut anchor_type = AnchorType::empty();
    let mut rest = text;
    if let Some(stripped) = rest.strip_prefix("||") {
        anchor_type |= AnchorType::HOST;
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('|') {
        anchor_type |= AnchorType::START;
        rest = stripped;
    }
    if let Some(stripped) = rest.strip_suffix('|') {
        anchor_type |= AnchorType::END;
        rest = stripped;
    }
    if rest.contains('|') {
        return None;
    }
    if rest == "*" {
        rest = "";
    }

    let pattern = if match_case {
        rest.to_string()
    } else {
        rest.to_ascii_lowercase()
    };
    let pattern_type = if pattern.contains(['*', '^']) {
        PatternType::Wildcarded
    } else {
        PatternType::Plain
    };

    Some(ParsedPattern {
        ngram_search_string: pattern.clone(),
        pattern,
        pattern_type,
        anchor_type,
    })
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug, Default)]
struct ParsedOptions {
    types_include: ResourceTypes,
    types_exclude: ResourceTypes,
    party_include: PartyFlags,
    party_exclude: PartyFlags,
    activation_types: ActivationTypes,
    match_case: bool,
    important: bool,
    badfilter: bool,
    domains_included: Vec<String>,
    domains_excluded: Vec<String>,
    modifier: Modifier,
    modifier_values: Vec<String>,
    redirect_rule_only: bool,
}

impl ParsedOptions {
    /// A rule carries at most one modifier.
    fn set_modifier(&mut self, modifier: Modifier, values: Vec<String>) -> Option<()> {
        if self.modifier != Modifier::None && self.modifier != modifier {
            return None;
        }
        self.modifier = modifier;
        self.modifier_values.extend(values);
        Some(())
    }
}

fn parse_options(text: &str) -> Option<ParsedOptions> {
    let mut options = ParsedOptions::default();

    for raw in text.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (name, value) = match raw.split_once('=') {
            Some((name, value)) => (name.trim().to_ascii_lowercase(), Some(value.trim())),
            None => (raw.to_ascii_lowercase(), None),
        };
        let (negated, name) = match name.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, name.as_str()),
        };

        match (name, value) {
            ("important", None) => options.important = true,
            ("match-case" | "match_case", None) => options.match_case = true,
            ("badfilter", None) => options.badfilter = true,
            ("domain" | "from", Some(value)) => {
                let (included, excluded) = parse_domain_option(value, '|')?;
                options.domains_included.extend(included);
                options.domains_excluded.extend(excluded);
            }
            ("csp", value) => {
                let values = value.filter(|v| !v.is_empty()).map(str::to_string);
                options.set_modifier(Modifier::Csp, values.into_iter().collect())?;
            }
            ("redirect" | "redirect-rule", Some(value)) if !value.is_empty() => {
                options.redirect_rule_only = name == "redirect-rule";
                options.set_modifier(Modifier::Redirect, vec![value.to_string()])?;
            }
            ("ad-query-trigger", Some(value)) => {
                let values = value
                    .split('|')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect();
                options.set_modifier(Modifier::AdQueryTrigger, values)?;
            }
            (name, None) if !negated && activation_type(name).is_some() => {
                options.activation_types |= activation_type(name)?;
            }
            (name, None) if party_flag(name).is_some() => {
                let party = party_flag(name)?;
                if negated {
                    options.party_exclude |= party;
                } else {
                    options.party_include |= party;
                }
            }
            (name, None) if ResourceTypes::from_request_type(name).is_some() => {
                let types = ResourceTypes::from_request_type(name)?;
                if negated {
                    options.types_exclude |= types;
                } else {
                    options.types_include |= types;
                }
            }
            _ => return None,
        }
    }

    Some(options)
}

fn activation_type(name: &str) -> Option<ActivationTypes> {
    match name {
        "document" | "doc" => Some(ActivationTypes::DOCUMENT),
        "elemhide" | "ehide" => Some(ActivationTypes::ELEMENT_HIDE),
        "generichide" | "ghide" => Some(ActivationTypes::GENERIC_HIDE),
        "genericblock" => Some(ActivationTypes::GENERIC_BLOCK),
        "attribute-ads" => Some(ActivationTypes::ATTRIBUTE_ADS),
        _ => None,
    }
}

fn party_flag(name: &str) -> Option<PartyFlags> {
    match name {
        "third-party" | "thirdparty" | "3p" => Some(PartyFlags::THIRD_PARTY),
        "first-party" | "firstparty" | "1p" => Some(PartyFlags::FIRST_PARTY),
        _ => None,
    }
}

/// Split a domain list into included and excluded domains.
fn parse_domain_option(value: &str, separator: char) -> Option<(Vec<String>, Vec<String>)> {
    let mut included = Vec::new();
    let mut excluded = Vec::new();

    for raw in value.split(separator) {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let domain = normalize_domain(domain_raw)?;
        if is_exclude {
            excluded.push(domain);
        } else {
            included.push(domain);
        }
    }

    Some((included, excluded))
}

// =============================================================================
// Hosts files
// =============================================================================

/// Names every hosts file maps to the local machine.
const LOCAL_HOST_NAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "ip6-allhosts",
];

/// Host column of an `<ip> <host>` line.
fn hosts_file_host(line: &str) -> Option<&str> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;
    first.parse::<IpAddr>().ok()?;
    Some(second)
}

fn blockable_host(host: &str) -> Option<String> {
    let domain = normalize_domain(host)?;
    if LOCAL_HOST_NAMES.contains(&domain.as_str()) || domain.parse::<IpAddr>().is_ok() {
        return None;
    }
    Some(domain)
}

/// `||domain^` block rule for a hosts file entry.
fn host_block_rule(domain: String) -> FilterRule {
    let pattern = format!("{domain}^");
    FilterRule {
        decision: Decision::Modify,
        modify_block: true,
        party: PartyFlags::ALL,
        resource_types: ResourceTypes::ALL,
        pattern_type: PatternType::Wildcarded,
        anchor_type: AnchorType::HOST,
        ngram_search_string: pattern.clone(),
        pattern,
        ..Default::default()
    }
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

// =============================================================================
// Cosmetic and scriptlet rules
// =============================================================================

enum InjectionRule {
    Cosmetic(CosmeticRule),
    Scriptlet(ScriptletInjectionRule),
}

struct InjectionLine<'a> {
    domains: &'a str,
    is_allow: bool,
    body: &'a str,
}

/// Extended syntaxes we do not support: procedural (`#?#`), CSS injection
/// (`#$#`) and JS (`#%#`) rules.
const UNSUPPORTED_INJECTION_SEPARATORS: &[&str] = &["#?#", "#@?#", "#$#", "#@$#", "#%#", "#@%#"];

fn split_content_injection(line: &str) -> Option<InjectionLine<'_>> {
    let block = line.find("##").map(|pos| (pos, 2, false));
    let allow = line.find("#@#").map(|pos| (pos, 3, true));
    let (pos, len, is_allow) = match (block, allow) {
        (Some(b), Some(a)) => {
            if a.0 < b.0 {
                a
            } else {
                b
            }
        }
        (Some(found), None) | (None, Some(found)) => found,
        (None, None) => {
            return UNSUPPORTED_INJECTION_SEPARATORS
                .iter()
                .find_map(|sep| line.find(sep))
                .map(|_| InjectionLine {
                    domains: "",
                    is_allow: false,
                    body: "",
                });
        }
    };

    Some(InjectionLine {
        domains: &line[..pos],
        is_allow,
        body: line[pos + len..].trim(),
    })
}

fn parse_content_injection(line: InjectionLine<'_>) -> Option<InjectionRule> {
    // Empty bodies and HTML filters (`##^`) are not supported
    if line.body.is_empty() || line.body.starts_with('^') {
        return None;
    }

    let (domains_included, domains_excluded) = parse_domain_option(line.domains, ',')?;
    let mut core = ContentInjectionRuleCore {
        is_allow_rule: line.is_allow,
        domains_included,
        domains_excluded,
    };
    sort_domains(&mut core.domains_included);
    sort_domains(&mut core.domains_excluded);

    if let Some(args) = line.body.strip_prefix("+js(").and_then(|b| b.strip_suffix(')')) {
        let mut parts = split_scriptlet_args(args).into_iter();
        let scriptlet_name = parts.next().filter(|name| !name.is_empty())?;
        return Some(InjectionRule::Scriptlet(ScriptletInjectionRule {
            core,
            scriptlet_name,
            arguments: parts.collect(),
        }));
    }

    Some(InjectionRule::Cosmetic(CosmeticRule {
        core,
        selector: line.body.to_string(),
    }))
}

/// Split scriptlet arguments on unescaped commas and strip matching quotes.
fn split_scriptlet_args(args: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for ch in args.chars() {
        match ch {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => result.push(std::mem::take(&mut current)),
            _ => {
                if escaped && ch != ',' {
                    current.push('\\');
                }
                current.push(ch);
                escaped = false;
            }
        }
    }
    if escaped {
        current.push('\\');
    }
    result.push(current);

    result
        .into_iter()
        .map(|arg| {
            let arg = arg.trim();
            let unquoted = ['"', '\'']
                .iter()
                .find_map(|&q| arg.strip_prefix(q).and_then(|a| a.strip_suffix(q)));
            unquoted.unwrap_or(arg).to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_filter(text: &str) -> FilterRule {
        let parsed = parse_filter_list(text);
        assert_eq!(parsed.rules.filter_rules.len(), 1, "expected one rule from {text:?}");
        parsed.rules.filter_rules[0].clone()
    }

    #[test]
    fn parses_wildcard_pattern() {
        let rule = single_filter("ad*banner^$script,important");
        assert_eq!(rule.pattern, "ad*banner^");
        assert_eq!(rule.pattern_type, PatternType::Wildcarded);
        assert_eq!(rule.anchor_type, AnchorType::empty());
        assert_eq!(rule.decision, Decision::ModifyImportant);
        assert_eq!(rule.resource_types, ResourceTypes::SCRIPT);
        assert_eq!(rule.party, PartyFlags::ALL);
        assert!(rule.modify_block);
        assert!(!rule.is_case_sensitive);
    }

    #[test]
    fn parses_anchors() {
        let rule = single_filter("||Example.com^");
        assert_eq!(rule.anchor_type, AnchorType::HOST);
        assert_eq!(rule.pattern, "example.com^");

        let rule = single_filter("|https://x.com/a.js|");
        assert_eq!(rule.anchor_type, AnchorType::START | AnchorType::END);
        assert_eq!(rule.pattern, "https://x.com/a.js");
        assert_eq!(rule.pattern_type, PatternType::Plain);
    }

    #[test]
    fn parses_regex_with_dollar() {
        let rule = single_filter("/ads\\d+$/$image");
        assert_eq!(rule.pattern_type, PatternType::Regexp);
        assert_eq!(rule.pattern, "ads\\d+$");
        assert!(rule.ngram_search_string.is_empty());
        assert_eq!(rule.resource_types, ResourceTypes::IMAGE);
    }

    #[test]
    fn parses_exception_and_party() {
        let rule = single_filter("@@||cdn.com^$~third-party");
        assert_eq!(rule.decision, Decision::Pass);
        assert_eq!(rule.party, PartyFlags::FIRST_PARTY);

        let rule = single_filter("||ads.com^$3p,~image");
        assert_eq!(rule.party, PartyFlags::THIRD_PARTY);
        assert!(!rule.resource_types.contains(ResourceTypes::IMAGE));
        assert!(rule.resource_types.contains(ResourceTypes::SCRIPT));
    }

    #[test]
    fn parses_domain_option() {
        let rule = single_filter("/track$domain=a.com|~b.a.com|longer.com");
        assert_eq!(rule.domains_included, vec!["longer.com", "a.com"]);
        assert_eq!(rule.domains_excluded, vec!["b.a.com"]);
    }

    #[test]
    fn parses_match_case() {
        let rule = single_filter("/Banner/Ad.$match-case");
        assert!(rule.is_case_sensitive);
        assert_eq!(rule.pattern, "/Banner/Ad.");
    }

    #[test]
    fn parses_activation_rules() {
        let rule = single_filter("@@||trusted.com^$document");
        assert_eq!(rule.activation_types, ActivationTypes::DOCUMENT);
        assert!(!rule.modify_block);

        let rule = single_filter("@@||site.com^$elemhide,generichide");
        assert_eq!(
            rule.activation_types,
            ActivationTypes::ELEMENT_HIDE | ActivationTypes::GENERIC_HIDE
        );
    }

    #[test]
    fn parses_modifiers() {
        let rule = single_filter("||x.com^$csp=script-src 'none'");
        assert_eq!(rule.modifier, Modifier::Csp);
        assert_eq!(rule.modifier_values, vec!["script-src 'none'"]);
        assert!(!rule.modify_block);

        let rule = single_filter("@@||x.com^$csp");
        assert_eq!(rule.modifier, Modifier::Csp);
        assert!(rule.modifier_values.is_empty());

        let rule = single_filter("||ads.com/tag.js$script,redirect=noop.js");
        assert_eq!(rule.modifier, Modifier::Redirect);
        assert_eq!(rule.modifier_values, vec!["noop.js"]);
        assert!(rule.modify_block);

        let rule = single_filter("||ads.com/tag.js$redirect-rule=noop.js");
        assert!(!rule.modify_block);

        let rule = single_filter("@@||shop.com^$ad-query-trigger=gclid|fbclid");
        assert_eq!(rule.modifier, Modifier::AdQueryTrigger);
        assert_eq!(rule.modifier_values, vec!["gclid", "fbclid"]);
    }

    #[test]
    fn skips_unsupported_lines() {
        let parsed = parse_filter_list(
            "! comment\n[Adblock Plus 2.0]\n||x.com^$unknown-option\nexample.com#?#div:has(.ad)\n||x.com^$csp=a,redirect=b\n",
        );
        assert!(parsed.rules.is_empty());
        assert_eq!(parsed.skipped_lines, 3);
    }

    #[test]
    fn parses_hosts_file_entries() {
        let rule = single_filter("0.0.0.0 Ads.Tracker.com");
        assert_eq!(rule.pattern, "ads.tracker.com^");
        assert_eq!(rule.anchor_type, AnchorType::HOST);
    }

    #[test]
    fn ignores_hosts_file_boilerplate() {
        let parsed = parse_filter_list(
            "127.0.0.1 localhost\n127.0.0.1 localhost.localdomain\n255.255.255.255 broadcasthost\n::1 localhost\n0.0.0.0 0.0.0.0\n0.0.0.0 ads.example.com",
        );
        assert_eq!(parsed.rules.filter_rules.len(), 1);
        assert_eq!(parsed.rules.filter_rules[0].pattern, "ads.example.com^");
        assert_eq!(parsed.skipped_lines, 0);
    }

    #[test]
    fn collects_badfilters_separately() {
        let parsed = parse_filter_list("||ads.com^\n||ads.com^$badfilter");
        assert_eq!(parsed.rules.filter_rules.len(), 1);
        assert_eq!(parsed.badfilters.len(), 1);
        assert_eq!(parsed.badfilters[0], parsed.rules.filter_rules[0]);
    }

    #[test]
    fn parses_cosmetic_rules() {
        let parsed = parse_filter_list("##.ads\nexample.com,~sub.example.com##.banner\nexample.com#@#.ads");
        let rules = &parsed.rules.cosmetic_rules;
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].selector, ".ads");
        assert!(rules[0].core.domains_included.is_empty());
        assert_eq!(rules[1].core.domains_included, vec!["example.com"]);
        assert_eq!(rules[1].core.domains_excluded, vec!["sub.example.com"]);
        assert!(rules[2].core.is_allow_rule);
    }

    #[test]
    fn parses_scriptlet_rules() {
        let parsed = parse_filter_list("example.com##+js(set-constant, ads, 'false')\n#@#+js(abort-on-property-read, a\\,b)");
        let rules = &parsed.rules.scriptlet_rules;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].scriptlet_name, "set-constant");
        assert_eq!(rules[0].arguments, vec!["ads", "false"]);
        assert!(rules[1].core.is_allow_rule);
        assert_eq!(rules[1].arguments, vec!["a,b"]);
    }
}
