//! Rule priorities, party and domain helpers, injection rule bodies

use url::Url;

use crate::psl::registrable_domain;
use crate::storage::{ContentInjectionRuleCore, CosmeticRule, FilterRule, ScriptletInjectionRule};
use crate::types::{Decision, Modifier};
use crate::url_info::Origin;

// =============================================================================
// Rule priority
// =============================================================================

/// Plain blocking rule.
pub const MODIFY_PRIORITY: u8 = 0;
/// Exception rule.
pub const PASS_PRIORITY: u8 = 1;
/// Exception rule for ad attribution (`$ad-query-trigger`).
pub const PASS_AD_ATTRIBUTION_PRIORITY: u8 = 2;
/// Exception rule lifting every rule of its modifier (e.g. `@@...$csp`).
pub const PASS_ALL_PRIORITY: u8 = 3;
/// `$important` blocking rule.
pub const MODIFY_IMPORTANT_PRIORITY: u8 = 4;

/// Highest priority a rule can have. A scan can stop once it found a
/// match with this priority.
pub const fn max_rule_priority() -> u8 {
    MODIFY_IMPORTANT_PRIORITY
}

/// Priority of a filter rule. Higher wins.
pub fn rule_priority(rule: &FilterRule) -> u8 {
    match rule.decision {
        Decision::Modify => MODIFY_PRIORITY,
        Decision::ModifyImportant => MODIFY_IMPORTANT_PRIORITY,
        Decision::Pass if rule.modifier == Modifier::AdQueryTrigger => PASS_AD_ATTRIBUTION_PRIORITY,
        Decision::Pass if is_pass_all_rule(rule) => PASS_ALL_PRIORITY,
        Decision::Pass => PASS_PRIORITY,
    }
}

/// Exception rule with a modifier but no modifier value: it lifts every
/// rule carrying that modifier.
pub fn is_pass_all_rule(rule: &FilterRule) -> bool {
    rule.decision == Decision::Pass
        && rule.modifier != Modifier::None
        && rule.modifier_values.is_empty()
}

// =============================================================================
// Domains
// =============================================================================

/// `host` equals `domain` or is one of its subdomains.
pub fn is_subdomain_or_same(host: &str, domain: &str) -> bool {
    match host.strip_suffix(domain) {
        Some("") => true,
        Some(rest) => rest.ends_with('.'),
        None => false,
    }
}

/// Whether a request to `url` made by `origin` is third-party. Requests
/// from opaque origins and to host-less URLs are always third-party.
pub fn is_third_party(url: &Url, origin: &Origin) -> bool {
    let (Some(url_host), Some(origin_host)) = (url.host_str(), origin.host()) else {
        return true;
    };
    !registrable_domain(url_host).eq_ignore_ascii_case(registrable_domain(origin_host))
}

/// Length of the longest entry of `domains` that `host` belongs to. The
/// list is sorted longest first, so the first hit wins.
fn longest_matching_domain(host: &str, domains: &[String]) -> Option<usize> {
    domains
        .iter()
        .find(|domain| is_subdomain_or_same(host, domain))
        .map(String::len)
}

/// Check a rule's domain constraints against the document origin.
///
/// An opaque origin only matches generic rules. Otherwise the longest
/// included domain covering the host must be longer than the longest
/// excluded one; a rule without included domains is generic and is skipped
/// when generic rules are disabled.
pub fn does_origin_match_domain_list(
    origin: &Origin,
    domains_included: &[String],
    domains_excluded: &[String],
    disable_generic_rules: bool,
) -> bool {
    let Some(host) = origin.host() else {
        return domains_included.is_empty() && !disable_generic_rules;
    };

    let included_len = longest_matching_domain(host, domains_included);
    if domains_included.is_empty() {
        if disable_generic_rules {
            return false;
        }
    } else if included_len.is_none() {
        return false;
    }

    match longest_matching_domain(host, domains_excluded) {
        None => true,
        Some(excluded_len) => included_len.unwrap_or(0) > excluded_len,
    }
}

// =============================================================================
// Content injection bodies
// =============================================================================

/// A domain-scoped rule whose identity is its body.
///
/// Two rules with the same body inject the same content, whatever their
/// domains, so allow and block rules are paired up by body.
pub trait InjectionRule {
    type Body<'a>: Ord + Clone
    where
        Self: 'a;

    fn core(&self) -> &ContentInjectionRuleCore;
    fn body(&self) -> Self::Body<'_>;
}

impl InjectionRule for CosmeticRule {
    type Body<'a> = &'a str;

    fn core(&self) -> &ContentInjectionRuleCore {
        &self.core
    }

    fn body(&self) -> Self::Body<'_> {
        &self.selector
    }
}

impl InjectionRule for ScriptletInjectionRule {
    type Body<'a> = (&'a str, &'a [String]);

    fn core(&self) -> &ContentInjectionRuleCore {
        &self.core
    }

    fn body(&self) -> Self::Body<'_> {
        (self.scriptlet_name.as_str(), self.arguments.as_slice())
    }
}
