//! URL pattern matching for filter rules
//!
//! Patterns are split on `*` into subpatterns which are then located in the
//! URL left to right. Inside a subpattern `^` stands for one separator byte;
//! when it is the very last byte of a subpattern it may also match the end
//! of the URL.
//!
//! Anchors:
//! - `START`: the first subpattern must match at offset 0
//! - `HOST`: the first subpattern must start at a label boundary of the host
//! - `END`: the last subpattern must end at the end of the URL
//!
//! Matching is greedy and never backtracks into earlier subpatterns.

use crate::storage::{FilterRule, RuleBufferHolder};
use crate::types::{AnchorType, PatternType};
use crate::url_info::UrlInfo;
use crate::utils::is_subdomain_or_same;

const WILDCARD: u8 = b'*';
const SEPARATOR_PLACEHOLDER: u8 = b'^';

/// Whether `b` counts as a separator for the `^` placeholder.
#[inline]
pub fn is_separator(b: u8) -> bool {
    !(b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'%'))
}

// =============================================================================
// Rule matching
// =============================================================================

/// Check the pattern of rule `rule_nr` of `buffer` against `url`, including
/// its optional host constraint.
pub fn rule_matches_url(buffer: &RuleBufferHolder, rule_nr: u32, url: &UrlInfo) -> bool {
    let Some(rule) = buffer.filter_rule(rule_nr) else {
        return false;
    };

    if let Some(host) = &rule.host {
        if !is_subdomain_or_same(url.host(), host) {
            return false;
        }
    }

    match rule.pattern_type {
        PatternType::Regexp => buffer
            .regex(rule_nr)
            .is_some_and(|regex| regex.is_match(url.spec())),
        PatternType::Plain | PatternType::Wildcarded => matches_filter_pattern(rule, url),
    }
}

/// Match a plain or wildcarded rule pattern against `url`.
pub fn matches_filter_pattern(rule: &FilterRule, url: &UrlInfo) -> bool {
    let spec = if rule.is_case_sensitive {
        url.spec()
    } else {
        url.fold_spec()
    };
    matches_pattern(
        rule.pattern.as_bytes(),
        rule.anchor_type,
        !rule.is_case_sensitive,
        spec.as_bytes(),
        url.host_span(),
    )
}

/// Match a raw pattern against `text`. With `fold` set, pattern bytes are
/// lowercased before comparison and `text` must already be lowercase.
pub fn matches_pattern(
    pattern: &[u8],
    anchor: AnchorType,
    fold: bool,
    text: &[u8],
    host_span: (usize, usize),
) -> bool {
    if pattern.is_empty() {
        return true;
    }

    let subpatterns: Vec<&[u8]> = pattern.split(|&b| b == WILDCARD).collect();
    let last = subpatterns.len() - 1;
    let mut pos = 0;

    for (i, sub) in subpatterns.iter().enumerate() {
        let must_end = i == last && anchor.contains(AnchorType::END);
        let ends_ok = |end: usize| !must_end || end == text.len();

        let found = if i == 0 && anchor.contains(AnchorType::START) {
            match_at(text, 0, sub, fold).filter(|&end| ends_ok(end))
        } else if i == 0 && anchor.contains(AnchorType::HOST) {
            host_label_starts(text, host_span)
                .find_map(|start| match_at(text, start, sub, fold).filter(|&end| ends_ok(end)))
        } else if must_end {
            match_suffix(text, pos, sub, fold)
        } else {
            find_from(text, pos, sub, fold)
        };

        match found {
            Some(end) => pos = end,
            None => return false,
        }
    }

    true
}

// =============================================================================
// Subpattern helpers
// =============================================================================

/// Match `sub` at exactly `start`, returning the end offset of the match.
fn match_at(text: &[u8], start: usize, sub: &[u8], fold: bool) -> Option<usize> {
    if start > text.len() {
        return None;
    }
    // Overflow means the subpattern cannot fit
    let end = start.checked_add(sub.len())?;

    for (i, &p) in sub.iter().enumerate() {
        let Some(&c) = text.get(start + i) else {
            // Only a trailing `^` may run past the end of the text
            let is_trailing_placeholder = p == SEPARATOR_PLACEHOLDER && i + 1 == sub.len();
            return is_trailing_placeholder.then_some(text.len());
        };
        let ok = if p == SEPARATOR_PLACEHOLDER {
            is_separator(c)
        } else if fold {
            p.to_ascii_lowercase() == c
        } else {
            p == c
        };
        if !ok {
            return None;
        }
    }

    Some(end)
}

/// First match of `sub` at or after `from`.
fn find_from(text: &[u8], from: usize, sub: &[u8], fold: bool) -> Option<usize> {
    (from..=text.len()).find_map(|start| match_at(text, start, sub, fold))
}

/// Match `sub` so that it ends at the end of `text`, starting no earlier
/// than `from`.
fn match_suffix(text: &[u8], from: usize, sub: &[u8], fold: bool) -> Option<usize> {
    let len = text.len();
    let mut starts = vec![len.checked_sub(sub.len())];
    if sub.last() == Some(&SEPARATOR_PLACEHOLDER) {
        // A trailing `^` may consume the end of the text instead of a byte
        starts.push(len.checked_sub(sub.len() - 1));
    }

    starts
        .into_iter()
        .flatten()
        .filter(|&start| start >= from)
        .find_map(|start| match_at(text, start, sub, fold).filter(|&end| end == len))
}

/// Offsets inside the host at which a `||` pattern may start: the host start
/// and every position right after a `.`.
fn host_label_starts(text: &[u8], host_span: (usize, usize)) -> impl Iterator<Item = usize> + '_ {
    let (host_start, host_end) = host_span;
    let host_end = host_end.min(text.len());
    let host_start = host_start.min(host_end);
    std::iter::once(host_start)
        .filter(move |_| host_start < host_end)
        .chain((host_start + 1..host_end).filter(move |&i| text[i - 1] == b'.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(pattern: &str, anchor: AnchorType, url: &str) -> bool {
        let info = UrlInfo::parse(url).unwrap();
        matches_pattern(
            pattern.as_bytes(),
            anchor,
            true,
            info.fold_spec().as_bytes(),
            info.host_span(),
        )
    }

    #[test]
    fn test_empty_pattern_matches_everything() {
        assert!(check("", AnchorType::empty(), "https://example.com/"));
        assert!(check("", AnchorType::START | AnchorType::END, "https://example.com/"));
    }

    #[test]
    fn test_unanchored_wildcards() {
        assert!(check("ad*banner^", AnchorType::empty(), "http://x.com/ad123banner/foo.js"));
        assert!(!check("ad*banner^", AnchorType::empty(), "http://x.com/ad123bannerfoo.js"));
        assert!(check("/ads/", AnchorType::empty(), "http://x.com/path/ads/img.png"));
        assert!(!check("/ads/", AnchorType::empty(), "http://x.com/path/adsx/img.png"));
    }

    #[test]
    fn test_separator_at_end() {
        assert!(check("banner^", AnchorType::empty(), "http://x.com/banner"));
        assert!(check("banner^", AnchorType::END, "http://x.com/banner"));
        assert!(check("banner^", AnchorType::END, "http://x.com/banner?"));
        assert!(!check("ban^ner", AnchorType::empty(), "http://x.com/banner"));
    }

    #[test]
    fn test_start_and_end_anchors() {
        assert!(check("http://x.com/", AnchorType::START, "http://x.com/a.js"));
        assert!(!check("x.com/", AnchorType::START, "http://x.com/a.js"));
        assert!(check(".js", AnchorType::END, "http://x.com/a.js"));
        assert!(!check(".js", AnchorType::END, "http://x.com/a.js?v=1"));
        assert!(check(
            "http://x.com/a.js",
            AnchorType::START | AnchorType::END,
            "http://x.com/a.js"
        ));
        assert!(!check(
            "http://x.com/a",
            AnchorType::START | AnchorType::END,
            "http://x.com/a.js"
        ));
        assert!(check(
            "http://*/a.js",
            AnchorType::START | AnchorType::END,
            "http://x.com/a.js"
        ));
    }

    #[test]
    fn test_host_anchor() {
        assert!(check("example.com^", AnchorType::HOST, "https://example.com/x"));
        assert!(check("example.com^", AnchorType::HOST, "https://ads.example.com/x"));
        assert!(!check("example.com^", AnchorType::HOST, "https://badexample.com/x"));
        assert!(!check("com/", AnchorType::HOST, "https://example.net/com/"));
        assert!(check("example.com/ads", AnchorType::HOST, "https://example.com/ads"));
    }

    #[test]
    fn test_case_sensitivity() {
        let info = UrlInfo::parse("https://x.com/Banner").unwrap();
        let mut rule = FilterRule {
            pattern: "Banner".to_string(),
            is_case_sensitive: true,
            ..Default::default()
        };
        assert!(matches_filter_pattern(&rule, &info));
        rule.pattern = "banner".to_string();
        assert!(!matches_filter_pattern(&rule, &info));
        rule.is_case_sensitive = false;
        assert!(matches_filter_pattern(&rule, &info));
        rule.pattern = "BANNER".to_string();
        assert!(matches_filter_pattern(&rule, &info));
    }

    #[test]
    fn test_overflowing_span_rejected() {
        assert!(!matches_pattern(
            b"abc",
            AnchorType::HOST,
            false,
            b"abc",
            (usize::MAX, usize::MAX),
        ));
        assert_eq!(match_at(b"abc", usize::MAX, b"a", false), None);
    }

    #[test]
    fn test_separator_bytes() {
        assert!(is_separator(b'/'));
        assert!(is_separator(b'?'));
        assert!(is_separator(b':'));
        assert!(!is_separator(b'a'));
        assert!(!is_separator(b'.'));
        assert!(!is_separator(b'%'));
    }
}
