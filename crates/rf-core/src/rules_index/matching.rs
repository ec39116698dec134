//! Network request queries: before-request, headers-received, modifier and
//! activation lookups.

use super::RulesIndex;
use crate::pattern_matcher::rule_matches_url;
use crate::storage::{FilterRule, RulesMapType};
use crate::types::{ActivationTypes, ActivationsFound, Decision, PartyFlags, ProcessKey, ResourceTypes, RuleId};
use crate::url_info::{Origin, UrlInfo};
use crate::utils::{does_origin_match_domain_list, is_pass_all_rule, is_third_party, max_rule_priority, rule_priority};

/// A matched rule and where it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch<'a> {
    pub id: RuleId,
    pub rule: &'a FilterRule,
}

/// Frame of a document, as seen by the activation queries.
///
/// Implemented by the host environment. The index only reads frames and
/// uses the process key as a cache key.
pub trait Frame {
    fn process_key(&self) -> ProcessKey;
    /// URL of the document loaded in the frame
    fn url(&self) -> &UrlInfo;
    /// Origin of the document loaded in the frame
    fn origin(&self) -> Origin;
    fn parent(&self) -> Option<&dyn Frame>;
}

impl RulesIndex {
    // =========================================================================
    // Before request
    // =========================================================================

    /// Find the highest priority rule deciding whether a request is blocked.
    pub fn find_matching_before_request_rule(
        &self,
        url: &UrlInfo,
        document_origin: &Origin,
        resource_type: ResourceTypes,
        is_third_party: bool,
        disable_generic_rules: bool,
    ) -> Option<RuleMatch<'_>> {
        if url.spec().len() > self.config.max_url_length {
            return None;
        }

        let party = PartyFlags::for_request(is_third_party);
        let mut best: Option<(u8, RuleMatch<'_>)> = None;

        for list in Self::candidate_lists(&self.data.before_request, url) {
            for &id in list {
                let Some((buffer, rule)) = self.filter_rule(id) else {
                    continue;
                };
                let priority = rule_priority(rule);
                if best.is_some_and(|(best_priority, _)| priority <= best_priority) {
                    // Lists are sorted by descending priority
                    break;
                }

                if !rule.resource_types.intersects(resource_type)
                    || !rule.party.intersects(party)
                    || !does_origin_match_domain_list(
                        document_origin,
                        &rule.domains_included,
                        &rule.domains_excluded,
                        disable_generic_rules,
                    )
                    || !rule_matches_url(buffer, id.rule_nr, url)
                {
                    continue;
                }

                if priority == max_rule_priority() {
                    return Some(RuleMatch { id, rule });
                }
                best = Some((priority, RuleMatch { id, rule }));
                break;
            }
        }

        best.map(|(_, found)| found)
    }

    // =========================================================================
    // Headers received and modifiers
    // =========================================================================

    /// Find every CSP rule applying to a document response. A matching
    /// `@@...$csp` rule without value is returned alone.
    pub fn find_matching_headers_received_rules(
        &self,
        url: &UrlInfo,
        document_origin: &Origin,
        is_third_party: bool,
        disable_generic_rules: bool,
    ) -> Vec<RuleMatch<'_>> {
        self.collect_matching_rules(
            RulesMapType::HeadersReceived,
            url,
            document_origin,
            None,
            is_third_party,
            disable_generic_rules,
        )
    }

    /// Find every rule of a modifier map (redirects or ad attribution)
    /// applying to a request, with the same blanket exception handling as
    /// `find_matching_headers_received_rules`.
    pub fn find_matching_modifier_rules(
        &self,
        map_type: RulesMapType,
        url: &UrlInfo,
        document_origin: &Origin,
        resource_type: ResourceTypes,
        is_third_party: bool,
        disable_generic_rules: bool,
    ) -> Vec<RuleMatch<'_>> {
        self.collect_matching_rules(
            map_type,
            url,
            document_origin,
            Some(resource_type),
            is_third_party,
            disable_generic_rules,
        )
    }

    fn collect_matching_rules(
        &self,
        map_type: RulesMapType,
        url: &UrlInfo,
        document_origin: &Origin,
        resource_type: Option<ResourceTypes>,
        is_third_party: bool,
        disable_generic_rules: bool,
    ) -> Vec<RuleMatch<'_>> {
        let party = PartyFlags::for_request(is_third_party);
        let mut found = Vec::new();

        for list in Self::candidate_lists(self.data.rules_map(map_type), url) {
            for &id in list {
                let Some((buffer, rule)) = self.filter_rule(id) else {
                    continue;
                };
                if resource_type.is_some_and(|types| !rule.resource_types.intersects(types))
                    || !rule.party.intersects(party)
                    || !does_origin_match_domain_list(
                        document_origin,
                        &rule.domains_included,
                        &rule.domains_excluded,
                        disable_generic_rules,
                    )
                    || !rule_matches_url(buffer, id.rule_nr, url)
                {
                    continue;
                }

                if is_pass_all_rule(rule) {
                    return vec![RuleMatch { id, rule }];
                }
                found.push(RuleMatch { id, rule });
            }
        }

        found
    }

    // =========================================================================
    // Activations
    // =========================================================================

    /// Activation types enabled or lifted for a document by `$document`,
    /// `$elemhide` and friends. Results are cached per process.
    pub fn find_matching_activations_rules(
        &mut self,
        url: &UrlInfo,
        document_origin: &Origin,
        is_third_party: bool,
        process: ProcessKey,
    ) -> ActivationsFound {
        if let Some(found) = self.activation_cache.get(process, document_origin, url.spec()) {
            return found;
        }

        let found = self.match_activations(url, document_origin, is_third_party);
        self.activation_cache
            .insert(process, document_origin.clone(), url.spec().to_string(), found);
        found
    }

    fn match_activations(&self, url: &UrlInfo, document_origin: &Origin, is_third_party: bool) -> ActivationsFound {
        let party = PartyFlags::for_request(is_third_party);
        let mut found = ActivationsFound::default();

        for list in Self::candidate_lists(&self.data.activation, url) {
            for &id in list {
                let Some((buffer, rule)) = self.filter_rule(id) else {
                    continue;
                };
                let target = match rule.decision {
                    Decision::Pass => &mut found.in_allow_rules,
                    Decision::Modify | Decision::ModifyImportant => &mut found.in_block_rules,
                };
                // Nothing left to learn from this rule
                if target.contains(rule.activation_types) {
                    continue;
                }

                if rule.party.intersects(party)
                    && does_origin_match_domain_list(
                        document_origin,
                        &rule.domains_included,
                        &rule.domains_excluded,
                        false,
                    )
                    && rule_matches_url(buffer, id.rule_nr, url)
                {
                    *target |= rule.activation_types;
                }
            }
        }

        found
    }

    /// Activations of `frame`, inheriting the allow activations of its
    /// ancestors. Without `is_origin_wanted` the document is treated as
    /// allowed wholesale.
    pub fn get_activations_for_frame(&mut self, is_origin_wanted: bool, frame: &dyn Frame) -> ActivationsFound {
        let mut found = self.frame_activations(frame);
        if !is_origin_wanted {
            found.in_allow_rules |= ActivationTypes::DOCUMENT;
        }

        let mut ancestor = frame.parent();
        while let Some(current) = ancestor {
            found.in_allow_rules |= self.frame_activations(current).in_allow_rules;
            ancestor = current.parent();
        }

        found
    }

    fn frame_activations(&mut self, frame: &dyn Frame) -> ActivationsFound {
        // A document is loaded on behalf of its parent; main frames by
        // themselves.
        let document_origin = match frame.parent() {
            Some(parent) => parent.origin(),
            None => frame.origin(),
        };
        let third_party = is_third_party(frame.url().url(), &document_origin);
        self.find_matching_activations_rules(frame.url(), &document_origin, third_party, frame.process_key())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::rules_index::{RuleBuffers, RulesIndexConfig};
    use crate::storage::{IndexData, RuleBufferHolder, RulesList};
    use crate::types::{Modifier, PatternType};

    const SOURCE: u32 = 7;

    fn rule(decision: Decision, pattern: &str) -> FilterRule {
        FilterRule {
            decision,
            modify_block: true,
            party: PartyFlags::ALL,
            resource_types: ResourceTypes::ALL,
            pattern_type: PatternType::Plain,
            pattern: pattern.to_string(),
            ngram_search_string: pattern.to_string(),
            ..Default::default()
        }
    }

    /// Index with every rule in the fallback list of `map_type`, sorted
    /// like the builder sorts them.
    fn index_with(map_type: RulesMapType, rules: Vec<FilterRule>, config: RulesIndexConfig) -> RulesIndex {
        let mut ids: Vec<RuleId> = (0..rules.len() as u32).map(|nr| RuleId::new(SOURCE, nr)).collect();
        ids.sort_by_key(|id| std::cmp::Reverse(rule_priority(&rules[id.rule_nr as usize])));

        let holder = RuleBufferHolder::new(
            RulesList {
                filter_rules: rules,
                ..Default::default()
            },
            "sum".to_string(),
        );
        let mut data = IndexData::default();
        data.source_checksums.insert(SOURCE, "sum".to_string());
        data.rules_map_mut(map_type).fallback_rules = ids;

        let mut buffers: RuleBuffers = BTreeMap::new();
        buffers.insert(SOURCE, Arc::new(holder));
        RulesIndex::new(data, buffers, config)
    }

    fn url(spec: &str) -> UrlInfo {
        UrlInfo::parse(spec).unwrap()
    }

    #[test]
    fn test_exception_beats_block_and_important_beats_exception() {
        let origin = Origin::parse("https://x.com");
        let index = index_with(
            RulesMapType::BeforeRequest,
            vec![rule(Decision::Modify, "/ads/"), rule(Decision::Pass, "/ads/")],
            RulesIndexConfig::default(),
        );
        let found = index
            .find_matching_before_request_rule(&url("https://x.com/ads/a.js"), &origin, ResourceTypes::SCRIPT, false, false)
            .unwrap();
        assert_eq!(found.rule.decision, Decision::Pass);

        let index = index_with(
            RulesMapType::BeforeRequest,
            vec![
                rule(Decision::Modify, "/ads/"),
                rule(Decision::Pass, "/ads/"),
                rule(Decision::ModifyImportant, "/ads/"),
            ],
            RulesIndexConfig::default(),
        );
        let found = index
            .find_matching_before_request_rule(&url("https://x.com/ads/a.js"), &origin, ResourceTypes::SCRIPT, false, false)
            .unwrap();
        assert_eq!(found.id, RuleId::new(SOURCE, 2));
    }

    #[test]
    fn test_before_request_checks_type_and_party() {
        let origin = Origin::parse("https://x.com");
        let mut script_only = rule(Decision::Modify, "/ads/");
        script_only.resource_types = ResourceTypes::SCRIPT;
        script_only.party = PartyFlags::THIRD_PARTY;
        let index = index_with(RulesMapType::BeforeRequest, vec![script_only], RulesIndexConfig::default());
        let spec = url("https://x.com/ads/a.png");

        assert!(index
            .find_matching_before_request_rule(&spec, &origin, ResourceTypes::IMAGE, true, false)
            .is_none());
        assert!(index
            .find_matching_before_request_rule(&spec, &origin, ResourceTypes::SCRIPT, false, false)
            .is_none());
        assert!(index
            .find_matching_before_request_rule(&spec, &origin, ResourceTypes::SCRIPT, true, false)
            .is_some());
    }

    #[test]
    fn test_overlong_url_never_matches() {
        let config = RulesIndexConfig {
            max_url_length: 20,
            ..Default::default()
        };
        let index = index_with(RulesMapType::BeforeRequest, vec![rule(Decision::Modify, "ads")], config);
        let origin = Origin::parse("https://x.com");
        assert!(index
            .find_matching_before_request_rule(&url("https://x.com/ads"), &origin, ResourceTypes::IMAGE, false, false)
            .is_some());
        assert!(index
            .find_matching_before_request_rule(&url("https://x.com/ads/long/path"), &origin, ResourceTypes::IMAGE, false, false)
            .is_none());
    }

    #[test]
    fn test_blanket_csp_exception_returned_alone() {
        let mut csp = rule(Decision::Modify, "x.com");
        csp.modifier = Modifier::Csp;
        csp.modifier_values = vec!["script-src 'none'".to_string()];
        let mut other_csp = csp.clone();
        other_csp.modifier_values = vec!["img-src 'none'".to_string()];
        let mut allow_all = rule(Decision::Pass, "x.com/safe");
        allow_all.modifier = Modifier::Csp;

        let index = index_with(
            RulesMapType::HeadersReceived,
            vec![csp, other_csp, allow_all],
            RulesIndexConfig::default(),
        );
        let origin = Origin::parse("https://x.com");

        let found = index.find_matching_headers_received_rules(&url("https://x.com/page"), &origin, false, false);
        assert_eq!(found.len(), 2);

        let found = index.find_matching_headers_received_rules(&url("https://x.com/safe"), &origin, false, false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, RuleId::new(SOURCE, 2));
    }

    #[test]
    fn test_modifier_rules_respect_resource_type() {
        let mut redirect = rule(Decision::Modify, "tracker.js");
        redirect.modifier = Modifier::Redirect;
        redirect.modifier_values = vec!["noop.js".to_string()];
        redirect.resource_types = ResourceTypes::SCRIPT;
        let index = index_with(RulesMapType::ModifyBlockedRequest, vec![redirect], RulesIndexConfig::default());
        let origin = Origin::parse("https://x.com");
        let spec = url("https://cdn.com/tracker.js");

        let found = index.find_matching_modifier_rules(
            RulesMapType::ModifyBlockedRequest,
            &spec,
            &origin,
            ResourceTypes::SCRIPT,
            true,
            false,
        );
        assert_eq!(found.len(), 1);
        let found = index.find_matching_modifier_rules(
            RulesMapType::ModifyBlockedRequest,
            &spec,
            &origin,
            ResourceTypes::IMAGE,
            true,
            false,
        );
        assert!(found.is_empty());
    }

    struct TestFrame {
        url: UrlInfo,
        parent: Option<Box<TestFrame>>,
    }

    impl Frame for TestFrame {
        fn process_key(&self) -> ProcessKey {
            ProcessKey(1)
        }

        fn url(&self) -> &UrlInfo {
            &self.url
        }

        fn origin(&self) -> Origin {
            Origin::from_url(self.url.url())
        }

        fn parent(&self) -> Option<&dyn Frame> {
            self.parent.as_deref().map(|frame| frame as &dyn Frame)
        }
    }

    fn activation_rule(decision: Decision, pattern: &str, types: ActivationTypes) -> FilterRule {
        FilterRule {
            modify_block: false,
            activation_types: types,
            ..rule(decision, pattern)
        }
    }

    #[test]
    fn test_activations_are_cached() {
        let mut index = index_with(
            RulesMapType::Activation,
            vec![activation_rule(Decision::Pass, "trusted.com", ActivationTypes::DOCUMENT)],
            RulesIndexConfig::default(),
        );
        let origin = Origin::parse("https://trusted.com");
        let spec = url("https://trusted.com/");

        let found = index.find_matching_activations_rules(&spec, &origin, false, ProcessKey(3));
        assert_eq!(found.in_allow_rules, ActivationTypes::DOCUMENT);
        assert_eq!(index.activation_cache.len_for(ProcessKey(3)), 1);

        index.on_process_destroyed(ProcessKey(3));
        assert_eq!(index.activation_cache.len_for(ProcessKey(3)), 0);

        index.find_matching_activations_rules(&spec, &origin, false, ProcessKey(3));
        index.invalidate_activation_cache();
        assert_eq!(index.activation_cache.len_for(ProcessKey(3)), 0);
    }

    #[test]
    fn test_frame_inherits_only_allow_activations() {
        let mut index = index_with(
            RulesMapType::Activation,
            vec![
                activation_rule(Decision::Pass, "trusted.com", ActivationTypes::ELEMENT_HIDE),
                activation_rule(Decision::Modify, "trusted.com", ActivationTypes::GENERIC_BLOCK),
            ],
            RulesIndexConfig::default(),
        );
        let frame = TestFrame {
            url: url("https://widgets.net/frame.html"),
            parent: Some(Box::new(TestFrame {
                url: url("https://trusted.com/"),
                parent: None,
            })),
        };

        let found = index.get_activations_for_frame(true, &frame);
        assert_eq!(found.in_allow_rules, ActivationTypes::ELEMENT_HIDE);
        assert!(found.in_block_rules.is_empty());

        let found = index.get_activations_for_frame(false, &frame);
        assert!(found.in_allow_rules.contains(ActivationTypes::DOCUMENT));

        let main = TestFrame {
            url: url("https://trusted.com/"),
            parent: None,
        };
        let found = index.get_activations_for_frame(true, &main);
        assert_eq!(found.in_block_rules, ActivationTypes::GENERIC_BLOCK);
    }
}
