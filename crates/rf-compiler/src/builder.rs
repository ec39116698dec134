//! Rules index builder
//!
//! Compiles every loaded rules list into one `IndexData`. The build is a
//! pure function of its input buffers: identical buffers always yield
//! byte-identical serialized indexes.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use rf_core::hash::ngrams;
use rf_core::rules_index::RuleBuffers;
use rf_core::storage::{
    serialize_index, FilterRule, IndexData, InjectionEntry, InjectionNode, InjectionTree, RulesMap, RulesMapType,
};
use rf_core::stylesheet::build_stylesheet;
use rf_core::types::{Modifier, RuleId};
use rf_core::utils::{rule_priority, InjectionRule};

// =============================================================================
// Rules maps
// =============================================================================

/// Rules map under construction. Candidates keep their priority until the
/// final sort.
#[derive(Default)]
struct RulesMapBuilder {
    ngram_rules: HashMap<u64, Vec<(u8, RuleId)>>,
    fallback_rules: Vec<(u8, RuleId)>,
}

impl RulesMapBuilder {
    fn add(&mut self, id: RuleId, rule: &FilterRule) {
        let entry = (rule_priority(rule), id);
        match self.pick_ngram(rule) {
            Some(ngram) => self.ngram_rules.entry(ngram).or_default().push(entry),
            None => self.fallback_rules.push(entry),
        }
    }

    /// N-gram of the rule with the shortest candidate list so far. An unused
    /// n-gram wins right away.
    fn pick_ngram(&self, rule: &FilterRule) -> Option<u64> {
        let mut best: Option<(u64, usize)> = None;
        for ngram in ngrams(rule.ngram_search_string.as_bytes()) {
            let len = self.ngram_rules.get(&ngram).map_or(0, Vec::len);
            if len == 0 {
                return Some(ngram);
            }
            if best.map_or(true, |(_, best_len)| len < best_len) {
                best = Some((ngram, len));
            }
        }
        best.map(|(ngram, _)| ngram)
    }

    fn finish(self) -> RulesMap {
        fn sorted(mut list: Vec<(u8, RuleId)>) -> Vec<RuleId> {
            // Stable, so equal priorities keep insertion order
            list.sort_by_key(|&(priority, _)| Reverse(priority));
            list.into_iter().map(|(_, id)| id).collect()
        }

        RulesMap {
            ngram_rules: self
                .ngram_rules
                .into_iter()
                .map(|(ngram, list)| (ngram, sorted(list)))
                .collect(),
            fallback_rules: sorted(self.fallback_rules),
        }
    }
}

// =============================================================================
// Content injection tree
// =============================================================================

struct TreeNodeBuilder<B> {
    rules: BTreeMap<B, InjectionEntry>,
    children: BTreeMap<String, u32>,
}

impl<B> Default for TreeNodeBuilder<B> {
    fn default() -> Self {
        Self {
            rules: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }
}

struct InjectionTreeBuilder<B> {
    nodes: Vec<TreeNodeBuilder<B>>,
}

impl<B: Ord> InjectionTreeBuilder<B> {
    fn new() -> Self {
        Self {
            nodes: vec![TreeNodeBuilder::default()],
        }
    }

    /// Node for `domain`, creating the label path from the TLD down.
    fn node_for(&mut self, domain: &str) -> usize {
        let mut node = InjectionTree::ROOT as usize;
        for label in domain.rsplit('.') {
            node = match self.nodes[node].children.get(label) {
                Some(&child) => child as usize,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(TreeNodeBuilder::default());
                    self.nodes[node].children.insert(label.to_string(), child as u32);
                    child
                }
            };
        }
        node
    }

    /// Attach a rule body to a node. Within a node an allow entry always
    /// replaces a block entry for the same body, never the reverse.
    fn insert(&mut self, node: usize, body: B, entry: InjectionEntry) {
        let rules = &mut self.nodes[node].rules;
        match rules.get(&body) {
            Some(existing) if existing.is_allow || !entry.is_allow => {}
            _ => {
                rules.insert(body, entry);
            }
        }
    }

    fn finish(self) -> InjectionTree {
        InjectionTree {
            nodes: self
                .nodes
                .into_iter()
                .map(|node| InjectionNode {
                    rules: node.rules.into_values().collect(),
                    subdomains: node.children.into_iter().collect(),
                })
                .collect(),
        }
    }
}

/// Build the domain tree for `rules`. When `split_default` is set, generic
/// block rules whose body is never allowed anywhere are kept out of the tree
/// and returned separately.
fn build_injection_tree<'a, R>(rules: &[(RuleId, &'a R)], split_default: bool) -> (InjectionTree, BTreeSet<R::Body<'a>>)
where
    R: InjectionRule + 'a,
{
    // Bodies that some rule allows somewhere, explicitly or by exclusion
    let allowed: BTreeSet<R::Body<'a>> = rules
        .iter()
        .filter(|&&(_, rule)| rule.core().is_allow_rule || !rule.core().domains_excluded.is_empty())
        .map(|&(_, rule)| rule.body())
        .collect();

    let mut tree = InjectionTreeBuilder::new();
    let mut default_bodies = BTreeSet::new();

    for &(id, rule) in rules {
        let core = rule.core();
        let is_allow = core.is_allow_rule;

        if core.domains_included.is_empty() {
            let body = rule.body();
            if split_default && !is_allow && !allowed.contains(&body) {
                default_bodies.insert(body);
            } else {
                tree.insert(InjectionTree::ROOT as usize, body, InjectionEntry { rule: id, is_allow });
            }
        }

        for domain in &core.domains_included {
            let node = tree.node_for(domain);
            tree.insert(node, rule.body(), InjectionEntry { rule: id, is_allow });
        }
        for domain in &core.domains_excluded {
            let node = tree.node_for(domain);
            tree.insert(node, rule.body(), InjectionEntry { rule: id, is_allow: !is_allow });
        }
    }

    (tree.finish(), default_bodies)
}

// =============================================================================
// Index
// =============================================================================

/// Build the index data for `buffers`. An empty buffer set yields a valid
/// index that matches nothing.
pub fn build_rules_index(buffers: &RuleBuffers) -> IndexData {
    let mut data = IndexData::default();
    let mut maps: BTreeMap<RulesMapType, RulesMapBuilder> = BTreeMap::new();
    let mut cosmetic_rules = Vec::new();
    let mut scriptlet_rules = Vec::new();

    for (&source_id, buffer) in buffers {
        data.source_checksums.insert(source_id, buffer.checksum().to_string());
        let list = buffer.rules_list();

        for (rule_nr, rule) in (0u32..).zip(&list.filter_rules) {
            let id = RuleId::new(source_id, rule_nr);
            if !rule.activation_types.is_empty() {
                maps.entry(RulesMapType::Activation).or_default().add(id, rule);
            }
            if rule.modify_block {
                maps.entry(RulesMapType::BeforeRequest).or_default().add(id, rule);
            }
            let modifier_map = match rule.modifier {
                Modifier::Csp => Some(RulesMapType::HeadersReceived),
                Modifier::Redirect => Some(RulesMapType::ModifyBlockedRequest),
                Modifier::AdQueryTrigger => Some(RulesMapType::ModifyAllowedRequest),
                Modifier::None => None,
            };
            if let Some(map_type) = modifier_map {
                maps.entry(map_type).or_default().add(id, rule);
            }
        }

        cosmetic_rules.extend((0u32..).zip(&list.cosmetic_rules).map(|(nr, rule)| (RuleId::new(source_id, nr), rule)));
        scriptlet_rules.extend((0u32..).zip(&list.scriptlet_rules).map(|(nr, rule)| (RuleId::new(source_id, nr), rule)));
    }

    for (map_type, builder) in maps {
        *data.rules_map_mut(map_type) = builder.finish();
    }

    let (cosmetic_tree, default_selectors) = build_injection_tree(&cosmetic_rules, true);
    let (scriptlet_tree, _) = build_injection_tree(&scriptlet_rules, false);
    data.cosmetic_tree = cosmetic_tree;
    data.scriptlet_tree = scriptlet_tree;
    data.default_stylesheet = build_stylesheet(default_selectors);

    log::info!(
        "Built rules index from {} sources: {} before-request, {} headers-received, {} activation, {} redirect, {} ad-attribution rules, {} cosmetic nodes, {} scriptlet nodes",
        data.source_checksums.len(),
        data.before_request.rule_count(),
        data.headers_received.rule_count(),
        data.activation.rule_count(),
        data.modify_blocked_request.rule_count(),
        data.modify_allowed_request.rule_count(),
        data.cosmetic_tree.nodes.len(),
        data.scriptlet_tree.nodes.len(),
    );

    data
}

/// Build and serialize the index. Returns the file bytes and the checksum
/// of the payload.
pub fn build_serialized_index(buffers: &RuleBuffers) -> (Vec<u8>, String) {
    serialize_index(&build_rules_index(buffers))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rf_core::storage::read_index_bytes;
    use rf_core::types::{Decision, ResourceTypes};
    use rf_core::{Origin, RuleBufferHolder, RulesIndex, RulesIndexConfig, UrlInfo};

    use super::*;
    use crate::list_builder::compile_filter_list;

    /// Compile each text as its own source (ids 1, 2, ...).
    fn buffers_for(texts: &[&str]) -> RuleBuffers {
        (1u32..)
            .zip(texts)
            .map(|(source_id, text)| {
                let compiled = compile_filter_list(text);
                let holder = RuleBufferHolder::from_file_bytes(&compiled.bytes, Some(&compiled.checksum))
                    .expect("list should load");
                (source_id, Arc::new(holder))
            })
            .collect()
    }

    /// Full cycle: build, serialize, read back and wrap in an index.
    fn index_for(texts: &[&str]) -> RulesIndex {
        let buffers = buffers_for(texts);
        let (bytes, checksum) = build_serialized_index(&buffers);
        let data = read_index_bytes(&bytes, &checksum).expect("index should load");
        assert!(RulesIndex::buffers_match(&data, &buffers));
        RulesIndex::new(data, buffers, RulesIndexConfig::default())
    }

    fn url(spec: &str) -> UrlInfo {
        UrlInfo::parse(spec).unwrap()
    }

    #[test]
    fn important_wildcard_rule_matches_script() {
        let index = index_for(&["ad*banner^$script,important"]);
        let found = index
            .find_matching_before_request_rule(
                &url("http://x.com/ad123banner/foo.js"),
                &Origin::parse("http://x.com"),
                ResourceTypes::SCRIPT,
                false,
                false,
            )
            .expect("rule should match");
        assert_eq!(found.rule.decision, Decision::ModifyImportant);
        assert_eq!(found.id, RuleId::new(1, 0));
    }

    #[test]
    fn exception_from_other_source_wins() {
        let index = index_for(&["||ads.example.com^", "@@||ads.example.com^$script"]);
        let origin = Origin::parse("https://example.com");
        let script = index
            .find_matching_before_request_rule(&url("https://ads.example.com/a.js"), &origin, ResourceTypes::SCRIPT, false, false)
            .unwrap();
        assert_eq!(script.rule.decision, Decision::Pass);
        assert_eq!(script.id.source_id, 2);

        let image = index
            .find_matching_before_request_rule(&url("https://ads.example.com/a.png"), &origin, ResourceTypes::IMAGE, false, false)
            .unwrap();
        assert_eq!(image.rule.decision, Decision::Modify);
    }

    #[test]
    fn domain_constraints_and_generic_block() {
        let index = index_for(&["/tracker.js$domain=news.com|~sports.news.com", "/pixel.gif"]);
        let spec = url("https://cdn.net/tracker.js");
        let find = |origin: &str, disable_generic: bool| {
            index
                .find_matching_before_request_rule(&spec, &Origin::parse(origin), ResourceTypes::SCRIPT, true, disable_generic)
                .is_some()
        };
        assert!(find("https://news.com", false));
        assert!(find("https://www.news.com", true));
        assert!(!find("https://sports.news.com", false));
        assert!(!find("https://other.com", false));

        let pixel = url("https://cdn.net/pixel.gif");
        let origin = Origin::parse("https://news.com");
        assert!(index
            .find_matching_before_request_rule(&pixel, &origin, ResourceTypes::IMAGE, true, false)
            .is_some());
        assert!(index
            .find_matching_before_request_rule(&pixel, &origin, ResourceTypes::IMAGE, true, true)
            .is_none());
    }

    #[test]
    fn regex_and_short_patterns_use_fallback() {
        let buffers = buffers_for(&["/[a-z]+\\.ads\\.net/\n||ab^"]);
        let data = build_rules_index(&buffers);
        assert_eq!(data.before_request.fallback_rules.len(), 2);
        assert!(data.before_request.ngram_rules.is_empty());

        let index = index_for(&["/[a-z]+\\.ads\\.net/"]);
        assert!(index
            .find_matching_before_request_rule(
                &url("https://foo.ads.net/x"),
                &Origin::parse("https://site.com"),
                ResourceTypes::IMAGE,
                true,
                false
            )
            .is_some());
    }

    #[test]
    fn rules_spread_over_ngrams() {
        let buffers = buffers_for(&["-banner\n-banner-ads\n-banner-ads-big"]);
        let data = build_rules_index(&buffers);
        // Each rule found an n-gram nobody used yet
        assert_eq!(data.before_request.ngram_rules.len(), 3);
        assert!(data.before_request.ngram_rules.values().all(|list| list.len() == 1));
    }

    #[test]
    fn buckets_sorted_by_priority() {
        let buffers = buffers_for(&["-ban-\n@@-ban-\n-ban-$important\n@@-ban-$csp"]);
        let data = build_rules_index(&buffers);
        let list = data.before_request.ngram_rules.values().next().unwrap();
        let priorities: Vec<u8> = list
            .iter()
            .map(|id| rule_priority(buffers[&id.source_id].filter_rule(id.rule_nr).unwrap()))
            .collect();
        assert_eq!(priorities, vec![4, 1, 0]);
        assert_eq!(data.headers_received.rule_count(), 1);
    }

    #[test]
    fn csp_rules_and_blanket_exception() {
        let index = index_for(&[
            "||site.com^$csp=script-src 'none'\n||site.com^$csp=img-src 'self'",
            "@@||site.com/trusted^$csp",
        ]);
        let origin = Origin::parse("https://site.com");
        let found = index.find_matching_headers_received_rules(&url("https://site.com/page"), &origin, false, false);
        assert_eq!(found.len(), 2);
        let found = index.find_matching_headers_received_rules(&url("https://site.com/trusted/"), &origin, false, false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule.decision, Decision::Pass);
    }

    #[test]
    fn redirect_and_ad_attribution_maps() {
        let index = index_for(&[
            "||ads.com/tag.js$script,redirect=noop.js\n@@||shop.com^$ad-query-trigger=gclid",
        ]);
        let origin = Origin::parse("https://site.com");
        let found = index.find_matching_modifier_rules(
            RulesMapType::ModifyBlockedRequest,
            &url("https://ads.com/tag.js"),
            &origin,
            ResourceTypes::SCRIPT,
            true,
            false,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule.modifier_values, vec!["noop.js"]);

        let found = index.find_matching_modifier_rules(
            RulesMapType::ModifyAllowedRequest,
            &url("https://shop.com/?gclid=1"),
            &origin,
            ResourceTypes::SUBDOCUMENT,
            true,
            false,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(index.stats().modify_allowed_rules, 1);
    }

    #[test]
    fn cosmetic_allow_on_domain_overrides_generic_block() {
        let index = index_for(&["##.ads", "example.com#@#.ads"]);
        assert_eq!(index.get_default_stylesheet(), "");
        assert_eq!(index.get_stylesheet_for_origin(&Origin::parse("https://example.com"), false), "");
        assert_eq!(
            index.get_stylesheet_for_origin(&Origin::parse("https://other.com"), false),
            ".ads {display: none !important;}\n"
        );
    }

    #[test]
    fn untouched_generic_rules_go_to_default_stylesheet() {
        let index = index_for(&["##.banner\n##.ads\n~example.com##.promo\nnews.com##.sidebar"]);
        assert_eq!(index.get_default_stylesheet(), ".ads,\n.banner {display: none !important;}\n");

        assert_eq!(
            index.get_stylesheet_for_origin(&Origin::parse("https://other.com"), false),
            ".promo {display: none !important;}\n"
        );
        assert_eq!(index.get_stylesheet_for_origin(&Origin::parse("https://example.com"), false), "");
        assert_eq!(
            index.get_stylesheet_for_origin(&Origin::parse("https://www.news.com"), false),
            ".promo,\n.sidebar {display: none !important;}\n"
        );
        assert_eq!(
            index.get_stylesheet_for_origin(&Origin::parse("https://www.news.com"), true),
            ".sidebar {display: none !important;}\n"
        );
    }

    #[test]
    fn deeper_domain_rule_overrides_shallower() {
        let index = index_for(&["example.com#@#.ads\nsub.example.com##.ads\n##.ads"]);
        assert_eq!(index.get_stylesheet_for_origin(&Origin::parse("https://example.com"), false), "");
        assert_eq!(
            index.get_stylesheet_for_origin(&Origin::parse("https://a.sub.example.com"), false),
            ".ads {display: none !important;}\n"
        );
    }

    #[test]
    fn scriptlets_for_origin() {
        let index = index_for(&[
            "example.com##+js(set-constant, ads, false)\n##+js(nowebrtc)\nexample.com#@#+js(nowebrtc)",
        ]);
        let data = index.get_injection_data_for_origin(&Origin::parse("https://example.com"), false);
        assert_eq!(data.scriptlets.len(), 1);
        assert_eq!(data.scriptlets[0].name, "set-constant");
        assert_eq!(data.scriptlets[0].arguments, vec!["ads", "false"]);

        let other = index.get_scriptlets_for_origin(&Origin::parse("https://other.com"), false);
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].name, "nowebrtc");
        assert!(index.get_scriptlets_for_origin(&Origin::Opaque, true).is_empty());
    }

    #[test]
    fn rebuild_is_deterministic() {
        let texts = ["||a.com^\n/ads/*\n##.x\nfoo.com##.y", "@@||a.com^$document\n##+js(a, b)"];
        let first = build_serialized_index(&buffers_for(&texts));
        let second = build_serialized_index(&buffers_for(&texts));
        assert_eq!(first, second);
    }

    #[test]
    fn empty_sources_build_empty_index() {
        let index = index_for(&[]);
        assert!(index.source_checksums().is_empty());
        assert!(index
            .find_matching_before_request_rule(
                &url("https://x.com/ads.js"),
                &Origin::parse("https://x.com"),
                ResourceTypes::SCRIPT,
                false,
                false
            )
            .is_none());
        assert_eq!(index.get_stylesheet_for_origin(&Origin::parse("https://x.com"), false), "");
        // Root nodes always exist
        let stats = index.stats();
        assert_eq!(stats.cosmetic_nodes, 1);
        assert_eq!(stats.scriptlet_nodes, 1);
        assert_eq!(stats.before_request_rules, 0);
        assert_eq!(stats.default_stylesheet_bytes, 0);
    }

    #[test]
    fn activation_rules_reach_frames() {
        let mut index = index_for(&["@@||trusted.com^$document\n@@||news.com^$generichide"]);
        let origin = Origin::parse("https://trusted.com");
        let found = index.find_matching_activations_rules(
            &url("https://trusted.com/"),
            &origin,
            false,
            rf_core::ProcessKey(1),
        );
        assert_eq!(found.in_allow_rules, rf_core::ActivationTypes::DOCUMENT);
        assert_eq!(index.stats().activation_rules, 2);
        assert_eq!(index.stats().before_request_rules, 0);
    }
}
