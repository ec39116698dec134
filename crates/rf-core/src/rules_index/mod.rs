//! Runtime rules index
//!
//! The index pairs the compiled `IndexData` with the rule buffers it was
//! built from. All queries are synchronous and run on the owner thread; the
//! only mutable state is the activation cache.
//!
//! # Query flow
//!
//! 1. Extract the n-grams of the lowercased request URL
//! 2. Collect the candidate list of every n-gram present in the map, plus
//!    the fallback list
//! 3. Check each candidate (cheapest checks first) against the request

mod activation_cache;
mod injection;
mod matching;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::hash::ngrams;
use crate::storage::{FilterRule, IndexData, RuleBufferHolder, RulesMap, RulesMapType};
use crate::types::{ProcessKey, RuleId};
use crate::url_info::UrlInfo;

pub use activation_cache::{ActivationCache, DEFAULT_ACTIVATION_CACHE_SIZE};
pub use injection::{InjectionData, ScriptletInjection};
pub use matching::{Frame, RuleMatch};

/// Rule buffers by source id.
pub type RuleBuffers = BTreeMap<u32, Arc<RuleBufferHolder>>;

/// URLs longer than this never match before-request rules.
pub const DEFAULT_MAX_URL_LENGTH: usize = 2 * 1024 * 1024;

// =============================================================================
// Config
// =============================================================================

/// Runtime knobs of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RulesIndexConfig {
    pub activation_cache_size: usize,
    pub max_url_length: usize,
}

impl Default for RulesIndexConfig {
    fn default() -> Self {
        Self {
            activation_cache_size: DEFAULT_ACTIVATION_CACHE_SIZE,
            max_url_length: DEFAULT_MAX_URL_LENGTH,
        }
    }
}

/// Size summary of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RulesIndexStats {
    pub sources: usize,
    pub before_request_rules: usize,
    pub headers_received_rules: usize,
    pub activation_rules: usize,
    pub modify_blocked_rules: usize,
    pub modify_allowed_rules: usize,
    pub cosmetic_nodes: usize,
    pub scriptlet_nodes: usize,
    pub default_stylesheet_bytes: usize,
}

// =============================================================================
// Rules Index
// =============================================================================

/// Queryable rules index.
#[derive(Debug)]
pub struct RulesIndex {
    data: IndexData,
    buffers: RuleBuffers,
    config: RulesIndexConfig,
    activation_cache: ActivationCache,
}

impl RulesIndex {
    /// Assemble an index. `buffers` must hold every source listed in
    /// `data.source_checksums`; rules of missing sources never match.
    pub fn new(data: IndexData, buffers: RuleBuffers, config: RulesIndexConfig) -> Self {
        Self {
            data,
            buffers,
            config,
            activation_cache: ActivationCache::new(config.activation_cache_size),
        }
    }

    /// Whether `buffers` are exactly the ones the index data was built from.
    /// Extra buffers are allowed.
    pub fn buffers_match(data: &IndexData, buffers: &RuleBuffers) -> bool {
        data.source_checksums.iter().all(|(source_id, sum)| {
            buffers
                .get(source_id)
                .is_some_and(|buffer| buffer.checksum() == sum)
        })
    }

    pub fn data(&self) -> &IndexData {
        &self.data
    }

    pub fn buffers(&self) -> &RuleBuffers {
        &self.buffers
    }

    pub fn config(&self) -> &RulesIndexConfig {
        &self.config
    }

    /// Checksums of the sources the index was built from.
    pub fn source_checksums(&self) -> &BTreeMap<u32, String> {
        &self.data.source_checksums
    }

    /// Stylesheet for generic rules that no exception touches.
    pub fn get_default_stylesheet(&self) -> &str {
        &self.data.default_stylesheet
    }

    /// Drop every cached activation result. Called when exception lists
    /// change.
    pub fn invalidate_activation_cache(&mut self) {
        self.activation_cache.clear();
    }

    /// Drop cached activation results of a renderer process that went away.
    pub fn on_process_destroyed(&mut self, process: ProcessKey) {
        self.activation_cache.remove_process(process);
    }

    pub fn stats(&self) -> RulesIndexStats {
        let count = |map_type| self.data.rules_map(map_type).rule_count();
        RulesIndexStats {
            sources: self.data.source_checksums.len(),
            before_request_rules: count(RulesMapType::BeforeRequest),
            headers_received_rules: count(RulesMapType::HeadersReceived),
            activation_rules: count(RulesMapType::Activation),
            modify_blocked_rules: count(RulesMapType::ModifyBlockedRequest),
            modify_allowed_rules: count(RulesMapType::ModifyAllowedRequest),
            cosmetic_nodes: self.data.cosmetic_tree.nodes.len(),
            scriptlet_nodes: self.data.scriptlet_tree.nodes.len(),
            default_stylesheet_bytes: self.data.default_stylesheet.len(),
        }
    }

    // =========================================================================
    // Candidate lookup
    // =========================================================================

    /// Resolve a rule id to its buffer and rule.
    fn filter_rule(&self, id: RuleId) -> Option<(&RuleBufferHolder, &FilterRule)> {
        let buffer = self.buffers.get(&id.source_id)?;
        let rule = buffer.filter_rule(id.rule_nr)?;
        Some((&**buffer, rule))
    }

    /// Candidate lists of `map` for `url`: one per distinct n-gram of the
    /// URL present in the map, then the fallback list.
    fn candidate_lists<'a>(map: &'a RulesMap, url: &UrlInfo) -> Vec<&'a [RuleId]> {
        let mut seen = HashSet::new();
        let mut lists: Vec<&[RuleId]> = ngrams(url.fold_spec().as_bytes())
            .filter(|ngram| seen.insert(*ngram))
            .filter_map(|ngram| map.ngram_rules.get(&ngram))
            .map(Vec::as_slice)
            .collect();
        lists.push(&map.fallback_rules);
        lists
    }
}
