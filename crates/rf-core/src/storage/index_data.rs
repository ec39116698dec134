//! Compiled rules index payload
//!
//! The index only stores `RuleId`s; rule bodies stay in the per-source
//! rules lists. An index is valid only while every source checksum it
//! records still matches the loaded rule buffers.

use std::collections::{BTreeMap, HashMap};

use super::format::*;
use crate::hash::checksum;
use crate::types::RuleId;

// =============================================================================
// Rules maps
// =============================================================================

/// Identifies one of the request rule maps of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RulesMapType {
    /// Block/allow decisions before the request is sent
    BeforeRequest,
    /// CSP injection on response headers
    HeadersReceived,
    /// $document, $elemhide, $generichide, ...
    Activation,
    /// Redirects of blocked requests
    ModifyBlockedRequest,
    /// Ad attribution on allowed requests
    ModifyAllowedRequest,
}

impl RulesMapType {
    pub const ALL: [RulesMapType; 5] = [
        Self::BeforeRequest,
        Self::HeadersReceived,
        Self::Activation,
        Self::ModifyBlockedRequest,
        Self::ModifyAllowedRequest,
    ];
}

/// N-gram keyed candidate lists for one map.
///
/// Every list is sorted by descending rule priority.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RulesMap {
    pub ngram_rules: HashMap<u64, Vec<RuleId>>,
    /// Rules whose pattern yields no usable n-gram
    pub fallback_rules: Vec<RuleId>,
}

impl RulesMap {
    pub fn rule_count(&self) -> usize {
        self.fallback_rules.len() + self.ngram_rules.values().map(Vec::len).sum::<usize>()
    }
}

// =============================================================================
// Content injection tree
// =============================================================================

/// One rule attached to a domain tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectionEntry {
    pub rule: RuleId,
    /// Whether the rule unhides (allows) its body at this node
    pub is_allow: bool,
}

/// Domain tree node, addressed by index into `InjectionTree::nodes`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InjectionNode {
    /// At most one entry per rule body
    pub rules: Vec<InjectionEntry>,
    /// Child label -> node index, sorted by label
    pub subdomains: Vec<(String, u32)>,
}

/// Domain-suffix tree for cosmetic or scriptlet rules. Node 0 is the root
/// and holds generic rules; children are keyed by the next domain label
/// walking from the TLD inwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionTree {
    pub nodes: Vec<InjectionNode>,
}

impl Default for InjectionTree {
    fn default() -> Self {
        Self {
            nodes: vec![InjectionNode::default()],
        }
    }
}

impl InjectionTree {
    pub const ROOT: u32 = 0;

    pub fn node(&self, index: u32) -> Option<&InjectionNode> {
        self.nodes.get(index as usize)
    }

    /// Child of `index` for `label`, using binary search on the sorted labels.
    pub fn child(&self, index: u32, label: &str) -> Option<u32> {
        let node = self.node(index)?;
        node.subdomains
            .binary_search_by(|(candidate, _)| candidate.as_str().cmp(label))
            .ok()
            .map(|pos| node.subdomains[pos].1)
    }
}

// =============================================================================
// Index data
// =============================================================================

/// Everything the runtime index needs besides the rule buffers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexData {
    /// Checksum of every rules list the index was built from
    pub source_checksums: BTreeMap<u32, String>,
    pub before_request: RulesMap,
    pub headers_received: RulesMap,
    pub activation: RulesMap,
    pub modify_blocked_request: RulesMap,
    pub modify_allowed_request: RulesMap,
    pub cosmetic_tree: InjectionTree,
    pub scriptlet_tree: InjectionTree,
    /// Pre-rendered stylesheet for generic rules no exception ever touches
    pub default_stylesheet: String,
}

impl IndexData {
    pub fn rules_map(&self, map_type: RulesMapType) -> &RulesMap {
        match map_type {
            RulesMapType::BeforeRequest => &self.before_request,
            RulesMapType::HeadersReceived => &self.headers_received,
            RulesMapType::Activation => &self.activation,
            RulesMapType::ModifyBlockedRequest => &self.modify_blocked_request,
            RulesMapType::ModifyAllowedRequest => &self.modify_allowed_request,
        }
    }

    pub fn rules_map_mut(&mut self, map_type: RulesMapType) -> &mut RulesMap {
        match map_type {
            RulesMapType::BeforeRequest => &mut self.before_request,
            RulesMapType::HeadersReceived => &mut self.headers_received,
            RulesMapType::Activation => &mut self.activation,
            RulesMapType::ModifyBlockedRequest => &mut self.modify_blocked_request,
            RulesMapType::ModifyAllowedRequest => &mut self.modify_allowed_request,
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

fn write_rule_ids(w: &mut ByteWriter, ids: &[RuleId]) {
    w.count(ids.len());
    for id in ids {
        w.u32(id.source_id);
        w.u32(id.rule_nr);
    }
}

fn write_rules_map(w: &mut ByteWriter, map: &RulesMap) {
    // Sorted so that identical inputs always produce identical bytes
    let mut keys: Vec<u64> = map.ngram_rules.keys().copied().collect();
    keys.sort_unstable();

    w.count(keys.len());
    for key in keys {
        w.u64(key);
        write_rule_ids(w, &map.ngram_rules[&key]);
    }
    write_rule_ids(w, &map.fallback_rules);
}

fn write_tree(w: &mut ByteWriter, tree: &InjectionTree) {
    w.count(tree.nodes.len());
    for node in &tree.nodes {
        w.count(node.rules.len());
        for entry in &node.rules {
            w.u32(entry.rule.source_id);
            w.u32(entry.rule.rule_nr);
            w.bool(entry.is_allow);
        }
        w.count(node.subdomains.len());
        for (label, child) in &node.subdomains {
            w.str(label);
            w.u32(*child);
        }
    }
}

/// Encode an index payload (without version header).
pub fn encode_index(data: &IndexData) -> Vec<u8> {
    let mut w = ByteWriter::new();

    w.count(data.source_checksums.len());
    for (source_id, sum) in &data.source_checksums {
        w.u32(*source_id);
        w.str(sum);
    }

    for map_type in RulesMapType::ALL {
        write_rules_map(&mut w, data.rules_map(map_type));
    }

    write_tree(&mut w, &data.cosmetic_tree);
    write_tree(&mut w, &data.scriptlet_tree);
    w.str(&data.default_stylesheet);

    w.finish()
}

/// Serialize an index to file bytes. Returns the bytes and the checksum of
/// the payload.
pub fn serialize_index(data: &IndexData) -> (Vec<u8>, String) {
    let payload = encode_index(data);
    let sum = checksum(&payload);
    (with_header(&rules_index_header(), &payload), sum)
}

// =============================================================================
// Decoding
// =============================================================================

fn read_rule_ids(r: &mut ByteReader<'_>) -> Result<Vec<RuleId>, FormatError> {
    let count = r.count(8)?;
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(RuleId::new(r.u32()?, r.u32()?));
    }
    Ok(ids)
}

fn read_rules_map(r: &mut ByteReader<'_>) -> Result<RulesMap, FormatError> {
    let count = r.count(12)?;
    let mut ngram_rules = HashMap::with_capacity(count);
    for _ in 0..count {
        let key = r.u64()?;
        ngram_rules.insert(key, read_rule_ids(r)?);
    }
    let fallback_rules = read_rule_ids(r)?;
    Ok(RulesMap {
        ngram_rules,
        fallback_rules,
    })
}

fn read_tree(r: &mut ByteReader<'_>) -> Result<InjectionTree, FormatError> {
    let count = r.count(8)?;
    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let rule_count = r.count(9)?;
        let mut rules = Vec::with_capacity(rule_count);
        for _ in 0..rule_count {
            let rule = RuleId::new(r.u32()?, r.u32()?);
            rules.push(InjectionEntry {
                rule,
                is_allow: r.bool()?,
            });
        }
        let child_count = r.count(8)?;
        let mut subdomains = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            let label = r.string()?;
            let child = r.u32()?;
            if child as usize >= count {
                return Err(FormatError::InvalidValue {
                    field: "tree child",
                    value: child,
                });
            }
            subdomains.push((label, child));
        }
        nodes.push(InjectionNode { rules, subdomains });
    }
    if nodes.is_empty() {
        return Err(FormatError::InvalidValue {
            field: "tree node count",
            value: 0,
        });
    }
    Ok(InjectionTree { nodes })
}

/// Decode an index payload (without version header).
pub fn decode_index(payload: &[u8]) -> Result<IndexData, FormatError> {
    let mut r = ByteReader::new(payload);

    let count = r.count(8)?;
    let mut source_checksums = BTreeMap::new();
    for _ in 0..count {
        let source_id = r.u32()?;
        source_checksums.insert(source_id, r.string()?);
    }

    let before_request = read_rules_map(&mut r)?;
    let headers_received = read_rules_map(&mut r)?;
    let activation = read_rules_map(&mut r)?;
    let modify_blocked_request = read_rules_map(&mut r)?;
    let modify_allowed_request = read_rules_map(&mut r)?;
    let cosmetic_tree = read_tree(&mut r)?;
    let scriptlet_tree = read_tree(&mut r)?;
    let default_stylesheet = r.string()?;

    r.finish()?;

    Ok(IndexData {
        source_checksums,
        before_request,
        headers_received,
        activation,
        modify_blocked_request,
        modify_allowed_request,
        cosmetic_tree,
        scriptlet_tree,
        default_stylesheet,
    })
}

/// Decode index file bytes, requiring the payload to hash to
/// `expected_checksum`.
pub fn read_index_bytes(data: &[u8], expected_checksum: &str) -> Result<IndexData, FormatError> {
    let payload = strip_header(data, &rules_index_header())?;
    let computed = checksum(payload);
    if computed != expected_checksum {
        return Err(FormatError::ChecksumMismatch {
            expected: expected_checksum.to_string(),
            computed,
        });
    }
    decode_index(payload)
}
