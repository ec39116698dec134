//! Cosmetic and scriptlet content for a document origin
//!
//! The domain tree is walked from the root (generic rules) down the labels
//! of the origin host, TLD first. Every node states, per rule body, whether
//! the body is hidden/injected or allowed; a deeper node overrides what a
//! shallower one said about the same body.

use std::collections::BTreeMap;

use super::RulesIndex;
use crate::storage::{InjectionTree, RuleBufferHolder};
use crate::stylesheet::build_stylesheet;
use crate::types::RuleId;
use crate::url_info::Origin;
use crate::utils::InjectionRule;

/// One scriptlet to inject into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptletInjection {
    pub name: String,
    pub arguments: Vec<String>,
}

/// Everything injected into a document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InjectionData {
    /// Origin specific stylesheet; the default stylesheet comes on top
    pub stylesheet: String,
    pub scriptlets: Vec<ScriptletInjection>,
}

/// Walk `tree` for `origin` and return the rules left active, ordered by
/// body.
fn active_rules<'a, R, F>(tree: &InjectionTree, origin: &Origin, disable_generic_rules: bool, lookup: F) -> Vec<&'a R>
where
    R: InjectionRule + 'a,
    F: Fn(RuleId) -> Option<&'a R>,
{
    let mut state: BTreeMap<R::Body<'a>, (bool, &'a R)> = BTreeMap::new();

    let mut apply = |node_index: u32| {
        let Some(node) = tree.node(node_index) else {
            return;
        };
        for entry in &node.rules {
            if let Some(rule) = lookup(entry.rule) {
                state.insert(rule.body(), (!entry.is_allow, rule));
            }
        }
    };

    if !disable_generic_rules {
        apply(InjectionTree::ROOT);
    }

    if let Some(host) = origin.host() {
        let mut node = InjectionTree::ROOT;
        for label in host.rsplit('.') {
            match tree.child(node, label) {
                Some(child) => {
                    apply(child);
                    node = child;
                }
                None => break,
            }
        }
    }

    state
        .into_values()
        .filter(|(active, _)| *active)
        .map(|(_, rule)| rule)
        .collect()
}

impl RulesIndex {
    fn buffer(&self, id: RuleId) -> Option<&RuleBufferHolder> {
        self.buffers.get(&id.source_id).map(|buffer| &**buffer)
    }

    /// Element hiding stylesheet for a document of `origin`, not including
    /// the default stylesheet.
    pub fn get_stylesheet_for_origin(&self, origin: &Origin, disable_generic_rules: bool) -> String {
        let rules = active_rules(&self.data.cosmetic_tree, origin, disable_generic_rules, |id| {
            self.buffer(id)?.cosmetic_rule(id.rule_nr)
        });
        build_stylesheet(rules.into_iter().map(|rule| rule.selector.as_str()))
    }

    /// Scriptlets to inject into a document of `origin`, ordered by name
    /// and arguments.
    pub fn get_scriptlets_for_origin(&self, origin: &Origin, disable_generic_rules: bool) -> Vec<ScriptletInjection> {
        active_rules(&self.data.scriptlet_tree, origin, disable_generic_rules, |id| {
            self.buffer(id)?.scriptlet_rule(id.rule_nr)
        })
        .into_iter()
        .map(|rule| ScriptletInjection {
            name: rule.scriptlet_name.clone(),
            arguments: rule.arguments.clone(),
        })
        .collect()
    }

    /// Stylesheet and scriptlets for a document of `origin`.
    pub fn get_injection_data_for_origin(&self, origin: &Origin, disable_generic_rules: bool) -> InjectionData {
        InjectionData {
            stylesheet: self.get_stylesheet_for_origin(origin, disable_generic_rules),
            scriptlets: self.get_scriptlets_for_origin(origin, disable_generic_rules),
        }
    }
}
