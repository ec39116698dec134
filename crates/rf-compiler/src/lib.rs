//! Request Filter Compiler
//!
//! Turns filter list text into stored rules list buffers, and a set of
//! loaded buffers into a rules index.
//!
//! # Pipeline
//!
//! 1. `parser`: filter list text to `RulesList` (network, cosmetic and
//!    scriptlet rules)
//! 2. `optimizer`: `$badfilter` handling and duplicate removal
//! 3. `list_builder`: serialization with version header and checksum
//! 4. `builder`: n-gram rules maps, content injection trees and the default
//!    stylesheet over all sources

pub mod builder;
pub mod list_builder;
pub mod optimizer;
pub mod parser;

pub use builder::{build_rules_index, build_serialized_index};
pub use list_builder::{compile_filter_list, CompiledRulesList, RulesListBuilder};
pub use optimizer::{optimize_rules, OptimizeStats};
pub use parser::{parse_filter_list, ParsedList};
