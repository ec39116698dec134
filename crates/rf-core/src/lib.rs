//! Request Filter Core Library
//!
//! This crate provides the runtime side of the request filter: the stored
//! rule formats and the read-only rules index answering request queries.
//!
//! # Architecture
//!
//! Every rule source is compiled into a "rules list" buffer. A separate
//! compile step builds a rules index over all buffers: n-gram keyed
//! candidate lists for network rules and a domain tree for cosmetic and
//! scriptlet rules. The index only refers to rules by `RuleId`, so it is
//! only valid together with the exact buffers it was built from.
//!
//! # Modules
//!
//! - `hash`: persistent checksums and n-gram extraction
//! - `storage`: version headers, rules list and index payload codecs
//! - `url_info`: request URL and document origin views
//! - `pattern_matcher`: URL pattern matching of a single rule
//! - `psl`: registrable domains from the Public Suffix List
//! - `utils`: rule priorities, party and domain checks
//! - `stylesheet`: element hiding stylesheet generation
//! - `rules_index`: the queryable index and its activation cache
//! - `types`: shared type definitions

pub mod hash;
pub mod pattern_matcher;
pub mod psl;
pub mod rules_index;
pub mod storage;
pub mod stylesheet;
pub mod types;
pub mod url_info;
pub mod utils;

// Re-export commonly used types
pub use hash::checksum;
pub use rules_index::{Frame, InjectionData, RuleBuffers, RuleMatch, RulesIndex, RulesIndexConfig};
pub use storage::{FormatError, IndexData, RuleBufferHolder, RulesList};
pub use types::{ActivationTypes, ActivationsFound, Decision, Modifier, ProcessKey, ResourceTypes, RuleId};
pub use url_info::{Origin, UrlInfo};
