//! Stored buffer formats and their loaders
//!
//! This module provides the byte-level format helpers, the per-source
//! rules list and the compiled index payload.

mod format;
mod index_data;
mod rules_list;

pub use format::*;
pub use index_data::*;
pub use rules_list::*;
