//! Request Filter Index Manager
//!
//! Keeps a `RulesIndex` in sync with a set of rule sources stored in a
//! rules directory:
//!
//! - `source`: rule source records and the `sources.json` file
//! - `files`: rules list and index files, written atomically
//! - `runner`: sequenced background task runners
//! - `manager`: the reload state machine
//! - `config`: manager configuration

pub mod config;
pub mod error;
pub mod files;
pub mod manager;
pub mod runner;
pub mod source;

#[cfg(test)]
mod testing;

pub use config::ManagerConfig;
pub use error::{ManagerError, Result};
pub use manager::{ManagerState, RulesIndexManager, RulesIndexObserver};
pub use runner::{InlineTaskRunner, TaskRunner, ThreadTaskRunner};
pub use source::{FetchResult, RuleSource, RuleSourcesFile};
