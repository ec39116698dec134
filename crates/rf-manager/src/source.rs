//! Rule source records
//!
//! Sources are owned by whoever fetches the filter lists; the manager only
//! reads their checksum and fetch state.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ManagerError, Result};

/// Name of the sources file inside a rules directory.
pub const SOURCES_FILE_NAME: &str = "sources.json";

/// Outcome of the last fetch of a rule source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchResult {
    #[default]
    Unknown,
    Success,
    DownloadFailed,
    FileNotFound,
    FileReadError,
    /// The list was fetched but holds nothing we can use
    FileUnsupported,
    FailedSavingParsedRules,
}

impl FetchResult {
    /// Whether the stored rules list reflects this fetch.
    pub fn is_usable(self) -> bool {
        matches!(self, FetchResult::Success | FetchResult::FileUnsupported)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSource {
    pub id: u32,
    /// Checksum of the stored rules list. Empty when nothing is stored.
    #[serde(default)]
    pub rules_list_checksum: String,
    #[serde(default)]
    pub last_fetch_result: FetchResult,
    #[serde(default)]
    pub is_fetching: bool,
}

impl RuleSource {
    /// A fetched source whose rules list has `checksum`.
    pub fn fetched(id: u32, checksum: impl Into<String>) -> Self {
        Self {
            id,
            rules_list_checksum: checksum.into(),
            last_fetch_result: FetchResult::Success,
            is_fetching: false,
        }
    }
}

/// Contents of `sources.json`: the sources and the checksum of the last
/// index built from them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSourcesFile {
    pub index_checksum: String,
    pub sources: Vec<RuleSource>,
}

impl RuleSourcesFile {
    /// Load `sources.json` from `rules_dir`. A missing file is an empty set.
    pub fn load(rules_dir: &Path) -> Result<Self> {
        let path = rules_dir.join(SOURCES_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path).map_err(ManagerError::io(&path))?;
        serde_json::from_str(&text).map_err(ManagerError::json(path))
    }

    pub fn save(&self, rules_dir: &Path) -> Result<()> {
        let path = rules_dir.join(SOURCES_FILE_NAME);
        let text = serde_json::to_string_pretty(self).map_err(ManagerError::json(&path))?;
        crate::files::write_atomically(&path, text.as_bytes())
    }

    /// Insert `source`, replacing a record with the same id.
    pub fn upsert(&mut self, source: RuleSource) {
        match self.sources.iter_mut().find(|s| s.id == source.id) {
            Some(existing) => *existing = source,
            None => {
                self.sources.push(source);
                self.sources.sort_by_key(|s| s.id);
            }
        }
    }
}
