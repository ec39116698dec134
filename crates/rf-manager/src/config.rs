//! Manager configuration

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use rf_core::rules_index::{DEFAULT_ACTIVATION_CACHE_SIZE, DEFAULT_MAX_URL_LENGTH};
use rf_core::RulesIndexConfig;

use crate::error::{ManagerError, Result};

/// Index read failures tolerated before the manager stops rebuilding.
pub const DEFAULT_MAX_INDEX_READ_FAILURES: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Directory holding one rules list file per source and the `Index` file
    pub rules_dir: PathBuf,
    pub max_index_read_failures: u32,
    pub activation_cache_size: usize,
    pub max_url_length: usize,
    /// Public Suffix List file replacing the built-in list
    pub public_suffix_list: Option<PathBuf>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            rules_dir: PathBuf::from("rules"),
            max_index_read_failures: DEFAULT_MAX_INDEX_READ_FAILURES,
            activation_cache_size: DEFAULT_ACTIVATION_CACHE_SIZE,
            max_url_length: DEFAULT_MAX_URL_LENGTH,
            public_suffix_list: None,
        }
    }
}

impl ManagerConfig {
    /// Defaults with another rules directory.
    pub fn with_rules_dir(rules_dir: impl Into<PathBuf>) -> Self {
        Self {
            rules_dir: rules_dir.into(),
            ..Default::default()
        }
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(ManagerError::io(path))?;
        serde_json::from_str(&text).map_err(ManagerError::json(path))
    }

    /// Install the configured Public Suffix List, if any.
    pub fn load_public_suffix_list(&self) -> Result<()> {
        let Some(path) = &self.public_suffix_list else {
            return Ok(());
        };
        let text = fs::read_to_string(path).map_err(ManagerError::io(path))?;
        rf_core::psl::load_public_suffix_list(&text).map_err(ManagerError::suffix_list(path))
    }

    pub fn index_config(&self) -> RulesIndexConfig {
        RulesIndexConfig {
            activation_cache_size: self.activation_cache_size,
            max_url_length: self.max_url_length,
        }
    }
}
