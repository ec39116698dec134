//! Rules directory file layer
//!
//! One rules list file per source, named by source id, and one `Index`
//! file. Every file is written to a temporary sibling first and renamed into
//! place, so readers never see a partial file.

use std::fs;
use std::path::{Path, PathBuf};

use rf_compiler::build_serialized_index;
use rf_core::storage::{read_index_bytes, INDEX_FILE_NAME};
use rf_core::{IndexData, RuleBufferHolder, RuleBuffers};

use crate::error::{ManagerError, Result};

pub fn rules_list_path(rules_dir: &Path, source_id: u32) -> PathBuf {
    rules_dir.join(source_id.to_string())
}

pub fn index_path(rules_dir: &Path) -> PathBuf {
    rules_dir.join(INDEX_FILE_NAME)
}

pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(ManagerError::io(parent))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes).map_err(ManagerError::io(&tmp_path))?;
    fs::rename(&tmp_path, path).map_err(ManagerError::io(path))
}

/// Store the rules list file of a source.
pub fn write_rules_list(rules_dir: &Path, source_id: u32, bytes: &[u8]) -> Result<()> {
    write_atomically(&rules_list_path(rules_dir, source_id), bytes)
}

/// Load the rules list of a source, checking it against `checksum`.
pub fn read_rules_buffer(rules_dir: &Path, source_id: u32, checksum: &str) -> Result<RuleBufferHolder> {
    let path = rules_list_path(rules_dir, source_id);
    let bytes = fs::read(&path).map_err(ManagerError::io(&path))?;
    RuleBufferHolder::from_file_bytes(&bytes, Some(checksum)).map_err(ManagerError::format(path))
}

pub fn save_index(rules_dir: &Path, bytes: &[u8]) -> Result<()> {
    write_atomically(&index_path(rules_dir), bytes)
}

/// Load the index file, checking it against `checksum`.
pub fn read_index(rules_dir: &Path, checksum: &str) -> Result<IndexData> {
    let path = index_path(rules_dir);
    let bytes = fs::read(&path).map_err(ManagerError::io(&path))?;
    read_index_bytes(&bytes, checksum).map_err(ManagerError::format(path))
}

/// Build the index over `buffers` and save it. Returns the checksum of the
/// saved index, or an empty string when saving failed.
pub fn build_and_save_index(rules_dir: &Path, buffers: &RuleBuffers) -> String {
    let (bytes, checksum) = build_serialized_index(buffers);
    match save_index(rules_dir, &bytes) {
        Ok(()) => {
            log::debug!("Saved index ({} bytes, checksum {})", bytes.len(), checksum);
            checksum
        }
        Err(e) => {
            log::warn!("Failed to save rules index: {}", e);
            String::new()
        }
    }
}
