//! Test helpers shared by the manager tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::{fs, process};

use rf_compiler::compile_filter_list;

use crate::files::write_rules_list;
use crate::source::RuleSource;

/// Unique directory under the system temp dir, removed on drop.
pub struct TempDir(PathBuf);

impl TempDir {
    pub fn new(name: &str) -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("rf-manager-{}-{}-{}", name, process::id(), n));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

/// Compile `text` into the rules list file of source `id`.
pub fn write_source(rules_dir: &Path, id: u32, text: &str) -> RuleSource {
    let compiled = compile_filter_list(text);
    write_rules_list(rules_dir, id, &compiled.bytes).unwrap();
    RuleSource::fetched(id, compiled.checksum)
}
