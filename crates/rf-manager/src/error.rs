use std::io;
use std::path::PathBuf;

use rf_core::psl::SuffixListError;
use rf_core::FormatError;

/// Errors of the manager file layer.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid file '{}': {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("Invalid JSON in '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid suffix list '{}': {source}", path.display())]
    SuffixList {
        path: PathBuf,
        #[source]
        source: SuffixListError,
    },
}

pub type Result<T> = std::result::Result<T, ManagerError>;

impl ManagerError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| ManagerError::Io { path, source }
    }

    pub(crate) fn format(path: impl Into<PathBuf>) -> impl FnOnce(FormatError) -> Self {
        let path = path.into();
        move |source| ManagerError::Format { path, source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>) -> impl FnOnce(serde_json::Error) -> Self {
        let path = path.into();
        move |source| ManagerError::Json { path, source }
    }

    pub(crate) fn suffix_list(path: impl Into<PathBuf>) -> impl FnOnce(SuffixListError) -> Self {
        let path = path.into();
        move |source| ManagerError::SuffixList { path, source }
    }
}
