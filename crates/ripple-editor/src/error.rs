//! Error types for safe editing

use std::path::PathBuf;

use ripple_core::DiffError;
use ripple_indexer::ScanError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditError {
    /// The file on disk no longer matches the content the edit was computed against.
    #[error("{path} changed since it was read (expected hash {expected}, found {actual})")]
    Conflict {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("hunks do not apply to {path}: {source}")]
    InvalidHunks {
        path: PathBuf,
        #[source]
        source: DiffError,
    },

    #[error("validation failed for {path}: {}", messages.join("; "))]
    ValidationFailed { path: PathBuf, messages: Vec<String> },

    #[error("no backup of {0}")]
    NoBackup(PathBuf),

    #[error("backup {id} of {path} does not exist")]
    UnknownBackup { path: PathBuf, id: String },

    /// Another live edit holds the path.
    #[error("{0} is locked by an edit in progress")]
    Locked(PathBuf),

    #[error("{0} is outside the project root")]
    OutsideRoot(PathBuf),

    #[error("{0} is not valid UTF-8")]
    NotText(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to update the graph: {0}")]
    Graph(#[from] ScanError),
}

impl EditError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> EditError {
        let path = path.into();
        move |source| EditError::Io { path, source }
    }
}
