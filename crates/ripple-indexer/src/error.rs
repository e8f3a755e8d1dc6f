//! Error types for extraction and scanning

use std::path::PathBuf;

use ripple_core::Language;
use thiserror::Error;

/// Why a tree-sitter extraction could not run. Never escapes `SymbolExtractor::extract`;
/// it is turned into the lexical fallback and a failure message.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("content is not valid UTF-8")]
    NotUtf8,

    #[error("failed to load the {0:?} grammar: {1}")]
    Grammar(Language, String),

    #[error("{0:?} source has syntax errors")]
    Syntax(Language),

    #[error("parser produced no tree")]
    NoTree,

    #[error("parser pool is unavailable")]
    PoolClosed,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("project root {0} is not a directory")]
    RootMissing(PathBuf),

    #[error("invalid ignore pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("failed to start the scan worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Graph(#[from] ripple_core::GraphError),
}
