//! Error types for the core crate

use std::path::PathBuf;

use thiserror::Error;

use crate::model::NodeId;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node {0} is not in the graph")]
    UnknownNode(NodeId),

    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("edge {from} -> {to} references a missing node")]
    DanglingEdge { from: NodeId, to: NodeId },

    #[error("symbol {symbol} belongs to file {file}, which is not in the graph")]
    OrphanSymbol { symbol: NodeId, file: NodeId },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiffError {
    #[error("hunk {hunk} starts at line {start} but the content has {len} lines")]
    OutOfRange { hunk: usize, start: usize, len: usize },

    #[error("hunk {hunk} overlaps the previous hunk")]
    Overlap { hunk: usize },

    #[error("hunk {hunk} does not match the content at line {line}")]
    Mismatch { hunk: usize, line: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
