//! Ripple Core: dependency graph, persistence, reference resolution, impact analysis and diffing

pub mod model;
pub mod hash;
pub mod error;
pub mod symbols;
pub mod graph;
pub mod link;
pub mod cache;
pub mod diff;
pub mod config;
pub mod resolver;
pub mod impact;
pub mod aggregation;


#[cfg(test)]
pub mod test_utils;

pub use model::{
    Confidence, EdgeKind, FileLink, GraphEdge, GraphNode, Language, NodeId, RawReference, RefTarget, SourceFile,
    Symbol, SymbolKind, normalize_path,
};
pub use hash::{content_hash, stable_hash};
pub use error::{CacheError, ConfigError, DiffError, GraphError};
pub use symbols::SymbolTable;
pub use graph::{Dependent, GraphStore, IntegrityIssue, SharedGraph};
pub use link::LinkStats;
pub use cache::{
    BACKUP_DIR, CACHE_DIR, CacheLoad, FORMAT_VERSION, GRAPH_CACHE, backup_dir, cache_dir, clear_cache,
    ensure_cache_dir, graph_cache_path,
};
pub use diff::{DiffEngine, Hunk};
pub use config::{EditSettings, ImpactSettings, RippleConfig, ScanSettings};
pub use resolver::{
    FoundReference, MatchKind, MissReason, MissingReference, ReferenceKind, ReferenceResolver, ReferenceToken,
    ResolvedReferences, tokenize,
};
pub use impact::{ChangeKind, ImpactAnalyzer, ImpactEntry, ImpactReason, ImpactSet, RiskLevel};
pub use aggregation::{FileRelationships, ProjectSummary, aggregate_file_edges, file_relationships, project_summary};
