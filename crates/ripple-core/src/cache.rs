//! Persisted graph snapshot (`.ripple/repository_data.json`)

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::graph::GraphStore;
use crate::model::{GraphEdge, NodeId, SourceFile, Symbol};

/// Cache directory: .ripple/
pub const CACHE_DIR: &str = ".ripple";

/// Graph cache file
pub const GRAPH_CACHE: &str = "repository_data.json";

/// Backup directory inside the cache directory
pub const BACKUP_DIR: &str = "backups";

/// Bumped whenever the document layout changes; older caches are rebuilt.
pub const FORMAT_VERSION: u32 = 1;

/// Get cache directory path
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// Get graph cache file path
pub fn graph_cache_path(root: &Path) -> PathBuf {
    root.join(CACHE_DIR).join(GRAPH_CACHE)
}

/// Get backup directory path
pub fn backup_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR).join(BACKUP_DIR)
}

/// Ensure cache directory exists
pub fn ensure_cache_dir(root: &Path) -> std::io::Result<()> {
    let cache = cache_dir(root);
    if !cache.exists() {
        std::fs::create_dir_all(&cache)?;
    }
    Ok(())
}

/// Clear cache directory (graph snapshot and backups)
pub fn clear_cache(root: &Path) -> std::io::Result<()> {
    let cache = cache_dir(root);
    if cache.exists() {
        std::fs::remove_dir_all(&cache)?;
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheDocument {
    format_version: u32,
    files: Vec<SourceFile>,
    symbols: Vec<Symbol>,
    edges: Vec<GraphEdge>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionProbe {
    format_version: Option<u32>,
}

/// What `GraphStore::load` found on disk.
#[derive(Debug)]
pub enum CacheLoad {
    Loaded(GraphStore),
    /// No cache yet; a full scan is needed.
    Missing,
    /// The cache was unusable and has been deleted; a full scan is needed.
    Discarded { reason: String },
}

impl CacheLoad {
    /// The loaded graph, or an empty one for a full rebuild.
    pub fn into_graph(self) -> GraphStore {
        match self {
            CacheLoad::Loaded(graph) => graph,
            CacheLoad::Missing | CacheLoad::Discarded { .. } => GraphStore::new(),
        }
    }

    pub fn needs_full_scan(&self) -> bool {
        !matches!(self, CacheLoad::Loaded(_))
    }
}

impl GraphStore {
    /// Write an atomic snapshot: serialize to a temp file beside `path`, then rename over it.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io { path: path.to_path_buf(), source };
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let bytes = serde_json::to_vec_pretty(&self.to_document())?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;

        tracing::debug!("Graph cache saved: {} ({} files)", path.display(), self.file_count());
        Ok(())
    }

    /// Load a snapshot. Corrupt or incompatible caches are deleted and reported, never fatal.
    pub fn load(path: &Path) -> CacheLoad {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CacheLoad::Missing,
            Err(e) => return discard(path, format!("unreadable: {e}")),
        };

        match serde_json::from_slice::<VersionProbe>(&bytes) {
            Ok(VersionProbe { format_version: Some(FORMAT_VERSION) }) => {}
            Ok(VersionProbe { format_version: Some(other) }) => {
                return discard(path, format!("format version {other} is not {FORMAT_VERSION}"));
            }
            Ok(VersionProbe { format_version: None }) => return discard(path, "missing format version".into()),
            Err(e) => return discard(path, format!("not valid JSON: {e}")),
        }

        let document: CacheDocument = match serde_json::from_slice(&bytes) {
            Ok(doc) => doc,
            Err(e) => return discard(path, format!("malformed document: {e}")),
        };

        match Self::from_document(document) {
            Ok(graph) => {
                tracing::debug!("Graph cache loaded from: {} ({} files)", path.display(), graph.file_count());
                CacheLoad::Loaded(graph)
            }
            Err(reason) => discard(path, reason),
        }
    }

    fn to_document(&self) -> CacheDocument {
        let mut files: Vec<SourceFile> = self.files().cloned().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut symbols: Vec<Symbol> = self.symbols().cloned().collect();
        symbols.sort_by(|a, b| (&a.file_path, a.line, a.id).cmp(&(&b.file_path, b.line, b.id)));

        let mut edges: Vec<GraphEdge> = self.all_edges().cloned().collect();
        edges.sort_by_key(|e| (e.source, e.target, e.kind, e.line));

        CacheDocument {
            format_version: FORMAT_VERSION,
            files,
            symbols,
            edges,
        }
    }

    fn from_document(document: CacheDocument) -> Result<GraphStore, String> {
        let mut by_id: HashMap<NodeId, Symbol> = HashMap::with_capacity(document.symbols.len());
        for symbol in document.symbols {
            if symbol.id != NodeId::for_symbol(&symbol.file_path, &symbol.qualified_name) {
                return Err(format!("symbol {} has a stale id", symbol.qualified_name));
            }
            let id = symbol.id;
            if by_id.insert(id, symbol).is_some() {
                return Err(format!("duplicate symbol id {id}"));
            }
        }

        let mut graph = GraphStore::new();
        let mut seen_files = HashSet::new();
        for file in document.files {
            let file_id = file.id();
            if !seen_files.insert(file_id) {
                return Err(format!("duplicate file {}", file.path.display()));
            }
            let mut owned = Vec::with_capacity(file.symbols.len());
            for id in &file.symbols {
                let symbol = by_id
                    .remove(id)
                    .ok_or_else(|| format!("{} lists unknown symbol {id}", file.path.display()))?;
                if symbol.file != file_id {
                    return Err(format!("symbol {id} is listed by the wrong file"));
                }
                owned.push(symbol);
            }
            graph.add_file(file, owned).map_err(|e| e.to_string())?;
        }
        if let Some(orphan) = by_id.keys().next() {
            return Err(format!("symbol {orphan} has no owning file"));
        }

        for edge in document.edges {
            graph.add_edge(edge).map_err(|e| e.to_string())?;
        }

        Ok(graph)
    }
}

fn discard(path: &Path, reason: String) -> CacheLoad {
    tracing::warn!("Discarding graph cache {}: {}", path.display(), reason);
    if let Err(e) = std::fs::remove_file(path) {
        tracing::debug!("Could not delete discarded cache {}: {}", path.display(), e);
    }
    CacheLoad::Discarded { reason }
}
