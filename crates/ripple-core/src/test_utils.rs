//! Test fixtures for ripple-core

use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use crate::graph::GraphStore;
use crate::hash::content_hash;
use crate::model::*;

/// A source file record with a fixed timestamp and no symbols.
pub fn source_file(path: &str) -> SourceFile {
    SourceFile {
        path: path.into(),
        hash: content_hash(path.as_bytes()),
        scanned_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        language: Language::from_path(Path::new(path)),
        symbols: Vec::new(),
        references: Vec::new(),
        line_count: 10,
        size: 100,
    }
}

pub fn symbol(path: &str, name: &str, kind: SymbolKind) -> Symbol {
    Symbol::new(Path::new(path), name, name, kind, 1)
}

pub fn reference(from: Option<&str>, target: RefTarget, kind: EdgeKind) -> RawReference {
    RawReference {
        from: from.map(str::to_string),
        target,
        kind,
        line: 1,
        confidence: Confidence::Exact,
    }
}

pub fn name(name: &str) -> RefTarget {
    RefTarget::Name { name: name.to_string(), module: None }
}

pub fn module(spec: &str) -> RefTarget {
    RefTarget::Module { spec: spec.to_string() }
}

pub fn call(graph: &mut GraphStore, source: NodeId, target: NodeId) {
    graph
        .add_edge(GraphEdge::new(source, target, EdgeKind::Call, Confidence::Exact))
        .unwrap();
}

/// Files a.py -> b.py -> c.py, each defining one function, wired with call edges
/// at both file and symbol level: `a.run` calls `b.helper` calls `c.leaf`.
pub fn chain_graph() -> GraphStore {
    let mut graph = GraphStore::new();
    for (path, func) in [("a.py", "run"), ("b.py", "helper"), ("c.py", "leaf")] {
        graph
            .add_file(source_file(path), vec![symbol(path, func, SymbolKind::Function)])
            .unwrap();
    }
    let file = |p: &str| NodeId::for_file(Path::new(p));
    let sym = |p: &str, n: &str| NodeId::for_symbol(Path::new(p), n);

    call(&mut graph, file("a.py"), file("b.py"));
    call(&mut graph, file("b.py"), file("c.py"));
    call(&mut graph, sym("a.py", "run"), sym("b.py", "helper"));
    call(&mut graph, sym("b.py", "helper"), sym("c.py", "leaf"));
    graph
}

/// Create a repository with custom file structure
pub fn create_repo_with_structure(structure: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    for (path, content) in structure {
        let full_path = root.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full_path, content).unwrap();
    }

    temp_dir
}
