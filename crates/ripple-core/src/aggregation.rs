//! Roll-ups: symbol edges aggregated to file pairs, per-file relationships, project summary

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::graph::GraphStore;
use crate::model::{FileLink, NodeId};

/// Every cross-file dependency, with the underlying edges counted per kind.
pub fn aggregate_file_edges(graph: &GraphStore) -> Vec<FileLink> {
    let mut agg_map: HashMap<(PathBuf, PathBuf), FileLink> = HashMap::new();

    for edge in graph.all_edges() {
        let (Some(source), Some(target)) = (owning_file(graph, edge.source), owning_file(graph, edge.target)) else {
            continue;
        };
        // Edges inside one file are not dependencies between files.
        if source == target {
            continue;
        }

        let link = agg_map
            .entry((source.clone(), target.clone()))
            .or_insert_with(|| FileLink {
                source,
                target,
                count: 0,
                kind_counts: BTreeMap::new(),
            });
        link.count += 1;
        *link.kind_counts.entry(edge.kind).or_insert(0) += 1;
    }

    let mut links: Vec<FileLink> = agg_map.into_values().collect();
    links.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
    links
}

fn owning_file(graph: &GraphStore, node: NodeId) -> Option<PathBuf> {
    graph.node(node).map(|n| n.path().to_path_buf())
}

/// What a file depends on and what depends on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileRelationships {
    pub path: PathBuf,
    pub imports: Vec<FileLink>,
    pub imported_by: Vec<FileLink>,
}

pub fn file_relationships(graph: &GraphStore, path: &Path) -> Option<FileRelationships> {
    let file = graph.file(path)?;
    let (imports, imported_by) = aggregate_file_edges(graph)
        .into_iter()
        .filter(|link| link.source == file.path || link.target == file.path)
        .partition(|link| link.source == file.path);
    Some(FileRelationships {
        path: file.path.clone(),
        imports,
        imported_by,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub files: usize,
    pub symbols: usize,
    pub edges: usize,
    pub total_lines: u64,
    pub total_bytes: u64,
    /// File count per language name.
    pub languages: BTreeMap<String, usize>,
}

pub fn project_summary(graph: &GraphStore) -> ProjectSummary {
    let mut summary = ProjectSummary {
        symbols: graph.symbols().count(),
        edges: graph.edge_count(),
        ..ProjectSummary::default()
    };
    for file in graph.files() {
        summary.files += 1;
        summary.total_lines += u64::from(file.line_count);
        summary.total_bytes += file.size;
        *summary.languages.entry(file.language.as_str().to_string()).or_insert(0) += 1;
    }
    summary
}
