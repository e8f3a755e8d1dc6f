//! GraphStore: a petgraph::StableDiGraph keyed by stable content-derived NodeIds

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde::Serialize;

use crate::error::GraphError;
use crate::model::*;
use crate::symbols::SymbolTable;

/// The dependency graph: files and symbols connected by typed, directed edges.
///
/// Edges point from the dependent to the dependency (`a.py --import--> b.py`),
/// so the dependents of a node are found by walking incoming edges.
pub struct GraphStore {
    inner: StableDiGraph<GraphNode, GraphEdge>,
    index: HashMap<NodeId, NodeIndex>,
    symbols: SymbolTable,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

/// A node reached by a dependents traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependent {
    pub node: NodeId,
    pub distance: usize,
    /// The edge through which the node was first reached (strongest one at that depth).
    pub via: EdgeKind,
    pub confidence: Confidence,
}

/// A violation of the graph's structural invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    DanglingEdge { source: NodeId, target: NodeId },
    OrphanSymbol { symbol: NodeId, file: NodeId },
    IndexDrift(NodeId),
}

impl GraphStore {
    pub fn new() -> Self {
        GraphStore {
            inner: StableDiGraph::new(),
            index: HashMap::new(),
            symbols: SymbolTable::new(),
        }
    }

    /// Add a file or symbol node. Symbols require their owning file to be present.
    pub fn add_node(&mut self, node: GraphNode) -> Result<NodeId, GraphError> {
        let id = node.id();
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        if let GraphNode::Symbol(symbol) = &node {
            let owner = self
                .index
                .get(&symbol.file)
                .copied()
                .ok_or(GraphError::OrphanSymbol { symbol: id, file: symbol.file })?;
            self.symbols.insert(&symbol.name, id);
            if let Some(GraphNode::File(file)) = self.inner.node_weight_mut(owner) {
                if !file.symbols.contains(&id) {
                    file.symbols.push(id);
                }
            }
        }
        let idx = self.inner.add_node(node);
        self.index.insert(id, idx);
        Ok(id)
    }

    /// Add a file together with the symbols it defines.
    pub fn add_file(&mut self, mut file: SourceFile, symbols: Vec<Symbol>) -> Result<NodeId, GraphError> {
        file.symbols.clear();
        let file_id = self.add_node(GraphNode::File(file))?;
        for symbol in symbols {
            if symbol.file != file_id {
                return Err(GraphError::OrphanSymbol { symbol: symbol.id, file: symbol.file });
            }
            self.add_node(GraphNode::Symbol(symbol))?;
        }
        Ok(file_id)
    }

    /// Replace a file's whole contribution: old symbols and their edges go first.
    pub fn replace_file(&mut self, file: SourceFile, symbols: Vec<Symbol>) -> Result<NodeId, GraphError> {
        let id = file.id();
        if self.contains(id) {
            self.remove_node(id);
        }
        self.add_file(file, symbols)
    }

    /// Add an edge. Returns `false` when an identical edge already exists.
    pub fn add_edge(&mut self, edge: GraphEdge) -> Result<bool, GraphError> {
        let (Some(&source), Some(&target)) = (self.index.get(&edge.source), self.index.get(&edge.target)) else {
            return Err(GraphError::DanglingEdge { from: edge.source, to: edge.target });
        };
        if self.has_edge_between(edge.source, edge.target, edge.kind) {
            return Ok(false);
        }
        self.inner.add_edge(source, target, edge);
        Ok(true)
    }

    /// Remove a node and every edge touching it. Removing a file cascades to its symbols.
    pub fn remove_node(&mut self, id: NodeId) -> Option<GraphNode> {
        let idx = self.index.remove(&id)?;
        let removed = self.inner.remove_node(idx)?;
        match &removed {
            GraphNode::File(file) => {
                for symbol_id in &file.symbols {
                    if let Some(symbol_idx) = self.index.remove(symbol_id) {
                        if let Some(GraphNode::Symbol(symbol)) = self.inner.remove_node(symbol_idx) {
                            self.symbols.remove(&symbol.name, symbol.id);
                        }
                    }
                }
            }
            GraphNode::Symbol(symbol) => {
                self.symbols.remove(&symbol.name, symbol.id);
                if let Some(&owner) = self.index.get(&symbol.file) {
                    if let Some(GraphNode::File(file)) = self.inner.node_weight_mut(owner) {
                        file.symbols.retain(|s| *s != id);
                    }
                }
            }
        }
        Some(removed)
    }

    /// Remove a file by path, with cascade.
    pub fn remove_file(&mut self, path: &Path) -> Option<SourceFile> {
        match self.remove_node(NodeId::for_file(path))? {
            GraphNode::File(file) => Some(file),
            GraphNode::Symbol(_) => None,
        }
    }

    /// Drop every edge; nodes stay.
    pub fn clear_edges(&mut self) {
        self.inner.clear_edges();
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Get a node by ID.
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.index.get(&id).and_then(|idx| self.inner.node_weight(*idx))
    }

    /// Get a mutable node by ID.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        let idx = *self.index.get(&id)?;
        self.inner.node_weight_mut(idx)
    }

    pub fn file(&self, path: &Path) -> Option<&SourceFile> {
        self.node(NodeId::for_file(path)).and_then(GraphNode::as_file)
    }

    pub fn file_mut(&mut self, path: &Path) -> Option<&mut SourceFile> {
        match self.node_mut(NodeId::for_file(path))? {
            GraphNode::File(file) => Some(file),
            GraphNode::Symbol(_) => None,
        }
    }

    pub fn symbol(&self, id: NodeId) -> Option<&Symbol> {
        self.node(id).and_then(GraphNode::as_symbol)
    }

    /// Symbols defined by a file, in source order.
    pub fn symbols_in_file(&self, path: &Path) -> Vec<&Symbol> {
        self.file(path)
            .map(|file| file.symbols.iter().filter_map(|id| self.symbol(*id)).collect())
            .unwrap_or_default()
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Iterate over all files.
    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.all_nodes().filter_map(GraphNode::as_file)
    }

    /// Iterate over all symbols.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.all_nodes().filter_map(GraphNode::as_symbol)
    }

    /// Iterate over all nodes.
    pub fn all_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx))
    }

    pub fn file_count(&self) -> usize {
        self.files().count()
    }

    /// Iterate over all edges.
    pub fn all_edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.inner
            .edge_indices()
            .filter_map(move |idx| self.inner.edge_weight(idx))
    }

    /// Get all outgoing edges from a node.
    pub fn edges_from(&self, source: NodeId) -> Vec<&GraphEdge> {
        self.edges_directed(source, Direction::Outgoing)
    }

    /// Get all incoming edges to a node.
    pub fn edges_to(&self, target: NodeId) -> Vec<&GraphEdge> {
        self.edges_directed(target, Direction::Incoming)
    }

    fn edges_directed(&self, id: NodeId, direction: Direction) -> Vec<&GraphEdge> {
        match self.index.get(&id) {
            Some(&idx) => self
                .inner
                .edges_directed(idx, direction)
                .map(|edge_ref| edge_ref.weight())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Check if an edge exists between two nodes of a specific kind.
    pub fn has_edge_between(&self, source: NodeId, target: NodeId, kind: EdgeKind) -> bool {
        self.edges_from(source)
            .iter()
            .any(|e| e.target == target && e.kind == kind)
    }

    /// Nodes with an edge path ending at `node` within `max_depth` hops.
    pub fn dependents(&self, node: NodeId, max_depth: usize) -> Vec<Dependent> {
        self.dependents_from(&[node], max_depth)
    }

    /// Breadth-first walk over incoming edges from several seeds at once.
    ///
    /// Seeds are never reported. Each node appears once, at its shortest
    /// distance; among the edges reaching it at that depth the strongest wins.
    pub fn dependents_from(&self, seeds: &[NodeId], max_depth: usize) -> Vec<Dependent> {
        let mut visited: HashSet<NodeId> = seeds.iter().copied().collect();
        let mut frontier: VecDeque<NodeId> = seeds.iter().copied().filter(|s| self.contains(*s)).collect();
        let mut result = Vec::new();

        for distance in 1..=max_depth {
            let mut level: HashMap<NodeId, &GraphEdge> = HashMap::new();
            while let Some(current) = frontier.pop_front() {
                for edge in self.edges_to(current) {
                    if visited.contains(&edge.source) {
                        continue;
                    }
                    let best = level.entry(edge.source).or_insert(edge);
                    if edge.strength() > best.strength() {
                        *best = edge;
                    }
                }
            }
            if level.is_empty() {
                break;
            }
            let mut reached: Vec<(NodeId, &GraphEdge)> = level.into_iter().collect();
            reached.sort_by_key(|(id, _)| *id);
            for (id, edge) in reached {
                visited.insert(id);
                frontier.push_back(id);
                result.push(Dependent {
                    node: id,
                    distance,
                    via: edge.kind,
                    confidence: edge.confidence,
                });
            }
        }

        result
    }

    /// Check the structural invariants over the whole graph.
    pub fn check_integrity(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();

        for edge in self.all_edges() {
            if !self.contains(edge.source) || !self.contains(edge.target) {
                issues.push(IntegrityIssue::DanglingEdge { source: edge.source, target: edge.target });
            }
        }
        for symbol in self.symbols() {
            let owned = self
                .node(symbol.file)
                .and_then(GraphNode::as_file)
                .is_some_and(|file| file.symbols.contains(&symbol.id));
            if !owned {
                issues.push(IntegrityIssue::OrphanSymbol { symbol: symbol.id, file: symbol.file });
            }
        }
        for (id, idx) in &self.index {
            if self.inner.node_weight(*idx).map(GraphNode::id) != Some(*id) {
                issues.push(IntegrityIssue::IndexDrift(*id));
            }
        }

        issues
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle with a readers-writer discipline: analyses read, merges write.
#[derive(Debug, Clone, Default)]
pub struct SharedGraph(Arc<RwLock<GraphStore>>);

impl SharedGraph {
    pub fn new(graph: GraphStore) -> Self {
        SharedGraph(Arc::new(RwLock::new(graph)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, GraphStore> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, GraphStore> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}
