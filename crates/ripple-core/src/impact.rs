//! Blast-radius analysis over the dependency graph (read-only)

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::error::GraphError;
use crate::graph::{Dependent, GraphStore};
use crate::model::{Confidence, EdgeKind, GraphNode, NodeId, normalize_path};

/// Default traversal depth for breaking changes.
pub const DEFAULT_MAX_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    ModifyBody,
    Rename,
    RemoveSymbol,
    AddSymbol,
}

impl ChangeKind {
    /// Whether dependents may stop compiling or running.
    pub fn is_breaking(&self) -> bool {
        matches!(self, ChangeKind::Rename | ChangeKind::RemoveSymbol)
    }

    fn risk_multiplier(&self) -> f64 {
        match self {
            ChangeKind::AddSymbol => 0.1,
            ChangeKind::ModifyBody => 0.3,
            ChangeKind::Rename => 0.6,
            ChangeKind::RemoveSymbol => 0.8,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::ModifyBody => "modify-body",
            ChangeKind::Rename => "rename",
            ChangeKind::RemoveSymbol => "remove-symbol",
            ChangeKind::AddSymbol => "add-symbol",
        };
        f.write_str(s)
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "modify-body" | "modify" => Ok(ChangeKind::ModifyBody),
            "rename" => Ok(ChangeKind::Rename),
            "remove-symbol" | "remove" | "delete" => Ok(ChangeKind::RemoveSymbol),
            "add-symbol" | "add" => Ok(ChangeKind::AddSymbol),
            other => Err(format!(
                "unknown change kind `{other}` (expected modify-body, rename, remove-symbol or add-symbol)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactReason {
    /// Informational: a direct dependent of a body change or an addition.
    Review,
    /// A hard reference to something that was removed or renamed.
    Breaking,
    /// A heuristic or mention-only reference; may or may not break.
    Advisory,
}

impl fmt::Display for ImpactReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImpactReason::Review => "may need review",
            ImpactReason::Breaking => "breaking: referenced symbol removed/renamed",
            ImpactReason::Advisory => "advisory",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// One affected node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactEntry {
    pub node: NodeId,
    /// Path for files, qualified name for symbols.
    pub label: String,
    pub path: PathBuf,
    pub distance: usize,
    pub reason: ImpactReason,
    pub via: EdgeKind,
}

/// Ordered result of one analysis: increasing distance, then path, then label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactSet {
    pub target: NodeId,
    pub target_label: String,
    pub change: ChangeKind,
    pub entries: Vec<ImpactEntry>,
}

impl ImpactSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn breaking(&self) -> impl Iterator<Item = &ImpactEntry> {
        self.entries.iter().filter(|e| e.reason == ImpactReason::Breaking)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.entries.iter().any(|e| e.node == node)
    }

    pub fn distance_of(&self, node: NodeId) -> Option<usize> {
        self.entries.iter().find(|e| e.node == node).map(|e| e.distance)
    }

    /// Distinct files containing affected nodes.
    pub fn affected_files(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| normalize_path(&e.path)).collect()
    }

    /// 0.0–1.0 estimate combining how many files are affected with how risky the change kind is.
    pub fn score(&self) -> f64 {
        let base = match self.affected_files().len() {
            0 => 0.1,
            1..=2 => 0.2,
            3..=5 => 0.4,
            6..=10 => 0.6,
            11..=20 => 0.8,
            _ => 0.9,
        };
        (base * self.change.risk_multiplier()).min(1.0)
    }

    pub fn risk(&self) -> RiskLevel {
        let affected = self.affected_files().len();
        let score = self.score();
        if (self.change == ChangeKind::RemoveSymbol && affected > 0) || score >= 0.65 || affected >= 8 {
            RiskLevel::High
        } else if score >= 0.35 || affected >= 4 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn recommendations(&self) -> Vec<String> {
        match self.risk() {
            RiskLevel::High => {
                let mut recs = vec!["High-risk change. Test thoroughly.".to_string()];
                if self.affected_files().len() > 5 {
                    recs.push("Consider staging changes.".to_string());
                }
                recs
            }
            RiskLevel::Medium => vec!["Verify related files functionality.".to_string()],
            RiskLevel::Low => vec!["Standard verification recommended.".to_string()],
        }
    }
}

/// Computes impact sets. Never mutates the graph.
pub struct ImpactAnalyzer<'g> {
    graph: &'g GraphStore,
    max_depth: usize,
}

impl<'g> ImpactAnalyzer<'g> {
    pub fn new(graph: &'g GraphStore) -> Self {
        ImpactAnalyzer {
            graph,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Depth used for rename and remove-symbol traversals.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Impact of `kind` applied to `changed` (a file or a symbol).
    pub fn analyze(&self, changed: NodeId, kind: ChangeKind) -> Result<ImpactSet, GraphError> {
        let target = self.graph.node(changed).ok_or(GraphError::UnknownNode(changed))?;

        // A file stands for itself and everything it defines.
        let mut seeds = vec![changed];
        if let GraphNode::File(file) = target {
            seeds.extend(file.symbols.iter().copied());
        }

        let depth = if kind.is_breaking() { self.max_depth } else { 1 };
        let mut entries: Vec<ImpactEntry> = self
            .graph
            .dependents_from(&seeds, depth)
            .into_iter()
            .filter_map(|dep| self.entry(dep, kind))
            .collect();
        entries.sort_by(|a, b| {
            (a.distance, &a.path, &a.label).cmp(&(b.distance, &b.path, &b.label))
        });

        tracing::debug!("Impact of {} on {}: {} nodes", kind, target.label(), entries.len());
        Ok(ImpactSet {
            target: changed,
            target_label: target.label(),
            change: kind,
            entries,
        })
    }

    fn entry(&self, dep: Dependent, kind: ChangeKind) -> Option<ImpactEntry> {
        let node = self.graph.node(dep.node)?;
        let reason = if !kind.is_breaking() {
            ImpactReason::Review
        } else if dep.via.is_structural() && dep.confidence == Confidence::Exact {
            ImpactReason::Breaking
        } else {
            ImpactReason::Advisory
        };
        Some(ImpactEntry {
            node: dep.node,
            label: node.label(),
            path: node.path().to_path_buf(),
            distance: dep.distance,
            reason,
            via: dep.via,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_parses_cli_spellings() {
        assert_eq!("remove-symbol".parse::<ChangeKind>(), Ok(ChangeKind::RemoveSymbol));
        assert_eq!("modify".parse::<ChangeKind>(), Ok(ChangeKind::ModifyBody));
        assert!("explode".parse::<ChangeKind>().is_err());
        assert_eq!(ChangeKind::AddSymbol.to_string(), "add-symbol");
    }

    #[test]
    fn test_reason_strings() {
        assert_eq!(ImpactReason::Review.to_string(), "may need review");
        assert_eq!(
            ImpactReason::Breaking.to_string(),
            "breaking: referenced symbol removed/renamed"
        );
    }
}
