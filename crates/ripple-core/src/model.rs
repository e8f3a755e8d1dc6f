//! Core data structures for the dependency graph

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::stable_hash;

/// Unique, stable identifier for a node.
///
/// Derived from the normalized relative path (and qualified name for
/// symbols), so an unchanged definition keeps its ID across rescans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn for_file(path: &Path) -> Self {
        NodeId(stable_hash(&["file", &normalize_path(path)]))
    }

    pub fn for_symbol(path: &Path, qualified_name: &str) -> Self {
        NodeId(stable_hash(&["symbol", &normalize_path(path), qualified_name]))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Forward-slash form of a relative path, used for IDs and ordering.
pub fn normalize_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let trimmed = raw.trim_start_matches("./");
    trimmed.to_string()
}

/// Supported languages for syntax-aware parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    TypeScript,
    JavaScript,
    Python,
    Go,
    Java,
    C,
    Cpp,
    Other,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("rs") => Language::Rust,
            Some("ts") | Some("tsx") | Some("mts") | Some("cts") => Language::TypeScript,
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Language::JavaScript,
            Some("py") | Some("pyi") => Language::Python,
            Some("go") => Language::Go,
            Some("java") => Language::Java,
            Some("c") | Some("h") => Language::C,
            Some("cpp") | Some("cc") | Some("cxx") | Some("hpp") | Some("hh") => Language::Cpp,
            _ => Language::Other,
        }
    }

    /// Extensions tried, in order, when resolving an import to a file.
    pub fn module_extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Rust => &["rs"],
            Language::TypeScript => &["ts", "tsx", "d.ts", "js", "jsx"],
            Language::JavaScript => &["js", "jsx", "mjs", "cjs", "ts", "tsx"],
            Language::Python => &["py", "pyi"],
            Language::Go => &["go"],
            Language::Java => &["java"],
            Language::C | Language::Cpp => &["h", "hpp", "c", "cpp", "cc"],
            Language::Other => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Other => "other",
        }
    }
}

/// What a symbol defines. Fixed across languages so the store stays language-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    /// Classes, structs, interfaces, traits, enums and type aliases.
    Class,
    Variable,
    Route,
    Other,
}

/// What kind of relationship this edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Import,
    Call,
    Inherit,
    /// A bare identifier mention that is not a call, import or base type.
    Mention,
}

impl EdgeKind {
    /// Edges that break outright when their target disappears.
    pub fn is_structural(&self) -> bool {
        matches!(self, EdgeKind::Import | EdgeKind::Call | EdgeKind::Inherit)
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::Import => "import",
            EdgeKind::Call => "call",
            EdgeKind::Inherit => "inherit",
            EdgeKind::Mention => "mention",
        };
        f.write_str(s)
    }
}

/// How this edge was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Matched through an import or a definition in the same file.
    Exact,
    /// Matched by name only, or produced by the lexical fallback.
    Heuristic,
}

impl Confidence {
    /// The weaker of two confidences.
    pub fn min(self, other: Confidence) -> Confidence {
        if self == Confidence::Heuristic || other == Confidence::Heuristic {
            Confidence::Heuristic
        } else {
            Confidence::Exact
        }
    }
}

/// What a raw reference points at, before linking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RefTarget {
    /// An import path exactly as written (`./util`, `a.b`, `crate::x`, `stdio.h`).
    Module { spec: String },
    /// An identifier, optionally qualified by the module it was imported from.
    Name {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module: Option<String>,
    },
}

/// An outgoing reference as extracted from a single file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RawReference {
    /// Qualified name of the enclosing symbol; `None` for file-level code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub target: RefTarget,
    pub kind: EdgeKind,
    pub line: u32,
    /// Upper bound on the confidence of any edge linked from this reference.
    pub confidence: Confidence,
}

/// A scanned source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub path: PathBuf,
    pub hash: String,
    pub scanned_at: DateTime<Utc>,
    pub language: Language,
    /// Symbols defined in this file, in source order.
    #[serde(default)]
    pub symbols: Vec<NodeId>,
    #[serde(default)]
    pub references: Vec<RawReference>,
    #[serde(default)]
    pub line_count: u32,
    #[serde(default)]
    pub size: u64,
}

impl SourceFile {
    pub fn id(&self) -> NodeId {
        NodeId::for_file(&self.path)
    }
}

/// A named definition owned by exactly one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub id: NodeId,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file: NodeId,
    pub file_path: PathBuf,
    pub line: u32,
}

impl Symbol {
    pub fn new(file_path: &Path, name: &str, qualified_name: &str, kind: SymbolKind, line: u32) -> Self {
        Symbol {
            id: NodeId::for_symbol(file_path, qualified_name),
            name: name.to_string(),
            qualified_name: qualified_name.to_string(),
            kind,
            file: NodeId::for_file(file_path),
            file_path: PathBuf::from(normalize_path(file_path)),
            line,
        }
    }

    /// Names starting with an underscore are private by convention.
    pub fn is_public(&self) -> bool {
        !self.name.starts_with('_')
    }
}

/// A single node in the dependency graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum GraphNode {
    File(SourceFile),
    Symbol(Symbol),
}

impl GraphNode {
    pub fn id(&self) -> NodeId {
        match self {
            GraphNode::File(file) => file.id(),
            GraphNode::Symbol(symbol) => symbol.id,
        }
    }

    /// Path of the file this node lives in.
    pub fn path(&self) -> &Path {
        match self {
            GraphNode::File(file) => &file.path,
            GraphNode::Symbol(symbol) => &symbol.file_path,
        }
    }

    /// Human-readable label: the path for files, the qualified name for symbols.
    pub fn label(&self) -> String {
        match self {
            GraphNode::File(file) => normalize_path(&file.path),
            GraphNode::Symbol(symbol) => symbol.qualified_name.clone(),
        }
    }

    pub fn as_file(&self) -> Option<&SourceFile> {
        match self {
            GraphNode::File(file) => Some(file),
            GraphNode::Symbol(_) => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            GraphNode::Symbol(symbol) => Some(symbol),
            GraphNode::File(_) => None,
        }
    }
}

/// A directed, typed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GraphEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl GraphEdge {
    pub fn new(source: NodeId, target: NodeId, kind: EdgeKind, confidence: Confidence) -> Self {
        GraphEdge {
            source,
            target,
            kind,
            confidence,
            line: None,
        }
    }

    /// Exact structural edges rank above everything else when several reach one node.
    pub fn strength(&self) -> u8 {
        match (self.kind.is_structural(), self.confidence) {
            (true, Confidence::Exact) => 3,
            (true, Confidence::Heuristic) => 2,
            (false, Confidence::Exact) => 1,
            (false, Confidence::Heuristic) => 0,
        }
    }
}

/// Symbol-level edges rolled up to a pair of files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileLink {
    pub source: PathBuf,
    pub target: PathBuf,
    /// How many underlying edges this represents.
    pub count: u32,
    /// Breakdown by edge kind.
    pub kind_counts: std::collections::BTreeMap<EdgeKind, u32>,
}
