//! Turns per-file raw references into graph edges

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::graph::GraphStore;
use crate::model::*;

/// Outcome of a relink pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub edges: usize,
    /// References whose target is outside the indexed tree (stdlib, packages, typos).
    pub unresolved: usize,
}

/// Index of indexed file paths for import resolution.
struct ModuleIndex {
    /// Normalized path -> file node.
    files: BTreeMap<String, NodeId>,
}

impl ModuleIndex {
    fn new(graph: &GraphStore) -> Self {
        let files = graph
            .files()
            .map(|f| (normalize_path(&f.path), f.id()))
            .collect();
        ModuleIndex { files }
    }

    /// Resolve an import spec written in `importer` to an indexed file.
    fn resolve(&self, importer: &str, language: Language, spec: &str) -> Option<(NodeId, Confidence)> {
        let spec = spec.trim().trim_matches(|c| c == '"' || c == '\'' || c == '<' || c == '>');
        if spec.is_empty() {
            return None;
        }
        for base in module_bases(importer, language, spec) {
            if let Some(id) = self.probe(&base, language) {
                return Some((id, Confidence::Exact));
            }
        }
        self.suffix_match(spec, language).map(|id| (id, Confidence::Heuristic))
    }

    fn probe(&self, base: &str, language: Language) -> Option<NodeId> {
        if let Some(id) = self.files.get(base) {
            return Some(*id);
        }
        for ext in language.module_extensions() {
            if let Some(id) = self.files.get(&format!("{base}.{ext}")) {
                return Some(*id);
            }
        }
        let index_files: &[&str] = match language {
            Language::Python => &["__init__.py"],
            Language::Rust => &["mod.rs", "lib.rs"],
            Language::JavaScript | Language::TypeScript => &["index.js", "index.ts", "index.tsx", "index.jsx"],
            _ => &[],
        };
        index_files
            .iter()
            .find_map(|index| self.files.get(&join(base, index)).copied())
    }

    /// A unique file whose extensionless path ends with the spec's path form.
    fn suffix_match(&self, spec: &str, language: Language) -> Option<NodeId> {
        let tail = spec_to_path(spec, language);
        let tail = tail.trim_start_matches("./").trim_start_matches("../");
        if tail.is_empty() {
            return None;
        }
        let needle = format!("/{tail}");
        let mut hits = self.files.iter().filter(|(path, _)| {
            let stem = strip_extension(path);
            stem == tail || stem.ends_with(&needle) || path.as_str() == tail || path.ends_with(&needle)
        });
        let first = hits.next()?;
        if hits.next().is_some() {
            return None;
        }
        Some(*first.1)
    }
}

/// Candidate extensionless paths for an import spec, most specific first.
fn module_bases(importer: &str, language: Language, spec: &str) -> Vec<String> {
    let dir = parent_dir(importer);
    let mut bases = Vec::new();

    match language {
        Language::Python => {
            let dots = spec.chars().take_while(|c| *c == '.').count();
            let rest = spec[dots..].replace('.', "/");
            if dots > 0 {
                let mut base = dir.to_string();
                for _ in 1..dots {
                    base = parent_dir(&base).to_string();
                }
                bases.push(join(&base, &rest));
            } else {
                bases.push(join(dir, &rest));
                bases.push(rest);
            }
        }
        Language::Rust => {
            let segments: Vec<&str> = spec.split("::").filter(|s| !s.is_empty()).collect();
            let (anchor, rest) = match segments.first() {
                Some(&"crate") => (crate_src(importer), &segments[1..]),
                Some(&"self") => (dir.to_string(), &segments[1..]),
                Some(&"super") => (parent_dir(dir).to_string(), &segments[1..]),
                _ => (crate_src(importer), &segments[..]),
            };
            // The last segments may name items rather than modules.
            for take in (1..=rest.len()).rev() {
                bases.push(join(&anchor, &rest[..take].join("/")));
            }
        }
        Language::JavaScript | Language::TypeScript => {
            if spec.starts_with('.') {
                bases.push(join(dir, spec));
            } else {
                bases.push(spec.to_string());
                bases.push(join("src", spec));
            }
        }
        Language::C | Language::Cpp => {
            bases.push(join(dir, spec));
            bases.push(spec.to_string());
            bases.push(join("include", spec));
        }
        Language::Java => bases.push(spec.replace('.', "/")),
        Language::Go | Language::Other => {
            if spec.starts_with('.') {
                bases.push(join(dir, spec));
            }
            bases.push(spec.to_string());
        }
    }

    bases.into_iter().map(|b| normalize_segments(&b)).filter(|b| !b.is_empty()).collect()
}

fn spec_to_path(spec: &str, language: Language) -> String {
    match language {
        Language::Python => spec.trim_start_matches('.').replace('.', "/"),
        Language::Java => spec.replace('.', "/"),
        Language::Rust => spec
            .split("::")
            .filter(|s| !matches!(*s, "crate" | "self" | "super" | ""))
            .collect::<Vec<_>>()
            .join("/"),
        _ => spec.to_string(),
    }
}

/// The `src` directory of the crate containing `importer`, or the root.
fn crate_src(importer: &str) -> String {
    match importer.rfind("src/") {
        Some(pos) => importer[..pos + 3].to_string(),
        None => String::new(),
    }
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

fn join(base: &str, rest: &str) -> String {
    if base.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{rest}")
    }
}

fn strip_extension(path: &str) -> &str {
    let file_start = path.rfind('/').map_or(0, |p| p + 1);
    match path[file_start..].find('.') {
        Some(dot) if dot > 0 => &path[..file_start + dot],
        _ => path,
    }
}

/// Collapse `.` and `..` segments. Paths escaping the root come back empty.
fn normalize_segments(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if out.pop().is_none() {
                    return String::new();
                }
            }
            s => out.push(s),
        }
    }
    out.join("/")
}

impl GraphStore {
    /// Rebuild every edge from the files' raw references.
    pub fn relink(&mut self) -> LinkStats {
        self.clear_edges();

        let modules = ModuleIndex::new(self);
        let mut files: Vec<(PathBuf, Language, Vec<RawReference>)> = self
            .files()
            .map(|f| (f.path.clone(), f.language, f.references.clone()))
            .collect();
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut stats = LinkStats::default();
        let mut edges = Vec::new();
        for (path, language, references) in &files {
            let importer = normalize_path(path);
            let file_id = NodeId::for_file(path);
            let mut module_cache: HashMap<&str, Option<(NodeId, Confidence)>> = HashMap::new();
            // Names brought in by `from m import x` / `import { x } from 'm'`.
            let imported: HashMap<&str, &str> = references
                .iter()
                .filter_map(|r| match (&r.kind, &r.target) {
                    (EdgeKind::Import, RefTarget::Name { name, module: Some(spec) }) => Some((name.as_str(), spec.as_str())),
                    _ => None,
                })
                .collect();

            for reference in references {
                let source = reference
                    .from
                    .as_deref()
                    .map(|scope| NodeId::for_symbol(path, scope))
                    .filter(|id| self.contains(*id))
                    .unwrap_or(file_id);

                let resolved = match &reference.target {
                    RefTarget::Module { spec } => *module_cache
                        .entry(spec.as_str())
                        .or_insert_with(|| modules.resolve(&importer, *language, spec)),
                    RefTarget::Name { name, module: Some(spec) } => {
                        // Imported names resolve through their module only; unresolved modules are external.
                        let module_file = *module_cache
                            .entry(spec.as_str())
                            .or_insert_with(|| modules.resolve(&importer, *language, spec));
                        module_file.map(|file| self.resolve_in_file(name, file, source))
                    }
                    RefTarget::Name { name, module: None } => {
                        let head = name.split('.').next().unwrap_or(name);
                        match imported.get(head) {
                            Some(spec) => {
                                let module_file = *module_cache
                                    .entry(*spec)
                                    .or_insert_with(|| modules.resolve(&importer, *language, spec));
                                module_file.map(|file| self.resolve_in_file(name, file, source))
                            }
                            None => self.resolve_name(path, name, source),
                        }
                    }
                };

                match resolved {
                    Some((target, confidence)) if target != source => {
                        let mut edge = GraphEdge::new(source, target, reference.kind, confidence.min(reference.confidence));
                        edge.line = Some(reference.line);
                        edges.push(edge);
                    }
                    Some(_) => {}
                    None => stats.unresolved += 1,
                }
            }
        }

        for edge in edges {
            if let Ok(true) = self.add_edge(edge) {
                stats.edges += 1;
            }
        }
        tracing::debug!("Linked {} edges ({} unresolved references)", stats.edges, stats.unresolved);
        stats
    }

    /// Resolve an imported name inside the module file it came from, or fall back to the file itself.
    fn resolve_in_file(&self, name: &str, (file, confidence): (NodeId, Confidence), source: NodeId) -> (NodeId, Confidence) {
        self.matching_symbols(name, source)
            .into_iter()
            .find(|s| s.file == file)
            .map_or((file, confidence), |s| (s.id, confidence))
    }

    /// Resolve a bare identifier: same file first, then the lexically first definition anywhere.
    fn resolve_name(&self, importer: &Path, name: &str, source: NodeId) -> Option<(NodeId, Confidence)> {
        let symbols = self.matching_symbols(name, source);
        let importer_id = NodeId::for_file(importer);
        if let Some(symbol) = symbols.iter().find(|s| s.file == importer_id) {
            return Some((symbol.id, Confidence::Exact));
        }
        symbols.first().map(|s| (s.id, Confidence::Heuristic))
    }

    /// Symbols named `name` (or whose qualified name ends with a dotted `name`), sorted by path.
    fn matching_symbols(&self, name: &str, source: NodeId) -> Vec<&Symbol> {
        let short = name.rsplit('.').next().unwrap_or(name);
        let dotted = format!(".{name}");
        let mut symbols: Vec<&Symbol> = self
            .symbol_table()
            .lookup(short)
            .into_iter()
            .filter_map(|id| self.symbol(id))
            .filter(|s| s.id != source)
            .filter(|s| !name.contains('.') || s.qualified_name == name || s.qualified_name.ends_with(&dotted))
            .collect();
        symbols.sort_by(|a, b| (&a.file_path, &a.qualified_name).cmp(&(&b.file_path, &b.qualified_name)));
        symbols
    }
}
