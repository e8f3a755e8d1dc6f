//! Symbol extraction: one file's content in, its symbols and raw references out

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use ripple_core::{Confidence, EdgeKind, Language, NodeId, RawReference, RefTarget, Symbol, SymbolKind};

use crate::error::ExtractError;
use crate::languages;
use crate::parser_pool::{ParseRequest, ParserPool, create_parser_pool};

/// What a single file defines and refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub language: Language,
    pub symbols: Vec<Symbol>,
    pub references: Vec<RawReference>,
    pub line_count: u32,
    /// Set when the content could not be parsed and the lexical fallback was used.
    pub failure: Option<String>,
}

impl Extraction {
    pub fn is_fallback(&self) -> bool {
        self.failure.is_some()
    }
}

/// Trait for language-specific symbol extractors
pub trait LanguageExtractor: Send + Sync {
    /// Walk a parsed tree, recording definitions and references into `out`.
    fn extract(&self, tree: &tree_sitter::Tree, source: &str, out: &mut ExtractionBuilder);
}

/// Collects definitions and references while a file is walked.
///
/// Call sites are kept as written and resolved against the file's import
/// bindings in `finish`, so imports may appear after their first use.
pub struct ExtractionBuilder {
    path: PathBuf,
    symbols: Vec<Symbol>,
    defined: HashSet<NodeId>,
    references: Vec<RawReference>,
    /// Local names brought in by imports.
    bindings: HashMap<String, Binding>,
    sites: Vec<Site>,
    confidence: Confidence,
}

struct Binding {
    spec: String,
    /// `None` binds the module itself.
    name: Option<String>,
    /// Module spec of the imported name, when it may itself be a module (`from pkg import mod`).
    submodule: Option<String>,
}

struct Site {
    from: Option<String>,
    text: String,
    kind: EdgeKind,
    line: u32,
}

impl ExtractionBuilder {
    pub fn new(path: &Path) -> Self {
        ExtractionBuilder {
            path: path.to_path_buf(),
            symbols: Vec::new(),
            defined: HashSet::new(),
            references: Vec::new(),
            bindings: HashMap::new(),
            sites: Vec::new(),
            confidence: Confidence::Exact,
        }
    }

    /// Cap the confidence of everything recorded from now on.
    pub fn heuristic(mut self) -> Self {
        self.confidence = Confidence::Heuristic;
        self
    }

    /// Record a definition. Redefinitions of the same qualified name keep the first.
    pub fn define(&mut self, name: &str, qualified_name: &str, kind: SymbolKind, line: u32) -> bool {
        let symbol = Symbol::new(&self.path, name, qualified_name, kind, line);
        if !self.defined.insert(symbol.id) {
            return false;
        }
        self.symbols.push(symbol);
        true
    }

    /// `import m` / `#include "m"` / `use m`.
    pub fn import_module(&mut self, from: Option<&str>, spec: &str, line: u32) {
        let spec = spec.trim();
        if spec.is_empty() {
            return;
        }
        self.push(from, RefTarget::Module { spec: spec.to_string() }, EdgeKind::Import, line);
    }

    /// `from m import name as local`, `import { name as local } from 'm'`.
    ///
    /// `submodule` is the spec to use for `local.attr` when `name` is itself a module.
    pub fn import_name(
        &mut self,
        from: Option<&str>,
        spec: &str,
        name: &str,
        local: Option<&str>,
        submodule: Option<String>,
        line: u32,
    ) {
        if spec.is_empty() || name.is_empty() {
            return;
        }
        let target = RefTarget::Name {
            name: name.to_string(),
            module: Some(spec.to_string()),
        };
        self.push(from, target, EdgeKind::Import, line);
        let binding = Binding {
            spec: spec.to_string(),
            name: Some(name.to_string()),
            submodule,
        };
        self.bindings.insert(local.unwrap_or(name).to_string(), binding);
    }

    /// `import m as local`, `import * as local from 'm'`, `const local = require('m')`.
    pub fn bind_module(&mut self, local: &str, spec: &str) {
        if !local.is_empty() && !spec.is_empty() {
            let binding = Binding {
                spec: spec.to_string(),
                name: None,
                submodule: None,
            };
            self.bindings.insert(local.to_string(), binding);
        }
    }

    /// A call, base type or mention of `text` (a dotted path such as `os.path.join`).
    pub fn reference(&mut self, from: Option<&str>, text: &str, kind: EdgeKind, line: u32) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.sites.push(Site {
            from: from.map(str::to_string),
            text: text.to_string(),
            kind,
            line,
        });
    }

    fn push(&mut self, from: Option<&str>, target: RefTarget, kind: EdgeKind, line: u32) {
        self.references.push(RawReference {
            from: from.map(str::to_string),
            target,
            kind,
            line,
            confidence: self.confidence,
        });
    }

    fn bind(&self, text: &str) -> RefTarget {
        let text = text
            .strip_prefix("self.")
            .or_else(|| text.strip_prefix("this."))
            .unwrap_or(text);

        // Longest bound prefix wins: `a.b.f` with `a.b` bound as a module.
        let mut split = text.len();
        loop {
            let head = &text[..split];
            let rest = text[split..].trim_start_matches('.');
            if let Some(binding) = self.bindings.get(head) {
                let (name, spec) = match (&binding.name, &binding.submodule, rest.is_empty()) {
                    (None, _, true) => return RefTarget::Module { spec: binding.spec.clone() },
                    (None, _, false) => (rest.to_string(), &binding.spec),
                    (Some(name), _, true) => (name.clone(), &binding.spec),
                    (Some(_), Some(submodule), false) => (rest.to_string(), submodule),
                    (Some(name), None, false) => (format!("{name}.{rest}"), &binding.spec),
                };
                return RefTarget::Name {
                    name,
                    module: Some(spec.clone()),
                };
            }
            match head.rfind('.') {
                Some(dot) => split = dot,
                None => break,
            }
        }

        RefTarget::Name {
            name: text.to_string(),
            module: None,
        }
    }

    pub fn finish(mut self, language: Language, line_count: u32, failure: Option<String>) -> Extraction {
        // Mentions only matter for names the file imports and does not otherwise call.
        let called: HashSet<(Option<String>, String)> = self
            .sites
            .iter()
            .filter(|s| s.kind != EdgeKind::Mention)
            .map(|s| (s.from.clone(), s.text.clone()))
            .collect();
        let sites = std::mem::take(&mut self.sites);
        let mut mentioned = HashSet::new();

        for site in sites {
            if site.kind == EdgeKind::Mention {
                let head = site.text.split('.').next().unwrap_or(&site.text);
                let key = (site.from.clone(), site.text.clone());
                if !self.bindings.contains_key(head) || called.contains(&key) || !mentioned.insert(key) {
                    continue;
                }
            }
            let target = self.bind(&site.text);
            self.push(site.from.as_deref(), target, site.kind, site.line);
        }

        Extraction {
            language,
            symbols: self.symbols,
            references: self.references,
            line_count,
            failure,
        }
    }
}

/// Parses any supported file into symbols and raw references.
///
/// Never fails: unparsable content yields no symbols and heuristic
/// references from a lexical import scan, with `failure` set.
#[derive(Clone)]
pub struct SymbolExtractor {
    pool: ParserPool,
}

impl Default for SymbolExtractor {
    fn default() -> Self {
        Self::new(create_parser_pool())
    }
}

impl SymbolExtractor {
    pub fn new(pool: ParserPool) -> Self {
        SymbolExtractor { pool }
    }

    pub fn pool(&self) -> &ParserPool {
        &self.pool
    }

    pub fn extract(&self, path: &Path, content: &[u8]) -> Extraction {
        let language = Language::from_path(path);
        let text = match std::str::from_utf8(content) {
            Ok(text) => text,
            Err(_) => return fallback(path, language, &String::from_utf8_lossy(content), ExtractError::NotUtf8),
        };

        match language {
            Language::Python | Language::JavaScript | Language::TypeScript | Language::Rust => {
                match self.parse(path, language, text) {
                    Ok(extraction) => extraction,
                    Err(e) => fallback(path, language, text, e),
                }
            }
            Language::Go | Language::Java | Language::C | Language::Cpp => {
                let mut out = ExtractionBuilder::new(path);
                languages::lexical::extract(language, text, &mut out);
                out.finish(language, line_count(text), None)
            }
            Language::Other => {
                let mut out = ExtractionBuilder::new(path).heuristic();
                languages::generic::scan_imports(text, &mut out);
                out.finish(language, line_count(text), None)
            }
        }
    }

    fn parse(&self, path: &Path, language: Language, text: &str) -> Result<Extraction, ExtractError> {
        let parsed = self.pool.parse_blocking(ParseRequest {
            language,
            content: text.to_string(),
            path: path.to_path_buf(),
        })?;
        if parsed.tree.root_node().has_error() {
            return Err(ExtractError::Syntax(language));
        }

        let mut out = ExtractionBuilder::new(path);
        match language {
            Language::Python => languages::python::PythonExtractor.extract(&parsed.tree, text, &mut out),
            Language::Rust => languages::rust::RustExtractor.extract(&parsed.tree, text, &mut out),
            _ => languages::javascript::JavaScriptExtractor.extract(&parsed.tree, text, &mut out),
        }
        Ok(out.finish(language, line_count(text), None))
    }
}

fn fallback(path: &Path, language: Language, text: &str, reason: ExtractError) -> Extraction {
    tracing::debug!("Falling back to lexical scan for {}: {}", path.display(), reason);
    let mut out = ExtractionBuilder::new(path).heuristic();
    languages::generic::scan_imports(text, &mut out);
    out.finish(language, line_count(text), Some(reason.to_string()))
}

fn line_count(text: &str) -> u32 {
    u32::try_from(text.lines().count()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_resolves_through_imports() {
        let mut out = ExtractionBuilder::new(Path::new("app.py"));
        out.import_name(None, "utils", "helper", Some("h"), None, 1);
        out.import_name(None, "pkg", "db", None, Some("pkg.db".into()), 1);
        out.bind_module("np", "numpy");
        out.reference(Some("main"), "h", EdgeKind::Call, 3);
        out.reference(Some("main"), "np.array", EdgeKind::Call, 4);
        out.reference(Some("main"), "self.save", EdgeKind::Call, 5);
        out.reference(Some("main"), "db.connect", EdgeKind::Call, 6);
        let extraction = out.finish(Language::Python, 6, None);

        let targets: Vec<&RefTarget> = extraction.references.iter().map(|r| &r.target).collect();
        assert_eq!(
            targets[2],
            &RefTarget::Name { name: "helper".into(), module: Some("utils".into()) }
        );
        assert_eq!(
            targets[3],
            &RefTarget::Name { name: "array".into(), module: Some("numpy".into()) }
        );
        assert_eq!(targets[4], &RefTarget::Name { name: "save".into(), module: None });
        assert_eq!(
            targets[5],
            &RefTarget::Name { name: "connect".into(), module: Some("pkg.db".into()) }
        );
    }

    #[test]
    fn test_mentions_kept_only_for_imported_names() {
        let mut out = ExtractionBuilder::new(Path::new("app.py"));
        out.import_name(None, "handlers", "on_click", None, None, 1);
        out.reference(None, "on_click", EdgeKind::Mention, 2);
        out.reference(None, "on_click", EdgeKind::Mention, 3);
        out.reference(None, "local_var", EdgeKind::Mention, 4);
        let extraction = out.finish(Language::Python, 4, None);

        let mentions = extraction.references.iter().filter(|r| r.kind == EdgeKind::Mention).count();
        assert_eq!(mentions, 1);
    }

    #[test]
    fn test_define_keeps_first_redefinition() {
        let mut out = ExtractionBuilder::new(Path::new("a.py"));
        assert!(out.define("f", "f", SymbolKind::Function, 1));
        assert!(!out.define("f", "f", SymbolKind::Function, 9));
        let extraction = out.finish(Language::Python, 10, None);
        assert_eq!(extraction.symbols.len(), 1);
        assert_eq!(extraction.symbols[0].line, 1);
    }
}
