//! `@path` / `#symbol` references in free text, resolved against the graph
//!
//! Every recognised token ends up in exactly one of `found` or `missing`;
//! a miss never stops the remaining tokens from being resolved.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use regex::Regex;
use serde::Serialize;

use crate::graph::GraphStore;
use crate::model::{NodeId, Symbol, normalize_path};

const MAX_SUGGESTIONS: usize = 3;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([@#])([\w./\\:\-]+)").expect("token pattern is valid"));

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_]\w*(?:(?:\.|::)[A-Za-z_]\w*)*$").expect("identifier pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Path,
    Symbol,
}

/// One `@...` or `#...` occurrence in the input text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceToken {
    pub kind: ReferenceKind,
    /// The token as written, marker included.
    pub raw: String,
    /// The token without its marker or trailing punctuation.
    pub value: String,
    /// Byte offset of the marker in the input.
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    CaseInsensitive,
    Substring,
    /// Unique indexed file whose path ends with the token.
    PathSuffix,
    /// Regular file on disk that is not in the graph.
    Filesystem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FoundReference {
    File {
        token: ReferenceToken,
        path: PathBuf,
        /// `None` when the file exists on disk but is not indexed.
        node: Option<NodeId>,
        matched: MatchKind,
    },
    Symbol {
        token: ReferenceToken,
        node: NodeId,
        qualified_name: String,
        path: PathBuf,
        line: u32,
        matched: MatchKind,
        /// Other equally ranked matches (`path:qualified_name`), if any.
        ambiguous_with: Vec<String>,
    },
}

impl FoundReference {
    pub fn token(&self) -> &ReferenceToken {
        match self {
            FoundReference::File { token, .. } | FoundReference::Symbol { token, .. } => token,
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        match self {
            FoundReference::File { node, .. } => *node,
            FoundReference::Symbol { node, .. } => Some(*node),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            FoundReference::File { path, .. } | FoundReference::Symbol { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MissReason {
    NotFound { suggestions: Vec<String> },
    Ambiguous { candidates: Vec<String> },
    /// The token is not a well-formed path or identifier.
    Invalid,
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::NotFound { suggestions } if suggestions.is_empty() => write!(f, "not found"),
            MissReason::NotFound { suggestions } => write!(f, "not found (did you mean: {}?)", suggestions.join(", ")),
            MissReason::Ambiguous { candidates } => write!(f, "ambiguous: {}", candidates.join(", ")),
            MissReason::Invalid => write!(f, "not a valid reference"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingReference {
    pub token: ReferenceToken,
    pub reason: MissReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedReferences {
    pub found: Vec<FoundReference>,
    pub missing: Vec<MissingReference>,
}

impl ResolvedReferences {
    /// Number of tokens classified.
    pub fn total(&self) -> usize {
        self.found.len() + self.missing.len()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn found_values(&self) -> Vec<&str> {
        self.found.iter().map(|f| f.token().value.as_str()).collect()
    }

    pub fn missing_values(&self) -> Vec<&str> {
        self.missing.iter().map(|m| m.token.value.as_str()).collect()
    }
}

/// Split text into reference tokens, in order of appearance.
///
/// A marker starts a token at the beginning of the text, after a non-word
/// character, or (for `#`) directly after a path token, so `@a.py#f` yields
/// both. Tokens are not validated here; malformed ones are classified by the
/// resolver.
pub fn tokenize(text: &str) -> Vec<ReferenceToken> {
    let mut tokens = Vec::new();
    let mut path_end = None;
    for caps in TOKEN_RE.captures_iter(text) {
        let (Some(marker), Some(body)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let kind = if marker.as_str() == "@" {
            ReferenceKind::Path
        } else {
            ReferenceKind::Symbol
        };
        let after_path = kind == ReferenceKind::Symbol && path_end == Some(marker.start());
        let boundary = text[..marker.start()]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_' || c == '@' || c == '#'));
        path_end = None;
        if !(boundary || after_path) {
            continue;
        }
        if kind == ReferenceKind::Path {
            path_end = Some(body.end());
        }

        let value = body.as_str().trim_end_matches(['.', ',', ':', ';', '!', '?', '-']);
        tokens.push(ReferenceToken {
            kind,
            raw: format!("{}{}", marker.as_str(), value),
            value: value.to_string(),
            offset: marker.start(),
        });
    }
    tokens
}

/// Resolves reference tokens against a graph and, optionally, the project tree on disk.
pub struct ReferenceResolver<'g> {
    graph: &'g GraphStore,
    root: Option<PathBuf>,
    matcher: SkimMatcherV2,
}

impl<'g> ReferenceResolver<'g> {
    pub fn new(graph: &'g GraphStore) -> Self {
        ReferenceResolver {
            graph,
            root: None,
            matcher: SkimMatcherV2::default(),
        }
    }

    /// Also accept files that exist under `root` but are not indexed.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Classify every token in `text` as found or missing.
    pub fn resolve(&self, text: &str) -> ResolvedReferences {
        let mut result = ResolvedReferences::default();
        for token in tokenize(text) {
            let outcome = match token.kind {
                ReferenceKind::Path => self.resolve_path(&token),
                ReferenceKind::Symbol => self.resolve_symbol(&token),
            };
            match outcome {
                Ok(found) => result.found.push(found),
                Err(reason) => {
                    tracing::debug!("Unresolved reference {}: {}", token.raw, reason);
                    result.missing.push(MissingReference { token, reason });
                }
            }
        }
        result
    }

    fn resolve_path(&self, token: &ReferenceToken) -> Result<FoundReference, MissReason> {
        let wanted = normalize_path(Path::new(&token.value));
        let escapes = Path::new(&wanted).is_absolute() || wanted.split('/').any(|s| s == "..");
        if wanted.is_empty() {
            return Err(MissReason::Invalid);
        }
        if escapes {
            return Err(MissReason::NotFound { suggestions: Vec::new() });
        }

        let found = |path: PathBuf, node, matched| FoundReference::File {
            token: token.clone(),
            path,
            node,
            matched,
        };

        if let Some(file) = self.graph.file(Path::new(&wanted)) {
            return Ok(found(file.path.clone(), Some(file.id()), MatchKind::Exact));
        }
        if let Some(root) = &self.root {
            if root.join(&wanted).is_file() {
                return Ok(found(PathBuf::from(&wanted), None, MatchKind::Filesystem));
            }
        }

        let needle = format!("/{wanted}");
        let mut matches: Vec<(String, NodeId)> = self
            .graph
            .files()
            .map(|f| (normalize_path(&f.path), f.id()))
            .filter(|(path, _)| path.ends_with(&needle))
            .collect();
        matches.sort();
        match matches.len() {
            0 => {
                let paths: Vec<String> = self.graph.files().map(|f| normalize_path(&f.path)).collect();
                Err(MissReason::NotFound { suggestions: self.suggest(&wanted, paths) })
            }
            1 => {
                let (path, id) = matches.remove(0);
                Ok(found(PathBuf::from(path), Some(id), MatchKind::PathSuffix))
            }
            _ => Err(MissReason::Ambiguous {
                candidates: matches.into_iter().map(|(path, _)| path).collect(),
            }),
        }
    }

    fn resolve_symbol(&self, token: &ReferenceToken) -> Result<FoundReference, MissReason> {
        if !IDENT_RE.is_match(&token.value) {
            return Err(MissReason::Invalid);
        }
        let qualified = token.value.replace("::", ".");
        let short = qualified.rsplit('.').next().unwrap_or(&qualified).to_string();
        let is_qualified = qualified.contains('.');
        let table = self.graph.symbol_table();

        let exact = self.candidates(table.lookup(&short), |s| {
            !is_qualified || s.qualified_name == qualified || s.qualified_name.ends_with(&format!(".{qualified}"))
        });
        let lower = qualified.to_lowercase();
        let tiers = [
            (MatchKind::Exact, exact),
            (
                MatchKind::CaseInsensitive,
                self.candidates(table.lookup_case_insensitive(&short), |s| {
                    let q = s.qualified_name.to_lowercase();
                    !is_qualified || q == lower || q.ends_with(&format!(".{lower}"))
                }),
            ),
            (
                MatchKind::Substring,
                self.candidates(table.lookup_substring(&short), |s| {
                    !is_qualified || s.qualified_name.to_lowercase().contains(&lower)
                }),
            ),
        ];

        for (matched, candidates) in tiers {
            let Some((first, rest)) = candidates.split_first() else {
                continue;
            };
            return Ok(FoundReference::Symbol {
                token: token.clone(),
                node: first.id,
                qualified_name: first.qualified_name.clone(),
                path: first.file_path.clone(),
                line: first.line,
                matched,
                ambiguous_with: rest.iter().map(|s| describe(s)).collect(),
            });
        }

        Err(MissReason::NotFound {
            suggestions: self.suggest(&short, table.names()),
        })
    }

    /// Symbols for `ids` that pass `keep`, ordered by (path, qualified name).
    fn candidates(&self, ids: Vec<NodeId>, keep: impl Fn(&Symbol) -> bool) -> Vec<&'g Symbol> {
        let mut symbols: Vec<&Symbol> = ids
            .into_iter()
            .filter_map(|id| self.graph.symbol(id))
            .filter(|s| keep(s))
            .collect();
        symbols.sort_by(|a, b| (&a.file_path, &a.qualified_name).cmp(&(&b.file_path, &b.qualified_name)));
        symbols.dedup_by_key(|s| s.id);
        symbols
    }

    fn suggest(&self, pattern: &str, choices: Vec<String>) -> Vec<String> {
        let mut scored: Vec<(i64, String)> = choices
            .into_iter()
            .filter_map(|choice| self.matcher.fuzzy_match(&choice, pattern).map(|score| (score, choice)))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.dedup_by(|a, b| a.1 == b.1);
        scored.into_iter().take(MAX_SUGGESTIONS).map(|(_, choice)| choice).collect()
    }
}

fn describe(symbol: &Symbol) -> String {
    format!("{}:{}", normalize_path(&symbol.file_path), symbol.qualified_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_markers_and_punctuation() {
        let tokens = tokenize("fix @src/app.py, then #Config.load. mail me@host.com #1");
        let values: Vec<(&ReferenceKind, &str)> = tokens.iter().map(|t| (&t.kind, t.value.as_str())).collect();
        assert_eq!(
            values,
            vec![
                (&ReferenceKind::Path, "src/app.py"),
                (&ReferenceKind::Symbol, "Config.load"),
                (&ReferenceKind::Symbol, "1"),
            ]
        );
        assert_eq!(tokens[0].offset, 4);
    }

    #[test]
    fn test_tokenize_adjacent_tokens() {
        let tokens = tokenize("@a.py @b.py #f #g");
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[3].raw, "#g");
    }

    #[test]
    fn test_tokenize_symbol_glued_to_path() {
        let tokens = tokenize("see @a.py#load and x#y");
        let raws: Vec<&str> = tokens.iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(raws, vec!["@a.py", "#load"]);
        assert_eq!(tokens[1].offset, 9);
    }

    #[test]
    fn test_tokenize_keeps_malformed_candidates() {
        let tokens = tokenize("#foo-bar #size! @.");
        let values: Vec<&str> = tokens.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["foo-bar", "size", ""]);
    }

    #[test]
    fn test_miss_reason_display() {
        let reason = MissReason::NotFound { suggestions: vec!["realFunc".into()] };
        assert_eq!(reason.to_string(), "not found (did you mean: realFunc?)");
        let reason = MissReason::Ambiguous { candidates: vec!["a/x.py".into(), "b/x.py".into()] };
        assert_eq!(reason.to_string(), "ambiguous: a/x.py, b/x.py");
        assert_eq!(MissReason::Invalid.to_string(), "not a valid reference");
    }
}
