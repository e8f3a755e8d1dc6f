//! Regex-based extractors for Go, Java, C and C++
//!
//! Line-oriented and approximate: definitions at the start of a line,
//! imports and includes, and Java base types. No call graph.

use std::sync::LazyLock;

use regex::Regex;
use ripple_core::{EdgeKind, Language, SymbolKind};

use crate::extractor::ExtractionBuilder;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("lexical pattern is valid")
}

static GO_FUNC: LazyLock<Regex> =
    LazyLock::new(|| re(r"^func\s+(?:\(\s*\w*\s*\*?\s*(\w+)(?:\[[^\]]*\])?\s*\)\s*)?(\w+)\s*[\[(]"));
static GO_TYPE: LazyLock<Regex> = LazyLock::new(|| re(r"^type\s+(\w+)\s+(?:\[[^\]]*\]\s*)?(\w+)?"));
static GO_VAR: LazyLock<Regex> = LazyLock::new(|| re(r"^(?:var|const)\s+(\w+)"));
static GO_IMPORT: LazyLock<Regex> = LazyLock::new(|| re(r#"^import\s+(?:[\w.]+\s+)?"([^"]+)""#));
static GO_IMPORT_BLOCK_LINE: LazyLock<Regex> = LazyLock::new(|| re(r#"^\s*(?:[\w.]+\s+)?"([^"]+)""#));

static JAVA_IMPORT: LazyLock<Regex> = LazyLock::new(|| re(r"^\s*import\s+(static\s+)?([\w.]+?)(\.\*)?\s*;"));
static JAVA_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"^\s*(?:(?:public|protected|private|static|final|abstract|sealed|non-sealed|strictfp)\s+)*(class|interface|enum|record)\s+(\w+)([^{]*)")
});
static GENERIC_ARGS: LazyLock<Regex> = LazyLock::new(|| re(r"<[^<>]*>"));
static JAVA_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    re(r"^\s+(?:(?:public|protected|private|static|final|abstract|synchronized|native|default)\s+)+(?:<[^>]+>\s+)?[\w<>\[\],.?]+(?:\s*<[^>]*>)?\s+(\w+)\s*\(")
});

static C_INCLUDE: LazyLock<Regex> = LazyLock::new(|| re(r#"^\s*#\s*include\s*([<"])([^>"]+)[>"]"#));
static C_TYPE: LazyLock<Regex> =
    LazyLock::new(|| re(r"^\s*(?:typedef\s+)?(struct|class|union|enum)\s+(?:class\s+)?(\w+)\s*(?::[^{;]*)?\{?\s*$"));
static C_FUNC: LazyLock<Regex> = LazyLock::new(|| {
    re(r"^(?:[\w*&:<>,]+\s+)+[*&]*((?:\w+::)*~?\w+)\s*\([^;]*\)\s*(?:const\s*)?(?:noexcept\s*)?(?:override\s*)?\{?\s*$")
});
static C_DEFINE: LazyLock<Regex> = LazyLock::new(|| re(r"^\s*#\s*define\s+(\w+)"));

const C_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "return", "sizeof", "else", "do"];

pub fn extract(language: Language, text: &str, out: &mut ExtractionBuilder) {
    match language {
        Language::Go => go(text, out),
        Language::Java => java(text, out),
        Language::C | Language::Cpp => c_family(text, out),
        _ => super::generic::scan_imports(text, out),
    }
}

fn numbered(text: &str) -> impl Iterator<Item = (u32, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (u32::try_from(i + 1).unwrap_or(u32::MAX), line))
}

fn go(text: &str, out: &mut ExtractionBuilder) {
    let mut in_import_block = false;
    for (at, line) in numbered(text) {
        if in_import_block {
            if line.trim_start().starts_with(')') {
                in_import_block = false;
            } else if let Some(caps) = GO_IMPORT_BLOCK_LINE.captures(line) {
                out.import_module(None, &caps[1], at);
            }
            continue;
        }
        if line.starts_with("import (") {
            in_import_block = true;
        } else if let Some(caps) = GO_IMPORT.captures(line) {
            out.import_module(None, &caps[1], at);
        } else if let Some(caps) = GO_FUNC.captures(line) {
            let name = &caps[2];
            match caps.get(1) {
                Some(receiver) => {
                    let qualified = format!("{}.{}", receiver.as_str(), name);
                    out.define(name, &qualified, SymbolKind::Function, at);
                }
                None => {
                    out.define(name, name, SymbolKind::Function, at);
                }
            }
        } else if let Some(caps) = GO_TYPE.captures(line) {
            let kind = match caps.get(2).map(|m| m.as_str()) {
                Some("func") => SymbolKind::Function,
                _ => SymbolKind::Class,
            };
            out.define(&caps[1], &caps[1], kind, at);
        } else if let Some(caps) = GO_VAR.captures(line) {
            out.define(&caps[1], &caps[1], SymbolKind::Variable, at);
        }
    }
}

fn java(text: &str, out: &mut ExtractionBuilder) {
    let mut current_type: Option<String> = None;
    for (at, line) in numbered(text) {
        if let Some(caps) = JAVA_IMPORT.captures(line) {
            let path = &caps[2];
            let is_static = caps.get(1).is_some();
            let is_glob = caps.get(3).is_some();
            match path.rsplit_once('.') {
                Some((package, name)) if !is_glob => {
                    // `import a.b.C` names a class file; `import static a.b.C.m` names a member of one.
                    let module = if is_static { package } else { path };
                    out.import_module(None, module, at);
                    if is_static {
                        out.import_name(None, package, name, None, None, at);
                    } else {
                        out.import_name(None, path, name, None, None, at);
                    }
                }
                _ => out.import_module(None, path, at),
            }
        } else if let Some(caps) = JAVA_TYPE.captures(line) {
            let name = &caps[2];
            let qualified = match &current_type {
                Some(outer) if line.starts_with(char::is_whitespace) => format!("{outer}.{name}"),
                _ => name.to_string(),
            };
            out.define(name, &qualified, SymbolKind::Class, at);
            for base in java_bases(&caps[3]) {
                out.reference(Some(&qualified), &base, EdgeKind::Inherit, at);
            }
            current_type = Some(qualified);
        } else if let Some(caps) = JAVA_METHOD.captures(line) {
            let name = &caps[1];
            let qualified = match &current_type {
                Some(owner) => format!("{owner}.{name}"),
                None => name.to_string(),
            };
            out.define(name, &qualified, SymbolKind::Function, at);
        }
    }
}

/// Type names after `extends`/`implements` in a declaration header.
fn java_bases(header: &str) -> Vec<String> {
    let mut header = header.to_string();
    while GENERIC_ARGS.is_match(&header) {
        header = GENERIC_ARGS.replace_all(&header, "").into_owned();
    }
    let mut bases = Vec::new();
    let mut listing = false;
    for word in header.split(|c: char| c.is_whitespace() || c == ',') {
        match word {
            "" => {}
            "extends" | "implements" => listing = true,
            "permits" | "throws" => listing = false,
            _ if listing && word.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') => {
                bases.push(word.to_string());
            }
            _ => listing = false,
        }
    }
    bases
}

fn c_family(text: &str, out: &mut ExtractionBuilder) {
    for (at, line) in numbered(text) {
        if let Some(caps) = C_INCLUDE.captures(line) {
            // Only quoted includes can point into the project.
            if &caps[1] == "\"" {
                out.import_module(None, &caps[2], at);
            }
        } else if let Some(caps) = C_DEFINE.captures(line) {
            out.define(&caps[1], &caps[1], SymbolKind::Variable, at);
        } else if let Some(caps) = C_TYPE.captures(line) {
            out.define(&caps[2], &caps[2], SymbolKind::Class, at);
        } else if let Some(caps) = C_FUNC.captures(line) {
            let full = &caps[1];
            let name = full.rsplit("::").next().unwrap_or(full);
            if C_KEYWORDS.contains(&name) || line.trim_start().starts_with("return") {
                continue;
            }
            out.define(name, &full.replace("::", "."), SymbolKind::Function, at);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use ripple_core::{RefTarget, SymbolKind};

    use crate::extractor::SymbolExtractor;

    fn names(path: &str, code: &str) -> Vec<(String, SymbolKind)> {
        SymbolExtractor::default()
            .extract(Path::new(path), code.as_bytes())
            .symbols
            .into_iter()
            .map(|s| (s.qualified_name, s.kind))
            .collect()
    }

    #[test]
    fn test_go_definitions_and_imports() {
        let code = r#"package store

import (
    "fmt"
    db "example.com/app/db"
)

type Store struct {
    conn *db.Conn
}

func NewStore() *Store {
    return &Store{}
}

func (s *Store) Save(key string) error {
    return fmt.Errorf("todo")
}

const MaxSize = 10
"#;
        assert_eq!(
            names("store/store.go", code),
            vec![
                ("Store".to_string(), SymbolKind::Class),
                ("NewStore".to_string(), SymbolKind::Function),
                ("Store.Save".to_string(), SymbolKind::Function),
                ("MaxSize".to_string(), SymbolKind::Variable),
            ]
        );

        let extraction = SymbolExtractor::default().extract(Path::new("store/store.go"), code.as_bytes());
        let specs: Vec<&RefTarget> = extraction.references.iter().map(|r| &r.target).collect();
        assert_eq!(
            specs,
            vec![
                &RefTarget::Module { spec: "fmt".into() },
                &RefTarget::Module { spec: "example.com/app/db".into() },
            ]
        );
    }

    #[test]
    fn test_java_types_and_methods() {
        let code = r#"package com.acme;

import com.acme.model.User;

public class UserService extends BaseService implements Auditable {
    private final Repo repo;

    public User find(String id) {
        return repo.load(id);
    }
}
"#;
        assert_eq!(
            names("src/main/java/com/acme/UserService.java", code),
            vec![
                ("UserService".to_string(), SymbolKind::Class),
                ("UserService.find".to_string(), SymbolKind::Function),
            ]
        );
        let extraction =
            SymbolExtractor::default().extract(Path::new("src/main/java/com/acme/UserService.java"), code.as_bytes());
        let inherits: Vec<&RefTarget> = extraction
            .references
            .iter()
            .filter(|r| r.kind == ripple_core::EdgeKind::Inherit)
            .map(|r| &r.target)
            .collect();
        assert_eq!(inherits.len(), 2);
    }

    #[test]
    fn test_java_bases_skip_generic_arguments() {
        assert_eq!(
            super::java_bases(" extends Base<Map<K, V>> implements Comparable<T>, java.io.Serializable "),
            vec!["Base", "Comparable", "java.io.Serializable"]
        );
        assert!(super::java_bases("(String name, int age) ").is_empty());
    }

    #[test]
    fn test_c_functions_and_includes() {
        let code = r#"#include <stdio.h>
#include "util.h"
#define BUFFER_SIZE 64

struct point {
    int x;
};

static int add(int a, int b) {
    return a + b;
}

int main(void)
{
    if (add(1, 2)) {
        return 0;
    }
}
"#;
        let extraction = SymbolExtractor::default().extract(Path::new("main.c"), code.as_bytes());
        let names: Vec<&str> = extraction.symbols.iter().map(|s| s.qualified_name.as_str()).collect();
        assert_eq!(names, vec!["BUFFER_SIZE", "point", "add", "main"]);
        assert_eq!(extraction.references.len(), 1);
    }
}
