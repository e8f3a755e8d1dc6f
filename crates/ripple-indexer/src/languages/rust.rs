//! Rust language extractor using tree-sitter

use ripple_core::{EdgeKind, SymbolKind};
use tree_sitter::Node;

use super::{Scope, field_text, line, named_children, text};
use crate::extractor::{ExtractionBuilder, LanguageExtractor};

pub struct RustExtractor;

impl LanguageExtractor for RustExtractor {
    fn extract(&self, tree: &tree_sitter::Tree, source: &str, out: &mut ExtractionBuilder) {
        let mut walker = Walker {
            source,
            out,
            scope: Scope::default(),
        };
        walker.visit(tree.root_node());
    }
}

/// One leaf of a `use` tree.
#[derive(Debug, PartialEq)]
struct UsePath {
    path: String,
    alias: Option<String>,
    glob: bool,
}

struct Walker<'a, 'b> {
    source: &'a str,
    out: &'b mut ExtractionBuilder,
    scope: Scope,
}

impl Walker<'_, '_> {
    fn visit(&mut self, node: Node) {
        match node.kind() {
            "use_declaration" => self.use_declaration(node),
            "function_item" | "function_signature_item" => self.function(node),
            "struct_item" | "enum_item" | "union_item" | "type_item" => {
                self.item(node, SymbolKind::Class, false);
            }
            "trait_item" => self.trait_item(node),
            "const_item" | "static_item" => {
                self.item(node, SymbolKind::Variable, false);
            }
            "macro_definition" => {
                self.item(node, SymbolKind::Other, false);
            }
            "mod_item" => self.module(node),
            "impl_item" => self.impl_item(node),
            "call_expression" => self.call(node),
            "type_identifier" => {
                let name = text(node, self.source).to_string();
                self.mention(&name, node);
            }
            "scoped_type_identifier" | "scoped_identifier" => {
                let path = rust_path(text(node, self.source));
                self.mention(&path, node);
            }
            "identifier" => {
                let name = text(node, self.source).to_string();
                self.mention(&name, node);
            }
            "string_literal" | "raw_string_literal" | "line_comment" | "block_comment" | "attribute_item" => {}
            _ => self.visit_children(node),
        }
    }

    fn visit_children(&mut self, node: Node) {
        for child in named_children(node) {
            self.visit(child);
        }
    }

    fn from(&self) -> Option<String> {
        self.scope.current().map(str::to_string)
    }

    fn mention(&mut self, path: &str, node: Node) {
        let from = self.from();
        self.out.reference(from.as_deref(), path, EdgeKind::Mention, line(node));
    }

    fn use_declaration(&mut self, node: Node) {
        let Some(argument) = node.child_by_field_name("argument") else {
            return;
        };
        let mut paths = Vec::new();
        self.collect_use(argument, "", &mut paths);

        let from = self.from();
        let at = line(node);
        for UsePath { path, alias, glob } in paths {
            self.out.import_module(from.as_deref(), &path, at);
            if glob {
                continue;
            }
            let Some((module, name)) = path.rsplit_once("::") else {
                self.out.bind_module(alias.as_deref().unwrap_or(&path), &path);
                continue;
            };
            if name == "self" {
                let local = alias.as_deref().unwrap_or_else(|| module.rsplit("::").next().unwrap_or(module));
                self.out.bind_module(local, module);
                continue;
            }
            // snake_case leaves are usually modules or functions; both resolve through `module::name`.
            let submodule = name
                .starts_with(|c: char| c.is_ascii_lowercase())
                .then(|| path.clone());
            self.out.import_name(from.as_deref(), module, name, alias.as_deref(), submodule, at);
        }
    }

    fn collect_use(&self, node: Node, prefix: &str, out: &mut Vec<UsePath>) {
        let join = |rest: &str| {
            if prefix.is_empty() {
                rest.to_string()
            } else {
                format!("{prefix}::{rest}")
            }
        };
        match node.kind() {
            "use_as_clause" => {
                if let Some(path) = field_text(node, "path", self.source) {
                    out.push(UsePath {
                        path: join(path),
                        alias: field_text(node, "alias", self.source).map(str::to_string),
                        glob: false,
                    });
                }
            }
            "scoped_use_list" => {
                let nested = field_text(node, "path", self.source).map_or_else(|| prefix.to_string(), join);
                if let Some(list) = node.child_by_field_name("list") {
                    self.collect_use(list, &nested, out);
                }
            }
            "use_list" => {
                for child in named_children(node) {
                    self.collect_use(child, prefix, out);
                }
            }
            "use_wildcard" => {
                let path = named_children(node)
                    .first()
                    .map(|n| join(text(*n, self.source)))
                    .unwrap_or_else(|| prefix.to_string());
                out.push(UsePath {
                    path,
                    alias: None,
                    glob: true,
                });
            }
            "scoped_identifier" | "identifier" | "crate" | "self" | "super" => out.push(UsePath {
                path: join(text(node, self.source)),
                alias: None,
                glob: false,
            }),
            _ => {}
        }
    }

    fn item(&mut self, node: Node, kind: SymbolKind, enter: bool) -> Option<String> {
        let name = field_text(node, "name", self.source)?;
        let qualified = self.scope.qualify(name);
        self.out.define(name, &qualified, kind, line(node));
        if enter {
            return Some(qualified);
        }
        // Field types and values still reference other items.
        self.scope.push(qualified.clone());
        let name_id = node.child_by_field_name("name").map(|n| n.id());
        for child in named_children(node) {
            if Some(child.id()) != name_id {
                self.visit(child);
            }
        }
        self.scope.pop();
        Some(qualified)
    }

    fn function(&mut self, node: Node) {
        let Some(qualified) = self.item(node, SymbolKind::Function, true) else {
            return;
        };
        self.scope.push(qualified);
        for field in ["parameters", "return_type", "body"] {
            if let Some(child) = node.child_by_field_name(field) {
                self.visit(child);
            }
        }
        self.scope.pop();
    }

    fn trait_item(&mut self, node: Node) {
        let Some(qualified) = self.item(node, SymbolKind::Class, true) else {
            return;
        };
        if let Some(bounds) = node.child_by_field_name("bounds") {
            for bound in named_children(bounds) {
                if matches!(bound.kind(), "type_identifier" | "scoped_type_identifier") {
                    let path = rust_path(text(bound, self.source));
                    self.out.reference(Some(&qualified), &path, EdgeKind::Inherit, line(bound));
                }
            }
        }
        self.scope.push(qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body);
        }
        self.scope.pop();
    }

    fn module(&mut self, node: Node) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };
        match node.child_by_field_name("body") {
            // `mod foo;` pulls in a file.
            None => {
                let from = self.from();
                self.out.import_module(from.as_deref(), &format!("self::{name}"), line(node));
            }
            Some(body) => {
                let qualified = self.scope.qualify(name);
                self.out.define(name, &qualified, SymbolKind::Other, line(node));
                self.scope.push(qualified);
                self.visit(body);
                self.scope.pop();
            }
        }
    }

    fn impl_item(&mut self, node: Node) {
        let Some(type_node) = node.child_by_field_name("type") else {
            return;
        };
        // `impl<T> Foo<T>` names the type without its parameters.
        let type_name = match type_node.kind() {
            "generic_type" => type_node
                .child_by_field_name("type")
                .map(|n| text(n, self.source))
                .unwrap_or(""),
            _ => text(type_node, self.source),
        };
        let type_name = rust_path(type_name);
        let type_name = type_name.rsplit('.').next().unwrap_or(&type_name).to_string();
        if type_name.is_empty() {
            return;
        }
        let qualified = self.scope.qualify(&type_name);

        if let Some(trait_node) = node.child_by_field_name("trait") {
            let trait_node = match trait_node.kind() {
                "generic_type" => trait_node.child_by_field_name("type").unwrap_or(trait_node),
                _ => trait_node,
            };
            let path = rust_path(text(trait_node, self.source));
            self.out.reference(Some(&qualified), &path, EdgeKind::Inherit, line(node));
        }

        self.scope.push(qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body);
        }
        self.scope.pop();
    }

    fn call(&mut self, node: Node) {
        let from = self.from();
        if let Some(function) = node.child_by_field_name("function") {
            let function = match function.kind() {
                "generic_function" => function.child_by_field_name("function").unwrap_or(function),
                _ => function,
            };
            match function.kind() {
                "identifier" | "scoped_identifier" => {
                    let path = rust_path(text(function, self.source));
                    self.out.reference(from.as_deref(), &path, EdgeKind::Call, line(node));
                }
                "field_expression" => {
                    if let Some(method) = field_text(function, "field", self.source) {
                        self.out.reference(from.as_deref(), method, EdgeKind::Call, line(node));
                    }
                    if let Some(value) = function.child_by_field_name("value") {
                        self.visit(value);
                    }
                }
                _ => self.visit(function),
            }
        }
        if let Some(arguments) = node.child_by_field_name("arguments") {
            self.visit(arguments);
        }
    }
}

/// `a::b::C` -> `a.b.C`, dropping generic arguments and leading `crate`/`self`/`Self`.
fn rust_path(path: &str) -> String {
    let path = path.split('<').next().unwrap_or(path);
    path.split("::")
        .map(str::trim)
        .filter(|s| !s.is_empty() && !matches!(*s, "crate" | "self" | "Self" | "super"))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use ripple_core::{EdgeKind, RefTarget, SymbolKind};

    use super::rust_path;
    use crate::extractor::SymbolExtractor;

    #[test]
    fn test_rust_path() {
        assert_eq!(rust_path("crate::graph::GraphStore"), "graph.GraphStore");
        assert_eq!(rust_path("Vec::<u8>::new"), "Vec");
        assert_eq!(rust_path("Self::new"), "new");
    }

    #[test]
    fn test_rust_extraction() {
        let rust_code = r#"
use crate::graph::{GraphStore, self};
use std::collections::HashMap as Map;

mod helpers;

pub struct User {
    name: String,
}

impl User {
    pub fn new(name: String) -> Self {
        User { name }
    }
}

impl Display for User {
    fn fmt(&self) {}
}

fn main() {
    let store = GraphStore::new();
    let user = User::new(helper());
    graph::rebuild(&store);
}
"#;

        let extraction = SymbolExtractor::default().extract(Path::new("src/main.rs"), rust_code.as_bytes());
        assert!(extraction.failure.is_none(), "{:?}", extraction.failure);

        let symbols: Vec<(&str, SymbolKind)> = extraction
            .symbols
            .iter()
            .map(|s| (s.qualified_name.as_str(), s.kind))
            .collect();
        assert_eq!(
            symbols,
            vec![
                ("User", SymbolKind::Class),
                ("User.new", SymbolKind::Function),
                ("User.fmt", SymbolKind::Function),
                ("main", SymbolKind::Function),
            ]
        );

        let refs = &extraction.references;
        assert!(refs.iter().any(|r| r.target == RefTarget::Module { spec: "self::helpers".into() }));
        assert!(refs.iter().any(|r| r.kind == EdgeKind::Inherit
            && r.from.as_deref() == Some("User")
            && r.target == RefTarget::Name { name: "Display".into(), module: None }));
        assert!(refs.iter().any(|r| r.from.as_deref() == Some("main")
            && r.kind == EdgeKind::Call
            && r.target == RefTarget::Name { name: "GraphStore.new".into(), module: Some("crate::graph".into()) }));
        assert!(refs.iter().any(|r| r.from.as_deref() == Some("main")
            && r.target == RefTarget::Name { name: "rebuild".into(), module: Some("crate::graph".into()) }));
        assert!(refs.iter().any(|r| r.from.as_deref() == Some("main")
            && r.target == RefTarget::Name { name: "User.new".into(), module: None }));
    }
}
