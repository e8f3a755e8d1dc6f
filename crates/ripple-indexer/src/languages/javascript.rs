//! JavaScript and TypeScript extractor using tree-sitter
//!
//! Both grammars share their expression and declaration node kinds; the
//! TypeScript-only declarations (interfaces, type aliases, enums) are
//! handled here as well.

use ripple_core::{EdgeKind, SymbolKind};
use tree_sitter::Node;

use super::{Scope, field_text, line, named_children, text, unquote};
use crate::extractor::{ExtractionBuilder, LanguageExtractor};

const ROUTE_METHODS: &[&str] = &["get", "post", "put", "delete", "patch", "all"];
const ROUTE_OBJECTS: &[&str] = &["app", "router", "server", "api"];

pub struct JavaScriptExtractor;

impl LanguageExtractor for JavaScriptExtractor {
    fn extract(&self, tree: &tree_sitter::Tree, source: &str, out: &mut ExtractionBuilder) {
        let mut walker = Walker {
            source,
            out,
            scope: Scope::default(),
        };
        walker.visit(tree.root_node());
    }
}

struct Walker<'a, 'b> {
    source: &'a str,
    out: &'b mut ExtractionBuilder,
    scope: Scope,
}

impl Walker<'_, '_> {
    fn visit(&mut self, node: Node) {
        match node.kind() {
            "import_statement" => self.import(node),
            "export_statement" => {
                if let Some(source) = field_text(node, "source", self.source) {
                    let from = self.from();
                    self.out.import_module(from.as_deref(), unquote(source), line(node));
                } else {
                    self.visit_children(node);
                }
            }
            "function_declaration" | "generator_function_declaration" => {
                self.function(node, SymbolKind::Function);
            }
            "class_declaration" | "abstract_class_declaration" | "class" => self.class(node),
            "interface_declaration" | "type_alias_declaration" | "enum_declaration" => {
                self.type_declaration(node);
            }
            "method_definition" => self.function(node, SymbolKind::Function),
            "lexical_declaration" | "variable_declaration" => {
                for declarator in named_children(node) {
                    if declarator.kind() == "variable_declarator" {
                        self.declarator(declarator);
                    }
                }
            }
            "call_expression" => self.call(node),
            "new_expression" => {
                let from = self.from();
                if let Some(constructor) = node.child_by_field_name("constructor") {
                    match self.dotted(constructor) {
                        Some(path) => self.out.reference(from.as_deref(), &path, EdgeKind::Call, line(node)),
                        None => self.visit(constructor),
                    }
                }
                if let Some(arguments) = node.child_by_field_name("arguments") {
                    self.visit(arguments);
                }
            }
            "member_expression" => match self.dotted(node) {
                Some(path) => self.mention(&path, node),
                None => self.visit_children(node),
            },
            "identifier" | "type_identifier" => {
                let name = text(node, self.source).to_string();
                self.mention(&name, node);
            }
            "string" | "template_string" | "comment" | "regex" => {}
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

    /// `a`, `a.b.c`, `this.x`; `None` for computed or call-based chains.
    fn dotted(&self, node: Node) -> Option<String> {
        match node.kind() {
            "identifier" | "this" | "type_identifier" => Some(text(node, self.source).to_string()),
            "member_expression" => {
                let object = self.dotted(node.child_by_field_name("object")?)?;
                let property = field_text(node, "property", self.source)?;
                Some(format!("{object}.{property}"))
            }
            _ => None,
        }
    }

    fn import(&mut self, node: Node) {
        let from = self.from();
        let Some(spec) = field_text(node, "source", self.source).map(unquote) else {
            return;
        };
        let at = line(node);
        self.out.import_module(from.as_deref(), spec, at);

        let Some(clause) = named_children(node).into_iter().find(|n| n.kind() == "import_clause") else {
            return;
        };
        for part in named_children(clause) {
            match part.kind() {
                // `import Foo from './foo'` usually names the module's default export after itself.
                "identifier" => {
                    let local = text(part, self.source);
                    self.out.import_name(from.as_deref(), spec, local, None, None, at);
                }
                "namespace_import" => {
                    if let Some(local) = named_children(part).first() {
                        self.out.bind_module(text(*local, self.source), spec);
                    }
                }
                "named_imports" => {
                    for specifier in named_children(part) {
                        if specifier.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(name) = field_text(specifier, "name", self.source) else {
                            continue;
                        };
                        let alias = field_text(specifier, "alias", self.source);
                        self.out.import_name(from.as_deref(), spec, name, alias, None, at);
                    }
                }
                _ => {}
            }
        }
    }

    fn function(&mut self, node: Node, kind: SymbolKind) {
        let Some(name) = field_text(node, "name", self.source) else {
            self.visit_children(node);
            return;
        };
        let qualified = self.scope.qualify(name);
        self.out.define(name, &qualified, kind, line(node));
        self.scope.push(qualified);
        for field in ["parameters", "return_type", "body"] {
            if let Some(child) = node.child_by_field_name(field) {
                self.visit(child);
            }
        }
        self.scope.pop();
    }

    fn class(&mut self, node: Node) {
        let Some(name) = field_text(node, "name", self.source) else {
            self.visit_children(node);
            return;
        };
        let qualified = self.scope.qualify(name);
        self.out.define(name, &qualified, SymbolKind::Class, line(node));

        for heritage in named_children(node).into_iter().filter(|n| n.kind() == "class_heritage") {
            for base in self.heritage(heritage) {
                self.out.reference(Some(&qualified), &base, EdgeKind::Inherit, line(heritage));
            }
        }

        self.scope.push(qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body);
        }
        self.scope.pop();
    }

    /// Base classes and implemented interfaces of a `class_heritage` node.
    fn heritage(&self, node: Node) -> Vec<String> {
        let mut bases = Vec::new();
        for child in named_children(node) {
            match child.kind() {
                "extends_clause" | "implements_clause" => {
                    for base in named_children(child) {
                        let base = match base.kind() {
                            "generic_type" => base.child_by_field_name("name").unwrap_or(base),
                            _ => base,
                        };
                        bases.extend(self.dotted(base));
                    }
                }
                _ => bases.extend(self.dotted(child)),
            }
        }
        bases
    }

    fn type_declaration(&mut self, node: Node) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };
        let qualified = self.scope.qualify(name);
        self.out.define(name, &qualified, SymbolKind::Class, line(node));
        let name_id = node.child_by_field_name("name").map(|n| n.id());
        self.scope.push(qualified);
        for child in named_children(node) {
            if child.kind() == "extends_type_clause" {
                for base in named_children(child) {
                    let base = match base.kind() {
                        "generic_type" => base.child_by_field_name("name").unwrap_or(base),
                        _ => base,
                    };
                    if let Some(path) = self.dotted(base) {
                        let from = self.from();
                        self.out.reference(from.as_deref(), &path, EdgeKind::Inherit, line(child));
                    }
                }
            } else if Some(child.id()) != name_id {
                self.visit(child);
            }
        }
        self.scope.pop();
    }

    fn declarator(&mut self, node: Node) {
        let name_node = node.child_by_field_name("name");
        let value = node.child_by_field_name("value");

        // `const x = require('m')` / `const { a, b } = require('m')`
        if let Some(spec) = value.and_then(|v| self.require_spec(v)) {
            let from = self.from();
            let at = line(node);
            self.out.import_module(from.as_deref(), &spec, at);
            match name_node {
                Some(n) if n.kind() == "identifier" => self.out.bind_module(text(n, self.source), &spec),
                Some(n) if n.kind() == "object_pattern" => {
                    for field in named_children(n) {
                        if field.kind() == "shorthand_property_identifier_pattern" {
                            let name = text(field, self.source);
                            self.out.import_name(from.as_deref(), &spec, name, None, None, at);
                        }
                    }
                }
                _ => {}
            }
            return;
        }

        let Some(name_node) = name_node.filter(|n| n.kind() == "identifier") else {
            if let Some(value) = value {
                self.visit(value);
            }
            return;
        };
        let name = text(name_node, self.source);
        let is_function = value.is_some_and(|v| {
            matches!(v.kind(), "arrow_function" | "function_expression" | "function" | "generator_function")
        });

        if is_function {
            let qualified = self.scope.qualify(name);
            self.out.define(name, &qualified, SymbolKind::Function, line(node));
            self.scope.push(qualified);
            if let Some(value) = value {
                self.visit_children(value);
            }
            self.scope.pop();
            return;
        }

        if self.scope.is_top_level() {
            self.out.define(name, name, SymbolKind::Variable, line(node));
        }
        if let Some(value) = value {
            self.visit(value);
        }
    }

    fn require_spec(&self, value: Node) -> Option<String> {
        if value.kind() != "call_expression" {
            return None;
        }
        let function = value.child_by_field_name("function")?;
        if text(function, self.source) != "require" {
            return None;
        }
        let arguments = value.child_by_field_name("arguments")?;
        let first = named_children(arguments).into_iter().next()?;
        (first.kind() == "string").then(|| unquote(text(first, self.source)).to_string())
    }

    fn call(&mut self, node: Node) {
        let from = self.from();
        let at = line(node);
        let function = node.child_by_field_name("function");
        let arguments = node.child_by_field_name("arguments");

        if let Some(function) = function {
            match function.kind() {
                // Dynamic `import('m')`
                "import" => {
                    if let Some(spec) = arguments.and_then(|a| self.first_string(a)) {
                        self.out.import_module(from.as_deref(), &spec, at);
                    }
                    return;
                }
                _ => match self.dotted(function) {
                    Some(path) => {
                        if path == "require" {
                            if let Some(spec) = arguments.and_then(|a| self.first_string(a)) {
                                self.out.import_module(from.as_deref(), &spec, at);
                            }
                            return;
                        }
                        self.route(&path, arguments, at);
                        self.out.reference(from.as_deref(), &path, EdgeKind::Call, at);
                    }
                    None if function.kind() == "member_expression" => {
                        if let Some(method) = field_text(function, "property", self.source) {
                            self.out.reference(from.as_deref(), method, EdgeKind::Call, at);
                        }
                        if let Some(object) = function.child_by_field_name("object") {
                            self.visit(object);
                        }
                    }
                    None => self.visit(function),
                },
            }
        }
        if let Some(arguments) = arguments {
            self.visit(arguments);
        }
    }

    /// `app.get('/users', handler)` defines a route symbol named `GET /users`.
    fn route(&mut self, callee: &str, arguments: Option<Node>, at: u32) {
        let Some((object, method)) = callee.rsplit_once('.') else {
            return;
        };
        let object = object.rsplit('.').next().unwrap_or(object);
        let is_router = ROUTE_OBJECTS.contains(&object) || object.ends_with("Router") || object.ends_with("router");
        if !is_router || !ROUTE_METHODS.contains(&method) {
            return;
        }
        let Some(path) = arguments.and_then(|a| self.first_string(a)) else {
            return;
        };
        if !path.starts_with('/') {
            return;
        }
        let name = format!("{} {}", method.to_uppercase(), path);
        self.out.define(&name, &name, SymbolKind::Route, at);
    }

    fn first_string(&self, arguments: Node) -> Option<String> {
        let first = named_children(arguments).into_iter().next()?;
        (first.kind() == "string").then(|| unquote(text(first, self.source)).to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use ripple_core::{EdgeKind, RefTarget, SymbolKind};

    use crate::extractor::SymbolExtractor;

    #[test]
    fn test_extract_javascript() {
        let code = r#"
import React from 'react';
import { useState as useLocalState } from 'react';
import * as api from './api';
const fs = require('fs');

class User extends Model {
    constructor(name) {
        super();
        this.name = name;
    }

    getName() {
        return api.fetchName(this.name);
    }
}

function createUser(name) {
    return new User(name);
}

const arrowFunc = (x, y) => x + y;

app.get('/users', (req, res) => res.json(createUser('a')));

export default createUser;
"#;

        let extraction = SymbolExtractor::default().extract(Path::new("src/user.js"), code.as_bytes());
        assert!(extraction.failure.is_none());

        let symbols: Vec<(&str, SymbolKind)> = extraction
            .symbols
            .iter()
            .map(|s| (s.qualified_name.as_str(), s.kind))
            .collect();
        assert_eq!(
            symbols,
            vec![
                ("User", SymbolKind::Class),
                ("User.constructor", SymbolKind::Function),
                ("User.getName", SymbolKind::Function),
                ("createUser", SymbolKind::Function),
                ("arrowFunc", SymbolKind::Function),
                ("GET /users", SymbolKind::Route),
            ]
        );

        let refs = &extraction.references;
        let modules: Vec<&str> = refs
            .iter()
            .filter_map(|r| match &r.target {
                RefTarget::Module { spec } if r.kind == EdgeKind::Import => Some(spec.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(modules, vec!["react", "react", "./api", "fs"]);

        assert!(refs.iter().any(|r| r.kind == EdgeKind::Inherit && r.from.as_deref() == Some("User")));
        assert!(refs.iter().any(|r| r.from.as_deref() == Some("User.getName")
            && r.target == RefTarget::Name { name: "fetchName".into(), module: Some("./api".into()) }));
        assert!(refs.iter().any(|r| r.from.as_deref() == Some("createUser")
            && r.kind == EdgeKind::Call
            && r.target == RefTarget::Name { name: "User".into(), module: None }));
    }

    #[test]
    fn test_extract_typescript_declarations() {
        let code = r#"
import { Repo } from './repo';

export interface Store extends Base {
    get(id: string): Item;
}

export type Id = string;

export enum Color { Red, Green }

export class SqlStore implements Store {
    constructor(private repo: Repo) {}

    get(id: string): Item {
        return this.repo.find(id);
    }
}
"#;
        let extraction = SymbolExtractor::default().extract(Path::new("src/store.ts"), code.as_bytes());
        assert!(extraction.failure.is_none(), "{:?}", extraction.failure);

        let names: Vec<&str> = extraction.symbols.iter().map(|s| s.qualified_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Store", "Id", "Color", "SqlStore", "SqlStore.constructor", "SqlStore.get"]
        );
        assert!(extraction
            .references
            .iter()
            .any(|r| r.kind == EdgeKind::Inherit && r.from.as_deref() == Some("SqlStore")));
    }
}
