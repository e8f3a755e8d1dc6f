//! Python language extractor using tree-sitter

use ripple_core::{EdgeKind, SymbolKind};
use tree_sitter::Node;

use super::{Scope, field_text, line, named_children, text};
use crate::extractor::{ExtractionBuilder, LanguageExtractor};

/// Decorator methods that turn a function into an HTTP route (`@app.get(...)`).
const ROUTE_DECORATORS: &[&str] = &["route", "get", "post", "put", "delete", "patch"];

pub struct PythonExtractor;

impl LanguageExtractor for PythonExtractor {
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
            "import_from_statement" => self.import_from(node),
            "future_import_statement" => {}
            "decorated_definition" => self.decorated(node),
            "function_definition" => self.function(node, false),
            "class_definition" => self.class(node),
            "call" => self.call(node),
            "attribute" => match self.dotted(node) {
                Some(path) => self.mention(&path, node),
                None => self.visit_children(node),
            },
            "identifier" => {
                let name = text(node, self.source).to_string();
                self.mention(&name, node);
            }
            "keyword_argument" => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(value);
                }
            }
            "expression_statement" if self.scope.is_top_level() => {
                for child in named_children(node) {
                    if child.kind() == "assignment" {
                        self.module_variable(child);
                    }
                }
                self.visit_children(node);
            }
            _ => self.visit_children(node),
        }
    }

    fn visit_children(&mut self, node: Node) {
        for child in named_children(node) {
            self.visit(child);
        }
    }

    fn mention(&mut self, path: &str, node: Node) {
        let from = self.scope.current().map(str::to_string);
        self.out.reference(from.as_deref(), path, EdgeKind::Mention, line(node));
    }

    /// `a`, `a.b.c`; `None` when the chain contains calls or subscripts.
    fn dotted(&self, node: Node) -> Option<String> {
        match node.kind() {
            "identifier" => Some(text(node, self.source).to_string()),
            "attribute" => {
                let object = self.dotted(node.child_by_field_name("object")?)?;
                let attribute = field_text(node, "attribute", self.source)?;
                Some(format!("{object}.{attribute}"))
            }
            _ => None,
        }
    }

    fn import(&mut self, node: Node) {
        let from = self.scope.current().map(str::to_string);
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let (module, alias) = match name.kind() {
                "aliased_import" => (
                    field_text(name, "name", self.source).unwrap_or(""),
                    field_text(name, "alias", self.source),
                ),
                _ => (text(name, self.source), None),
            };
            self.out.import_module(from.as_deref(), module, line(node));
            self.out.bind_module(alias.unwrap_or(module), module);
        }
    }

    fn import_from(&mut self, node: Node) {
        let from = self.scope.current().map(str::to_string);
        let Some(module) = field_text(node, "module_name", self.source) else {
            return;
        };
        let at = line(node);
        self.out.import_module(from.as_deref(), module, at);

        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let (imported, alias) = match name.kind() {
                "aliased_import" => (
                    field_text(name, "name", self.source).unwrap_or(""),
                    field_text(name, "alias", self.source),
                ),
                _ => (text(name, self.source), None),
            };
            // `from pkg import mod` may name a submodule; lowercase names are treated as possible modules.
            let submodule = imported
                .starts_with(|c: char| c.is_ascii_lowercase())
                .then(|| submodule_spec(module, imported));
            self.out.import_name(from.as_deref(), module, imported, alias, submodule, at);
        }
    }

    fn decorated(&mut self, node: Node) {
        let mut route = false;
        for child in named_children(node) {
            if child.kind() != "decorator" {
                continue;
            }
            for expr in named_children(child) {
                route |= self.is_route_decorator(expr);
                self.visit(expr);
            }
        }
        if let Some(definition) = node.child_by_field_name("definition") {
            match definition.kind() {
                "function_definition" => self.function(definition, route),
                _ => self.visit(definition),
            }
        }
    }

    fn is_route_decorator(&self, expr: Node) -> bool {
        if expr.kind() != "call" {
            return false;
        }
        expr.child_by_field_name("function")
            .filter(|f| f.kind() == "attribute")
            .and_then(|f| field_text(f, "attribute", self.source))
            .is_some_and(|method| ROUTE_DECORATORS.contains(&method))
    }

    fn function(&mut self, node: Node, route: bool) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };
        let qualified = self.scope.qualify(name);
        let kind = if route { SymbolKind::Route } else { SymbolKind::Function };
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
            return;
        };
        let qualified = self.scope.qualify(name);
        self.out.define(name, &qualified, SymbolKind::Class, line(node));

        if let Some(bases) = node.child_by_field_name("superclasses") {
            for base in named_children(bases) {
                match self.dotted(base) {
                    Some(path) => self.out.reference(Some(&qualified), &path, EdgeKind::Inherit, line(base)),
                    None => self.visit(base),
                }
            }
        }

        self.scope.push(qualified);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body);
        }
        self.scope.pop();
    }

    fn call(&mut self, node: Node) {
        let from = self.scope.current().map(str::to_string);
        if let Some(function) = node.child_by_field_name("function") {
            match self.dotted(function) {
                Some(path) => self.out.reference(from.as_deref(), &path, EdgeKind::Call, line(node)),
                None if function.kind() == "attribute" => {
                    if let Some(method) = field_text(function, "attribute", self.source) {
                        self.out.reference(from.as_deref(), method, EdgeKind::Call, line(node));
                    }
                    if let Some(object) = function.child_by_field_name("object") {
                        self.visit(object);
                    }
                }
                None => self.visit(function),
            }
        }
        if let Some(arguments) = node.child_by_field_name("arguments") {
            self.visit(arguments);
        }
    }

    fn module_variable(&mut self, assignment: Node) {
        let Some(left) = assignment.child_by_field_name("left") else {
            return;
        };
        let targets = match left.kind() {
            "identifier" => vec![left],
            "pattern_list" | "tuple_pattern" => named_children(left)
                .into_iter()
                .filter(|n| n.kind() == "identifier")
                .collect(),
            _ => Vec::new(),
        };
        for target in targets {
            let name = text(target, self.source);
            self.out.define(name, name, SymbolKind::Variable, line(target));
        }
    }
}

/// Spec of `name` imported from `module`: `pkg` + `db` -> `pkg.db`, `.` + `db` -> `.db`.
fn submodule_spec(module: &str, name: &str) -> String {
    if module.ends_with('.') {
        format!("{module}{name}")
    } else {
        format!("{module}.{name}")
    }
}
