//! Language extractors for different programming languages

pub mod generic;
pub mod javascript;
pub mod lexical;
pub mod python;
pub mod rust;

use tree_sitter::Node;

/// 1-based line of a node's first byte.
pub(crate) fn line(node: Node) -> u32 {
    u32::try_from(node.start_position().row + 1).unwrap_or(u32::MAX)
}

pub(crate) fn text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

pub(crate) fn field_text<'a>(node: Node, field: &str, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| text(n, source))
}

/// String literal contents without quotes.
pub(crate) fn unquote(literal: &str) -> &str {
    literal.trim_matches(|c| matches!(c, '"' | '\'' | '`'))
}

pub(crate) fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Names of the definitions enclosing the walk position, innermost last.
#[derive(Default)]
pub(crate) struct Scope {
    stack: Vec<String>,
}

impl Scope {
    pub fn current(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    pub fn qualify(&self, name: &str) -> String {
        match self.current() {
            Some(outer) => format!("{outer}.{name}"),
            None => name.to_string(),
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn push(&mut self, qualified: String) {
        self.stack.push(qualified);
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }
}
