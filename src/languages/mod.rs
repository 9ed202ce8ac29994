// Built-in language modules and the tree-sitter helpers they share

pub mod javascript;
pub mod php;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tree_sitter::{Language, Node, Parser as TreeParser, Tree};

use crate::index::db::SymbolStore;
use crate::index::Location;
use crate::indexer::LanguageModule;

/// Names accepted by [`create_module`]
pub const SUPPORTED: &[&str] = &["php", "javascript"];

/// Instantiate a built-in language module by name
pub fn create_module(name: &str, store: Arc<SymbolStore>, root: PathBuf) -> Option<Box<dyn LanguageModule>> {
    match name {
        "php" => Some(Box::new(php::PhpModule::new(store, root))),
        "javascript" => Some(Box::new(javascript::JavaScriptModule::new(store, root))),
        _ => None,
    }
}

pub(crate) fn parse_tree(language: &Language, content: &str, label: &str) -> Result<Tree> {
    let mut parser = TreeParser::new();
    parser.set_language(language)?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| anyhow::anyhow!("Failed to parse {} code", label))?;

    Ok(tree)
}

pub(crate) fn node_text<'a>(node: Node<'_>, content: &'a str) -> &'a str {
    content.get(node.byte_range()).unwrap_or_default()
}

pub(crate) fn field_text<'a>(node: Node<'_>, field: &str, content: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| node_text(n, content))
}

/// 1-based location of a node
pub(crate) fn node_location(node: Node<'_>, file_path: &str) -> Location {
    let start = node.start_position();
    let end = node.end_position();

    Location::new(file_path, start.row as u32 + 1, start.column as u32 + 1)
        .with_end(end.row as u32 + 1, end.column as u32 + 1)
}

pub(crate) fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let children = node.named_children(&mut cursor).collect();
    children
}

/// First named child of one of `kinds`
pub(crate) fn child_of_kind<'t>(node: Node<'t>, kinds: &[&str]) -> Option<Node<'t>> {
    named_children(node).into_iter().find(|c| kinds.contains(&c.kind()))
}

pub(crate) fn has_child_kind(node: Node<'_>, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == kind);
    found
}

/// Shorten snippets stored as reference context
pub(crate) fn snippet(text: &str) -> String {
    const MAX: usize = 120;
    let line = text.lines().next().unwrap_or_default().trim();
    if line.len() <= MAX {
        return line.to_string();
    }
    let mut end = MAX;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &line[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_modules_construct() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SymbolStore::open(dir.path().join("g.db")).unwrap());

        for name in SUPPORTED {
            let module = create_module(name, store.clone(), dir.path().to_path_buf()).unwrap();
            assert_eq!(module.name(), *name);
        }
        assert!(create_module("cobol", store, dir.path().to_path_buf()).is_none());
    }

    #[test]
    fn test_snippet_truncates_first_line() {
        assert_eq!(snippet("  F::render();\n more"), "F::render();");
        let long = "x".repeat(200);
        assert_eq!(snippet(&long).len(), 123);
    }
}
