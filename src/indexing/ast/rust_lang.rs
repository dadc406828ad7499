//! Rust symbol extraction
//!
//! Structs map to class nodes, traits to interfaces, impl-block functions
//! to methods with `contains` edges; `impl Trait for Type` yields an
//! `implements` edge. Doc comments are the consecutive `///` run above a
//! declaration.

use super::{FileExtraction, RawRelation, RawSymbol, SymbolExtractor};
use crate::domain::ast::{AstNodeKind, AstRelation};
use crate::domain::error::{Error, Result};
use tree_sitter::Node;

/// Extractor for Rust sources.
pub struct RustExtractor {
    language: tree_sitter::Language,
}

impl RustExtractor {
    /// Create the extractor.
    pub fn new() -> Self {
        Self { language: tree_sitter_rust::LANGUAGE.into() }
    }
}

impl Default for RustExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolExtractor for RustExtractor {
    fn extract(&self, source: &str) -> Result<FileExtraction> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| Error::internal(format!("grammar version mismatch: {e}")))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| Error::internal("tree-sitter returned no tree"))?;

        let mut out = FileExtraction::default();
        let bytes = source.as_bytes();
        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            collect_item(child, bytes, &mut out);
        }
        Ok(out)
    }
}

fn collect_item(node: Node<'_>, bytes: &[u8], out: &mut FileExtraction) {
    match node.kind() {
        "function_item" => {
            if let Some(name) = name_of(node, bytes) {
                push_symbol(out, &name, AstNodeKind::Function, node, bytes);
                collect_calls(node, bytes, &name, out);
            }
        }
        "struct_item" => {
            if let Some(name) = name_of(node, bytes) {
                push_symbol(out, &name, AstNodeKind::Class, node, bytes);
            }
        }
        "trait_item" => {
            if let Some(name) = name_of(node, bytes) {
                push_symbol(out, &name, AstNodeKind::Interface, node, bytes);
            }
        }
        "enum_item" => {
            if let Some(name) = name_of(node, bytes) {
                push_symbol(out, &name, AstNodeKind::Enum, node, bytes);
            }
        }
        "type_item" => {
            if let Some(name) = name_of(node, bytes) {
                push_symbol(out, &name, AstNodeKind::Type, node, bytes);
            }
        }
        "impl_item" => collect_impl(node, bytes, out),
        _ => {}
    }
}

fn collect_impl(node: Node<'_>, bytes: &[u8], out: &mut FileExtraction) {
    let type_name = node
        .child_by_field_name("type")
        .map(|n| type_head(n, bytes))
        .unwrap_or_default();
    if type_name.is_empty() {
        return;
    }

    if let Some(trait_node) = node.child_by_field_name("trait") {
        let trait_name = type_head(trait_node, bytes);
        if !trait_name.is_empty() {
            out.relations.push(RawRelation {
                src: type_name.clone(),
                tgt: trait_name,
                relation: AstRelation::Implements,
            });
        }
    }

    let Some(body) = node.child_by_field_name("body") else {
        return;
    };
    let mut cursor = body.walk();
    for member in body.children(&mut cursor) {
        if member.kind() != "function_item" {
            continue;
        }
        let Some(method_name) = name_of(member, bytes) else {
            continue;
        };
        push_symbol(out, &method_name, AstNodeKind::Method, member, bytes);
        out.relations.push(RawRelation {
            src: type_name.clone(),
            tgt: method_name.clone(),
            relation: AstRelation::Contains,
        });
        collect_calls(member, bytes, &method_name, out);
    }
}

/// `Foo<T>` → `Foo`; `path::Foo` → `Foo`.
fn type_head(node: Node<'_>, bytes: &[u8]) -> String {
    match node.kind() {
        "type_identifier" => node.utf8_text(bytes).unwrap_or_default().to_string(),
        "generic_type" => node
            .child_by_field_name("type")
            .map(|n| type_head(n, bytes))
            .unwrap_or_default(),
        "scoped_type_identifier" => node
            .child_by_field_name("name")
            .map(|n| n.utf8_text(bytes).unwrap_or_default().to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn name_of(node: Node<'_>, bytes: &[u8]) -> Option<String> {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(bytes).ok())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

fn is_public(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor).any(|c| c.kind() == "visibility_modifier");
    result
}

fn push_symbol(out: &mut FileExtraction, name: &str, kind: AstNodeKind, node: Node<'_>, bytes: &[u8]) {
    out.symbols.push(RawSymbol {
        name: name.to_string(),
        kind,
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        is_exported: is_public(node),
        doc: doc_comment(node, bytes),
        content: node.utf8_text(bytes).unwrap_or_default().to_string(),
    });
}

/// Consecutive `///` lines directly above the item.
fn doc_comment(node: Node<'_>, bytes: &[u8]) -> Option<String> {
    let mut lines = Vec::new();
    let mut current = node.prev_sibling();
    let mut expected_row = node.start_position().row;
    while let Some(prev) = current {
        if prev.kind() != "line_comment" || prev.end_position().row + 1 != expected_row {
            break;
        }
        let text = prev.utf8_text(bytes).unwrap_or_default();
        let Some(stripped) = text.strip_prefix("///") else {
            break;
        };
        lines.push(stripped.trim().to_string());
        expected_row = prev.start_position().row;
        current = prev.prev_sibling();
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    let joined = lines.join(" ").trim().to_string();
    (!joined.is_empty()).then_some(joined)
}

fn collect_calls(node: Node<'_>, bytes: &[u8], caller: &str, out: &mut FileExtraction) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.kind() == "call_expression" {
            if let Some(callee) = current.child_by_field_name("function") {
                if callee.kind() == "identifier" {
                    let name = callee.utf8_text(bytes).unwrap_or_default().to_string();
                    if name != caller && !name.is_empty() {
                        let relation = RawRelation {
                            src: caller.to_string(),
                            tgt: name,
                            relation: AstRelation::Calls,
                        };
                        if !out.relations.contains(&relation) {
                            out.relations.push(relation);
                        }
                    }
                }
            }
        }
        let mut cursor = current.walk();
        for child in current.children(&mut cursor) {
            stack.push(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"/// Parses a manifest file into its typed form.
pub fn parse_manifest(raw: &str) -> Manifest {
    validate(raw);
    Manifest::default()
}

fn validate(_raw: &str) {}

pub struct Manifest {
    version: u32,
}

pub trait Store {
    fn put(&self);
}

impl Store for Manifest {
    fn put(&self) {
        parse_manifest("again");
    }
}
"#;

    fn extraction() -> FileExtraction {
        RustExtractor::new().extract(SOURCE).unwrap()
    }

    #[test]
    fn items_map_to_graph_kinds() {
        let out = extraction();
        let find = |name: &str| out.symbols.iter().find(|s| s.name == name).unwrap();
        assert_eq!(find("parse_manifest").kind, AstNodeKind::Function);
        assert_eq!(find("Manifest").kind, AstNodeKind::Class);
        assert_eq!(find("Store").kind, AstNodeKind::Interface);
        assert_eq!(find("put").kind, AstNodeKind::Method);
    }

    #[test]
    fn visibility_tracks_pub() {
        let out = extraction();
        assert!(out.symbols.iter().find(|s| s.name == "parse_manifest").unwrap().is_exported);
        assert!(!out.symbols.iter().find(|s| s.name == "validate").unwrap().is_exported);
    }

    #[test]
    fn doc_comments_are_captured() {
        let out = extraction();
        let parse = out.symbols.iter().find(|s| s.name == "parse_manifest").unwrap();
        assert!(parse.doc.as_deref().unwrap().starts_with("Parses a manifest"));
    }

    #[test]
    fn impl_blocks_emit_implements_and_contains() {
        let out = extraction();
        assert!(out.relations.iter().any(|r| r.src == "Manifest"
            && r.tgt == "Store"
            && r.relation == AstRelation::Implements));
        assert!(out.relations.iter().any(|r| r.src == "Manifest"
            && r.tgt == "put"
            && r.relation == AstRelation::Contains));
    }

    #[test]
    fn call_references_are_emitted() {
        let out = extraction();
        assert!(out.relations.iter().any(|r| r.src == "parse_manifest"
            && r.tgt == "validate"
            && r.relation == AstRelation::Calls));
        assert!(out.relations.iter().any(|r| r.src == "put"
            && r.tgt == "parse_manifest"
            && r.relation == AstRelation::Calls));
    }
}
