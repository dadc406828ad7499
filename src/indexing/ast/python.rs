//! Python symbol extraction
//!
//! Module-level functions and classes, methods with `contains` edges,
//! superclass `extends` edges, docstrings as descriptions. Python has no
//! export keyword; the underscore convention decides exportedness.

use super::{FileExtraction, RawRelation, RawSymbol, SymbolExtractor};
use crate::domain::ast::{AstNodeKind, AstRelation};
use crate::domain::error::{Error, Result};
use tree_sitter::Node;

/// Extractor for Python sources.
pub struct PythonExtractor {
    language: tree_sitter::Language,
}

impl PythonExtractor {
    /// Create the extractor.
    pub fn new() -> Self {
        Self { language: tree_sitter_python::LANGUAGE.into() }
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolExtractor for PythonExtractor {
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
            collect_top_level(unwrap_decorated(child), bytes, &mut out);
        }
        Ok(out)
    }
}

/// `decorated_definition` wraps the real definition.
fn unwrap_decorated(node: Node<'_>) -> Node<'_> {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition").unwrap_or(node)
    } else {
        node
    }
}

fn collect_top_level(node: Node<'_>, bytes: &[u8], out: &mut FileExtraction) {
    match node.kind() {
        "function_definition" => {
            if let Some(name) = name_of(node, bytes) {
                push_symbol(out, &name, AstNodeKind::Function, node, bytes);
                collect_calls(node, bytes, &name, out);
            }
        }
        "class_definition" => {
            let Some(class_name) = name_of(node, bytes) else {
                return;
            };
            push_symbol(out, &class_name, AstNodeKind::Class, node, bytes);

            if let Some(superclasses) = node.child_by_field_name("superclasses") {
                for target in collect_identifiers(superclasses, bytes) {
                    out.relations.push(RawRelation {
                        src: class_name.clone(),
                        tgt: target,
                        relation: AstRelation::Extends,
                    });
                }
            }

            if let Some(body) = node.child_by_field_name("body") {
                let mut cursor = body.walk();
                for member in body.children(&mut cursor) {
                    let member = unwrap_decorated(member);
                    if member.kind() != "function_definition" {
                        continue;
                    }
                    let Some(method_name) = name_of(member, bytes) else {
                        continue;
                    };
                    if method_name == "__init__" {
                        continue;
                    }
                    push_symbol(out, &method_name, AstNodeKind::Method, member, bytes);
                    out.relations.push(RawRelation {
                        src: class_name.clone(),
                        tgt: method_name.clone(),
                        relation: AstRelation::Contains,
                    });
                    collect_calls(member, bytes, &method_name, out);
                }
            }
        }
        _ => {}
    }
}

fn name_of(node: Node<'_>, bytes: &[u8]) -> Option<String> {
    node.child_by_field_name("name")
        .and_then(|n| n.utf8_text(bytes).ok())
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

fn push_symbol(out: &mut FileExtraction, name: &str, kind: AstNodeKind, node: Node<'_>, bytes: &[u8]) {
    out.symbols.push(RawSymbol {
        name: name.to_string(),
        kind,
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        is_exported: !name.starts_with('_'),
        doc: docstring(node, bytes),
        content: node.utf8_text(bytes).unwrap_or_default().to_string(),
    });
}

/// First string expression of a definition body.
fn docstring(node: Node<'_>, bytes: &[u8]) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    if string.kind() != "string" {
        return None;
    }
    let raw = string.utf8_text(bytes).ok()?;
    let cleaned = raw
        .trim_start_matches("r\"\"\"")
        .trim_start_matches("\"\"\"")
        .trim_start_matches("'''")
        .trim_end_matches("\"\"\"")
        .trim_end_matches("'''")
        .trim()
        .to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn collect_identifiers(node: Node<'_>, bytes: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.kind() == "identifier" {
            if let Ok(text) = current.utf8_text(bytes) {
                if !text.is_empty() && !out.contains(&text.to_string()) {
                    out.push(text.to_string());
                }
            }
        }
        let mut cursor = current.walk();
        for child in current.children(&mut cursor) {
            stack.push(child);
        }
    }
    out.reverse();
    out
}

fn collect_calls(node: Node<'_>, bytes: &[u8], caller: &str, out: &mut FileExtraction) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.kind() == "call" {
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
