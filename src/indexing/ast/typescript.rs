//! TypeScript / JavaScript symbol extraction
//!
//! Walks the tree-sitter syntax tree for exported declarations, class
//! heritage (`extends` / `implements`), method membership, and call
//! references. The same walker serves both grammars; the JavaScript tree
//! simply never produces interface or type-alias nodes.

use super::{FileExtraction, RawRelation, RawSymbol, SymbolExtractor};
use crate::domain::ast::{AstNodeKind, AstRelation};
use crate::domain::error::{Error, Result};
use tree_sitter::Node;

/// Extractor for TypeScript and JavaScript sources.
pub struct TypeScriptExtractor {
    language: tree_sitter::Language,
}

impl TypeScriptExtractor {
    /// TypeScript grammar (also used for `.tsx` via the shared node kinds).
    pub fn typescript() -> Self {
        Self { language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into() }
    }

    /// JavaScript grammar.
    pub fn javascript() -> Self {
        Self { language: tree_sitter_javascript::LANGUAGE.into() }
    }
}

impl SymbolExtractor for TypeScriptExtractor {
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
            match child.kind() {
                "export_statement" => {
                    if let Some(decl) = child.child_by_field_name("declaration") {
                        collect_declaration(decl, bytes, true, doc_comment(child, bytes), &mut out);
                    }
                }
                _ => collect_declaration(child, bytes, false, doc_comment(child, bytes), &mut out),
            }
        }
        Ok(out)
    }
}

fn collect_declaration(
    node: Node<'_>,
    bytes: &[u8],
    exported: bool,
    doc: Option<String>,
    out: &mut FileExtraction,
) {
    let kind = match node.kind() {
        "class_declaration" | "abstract_class_declaration" => AstNodeKind::Class,
        "interface_declaration" => AstNodeKind::Interface,
        "enum_declaration" => AstNodeKind::Enum,
        "function_declaration" | "generator_function_declaration" => AstNodeKind::Function,
        "type_alias_declaration" => AstNodeKind::Type,
        "lexical_declaration" | "variable_declaration" => {
            collect_arrow_functions(node, bytes, exported, doc, out);
            return;
        }
        _ => return,
    };

    let Some(name) = named_child_text(node, "name", bytes) else {
        return;
    };

    push_symbol(out, &name, kind, node, bytes, exported, doc);

    match kind {
        AstNodeKind::Class => {
            collect_heritage(node, bytes, &name, out);
            collect_class_members(node, bytes, &name, out);
        }
        AstNodeKind::Interface => collect_heritage(node, bytes, &name, out),
        AstNodeKind::Function => collect_calls(node, bytes, &name, out),
        _ => {}
    }
}

/// `const foo = () => {}` and `const foo = function () {}` bindings.
fn collect_arrow_functions(
    node: Node<'_>,
    bytes: &[u8],
    exported: bool,
    doc: Option<String>,
    out: &mut FileExtraction,
) {
    let mut cursor = node.walk();
    for declarator in node.children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let is_function = declarator
            .child_by_field_name("value")
            .map(|v| matches!(v.kind(), "arrow_function" | "function_expression" | "function"))
            .unwrap_or(false);
        if !is_function {
            continue;
        }
        if let Some(name) = named_child_text(declarator, "name", bytes) {
            push_symbol(out, &name, AstNodeKind::Function, node, bytes, exported, doc.clone());
            collect_calls(declarator, bytes, &name, out);
        }
    }
}

/// `extends` / `implements` clauses on classes and interfaces.
fn collect_heritage(node: Node<'_>, bytes: &[u8], owner: &str, out: &mut FileExtraction) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let clauses: Vec<Node<'_>> = if child.kind() == "class_heritage" {
            let mut inner = child.walk();
            child.children(&mut inner).collect()
        } else {
            vec![child]
        };
        for clause in clauses {
            let relation = match clause.kind() {
                k if k.contains("extends") => AstRelation::Extends,
                k if k.contains("implements") => AstRelation::Implements,
                _ => continue,
            };
            for target in collect_identifiers(clause, bytes) {
                out.relations.push(RawRelation {
                    src: owner.to_string(),
                    tgt: target,
                    relation,
                });
            }
        }
    }
}

/// Methods inside a class body, with `contains` edges back to the class.
fn collect_class_members(class: Node<'_>, bytes: &[u8], owner: &str, out: &mut FileExtraction) {
    let Some(body) = class.child_by_field_name("body") else {
        return;
    };
    let mut cursor = body.walk();
    for member in body.children(&mut cursor) {
        if member.kind() != "method_definition" {
            continue;
        }
        let Some(name) = named_child_text(member, "name", bytes) else {
            continue;
        };
        if name == "constructor" {
            // Constructor parameters are the injection surface.
            collect_injections(member, bytes, owner, out);
            continue;
        }
        push_symbol(out, &name, AstNodeKind::Method, member, bytes, false, doc_comment(member, bytes));
        out.relations.push(RawRelation {
            src: owner.to_string(),
            tgt: name.clone(),
            relation: AstRelation::Contains,
        });
        collect_calls(member, bytes, &name, out);
    }
}

/// Typed constructor parameters become `injects` edges (the DI idiom in
/// TypeScript services).
fn collect_injections(constructor: Node<'_>, bytes: &[u8], owner: &str, out: &mut FileExtraction) {
    let Some(params) = constructor.child_by_field_name("parameters") else {
        return;
    };
    let mut stack = vec![params];
    while let Some(node) = stack.pop() {
        if node.kind() == "type_annotation" {
            for target in collect_identifiers(node, bytes) {
                out.relations.push(RawRelation {
                    src: owner.to_string(),
                    tgt: target,
                    relation: AstRelation::Injects,
                });
            }
            continue;
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            stack.push(child);
        }
    }
}

/// Call references out of a symbol's subtree.
fn collect_calls(node: Node<'_>, bytes: &[u8], caller: &str, out: &mut FileExtraction) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.kind() == "call_expression" {
            if let Some(callee) = current.child_by_field_name("function") {
                if callee.kind() == "identifier" {
                    let name = node_text(callee, bytes);
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

fn push_symbol(
    out: &mut FileExtraction,
    name: &str,
    kind: AstNodeKind,
    node: Node<'_>,
    bytes: &[u8],
    exported: bool,
    doc: Option<String>,
) {
    out.symbols.push(RawSymbol {
        name: name.to_string(),
        kind,
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        is_exported: exported,
        doc,
        content: node_text(node, bytes),
    });
}

fn node_text(node: Node<'_>, bytes: &[u8]) -> String {
    node.utf8_text(bytes).unwrap_or_default().to_string()
}

fn named_child_text(node: Node<'_>, field: &str, bytes: &[u8]) -> Option<String> {
    node.child_by_field_name(field).map(|n| node_text(n, bytes)).filter(|s| !s.is_empty())
}

/// All identifier-ish leaves under a node.
fn collect_identifiers(node: Node<'_>, bytes: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if matches!(current.kind(), "identifier" | "type_identifier") {
            let text = node_text(current, bytes);
            if !text.is_empty() && !out.contains(&text) {
                out.push(text);
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

/// Leading `/** … */` or `//` comment attached to a declaration.
fn doc_comment(node: Node<'_>, bytes: &[u8]) -> Option<String> {
    let prev = node.prev_named_sibling()?;
    if prev.kind() != "comment" || prev.end_position().row + 1 < node.start_position().row {
        return None;
    }
    let text = node_text(prev, bytes);
    let cleaned = text
        .trim_start_matches("/**")
        .trim_start_matches("/*")
        .trim_end_matches("*/")
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim_start_matches("//").trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!cleaned.is_empty()).then_some(cleaned)
}
