//! Typed AST graph model
//!
//! Symbols and their relations within a bundle, as produced by the
//! per-language extractors and persisted alongside the vector namespace.
//! The serialized form is a map from node name to node plus an edge list;
//! the traversable arena representation lives in [`crate::graph::KgStore`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Symbol kinds admitted into the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AstNodeKind {
    /// Class declaration
    Class,
    /// Interface or trait declaration
    Interface,
    /// Enum declaration
    Enum,
    /// Free function
    Function,
    /// Method on a class/impl
    Method,
    /// Type alias
    Type,
    /// Anonymous or fallback block
    Block,
}

impl std::fmt::Display for AstNodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Enum => "enum",
            Self::Function => "function",
            Self::Method => "method",
            Self::Type => "type",
            Self::Block => "block",
        };
        write!(f, "{s}")
    }
}

/// Relation types between symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AstRelation {
    /// Class inheritance
    Extends,
    /// Interface implementation
    Implements,
    /// Constructor/dependency injection
    Injects,
    /// Structural membership (class contains method)
    Contains,
    /// Cross-symbol call reference
    Calls,
}

/// One symbol in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstNode {
    /// Symbol name
    pub name: String,
    /// Symbol kind
    pub kind: AstNodeKind,
    /// Relative posix path of the declaring file
    pub file_path: String,
    /// First line of the declaration (1-indexed)
    pub start_line: u32,
    /// Last line of the declaration (inclusive)
    pub end_line: u32,
    /// Leading doc comment, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Truncated source of the symbol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Importance score in [0,1]
    pub importance: f32,
    /// Whether the symbol is exported from its module
    pub is_exported: bool,
}

impl AstNode {
    /// Line span of the declaration.
    pub fn line_span(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// One directed relation between two named symbols.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AstEdge {
    /// Source symbol name
    pub src: String,
    /// Target symbol name
    pub tgt: String,
    /// Relation type
    pub relation: AstRelation,
    /// File the relation was observed in
    pub src_file: String,
}

/// Serializable AST graph: named nodes plus an edge list.
///
/// `nodes` is a `BTreeMap` so dumps are canonically ordered and two
/// identical indexing runs serialize byte-identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AstGraph {
    /// Node name → node
    pub nodes: BTreeMap<String, AstNode>,
    /// Directed edges; both endpoints must name entries in `nodes`
    pub edges: Vec<AstEdge>,
}

impl AstGraph {
    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Insert a node, replacing any previous node of the same name.
    pub fn add_node(&mut self, node: AstNode) {
        self.nodes.insert(node.name.clone(), node);
    }

    /// Append an edge. Endpoints are not checked here; [`Self::prune_dangling_edges`]
    /// drops edges whose endpoints never materialized.
    pub fn add_edge(&mut self, edge: AstEdge) {
        self.edges.push(edge);
    }

    /// Drop edges whose `src` or `tgt` is not a known node, returning how
    /// many were removed. Also deduplicates surviving edges and sorts them
    /// canonically so dumps are deterministic.
    pub fn prune_dangling_edges(&mut self) -> usize {
        let before = self.edges.len();
        self.edges.retain(|e| self.nodes.contains_key(&e.src) && self.nodes.contains_key(&e.tgt));
        self.edges.sort_by(|a, b| {
            (&a.src, &a.tgt, a.relation as u8).cmp(&(&b.src, &b.tgt, b.relation as u8))
        });
        self.edges.dedup();
        before - self.edges.len()
    }

    /// Merge another graph into this one (nodes by name, edges appended).
    pub fn merge(&mut self, other: AstGraph) {
        for (_, node) in other.nodes {
            self.add_node(node);
        }
        self.edges.extend(other.edges);
    }
}
