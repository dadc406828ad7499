//! In-memory knowledge-graph store
//!
//! Wraps the serializable [`AstGraph`] in a traversable arena: nodes live
//! in a vector, names map to indices, and edges are index pairs. No
//! back-references anywhere, so `contains`/`calls` cycles are harmless.
//!
//! A loaded store is immutable; the indexer builds a fresh store and the
//! query layer swaps the shared `Arc`, which is what gives concurrent
//! queries their snapshot semantics.

use crate::domain::ast::{AstEdge, AstGraph, AstNode};
use crate::domain::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::warn;

/// Node/edge counts reported by [`KgStore::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of nodes in the graph
    pub node_count: usize,
    /// Number of edges in the graph
    pub edge_count: usize,
}

/// Immutable, traversable knowledge graph for one bundle.
#[derive(Debug, Default)]
pub struct KgStore {
    nodes: Vec<AstNode>,
    /// Exact name → arena index
    by_name: HashMap<String, usize>,
    /// Lowercased name → arena index (query-token matching)
    by_name_ci: HashMap<String, usize>,
    /// Undirected adjacency, index-sorted for deterministic traversal
    adjacency: Vec<Vec<usize>>,
    /// Canonical (pruned, deduplicated) edge list for dump round-trips
    edges: Vec<AstEdge>,
}

impl KgStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a graph, dropping dangling edges.
    pub fn load(graph: AstGraph) -> Self {
        let mut graph = graph;
        let dropped = graph.prune_dangling_edges();
        if dropped > 0 {
            warn!(dropped, "dropped dangling graph edges at load");
        }

        let mut nodes = Vec::with_capacity(graph.nodes.len());
        let mut by_name = HashMap::with_capacity(graph.nodes.len());
        let mut by_name_ci = HashMap::with_capacity(graph.nodes.len());
        for (name, node) in graph.nodes {
            let idx = nodes.len();
            by_name.insert(name.clone(), idx);
            by_name_ci.insert(name.to_lowercase(), idx);
            nodes.push(node);
        }

        let mut adjacency = vec![Vec::new(); nodes.len()];
        for edge in &graph.edges {
            // Both endpoints exist: prune_dangling_edges ran above.
            let src = by_name[&edge.src];
            let tgt = by_name[&edge.tgt];
            adjacency[src].push(tgt);
            adjacency[tgt].push(src);
        }
        for list in &mut adjacency {
            list.sort_unstable();
            list.dedup();
        }

        Self { nodes, by_name, by_name_ci, adjacency, edges: graph.edges }
    }

    /// Parse a dumped graph document.
    pub fn from_json(json: &str) -> Result<Self> {
        let graph: AstGraph = serde_json::from_str(json)?;
        Ok(Self::load(graph))
    }

    /// Serialize back to the canonical graph document.
    pub fn dump(&self) -> Result<String> {
        let mut graph = AstGraph::default();
        for node in &self.nodes {
            graph.add_node(node.clone());
        }
        graph.edges = self.edges.clone();
        Ok(serde_json::to_string(&graph)?)
    }

    /// Exact-name lookup.
    pub fn find_node(&self, name: &str) -> Option<&AstNode> {
        self.by_name.get(name).map(|&idx| &self.nodes[idx])
    }

    /// Case-insensitive lookup, used for query-token matching.
    pub fn find_node_ci(&self, name: &str) -> Option<&AstNode> {
        self.by_name_ci.get(&name.to_lowercase()).map(|&idx| &self.nodes[idx])
    }

    /// Breadth-first neighborhood of `name`, up to `max_hops` (inclusive).
    ///
    /// Deterministic for a fixed insertion order; never contains the query
    /// node itself; empty when the name is unknown or `max_hops` is 0.
    pub fn neighbors(&self, name: &str, max_hops: usize) -> Vec<&AstNode> {
        let Some(&start) = self.by_name.get(name) else {
            return vec![];
        };
        if max_hops == 0 {
            return vec![];
        }

        let mut visited = vec![false; self.nodes.len()];
        visited[start] = true;
        let mut queue = VecDeque::new();
        queue.push_back((start, 0usize));
        let mut out = Vec::new();

        while let Some((idx, depth)) = queue.pop_front() {
            if depth == max_hops {
                continue;
            }
            for &next in &self.adjacency[idx] {
                if !visited[next] {
                    visited[next] = true;
                    out.push(&self.nodes[next]);
                    queue.push_back((next, depth + 1));
                }
            }
        }
        out
    }

    /// Node and edge counts.
    pub fn stats(&self) -> GraphStats {
        GraphStats { node_count: self.nodes.len(), edge_count: self.edges.len() }
    }

    /// Whether the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate all nodes in insertion order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &AstNode> {
        self.nodes.iter()
    }
}
