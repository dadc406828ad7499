//! Hybrid retrieval
//!
//! Merges dense similarity and BM25 keyword scoring into one ranked
//! candidate list, then boosts candidates that sit in the knowledge-graph
//! neighborhood of symbols named in the question.
//!
//! Score fusion follows `s = α·v + (1−α)·k` with per-mode min-max
//! normalization before the weighted sum; ties are broken by ascending
//! chunk id so the ordering is reproducible run to run.

use crate::config::{RetrieverConfig, RetrieverMode};
use crate::domain::error::{Error, Result};
use crate::domain::ports::{ChunkFilter, EmbeddingProvider, VectorStore};
use crate::domain::types::Chunk;
use crate::graph::KgStore;
use crate::retrieval::bm25::{min_max_normalize, tokenize, Bm25Params, Bm25Scorer};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// One ranked retrieval candidate with its score breakdown.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    /// The candidate chunk
    pub chunk: Chunk,
    /// Final fused score in [0,1]
    pub score: f32,
    /// Normalized dense-similarity component
    pub vector_score: f32,
    /// Normalized keyword component
    pub keyword_score: f32,
    /// Whether the graph-neighborhood boost applied
    pub graph_boosted: bool,
}

/// Result of one retrieval call.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    /// Candidates, strictly descending by score (ties by ascending id)
    pub candidates: Vec<RetrievedChunk>,
    /// Symbol names from the question that matched graph nodes
    pub expanded_types: Vec<String>,
}

/// Hybrid retriever over one vector namespace.
pub struct Retriever {
    config: RetrieverConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    /// Create a retriever from configuration and providers.
    pub fn new(
        config: RetrieverConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self { config, embedder, store }
    }

    /// Retrieve candidates for a question.
    ///
    /// `kg` is the bundle's graph snapshot when one has been loaded;
    /// without it (or with `max_hops` 0) graph boosting is skipped
    /// entirely rather than silently consulting an empty graph.
    pub async fn retrieve(
        &self,
        question: &str,
        filter: &ChunkFilter,
        mode: RetrieverMode,
        top_k: usize,
        kg: Option<&KgStore>,
    ) -> Result<RetrievalOutcome> {
        let namespace = filter.bundle_id.to_string();
        let pool = top_k.saturating_mul(2).max(top_k);

        // id → (chunk, raw vector score, raw keyword score)
        let mut candidates: HashMap<String, (Chunk, Option<f32>, Option<f32>)> = HashMap::new();
        let mut effective_mode = mode;

        if mode != RetrieverMode::Keyword {
            match self.embedder.embed(question).await {
                Ok(embedding) => {
                    let hits = self
                        .store
                        .query(&namespace, &embedding.vector, pool, filter)
                        .await?;
                    for hit in hits {
                        candidates.insert(hit.chunk.id.clone(), (hit.chunk, Some(hit.score), None));
                    }
                }
                Err(e) if self.config.keyword_fallback => {
                    warn!(error = %e, "embedder unavailable, degrading to keyword-only retrieval");
                    effective_mode = RetrieverMode::Keyword;
                }
                Err(e) => {
                    return Err(Error::embedding(format!("embedding unavailable: {e}")));
                }
            }
        }

        if effective_mode != RetrieverMode::Vector {
            let chunks = self.store.list(&namespace, filter).await?;
            let scorer = Bm25Scorer::index(&chunks, Bm25Params::default());
            let scores = scorer.score(question);
            let mut keyword_hits: Vec<(usize, f32)> = scores
                .iter()
                .copied()
                .enumerate()
                .filter(|(_, s)| *s > 0.0)
                .collect();
            keyword_hits.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| chunks[a.0].id.cmp(&chunks[b.0].id))
            });
            keyword_hits.truncate(pool);
            for (idx, score) in keyword_hits {
                let chunk = &chunks[idx];
                candidates
                    .entry(chunk.id.clone())
                    .and_modify(|entry| entry.2 = Some(score))
                    .or_insert_with(|| (chunk.clone(), None, Some(score)));
            }
        }

        let mut ranked = fuse_scores(candidates, effective_mode, self.config.alpha);

        let expanded_types = if let Some(kg) = kg.filter(|kg| !kg.is_empty()) {
            if self.config.max_hops >= 1 {
                self.apply_graph_boost(question, kg, &mut ranked)
            } else {
                vec![]
            }
        } else {
            vec![]
        };

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        ranked.truncate(top_k);

        debug!(
            candidates = ranked.len(),
            expanded = expanded_types.len(),
            ?effective_mode,
            "retrieval complete"
        );
        Ok(RetrievalOutcome { candidates: ranked, expanded_types })
    }

    /// Boost candidates overlapping the neighborhood of question symbols.
    fn apply_graph_boost(
        &self,
        question: &str,
        kg: &KgStore,
        ranked: &mut [RetrievedChunk],
    ) -> Vec<String> {
        let mut matched: Vec<String> = Vec::new();
        for token in tokenize(question) {
            if let Some(node) = kg.find_node_ci(&token) {
                if !matched.contains(&node.name) {
                    matched.push(node.name.clone());
                }
            }
        }
        if matched.is_empty() {
            return matched;
        }

        // (file, start, end) windows of every neighbor symbol.
        let mut windows: Vec<(&str, u32, u32)> = Vec::new();
        for name in &matched {
            for neighbor in kg.neighbors(name, self.config.max_hops) {
                windows.push((neighbor.file_path.as_str(), neighbor.start_line, neighbor.end_line));
            }
        }

        for candidate in ranked.iter_mut() {
            let meta = &candidate.chunk.metadata;
            let Some(range) = meta.line_range else {
                continue;
            };
            let overlaps = windows.iter().any(|(file, start, end)| {
                *file == meta.file_path
                    && range.start_line <= *end
                    && *start <= range.end_line
            });
            if overlaps {
                candidate.score = (candidate.score + self.config.graph_boost).min(1.0);
                candidate.graph_boosted = true;
            }
        }
        matched
    }
}

/// Per-mode min-max normalization followed by the weighted sum.
fn fuse_scores(
    candidates: HashMap<String, (Chunk, Option<f32>, Option<f32>)>,
    mode: RetrieverMode,
    alpha: f32,
) -> Vec<RetrievedChunk> {
    // Deterministic processing order before normalization.
    let mut rows: Vec<(Chunk, Option<f32>, Option<f32>)> = candidates.into_values().collect();
    rows.sort_by(|a, b| a.0.id.cmp(&b.0.id));

    let vector_raw: Vec<f32> = rows.iter().map(|r| r.1.unwrap_or(0.0)).collect();
    let keyword_raw: Vec<f32> = rows.iter().map(|r| r.2.unwrap_or(0.0)).collect();
    let vector_norm = min_max_normalize(&vector_raw);
    let keyword_norm = min_max_normalize(&keyword_raw);

    rows.into_iter()
        .enumerate()
        .map(|(i, (chunk, raw_v, _))| {
            let v = vector_norm.get(i).copied().unwrap_or(0.0);
            let k = keyword_norm.get(i).copied().unwrap_or(0.0);
            let score = match mode {
                // Pure vector mode keeps the store's calibrated [0,1] score.
                RetrieverMode::Vector => raw_v.unwrap_or(0.0),
                RetrieverMode::Keyword => k,
                RetrieverMode::Hybrid => alpha * v + (1.0 - alpha) * k,
            };
            RetrievedChunk { chunk, score, vector_score: v, keyword_score: k, graph_boosted: false }
        })
        .collect()
}
