//! BM25 keyword scoring
//!
//! Classic Okapi BM25 over a bundle's chunks, used as the sparse half of
//! hybrid retrieval. The index is rebuilt per query from the namespace
//! listing; bundles are small enough (bounded by the ingestion caps) that
//! this stays cheap and keeps the scorer stateless across queries.

use crate::domain::types::Chunk;
use std::collections::HashMap;

/// BM25 tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation
    pub k1: f32,
    /// Length normalization strength
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Lowercased word tokens, split on non-word boundaries.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

struct DocEntry {
    term_freq: HashMap<String, f32>,
    len: f32,
}

/// BM25 scorer over a fixed document set.
pub struct Bm25Scorer {
    params: Bm25Params,
    docs: Vec<DocEntry>,
    doc_freq: HashMap<String, usize>,
    avg_len: f32,
}

impl Bm25Scorer {
    /// Build the index over a chunk set. Document order is preserved;
    /// [`Self::score`] returns one score per input chunk.
    pub fn index(chunks: &[Chunk], params: Bm25Params) -> Self {
        let mut docs = Vec::with_capacity(chunks.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0f32;

        for chunk in chunks {
            let tokens = tokenize(&chunk.content);
            let len = tokens.len() as f32;
            total_len += len;
            let mut term_freq: HashMap<String, f32> = HashMap::new();
            for token in tokens {
                *term_freq.entry(token).or_insert(0.0) += 1.0;
            }
            for term in term_freq.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            docs.push(DocEntry { term_freq, len });
        }

        let avg_len = if docs.is_empty() { 0.0 } else { total_len / docs.len() as f32 };
        Self { params, docs, doc_freq, avg_len }
    }

    /// Raw BM25 scores of every indexed document against a query.
    pub fn score(&self, query: &str) -> Vec<f32> {
        let terms = tokenize(query);
        let n = self.docs.len() as f32;
        self.docs
            .iter()
            .map(|doc| {
                let mut score = 0f32;
                for term in &terms {
                    let Some(&tf) = doc.term_freq.get(term) else {
                        continue;
                    };
                    let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
                    let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                    let len_norm = if self.avg_len > 0.0 {
                        1.0 - self.params.b + self.params.b * doc.len / self.avg_len
                    } else {
                        1.0
                    };
                    score += idf * (tf * (self.params.k1 + 1.0))
                        / (tf + self.params.k1 * len_norm);
                }
                score
            })
            .collect()
    }
}

/// Min-max normalize scores into [0,1]; a constant slate maps to 1.0 so a
/// single-candidate mode does not zero itself out.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let Some(&max) = scores.iter().max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)) else {
        return vec![];
    };
    let min = scores
        .iter()
        .copied()
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or(0.0);
    let span = max - min;
    scores
        .iter()
        .map(|&s| if span > f32::EPSILON { (s - min) / span } else if max > 0.0 { 1.0 } else { 0.0 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ChunkMetadata, SourceType};
    use uuid::Uuid;

    fn chunk(id: &str, content: &str) -> Chunk {
        Chunk {
            id: id.into(),
            content: content.into(),
            metadata: ChunkMetadata {
                bundle_id: Uuid::nil(),
                repo_id: "a/b".into(),
                source_type: SourceType::Doc,
                file_path: "f.md".into(),
                line_range: None,
                symbol: None,
                heading_path: vec![],
                importance: 0.5,
            },
        }
    }

    #[test]
    fn matching_documents_outscore_unrelated_ones() {
        let chunks = vec![
            chunk("a", "the retriever merges vector and keyword scores"),
            chunk("b", "completely unrelated prose about gardening and soil"),
        ];
        let scorer = Bm25Scorer::index(&chunks, Bm25Params::default());
        let scores = scorer.score("keyword retriever");
        assert!(scores[0] > scores[1]);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn rarer_terms_weigh_more() {
        let chunks = vec![
            chunk("a", "common common common rare"),
            chunk("b", "common common common common"),
            chunk("c", "common text here body"),
        ];
        let scorer = Bm25Scorer::index(&chunks, Bm25Params::default());
        let scores = scorer.score("rare");
        assert!(scores[0] > 0.0);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn tokenizer_splits_on_non_word_boundaries() {
        assert_eq!(
            tokenize("fooBar, baz_qux(12)"),
            vec!["foobar", "baz_qux", "12"]
        );
    }

    #[test]
    fn normalization_maps_to_unit_interval() {
        let normalized = min_max_normalize(&[2.0, 4.0, 3.0]);
        assert_eq!(normalized, vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn constant_positive_slate_normalizes_to_one() {
        assert_eq!(min_max_normalize(&[3.0, 3.0]), vec![1.0, 1.0]);
        assert_eq!(min_max_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
