//! Domain ports
//!
//! Business contracts the core consumes, implemented by the adapters in
//! [`crate::providers`]. Everything behind these traits is replaceable:
//! embedding backends, vector stores, and the completion endpoint the
//! uncertainty calculator talks to.

use crate::domain::error::Result;
use crate::domain::types::{Chunk, ChunkMetadata, Embedding, ScoredChunk, SourceType};
use async_trait::async_trait;
use uuid::Uuid;

/// Turns text into dense vectors for similarity search.
///
/// The dimension must be stable for the lifetime of a bundle. Providers
/// whose batch endpoint is unavailable must fall back to sequential
/// single-text calls, preserving order, without the caller noticing.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed a batch of texts, preserving order. Output length equals input
    /// length and every vector has [`Self::dimensions`] entries.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Dimensionality of every vector this provider produces.
    fn dimensions(&self) -> usize;

    /// Short provider label for logs and reports.
    fn provider_name(&self) -> &str;
}

/// Metadata filter applied to vector-store reads.
///
/// Matches on the owning bundle, optionally narrowed to one repo and one
/// source type.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFilter {
    /// Bundle the namespace belongs to
    pub bundle_id: Uuid,
    /// Restrict to one repo when set
    pub repo_id: Option<String>,
    /// Restrict to one source type when set
    pub source_type: Option<SourceType>,
}

impl ChunkFilter {
    /// Filter that matches every chunk of a bundle.
    pub fn bundle(bundle_id: Uuid) -> Self {
        Self { bundle_id, repo_id: None, source_type: None }
    }

    /// Whether a chunk's metadata passes this filter.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if metadata.bundle_id != self.bundle_id {
            return false;
        }
        if let Some(repo) = &self.repo_id {
            if &metadata.repo_id != repo {
                return false;
            }
        }
        if let Some(source_type) = self.source_type {
            if metadata.source_type != source_type {
                return false;
            }
        }
        true
    }
}

/// Persistent per-bundle vector namespace.
///
/// `query` results come back sorted strictly descending by score with ties
/// broken by ascending chunk id; `upsert` replaces by chunk id and is
/// idempotent. The graph blob operations co-locate an opaque JSON document
/// with the namespace so bundle deletion cascades over both.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace chunks (keyed by `chunk.id`) with their embeddings.
    async fn upsert(&self, namespace: &str, chunks: Vec<(Chunk, Embedding)>) -> Result<()>;

    /// Similarity search over the namespace, filtered by metadata. Scores
    /// are normalized to [0,1] where 1 is best.
    async fn query(
        &self,
        namespace: &str,
        query_vector: &[f32],
        top_k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>>;

    /// Enumerate every chunk of the namespace passing the filter, in
    /// ascending chunk-id order. Keyword scoring and cascade checks build
    /// on this.
    async fn list(&self, namespace: &str, filter: &ChunkFilter) -> Result<Vec<Chunk>>;

    /// Remove the namespace and everything co-located with it.
    async fn delete_namespace(&self, namespace: &str) -> Result<()>;

    /// Persist an opaque graph document next to the namespace.
    async fn store_graph(&self, namespace: &str, graph_json: &str) -> Result<()>;

    /// Load the namespace's graph document, if one was stored.
    async fn load_graph(&self, namespace: &str) -> Result<Option<String>>;

    /// Short provider label for logs and reports.
    fn provider_name(&self) -> &str;
}

/// One completion request against the LLM endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Full prompt text
    pub prompt: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature (0 for the deterministic paths)
    pub temperature: f32,
    /// Request the top-K log-probabilities per generated token
    pub top_logprobs: Option<u8>,
}

impl CompletionRequest {
    /// A deterministic (temperature 0) request without logprobs.
    pub fn deterministic(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self { prompt: prompt.into(), max_tokens, temperature: 0.0, top_logprobs: None }
    }
}

/// Top-K log-probabilities observed at one generated token position.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenTopLogprobs {
    /// The token the model emitted
    pub token: String,
    /// Log-probabilities of the top-K candidates at this position
    pub logprobs: Vec<f64>,
}

/// Result of one completion call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Completion {
    /// Generated text
    pub text: String,
    /// Per-token top-K log-probabilities, when requested and supported
    pub logprobs: Option<Vec<TokenTopLogprobs>>,
}

/// The LLM completion endpoint.
///
/// Implementations map network/5xx failures to
/// [`crate::domain::error::Error::LlmTransient`] and absent `top_logprobs`
/// support to [`crate::domain::error::Error::LogprobsUnsupported`].
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run one completion.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Whether this provider can return `top_logprobs`. Pure: implemented
    /// as a predicate on the provider URL, never a network probe.
    fn supports_logprobs(&self) -> bool;

    /// Short provider label for logs and reports.
    fn provider_name(&self) -> &str;
}
