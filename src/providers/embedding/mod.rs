//! Embedding provider implementations
//!
//! Converts text into dense vector embeddings for similarity search.
//!
//! ## Available Providers
//!
//! | Provider | Deployment | Use Case |
//! |----------|------------|----------|
//! | [`HashEmbeddingProvider`] | Local | Deterministic, offline, the default |
//! | [`HttpEmbeddingProvider`] | Remote | OpenAI-compatible `/embeddings` endpoints |
//!
//! The hash provider produces the same vector for the same text on every
//! run, which is what keeps indexing deterministic in tests and air-gapped
//! deployments. The HTTP provider talks to any OpenAI-compatible endpoint
//! and silently degrades to sequential single-text calls when the batch
//! endpoint refuses.

pub mod hash;
pub mod http;

pub use hash::HashEmbeddingProvider;
pub use http::HttpEmbeddingProvider;

use crate::config::EmbeddingConfig;
use crate::domain::error::{Error, Result};
use crate::domain::ports::EmbeddingProvider;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Build the configured embedding provider.
///
/// `embed_permits` is the shared embedding-concurrency semaphore; the hash
/// provider ignores it (no I/O), the HTTP provider acquires one permit per
/// request.
pub fn create_embedding_provider(
    config: &EmbeddingConfig,
    embed_permits: Arc<Semaphore>,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbeddingProvider::new(config.dimensions))),
        "http" => {
            let base = config
                .api_base
                .clone()
                .ok_or_else(|| Error::config("embedding.api_base is required for http"))?;
            Ok(Arc::new(HttpEmbeddingProvider::new(
                base,
                config.api_key.clone(),
                config.model.clone(),
                config.dimensions,
                embed_permits,
            )?))
        }
        other => Err(Error::config(format!(
            "unknown embedding provider '{other}' (expected 'hash' or 'http')"
        ))),
    }
}
