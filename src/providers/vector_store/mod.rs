//! Vector store implementations
//!
//! Persistent per-bundle namespaces behind the [`VectorStore`] port.
//!
//! | Backend | Persistence | Use Case |
//! |---------|-------------|----------|
//! | [`FilesystemVectorStore`] | JSON file per namespace | Single-node default |
//! | [`InMemoryVectorStore`] | None | Tests, ephemeral bundles |
//!
//! Both backends share the same ranking semantics: cosine similarity mapped
//! onto [0,1], sorted strictly descending with ties broken by ascending
//! chunk id.

pub mod filesystem;
pub mod memory;

pub use filesystem::FilesystemVectorStore;
pub use memory::InMemoryVectorStore;

use crate::domain::error::{Error, Result};
use crate::domain::types::ScoredChunk;

/// Retry a vector-store operation once on transient I/O failure.
///
/// Stores mostly fail for durable reasons (corrupt JSON, permissions); a
/// single retry covers transient NFS/filesystem hiccups without masking
/// real corruption.
pub async fn with_single_retry<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    match op().await {
        Ok(v) => Ok(v),
        Err(Error::Io { .. }) | Err(Error::VectorStore { .. }) => op().await,
        Err(e) => Err(e),
    }
}

/// Cosine similarity mapped onto [0,1] (1 = identical direction).
///
/// Zero vectors and dimension mismatches score 0 rather than erroring;
/// the dimension contract is enforced at upsert time.
pub fn cosine_unit_interval(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    let cosine = dot / (norm_a.sqrt() * norm_b.sqrt());
    ((1.0 + cosine) / 2.0).clamp(0.0, 1.0)
}

/// Sort strictly descending by score, ties broken by ascending chunk id.
pub fn rank_scored(results: &mut [ScoredChunk]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}
