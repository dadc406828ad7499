//! Adapters behind the domain ports
//!
//! Embedding backends, the LLM completion client, and the vector-store
//! backends. Everything here is wired through [`crate::domain::ports`];
//! the pipeline never names a concrete adapter.

pub mod embedding;
pub mod llm;
pub mod vector_store;

use crate::config::ConcurrencyConfig;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Per-process concurrency semaphores shared by all adapters.
///
/// Exceeding a cap queues behind the semaphore rather than failing; these
/// are backpressure valves, not rate limits.
#[derive(Clone)]
pub struct ConcurrencyLimits {
    /// In-flight LLM completion calls
    pub llm: Arc<Semaphore>,
    /// In-flight embedding calls
    pub embed: Arc<Semaphore>,
    /// In-flight file operations
    pub file_io: Arc<Semaphore>,
}

impl ConcurrencyLimits {
    /// Build the semaphore set from configuration.
    pub fn from_config(config: &ConcurrencyConfig) -> Self {
        Self {
            llm: Arc::new(Semaphore::new(config.llm.max(1))),
            embed: Arc::new(Semaphore::new(config.embed.max(1))),
            file_io: Arc::new(Semaphore::new(config.file_io.max(1))),
        }
    }
}
