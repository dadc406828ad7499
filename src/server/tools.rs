//! Tool entry points
//!
//! Transport-agnostic implementations of the tool surface: `index_bundle`,
//! `query`, and `delete_bundle`, each returning the typed envelope. The
//! JSON-RPC runtime that fronts these functions lives outside the core.

use crate::bundle::{validate_bundle_id, BundleLifecycle};
use crate::config::{Config, IgpConfig, RetrieverMode};
use crate::domain::error::{Error, Result};
use crate::domain::ports::{
    ChunkFilter, CompletionClient, EmbeddingProvider, VectorStore,
};
use crate::domain::types::{EvidencePointer, IndexReport, QueryStats, Warning};
use crate::generation::Generator;
use crate::graph::KgStore;
use crate::igp::{IgPruner, NuCalculator, UncertaintyProbe};
use crate::indexing::Indexer;
use crate::providers::embedding::create_embedding_provider;
use crate::providers::llm::{HttpCompletionClient, RetryPolicy};
use crate::providers::vector_store::FilesystemVectorStore;
use crate::providers::ConcurrencyLimits;
use crate::retrieval::Retriever;
use crate::server::envelope::Envelope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Options accepted by [`PreflightEngine::query`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct QueryOptions {
    /// Bundle to query (required in practice; its absence is an error)
    pub bundle_id: Option<String>,
    /// Restrict retrieval to one repo
    pub repo_id: Option<String>,
    /// Retrieval mode override
    pub mode: Option<RetrieverMode>,
    /// Candidate count override
    pub top_k: Option<usize>,
    /// Graph expansion radius override
    pub max_hops: Option<usize>,
    /// Gate the uncertainty-probing completion passes; `false` forces the
    /// pruner off for this query
    pub enable_context_completion: Option<bool>,
    /// Run the faithfulness verifier on the answer
    pub enable_verification: bool,
    /// Full IG-pruner override for this query
    pub igp_options: Option<IgpConfig>,
    /// Removed in schema 2.0; supplying it fails with
    /// `DEPRECATED_PARAMETER` pointing at `enableContextCompletion`
    pub enable_igp: Option<bool>,
}

/// Payload of a successful `query` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryData {
    /// The generated answer
    pub answer: String,
    /// Cited evidence, in order of first citation
    pub sources: Vec<EvidencePointer>,
    /// Graph entities related to the question
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_entities: Vec<String>,
    /// Faithfulness in [0,1] when verification ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faithfulness_score: Option<f32>,
    /// Per-query statistics
    pub stats: QueryStats,
}

/// Payload of a successful `delete_bundle` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    /// Whether the bundle directory was removed
    pub deleted: bool,
}

/// The assembled retrieval-and-pruning engine behind the tool surface.
pub struct PreflightEngine {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    probe: Arc<dyn UncertaintyProbe>,
    indexer: Indexer,
    generator: Generator,
    lifecycle: BundleLifecycle,
    /// Per-bundle graph snapshots; queries clone the `Arc` and keep their
    /// snapshot even while an indexer swaps in a new one.
    graphs: RwLock<HashMap<Uuid, Arc<KgStore>>>,
}

impl PreflightEngine {
    /// Build the engine with the default provider wiring: filesystem
    /// vector store, configured embedding provider, HTTP completion
    /// client.
    pub fn new(config: Config) -> Result<Self> {
        let config = config.validated()?;
        let limits = ConcurrencyLimits::from_config(&config.concurrency);
        let embedder = create_embedding_provider(&config.embedding, limits.embed.clone())?;
        let store: Arc<dyn VectorStore> = Arc::new(FilesystemVectorStore::new(
            config.storage.root.clone(),
            limits.file_io.clone(),
        ));
        let llm: Arc<dyn CompletionClient> =
            Arc::new(HttpCompletionClient::new(&config.llm, limits.llm.clone())?);
        Ok(Self::assemble(config, embedder, store, llm))
    }

    /// Build the engine over explicit providers (tests, embedded use).
    pub fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn CompletionClient>,
    ) -> Self {
        Self::assemble(config, embedder, store, llm)
    }

    /// Replace the uncertainty probe (scripted probes in tests).
    pub fn with_probe(mut self, probe: Arc<dyn UncertaintyProbe>) -> Self {
        self.probe = probe;
        self
    }

    fn assemble(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn CompletionClient>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.llm);
        let probe: Arc<dyn UncertaintyProbe> =
            Arc::new(NuCalculator::new(llm.clone(), config.igp.nu.clone(), retry));
        let generator = Generator::new(llm, config.generator.clone(), retry);
        let indexer = Indexer::new(config.clone(), embedder.clone(), store.clone());
        let lifecycle = BundleLifecycle::new(config.storage.clone(), store.clone());
        Self {
            config,
            embedder,
            store,
            probe,
            indexer,
            generator,
            lifecycle,
            graphs: RwLock::new(HashMap::new()),
        }
    }

    /// Startup maintenance: reap orphaned staging/deleting directories.
    pub async fn startup(&self) -> Result<usize> {
        self.lifecycle.cleanup_stale().await
    }

    /// Index a bundle directory.
    pub async fn index_bundle(
        &self,
        bundle_id: &str,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Envelope<IndexReport> {
        let started = Instant::now();
        let id = match validate_bundle_id(bundle_id) {
            Ok(id) => id,
            Err(e) => return Envelope::failure("index_bundle", None, elapsed(started), &e, vec![]),
        };
        match self.indexer.index(path, id, cancel).await {
            Ok(report) => {
                self.refresh_graph(id).await;
                Envelope::success(
                    "index_bundle",
                    Some(id.to_string()),
                    elapsed(started),
                    report,
                    vec![],
                    vec![],
                )
            }
            Err(e) => {
                Envelope::failure("index_bundle", Some(id.to_string()), elapsed(started), &e, vec![])
            }
        }
    }

    /// Answer a question over an indexed bundle.
    pub async fn query(
        &self,
        question: &str,
        options: QueryOptions,
        cancel: &CancellationToken,
    ) -> Envelope<QueryData> {
        let started = Instant::now();

        if options.enable_igp.is_some() {
            let e = Error::DeprecatedParameter {
                name: "enableIgp".into(),
                replacement: "enableContextCompletion".into(),
            };
            return Envelope::failure("query", options.bundle_id.clone(), elapsed(started), &e, vec![]);
        }

        let Some(raw_id) = options.bundle_id.clone() else {
            let e = Error::invalid_path("query requires a bundleId");
            return Envelope::failure("query", None, elapsed(started), &e, vec![]);
        };
        let id = match validate_bundle_id(&raw_id) {
            Ok(id) => id,
            Err(e) => return Envelope::failure("query", Some(raw_id), elapsed(started), &e, vec![]),
        };
        let bundle_label = Some(id.to_string());

        if !self.bundle_exists(id).await {
            let e = Error::BundleNotFound { bundle_id: id.to_string() };
            return Envelope::failure("query", bundle_label, elapsed(started), &e, vec![]);
        }

        // Per-query retriever with option overrides.
        let mut retriever_config = self.config.retriever.clone();
        if let Some(hops) = options.max_hops {
            retriever_config.max_hops = hops;
        }
        let mode = options.mode.unwrap_or(retriever_config.mode);
        let top_k = options.top_k.unwrap_or(retriever_config.top_k);
        let retriever =
            Retriever::new(retriever_config.clone(), self.embedder.clone(), self.store.clone());

        let filter = ChunkFilter {
            bundle_id: id,
            repo_id: options.repo_id.clone(),
            source_type: None,
        };
        let kg = self.graph_snapshot(id).await;

        let retrieval_started = Instant::now();
        let retrieval = match retriever
            .retrieve(question, &filter, mode, top_k, kg.as_deref())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return Envelope::failure("query", bundle_label, elapsed(started), &e, vec![]),
        };
        let retrieval_ms = elapsed(retrieval_started);

        if cancel.is_cancelled() {
            return Envelope::failure(
                "query",
                bundle_label,
                elapsed(started),
                &Error::Cancelled,
                vec![],
            );
        }

        // Per-query pruner: explicit overrides win, and disabling context
        // completion forces it off.
        let mut igp_config = options.igp_options.clone().unwrap_or_else(|| self.config.igp.clone());
        if options.enable_context_completion == Some(false) {
            igp_config.enabled = false;
        }
        let pruner = IgPruner::new(igp_config, self.probe.clone());

        let pruning_started = Instant::now();
        let chunks_retrieved = retrieval.candidates.len();
        let prune = match pruner.prune(question, retrieval.candidates, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => return Envelope::failure("query", bundle_label, elapsed(started), &e, vec![]),
        };
        let pruning_ms = elapsed(pruning_started);
        let mut warnings: Vec<Warning> = prune.warnings.clone();

        let generation_started = Instant::now();
        match self
            .generator
            .generate(question, &prune.ranked_chunks, options.enable_verification, cancel)
            .await
        {
            Ok(output) => {
                let stats = QueryStats {
                    chunks_retrieved,
                    chunks_after_pruning: prune.pruned_count,
                    baseline_nu: prune.baseline_nu,
                    batches_used: prune.batches_used,
                    retrieval_ms,
                    pruning_ms,
                    generation_ms: elapsed(generation_started),
                };
                if prune.cancelled {
                    warnings.push(Warning {
                        code: "UNKNOWN".into(),
                        message: "pruning was cancelled; answer generated from partial evidence"
                            .into(),
                        recoverable: true,
                    });
                }
                let related_entities = related_entities(
                    &retrieval.expanded_types,
                    kg.as_deref(),
                    retriever_config.max_hops,
                );
                debug!(
                    retrieved = stats.chunks_retrieved,
                    kept = stats.chunks_after_pruning,
                    "query answered"
                );
                let evidence = output.sources.clone();
                Envelope::success(
                    "query",
                    bundle_label,
                    elapsed(started),
                    QueryData {
                        answer: output.answer,
                        sources: output.sources,
                        related_entities,
                        faithfulness_score: output.faithfulness,
                        stats,
                    },
                    warnings,
                    evidence,
                )
            }
            Err(failure) => Envelope::failure(
                "query",
                bundle_label,
                elapsed(started),
                &failure.error,
                failure.partial_sources,
            ),
        }
    }

    /// Delete a bundle and everything it owns.
    pub async fn delete_bundle(&self, bundle_id: &str) -> Envelope<DeleteReport> {
        let started = Instant::now();
        let id = match validate_bundle_id(bundle_id) {
            Ok(id) => id,
            Err(e) => return Envelope::failure("delete_bundle", None, elapsed(started), &e, vec![]),
        };
        match self.lifecycle.delete(id).await {
            Ok(()) => {
                self.graphs.write().await.remove(&id);
                info!(bundle = %id, "bundle deleted via tool surface");
                Envelope::success(
                    "delete_bundle",
                    Some(id.to_string()),
                    elapsed(started),
                    DeleteReport { deleted: true },
                    vec![],
                    vec![],
                )
            }
            Err(e) => {
                Envelope::failure("delete_bundle", Some(id.to_string()), elapsed(started), &e, vec![])
            }
        }
    }

    /// Whether the bundle is materialized on disk or has indexed chunks.
    async fn bundle_exists(&self, id: Uuid) -> bool {
        if self.lifecycle.bundle_exists(id) {
            return true;
        }
        self.store
            .list(&id.to_string(), &ChunkFilter::bundle(id))
            .await
            .map(|chunks| !chunks.is_empty())
            .unwrap_or(false)
    }

    /// Cached graph snapshot for a bundle, loading lazily from the store.
    async fn graph_snapshot(&self, id: Uuid) -> Option<Arc<KgStore>> {
        if let Some(kg) = self.graphs.read().await.get(&id) {
            return Some(kg.clone());
        }
        let json = self.store.load_graph(&id.to_string()).await.ok().flatten()?;
        match KgStore::from_json(&json) {
            Ok(kg) => {
                let kg = Arc::new(kg);
                self.graphs.write().await.insert(id, kg.clone());
                Some(kg)
            }
            Err(e) => {
                tracing::warn!(bundle = %id, error = %e, "stored graph is unreadable");
                None
            }
        }
    }

    /// Drop and repopulate the cached graph after an index run.
    async fn refresh_graph(&self, id: Uuid) {
        self.graphs.write().await.remove(&id);
        let _ = self.graph_snapshot(id).await;
    }

}

/// Matched symbols plus their neighborhood, for the response payload.
fn related_entities(expanded: &[String], kg: Option<&KgStore>, max_hops: usize) -> Vec<String> {
    let mut related: Vec<String> = expanded.to_vec();
    if let Some(kg) = kg {
        for name in expanded {
            for neighbor in kg.neighbors(name, max_hops) {
                if !related.contains(&neighbor.name) {
                    related.push(neighbor.name.clone());
                }
            }
        }
    }
    related.truncate(16);
    related
}

fn elapsed(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
