//! Bundle indexing orchestration
//!
//! Walks a bundle's normalized trees, runs the chunker and the AST
//! builder, embeds everything, and writes chunks plus the serialized graph
//! to the vector store. One writer per bundle: concurrent calls for the
//! same bundle either queue or fail fast depending on the configured
//! policy.
//!
//! Per-file problems never abort a run; they are collected into the
//! report's `errors` and the bundle finishes with whatever indexed
//! cleanly.

use crate::config::{BusyPolicy, Config};
use crate::domain::error::{Error, Result};
use crate::domain::ports::{EmbeddingProvider, VectorStore};
use crate::domain::types::{
    Chunk, IndexReport, IndexWarning, NormalizedFile, RepoClassification,
};
use crate::indexing::ast::{AstBuilder, ExtractedSymbol, RawRelation};
use crate::indexing::chunker::Chunker;
use crate::indexing::classify::classify_repo;
use crate::indexing::filter::FileFilter;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Chunks embedded per provider batch.
const EMBED_BATCH: usize = 32;

/// One repo discovered inside a bundle.
#[derive(Debug)]
struct RepoTree {
    repo_id: String,
    root: PathBuf,
}

/// Orchestrates chunking, AST building, embedding, and persistence.
pub struct Indexer {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    chunker: Chunker,
    ast: AstBuilder,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl Indexer {
    /// Create an indexer over the given providers.
    pub fn new(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let chunker = Chunker::new(config.chunk.clone());
        let ast = AstBuilder::new(config.ast_filter.clone());
        Self { config, embedder, store, chunker, ast, locks: DashMap::new() }
    }

    fn bundle_lock(&self, bundle_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(bundle_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Index a bundle directory into its vector namespace and graph.
    ///
    /// Returns the run report; cancellation surfaces as
    /// [`Error::Cancelled`] and guarantees no further writes after the
    /// token was observed.
    pub async fn index(
        &self,
        bundle_path: &Path,
        bundle_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let lock = self.bundle_lock(bundle_id);
        let _guard = match self.config.busy_policy {
            BusyPolicy::Wait => lock.lock().await,
            BusyPolicy::FailFast => lock
                .try_lock()
                .map_err(|_| Error::BundleBusy { bundle_id: bundle_id.to_string() })?,
        };

        if !bundle_path.is_dir() {
            return Err(Error::BundleNotFound { bundle_id: bundle_id.to_string() });
        }

        let started = Instant::now();
        let mut report = IndexReport::default();
        let filter = FileFilter::new(&self.config.chunk);

        let mut all_chunks: Vec<Chunk> = Vec::new();
        let mut all_symbols: Vec<ExtractedSymbol> = Vec::new();
        let mut all_relations: Vec<(String, RawRelation)> = Vec::new();
        // Code files that end up with no admitted symbols still need their
        // sliding-window fallback, which can only be decided post-quota.
        let mut code_files: HashMap<String, (String, NormalizedFile)> = HashMap::new();

        for repo in discover_repos(bundle_path) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let files = self.load_repo_files(&repo, &filter, &mut report).await?;
            let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
            let classification = classify_repo(&paths);
            info!(
                repo = %repo.repo_id,
                files = files.len(),
                ?classification,
                "indexing repo"
            );

            for file in files {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                if file.language.is_documentation()
                    || classification == RepoClassification::Documentation
                {
                    all_chunks.extend(self.chunker.chunk_doc(bundle_id, &repo.repo_id, &file));
                } else if file.language.is_code() {
                    let extraction = self.ast.extract(&file);
                    let (symbols, relations) = self.ast.admit(&file, extraction);
                    all_relations
                        .extend(relations.into_iter().map(|r| (file.path.clone(), r)));
                    all_symbols.extend(symbols);
                    code_files.insert(file.path.clone(), (repo.repo_id.clone(), file));
                }
                // Data files (json/yaml/toml) carry no retrieval value.
            }
        }

        // Quota runs over the whole bundle, then code chunks are cut from
        // whatever survived.
        let kept = self.ast.apply_quota(all_symbols);
        let mut by_file: HashMap<&str, Vec<&ExtractedSymbol>> = HashMap::new();
        for symbol in &kept {
            by_file.entry(symbol.file_path.as_str()).or_default().push(symbol);
        }
        for (path, (repo_id, file)) in &code_files {
            let symbols: Vec<ExtractedSymbol> = by_file
                .get(path.as_str())
                .map(|list| list.iter().map(|&s| s.clone()).collect())
                .unwrap_or_default();
            all_chunks.extend(self.chunker.chunk_code(bundle_id, repo_id, file, &symbols));
        }

        let graph = self.ast.build_graph(&kept, &all_relations);
        report.entities = graph.node_count();
        report.relations = graph.edge_count();

        // Deterministic write order regardless of map iteration above.
        all_chunks.sort_by(|a, b| a.id.cmp(&b.id));
        all_chunks.dedup_by(|a, b| a.id == b.id);

        let namespace = bundle_id.to_string();
        for batch in all_chunks.chunks(EMBED_BATCH) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = match self.embedder.embed_batch(&texts).await {
                Ok(embeddings) => embeddings,
                Err(e) => {
                    warn!(error = %e, batch = batch.len(), "embedding batch failed, skipping");
                    report.errors.push(IndexWarning {
                        path: batch[0].metadata.file_path.clone(),
                        message: format!("embedding failed for {} chunks: {e}", batch.len()),
                    });
                    continue;
                }
            };
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let rows: Vec<_> = batch.iter().cloned().zip(embeddings).collect();
            let row_count = rows.len();
            crate::providers::vector_store::with_single_retry(|| {
                self.store.upsert(&namespace, rows.clone())
            })
            .await?;
            report.chunks_written += row_count;
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let graph_json = serde_json::to_string(&graph)?;
        self.store.store_graph(&namespace, &graph_json).await?;

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            bundle = %bundle_id,
            chunks = report.chunks_written,
            entities = report.entities,
            relations = report.relations,
            warnings = report.errors.len(),
            duration_ms = report.duration_ms,
            "index complete"
        );
        Ok(report)
    }

    /// Walk one repo tree, admitting files through the filter and caps.
    async fn load_repo_files(
        &self,
        repo: &RepoTree,
        filter: &FileFilter,
        report: &mut IndexReport,
    ) -> Result<Vec<NormalizedFile>> {
        let mut files = Vec::new();
        let mut total_bytes = 0u64;

        let walker = WalkDir::new(&repo.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| !FileFilter::is_excluded_dir(name))
                    .unwrap_or(true)
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    report.errors.push(IndexWarning {
                        path: repo.repo_id.clone(),
                        message: format!("walk error: {e}"),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&repo.root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

            if let Some(reason) = filter.check(&relative, size) {
                debug!(path = %relative, %reason, "file skipped");
                continue;
            }
            if files.len() >= self.config.limits.max_total_files {
                report.errors.push(IndexWarning {
                    path: relative,
                    message: format!(
                        "file cap of {} reached; remaining files skipped",
                        self.config.limits.max_total_files
                    ),
                });
                break;
            }
            if total_bytes + size > self.config.limits.max_total_bytes {
                report.errors.push(IndexWarning {
                    path: relative,
                    message: "total byte cap reached; remaining files skipped".into(),
                });
                break;
            }

            match tokio::fs::read(entry.path()).await {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        total_bytes += size;
                        files.push(NormalizedFile::new(relative, &text));
                    }
                    Err(_) => {
                        debug!(path = %relative, "skipping non-UTF-8 file");
                    }
                },
                Err(e) => {
                    warn!(path = %relative, error = %e, "unreadable file skipped");
                    report.errors.push(IndexWarning {
                        path: relative,
                        message: format!("unreadable: {e}"),
                    });
                }
            }
        }
        Ok(files)
    }
}

/// Find the repos of a bundle: `repos/<owner>/<repo>/norm` trees when the
/// layout is present, otherwise the bundle directory itself as a single
/// repo.
fn discover_repos(bundle_path: &Path) -> Vec<RepoTree> {
    let repos_dir = bundle_path.join("repos");
    if !repos_dir.is_dir() {
        let name = bundle_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "bundle".to_string());
        return vec![RepoTree { repo_id: format!("local/{name}"), root: bundle_path.to_path_buf() }];
    }

    let mut out = Vec::new();
    let mut owners: Vec<_> = std::fs::read_dir(&repos_dir)
        .map(|iter| iter.flatten().filter(|e| e.path().is_dir()).collect())
        .unwrap_or_default();
    owners.sort_by_key(|e| e.file_name());
    for owner in owners {
        let mut repos: Vec<_> = std::fs::read_dir(owner.path())
            .map(|iter| iter.flatten().filter(|e| e.path().is_dir()).collect())
            .unwrap_or_default();
        repos.sort_by_key(|e| e.file_name());
        for repo in repos {
            let norm = repo.path().join("norm");
            let root = if norm.is_dir() { norm } else { repo.path() };
            out.push(RepoTree {
                repo_id: format!(
                    "{}/{}",
                    owner.file_name().to_string_lossy(),
                    repo.file_name().to_string_lossy()
                ),
                root,
            });
        }
    }
    out
}
