//! Filesystem vector store
//!
//! One JSON document per namespace at `<root>/<bundle>/indexes/vectors.db`,
//! holding chunks, their vectors, and the co-located graph blob. Writes go
//! through a per-namespace mutex and land via write-to-temp + rename so a
//! crash never leaves a torn file; reads load a consistent snapshot and are
//! unaffected by concurrent writers.
//!
//! Search is brute-force cosine; bundles are bounded by the ingestion
//! caps, so the namespace stays small enough for a flat file.

use super::{cosine_unit_interval, rank_scored};
use crate::domain::error::{Error, Result};
use crate::domain::ports::{ChunkFilter, VectorStore};
use crate::domain::types::{Chunk, Embedding, ScoredChunk};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::debug;

#[derive(Debug, Serialize, Deserialize, Default)]
struct NamespaceFile {
    /// Schema version for forward migrations
    version: u32,
    /// Chunk id → stored entry; BTreeMap keeps the file diff-stable.
    chunks: BTreeMap<String, StoredChunk>,
    /// Opaque graph document co-located with the namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    graph: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Vector store persisting namespaces as flat JSON files.
pub struct FilesystemVectorStore {
    root: PathBuf,
    io_permits: Arc<Semaphore>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FilesystemVectorStore {
    /// Create a store rooted at the bundle storage directory.
    pub fn new(root: impl Into<PathBuf>, io_permits: Arc<Semaphore>) -> Self {
        Self { root: root.into(), io_permits, write_locks: DashMap::new() }
    }

    fn db_path(&self, namespace: &str) -> PathBuf {
        self.root.join(namespace).join("indexes").join("vectors.db")
    }

    fn write_lock(&self, namespace: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_namespace(&self, namespace: &str) -> Result<NamespaceFile> {
        let _permit = self
            .io_permits
            .acquire()
            .await
            .map_err(|_| Error::internal("file-io semaphore closed"))?;
        let path = self.db_path(namespace);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::index_corrupt(format!("unreadable namespace file {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NamespaceFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_namespace(&self, namespace: &str, file: &NamespaceFile) -> Result<()> {
        let _permit = self
            .io_permits
            .acquire()
            .await
            .map_err(|_| Error::internal("file-io semaphore closed"))?;
        let path = self.db_path(namespace);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("db.tmp");
        let bytes = serde_json::to_vec(file)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(namespace, chunks = file.chunks.len(), "namespace persisted");
        Ok(())
    }

    fn check_namespace(namespace: &str, chunk: &Chunk) -> Result<()> {
        if chunk.metadata.bundle_id.to_string() != namespace {
            return Err(Error::vector_store(format!(
                "chunk {} belongs to bundle {} but was written to namespace {namespace}",
                chunk.id, chunk.metadata.bundle_id
            )));
        }
        Ok(())
    }

    /// Whether a namespace file exists on disk.
    pub fn namespace_exists(&self, namespace: &str) -> bool {
        self.db_path(namespace).exists()
    }
}

#[async_trait]
impl VectorStore for FilesystemVectorStore {
    async fn upsert(&self, namespace: &str, chunks: Vec<(Chunk, Embedding)>) -> Result<()> {
        let lock = self.write_lock(namespace);
        let _guard = lock.lock().await;
        let mut file = self.read_namespace(namespace).await?;
        file.version = 1;
        for (chunk, embedding) in chunks {
            Self::check_namespace(namespace, &chunk)?;
            file.chunks
                .insert(chunk.id.clone(), StoredChunk { chunk, vector: embedding.vector });
        }
        self.write_namespace(namespace, &file).await
    }

    async fn query(
        &self,
        namespace: &str,
        query_vector: &[f32],
        top_k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let file = self.read_namespace(namespace).await?;
        let mut results: Vec<ScoredChunk> = file
            .chunks
            .into_values()
            .filter(|stored| filter.matches(&stored.chunk.metadata))
            .map(|stored| {
                let score = cosine_unit_interval(query_vector, &stored.vector);
                ScoredChunk { chunk: stored.chunk, score }
            })
            .collect();
        rank_scored(&mut results);
        results.truncate(top_k);
        Ok(results)
    }

    async fn list(&self, namespace: &str, filter: &ChunkFilter) -> Result<Vec<Chunk>> {
        let file = self.read_namespace(namespace).await?;
        Ok(file
            .chunks
            .into_values()
            .filter(|stored| filter.matches(&stored.chunk.metadata))
            .map(|stored| stored.chunk)
            .collect())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        let lock = self.write_lock(namespace);
        let _guard = lock.lock().await;
        let path = self.db_path(namespace);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store_graph(&self, namespace: &str, graph_json: &str) -> Result<()> {
        let lock = self.write_lock(namespace);
        let _guard = lock.lock().await;
        let mut file = self.read_namespace(namespace).await?;
        file.graph = Some(graph_json.to_string());
        self.write_namespace(namespace, &file).await
    }

    async fn load_graph(&self, namespace: &str) -> Result<Option<String>> {
        Ok(self.read_namespace(namespace).await?.graph)
    }

    fn provider_name(&self) -> &str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ChunkMetadata, LineRange, SourceType};
    use std::path::Path;
    use uuid::Uuid;

    fn chunk(bundle: Uuid, id: &str, vector: Vec<f32>) -> (Chunk, Embedding) {
        let dims = vector.len();
        (
            Chunk {
                id: id.into(),
                content: format!("content of {id}"),
                metadata: ChunkMetadata {
                    bundle_id: bundle,
                    repo_id: "acme/api".into(),
                    source_type: SourceType::Code,
                    file_path: "src/lib.rs".into(),
                    line_range: Some(LineRange { start_line: 1, end_line: 3 }),
                    symbol: None,
                    heading_path: vec![],
                    importance: 0.5,
                },
            },
            Embedding { vector, model: "test".into(), dimensions: dims },
        )
    }

    fn store(root: &Path) -> FilesystemVectorStore {
        FilesystemVectorStore::new(root, Arc::new(Semaphore::new(8)))
    }

    #[tokio::test]
    async fn roundtrip_survives_process_restart() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = Uuid::new_v4();
        let ns = bundle.to_string();

        {
            let store = store(dir.path());
            store
                .upsert(&ns, vec![chunk(bundle, "c1", vec![1.0, 0.0])])
                .await
                .unwrap();
        }

        // Fresh store instance, same root.
        let reopened = store(dir.path());
        let results = reopened
            .query(&ns, &[1.0, 0.0], 10, &ChunkFilter::bundle(bundle))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].score > 0.99);
    }

    #[tokio::test]
    async fn query_orders_by_score_then_id() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = Uuid::new_v4();
        let ns = bundle.to_string();
        let store = store(dir.path());
        store
            .upsert(
                &ns,
                vec![
                    chunk(bundle, "b-far", vec![0.0, 1.0]),
                    chunk(bundle, "a-near", vec![1.0, 0.0]),
                    chunk(bundle, "c-near", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = store
            .query(&ns, &[1.0, 0.0], 10, &ChunkFilter::bundle(bundle))
            .await
            .unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a-near", "c-near", "b-far"]);
    }

    #[tokio::test]
    async fn missing_namespace_queries_empty() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = Uuid::new_v4();
        let store = store(dir.path());
        let results = store
            .query(&bundle.to_string(), &[1.0], 5, &ChunkFilter::bundle(bundle))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn corrupt_namespace_file_reports_index_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = Uuid::new_v4();
        let ns = bundle.to_string();
        let db = dir.path().join(&ns).join("indexes").join("vectors.db");
        std::fs::create_dir_all(db.parent().unwrap()).unwrap();
        std::fs::write(&db, b"not json").unwrap();

        let store = store(dir.path());
        let err = store
            .query(&ns, &[1.0], 5, &ChunkFilter::bundle(bundle))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IndexCorrupt { .. }));
    }
}
