//! In-memory vector store for tests and ephemeral bundles

use super::{cosine_unit_interval, rank_scored};
use crate::domain::error::{Error, Result};
use crate::domain::ports::{ChunkFilter, VectorStore};
use crate::domain::types::{Chunk, Embedding, ScoredChunk};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;

#[derive(Default, Clone)]
struct Namespace {
    /// Chunk id → (chunk, vector); BTreeMap keeps enumeration id-ordered.
    chunks: BTreeMap<String, (Chunk, Vec<f32>)>,
    graph: Option<String>,
}

/// Vector store that keeps everything in process memory.
#[derive(Default)]
pub struct InMemoryVectorStore {
    namespaces: DashMap<String, Namespace>,
}

impl InMemoryVectorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
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
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, namespace: &str, chunks: Vec<(Chunk, Embedding)>) -> Result<()> {
        let mut ns = self.namespaces.entry(namespace.to_string()).or_default();
        for (chunk, embedding) in chunks {
            Self::check_namespace(namespace, &chunk)?;
            ns.chunks.insert(chunk.id.clone(), (chunk, embedding.vector));
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        query_vector: &[f32],
        top_k: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let Some(ns) = self.namespaces.get(namespace) else {
            return Ok(vec![]);
        };
        let mut results: Vec<ScoredChunk> = ns
            .chunks
            .values()
            .filter(|(chunk, _)| filter.matches(&chunk.metadata))
            .map(|(chunk, vector)| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine_unit_interval(query_vector, vector),
            })
            .collect();
        rank_scored(&mut results);
        results.truncate(top_k);
        Ok(results)
    }

    async fn list(&self, namespace: &str, filter: &ChunkFilter) -> Result<Vec<Chunk>> {
        let Some(ns) = self.namespaces.get(namespace) else {
            return Ok(vec![]);
        };
        Ok(ns
            .chunks
            .values()
            .filter(|(chunk, _)| filter.matches(&chunk.metadata))
            .map(|(chunk, _)| chunk.clone())
            .collect())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<()> {
        self.namespaces.remove(namespace);
        Ok(())
    }

    async fn store_graph(&self, namespace: &str, graph_json: &str) -> Result<()> {
        let mut ns = self.namespaces.entry(namespace.to_string()).or_default();
        ns.graph = Some(graph_json.to_string());
        Ok(())
    }

    async fn load_graph(&self, namespace: &str) -> Result<Option<String>> {
        Ok(self.namespaces.get(namespace).and_then(|ns| ns.graph.clone()))
    }

    fn provider_name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ChunkMetadata, LineRange, SourceType};
    use uuid::Uuid;

    fn chunk(bundle: Uuid, id: &str, content: &str) -> (Chunk, Embedding) {
        let chunk = Chunk {
            id: id.into(),
            content: content.into(),
            metadata: ChunkMetadata {
                bundle_id: bundle,
                repo_id: "acme/api".into(),
                source_type: SourceType::Code,
                file_path: "src/lib.rs".into(),
                line_range: Some(LineRange { start_line: 1, end_line: 2 }),
                symbol: None,
                heading_path: vec![],
                importance: 0.5,
            },
        };
        let embedding =
            Embedding { vector: vec![1.0, 0.0], model: "test".into(), dimensions: 2 };
        (chunk, embedding)
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = InMemoryVectorStore::new();
        let bundle = Uuid::new_v4();
        let ns = bundle.to_string();
        store.upsert(&ns, vec![chunk(bundle, "c1", "one")]).await.unwrap();
        store.upsert(&ns, vec![chunk(bundle, "c1", "one again")]).await.unwrap();
        let all = store.list(&ns, &ChunkFilter::bundle(bundle)).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "one again");
    }

    #[tokio::test]
    async fn cross_bundle_writes_are_rejected() {
        let store = InMemoryVectorStore::new();
        let bundle = Uuid::new_v4();
        let other = Uuid::new_v4();
        let err = store
            .upsert(&other.to_string(), vec![chunk(bundle, "c1", "one")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VectorStore { .. }));
    }

    #[tokio::test]
    async fn delete_cascades_over_graph_blob() {
        let store = InMemoryVectorStore::new();
        let bundle = Uuid::new_v4();
        let ns = bundle.to_string();
        store.upsert(&ns, vec![chunk(bundle, "c1", "one")]).await.unwrap();
        store.store_graph(&ns, r#"{"nodes":{},"edges":[]}"#).await.unwrap();
        store.delete_namespace(&ns).await.unwrap();
        assert!(store.list(&ns, &ChunkFilter::bundle(bundle)).await.unwrap().is_empty());
        assert!(store.load_graph(&ns).await.unwrap().is_none());
    }
}
