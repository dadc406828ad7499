//! Bundle lifecycle
//!
//! Staging-directory builds with atomic rename, deferred deletion via a
//! `.deleting.<timestamp>` rename, and startup cleanup of orphans. The
//! staging directory is a scoped resource: dropping the guard without
//! committing removes it, on every exit path.

use crate::config::StorageConfig;
use crate::domain::error::{Error, Result};
use crate::domain::ports::VectorStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Validate a caller-supplied bundle id: must parse as a UUID and be
/// version 4. Anything else is an invalid path, never a lookup miss.
pub fn validate_bundle_id(raw: &str) -> Result<Uuid> {
    let parsed = Uuid::parse_str(raw)
        .map_err(|_| Error::invalid_path(format!("'{raw}' is not a UUID bundle id")))?;
    if parsed.get_version_num() != 4 {
        return Err(Error::invalid_path(format!("'{raw}' is not a v4 UUID")));
    }
    Ok(parsed)
}

/// A staging directory that removes itself unless committed.
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    committed: bool,
}

impl StagingDir {
    /// Where to populate the bundle under construction.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically move the staged tree into its final location, replacing
    /// any previous bundle directory.
    pub async fn commit(mut self, final_dir: &Path) -> Result<()> {
        if let Some(parent) = final_dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if final_dir.exists() {
            // Swap out the old tree first so the rename lands cleanly.
            let displaced = final_dir.with_extension("replaced");
            let _ = tokio::fs::remove_dir_all(&displaced).await;
            tokio::fs::rename(final_dir, &displaced).await?;
            tokio::fs::rename(&self.path, final_dir).await?;
            let _ = tokio::fs::remove_dir_all(&displaced).await;
        } else {
            tokio::fs::rename(&self.path, final_dir).await?;
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if !self.committed && self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove staging directory");
            }
        }
    }
}

/// Health probe result for one bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BundleHealth {
    /// `manifest.json` present and readable
    pub manifest_ok: bool,
    /// Vector namespace present
    pub vectors_ok: bool,
    /// Graph document present and parseable
    pub graph_ok: bool,
}

impl BundleHealth {
    /// Whether the bundle satisfies the completeness invariant.
    pub fn is_complete(&self) -> bool {
        self.manifest_ok && self.vectors_ok && self.graph_ok
    }
}

/// Drives bundle creation, deletion, and startup cleanup.
pub struct BundleLifecycle {
    storage: StorageConfig,
    store: Arc<dyn VectorStore>,
}

impl BundleLifecycle {
    /// Create a lifecycle driver.
    pub fn new(storage: StorageConfig, store: Arc<dyn VectorStore>) -> Self {
        Self { storage, store }
    }

    /// Final directory of a bundle.
    pub fn bundle_dir(&self, bundle_id: Uuid) -> PathBuf {
        self.storage.root.join(bundle_id.to_string())
    }

    /// Whether the bundle directory exists under the storage root or any
    /// read-only mirror.
    pub fn bundle_exists(&self, bundle_id: Uuid) -> bool {
        if self.bundle_dir(bundle_id).is_dir() {
            return true;
        }
        self.storage
            .mirrors
            .iter()
            .any(|mirror| mirror.join(bundle_id.to_string()).is_dir())
    }

    /// Open a staging directory for building (or rebuilding) a bundle.
    pub async fn stage(&self, bundle_id: Uuid) -> Result<StagingDir> {
        let tmp_root = self
            .storage
            .tmp_dir
            .clone()
            .unwrap_or_else(|| self.storage.root.join(".tmp"));
        tokio::fs::create_dir_all(&tmp_root).await?;
        let path = tmp_root.join(format!("staging.{bundle_id}.{}", chrono::Utc::now().timestamp()));
        tokio::fs::create_dir_all(&path).await?;
        debug!(path = %path.display(), "staging directory created");
        Ok(StagingDir { path, committed: false })
    }

    /// Delete a bundle: rename to a `.deleting.<timestamp>` suffix, drop
    /// the vector namespace, and remove the renamed tree in the
    /// background. Returns as soon as the rename lands.
    pub async fn delete(&self, bundle_id: Uuid) -> Result<()> {
        let dir = self.bundle_dir(bundle_id);
        if !dir.is_dir() {
            return Err(Error::BundleNotFound { bundle_id: bundle_id.to_string() });
        }
        let tombstone = self
            .storage
            .root
            .join(format!("{bundle_id}.deleting.{}", chrono::Utc::now().timestamp()));
        tokio::fs::rename(&dir, &tombstone).await?;

        // Cascade over the namespace (covers non-filesystem stores too).
        self.store.delete_namespace(&bundle_id.to_string()).await?;

        tokio::spawn(async move {
            if let Err(e) = tokio::fs::remove_dir_all(&tombstone).await {
                warn!(path = %tombstone.display(), error = %e, "background bundle removal failed");
            }
        });
        info!(bundle = %bundle_id, "bundle deleted");
        Ok(())
    }

    /// Remove orphaned `.deleting.*` tombstones and stale staging
    /// directories older than the configured TTL. Run at startup.
    pub async fn cleanup_stale(&self) -> Result<usize> {
        let ttl = Duration::from_secs(self.storage.stale_dir_ttl_secs);
        let mut removed = 0usize;

        let mut roots = vec![self.storage.root.clone()];
        roots.push(
            self.storage.tmp_dir.clone().unwrap_or_else(|| self.storage.root.join(".tmp")),
        );

        for root in roots {
            let Ok(mut entries) = tokio::fs::read_dir(&root).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name().to_string_lossy().to_string();
                let is_tombstone = name.contains(".deleting.");
                let is_staging = name.starts_with("staging.");
                if !is_tombstone && !is_staging {
                    continue;
                }
                let old_enough = entry
                    .metadata()
                    .await
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
                    .map(|age| age >= ttl)
                    .unwrap_or(true);
                // Tombstones are removable immediately; staging dirs only
                // once stale (a build may still be running).
                if is_tombstone || old_enough {
                    if tokio::fs::remove_dir_all(entry.path()).await.is_ok() {
                        removed += 1;
                        debug!(path = %entry.path().display(), "stale directory removed");
                    }
                }
            }
        }
        Ok(removed)
    }

    /// Enumerate valid bundle directories under the storage root. Names
    /// that are not v4 UUIDs are ignored.
    pub async fn list_bundles(&self) -> Result<Vec<Uuid>> {
        let mut out = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.storage.root).await else {
            return Ok(out);
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Ok(id) = validate_bundle_id(&name) {
                out.push(id);
            }
        }
        out.sort();
        Ok(out)
    }

    /// Probe the completeness invariant of a bundle: manifest, vector
    /// namespace, and graph all present and cross-consistent.
    pub async fn probe(&self, bundle_id: Uuid) -> Result<BundleHealth> {
        let dir = self.bundle_dir(bundle_id);
        let manifest_ok = match crate::bundle::manifest::BundleManifest::load(&dir).await {
            Ok(manifest) => manifest.bundle_id == bundle_id,
            Err(_) => false,
        };
        let namespace = bundle_id.to_string();
        let vectors_ok = self
            .store
            .list(&namespace, &crate::domain::ports::ChunkFilter::bundle(bundle_id))
            .await
            .map(|chunks| !chunks.is_empty())
            .unwrap_or(false);
        let graph_ok = match self.store.load_graph(&namespace).await {
            Ok(Some(json)) => crate::graph::KgStore::from_json(&json).is_ok(),
            _ => false,
        };
        Ok(BundleHealth { manifest_ok, vectors_ok, graph_ok })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::vector_store::InMemoryVectorStore;

    fn lifecycle(root: &Path) -> BundleLifecycle {
        let mut storage = StorageConfig::default();
        storage.root = root.to_path_buf();
        BundleLifecycle::new(storage, Arc::new(InMemoryVectorStore::new()))
    }

    #[test]
    fn bundle_id_validation_rejects_non_uuids() {
        assert!(matches!(
            validate_bundle_id("not-a-uuid").unwrap_err(),
            Error::InvalidPath { .. }
        ));
        // v1-style UUID (version nibble 1) is rejected too.
        assert!(validate_bundle_id("a8098c1a-f86e-11da-bd1a-00112444be1e").is_err());
        assert!(validate_bundle_id(&Uuid::new_v4().to_string()).is_ok());
    }

    #[tokio::test]
    async fn staging_commits_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = lifecycle(dir.path());
        let bundle = Uuid::new_v4();

        let staging = lifecycle.stage(bundle).await.unwrap();
        tokio::fs::write(staging.path().join("manifest.json"), b"{}").await.unwrap();
        staging.commit(&lifecycle.bundle_dir(bundle)).await.unwrap();

        assert!(lifecycle.bundle_dir(bundle).join("manifest.json").exists());
    }

    #[tokio::test]
    async fn dropped_staging_cleans_itself_up() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = lifecycle(dir.path());
        let staging_path;
        {
            let staging = lifecycle.stage(Uuid::new_v4()).await.unwrap();
            staging_path = staging.path().to_path_buf();
            assert!(staging_path.exists());
        }
        assert!(!staging_path.exists());
    }

    #[tokio::test]
    async fn delete_renames_then_removes_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = lifecycle(dir.path());
        let bundle = Uuid::new_v4();
        tokio::fs::create_dir_all(lifecycle.bundle_dir(bundle)).await.unwrap();

        lifecycle.delete(bundle).await.unwrap();
        // The final directory is gone the moment delete returns.
        assert!(!lifecycle.bundle_dir(bundle).exists());
    }

    #[tokio::test]
    async fn delete_of_missing_bundle_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = lifecycle(dir.path());
        let err = lifecycle.delete(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::BundleNotFound { .. }));
    }

    #[tokio::test]
    async fn cleanup_reaps_tombstones_and_ignores_fresh_staging() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = StorageConfig::default();
        storage.root = dir.path().to_path_buf();
        storage.stale_dir_ttl_secs = 3_600;
        let lifecycle = BundleLifecycle::new(storage, Arc::new(InMemoryVectorStore::new()));

        let tombstone = dir.path().join(format!("{}.deleting.123", Uuid::new_v4()));
        tokio::fs::create_dir_all(&tombstone).await.unwrap();
        let fresh_staging = dir.path().join(".tmp").join("staging.fresh.456");
        tokio::fs::create_dir_all(&fresh_staging).await.unwrap();

        let removed = lifecycle.cleanup_stale().await.unwrap();
        assert_eq!(removed, 1);
        assert!(!tombstone.exists());
        assert!(fresh_staging.exists());
    }

    #[tokio::test]
    async fn probe_reports_missing_artifacts() {
        use crate::domain::ports::VectorStore as _;
        use crate::domain::types::{
            Chunk, ChunkMetadata, Embedding, LineRange, SourceType,
        };

        let dir = tempfile::tempdir().unwrap();
        let mut storage = StorageConfig::default();
        storage.root = dir.path().to_path_buf();
        let store = Arc::new(InMemoryVectorStore::new());
        let lifecycle = BundleLifecycle::new(storage, store.clone());
        let bundle = Uuid::new_v4();

        // Nothing present yet.
        let health = lifecycle.probe(bundle).await.unwrap();
        assert!(!health.is_complete());
        assert!(!health.manifest_ok);

        // Manifest + one chunk + graph makes the bundle complete.
        let manifest = crate::bundle::manifest::BundleManifest {
            bundle_id: bundle,
            fingerprint: "f".into(),
            repos: vec![],
            updated_at: chrono::Utc::now(),
        };
        manifest.save(&lifecycle.bundle_dir(bundle)).await.unwrap();
        let chunk = Chunk {
            id: "c1".into(),
            content: "body".into(),
            metadata: ChunkMetadata {
                bundle_id: bundle,
                repo_id: "a/b".into(),
                source_type: SourceType::Code,
                file_path: "src/lib.rs".into(),
                line_range: Some(LineRange { start_line: 1, end_line: 2 }),
                symbol: None,
                heading_path: vec![],
                importance: 0.5,
            },
        };
        let embedding = Embedding { vector: vec![1.0], model: "t".into(), dimensions: 1 };
        store.upsert(&bundle.to_string(), vec![(chunk, embedding)]).await.unwrap();
        store
            .store_graph(&bundle.to_string(), r#"{"nodes":{},"edges":[]}"#)
            .await
            .unwrap();

        let health = lifecycle.probe(bundle).await.unwrap();
        assert!(health.is_complete());
    }

    #[tokio::test]
    async fn list_bundles_ignores_non_uuid_names() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = lifecycle(dir.path());
        let bundle = Uuid::new_v4();
        tokio::fs::create_dir_all(lifecycle.bundle_dir(bundle)).await.unwrap();
        tokio::fs::create_dir_all(dir.path().join("random-dir")).await.unwrap();

        let bundles = lifecycle.list_bundles().await.unwrap();
        assert_eq!(bundles, vec![bundle]);
    }
}
