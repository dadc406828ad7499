//! Bundle manifest
//!
//! `manifest.json` at the bundle root: identity, content fingerprint, and
//! the repo set. A bundle is complete only when the manifest, the vector
//! namespace, and the graph agree; the lifecycle probe checks exactly
//! that.

use crate::domain::error::{Error, Result};
use crate::domain::types::{sha256_hex, NormalizedFile, RepoClassification, RepoKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One repo entry in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRepo {
    /// `owner/name`
    pub repo_id: String,
    /// Where the repo came from
    pub kind: RepoKind,
    /// Detected content classification
    pub classification: RepoClassification,
}

/// The bundle manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Bundle identity (UUID v4)
    pub bundle_id: uuid::Uuid,
    /// SHA-256 over the sorted per-file content hashes
    pub fingerprint: String,
    /// Repos contained in the bundle
    pub repos: Vec<ManifestRepo>,
    /// Last successful index time
    pub updated_at: DateTime<Utc>,
}

impl BundleManifest {
    /// File name inside the bundle directory.
    pub const FILE_NAME: &'static str = "manifest.json";

    /// Load a manifest from a bundle directory.
    pub async fn load(bundle_dir: &Path) -> Result<Self> {
        let path = bundle_dir.join(Self::FILE_NAME);
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::index_corrupt(format!("manifest missing at {}", path.display()))
            } else {
                e.into()
            }
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::index_corrupt(format!("unreadable manifest: {e}")))
    }

    /// Persist the manifest into a bundle directory (write-to-temp then
    /// rename, same as every other bundle artifact).
    pub async fn save(&self, bundle_dir: &Path) -> Result<()> {
        let path = bundle_dir.join(Self::FILE_NAME);
        let tmp = bundle_dir.join(format!("{}.tmp", Self::FILE_NAME));
        let bytes = serde_json::to_vec_pretty(self)?;
        tokio::fs::create_dir_all(bundle_dir).await?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Content fingerprint of a file set: SHA-256 over the sorted
/// `path\0hash` lines. Identical normalized trees always fingerprint
/// identically, which is how unchanged bundles skip re-indexing.
pub fn fingerprint_files(files: &[NormalizedFile]) -> String {
    let mut lines: Vec<String> =
        files.iter().map(|f| format!("{}\0{}", f.path, f.sha256)).collect();
    lines.sort();
    sha256_hex(lines.join("\n").as_bytes())
}
