//! Bundle lifecycle and manifest handling.

pub mod lifecycle;
pub mod manifest;

pub use lifecycle::{validate_bundle_id, BundleHealth, BundleLifecycle, StagingDir};
pub use manifest::{fingerprint_files, BundleManifest, ManifestRepo};
