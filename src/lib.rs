//! # preflight-core
//!
//! The retrieval-and-pruning core behind preflight bundles: content-
//! addressed, searchable snapshots of source repositories and library
//! documentation, plus a retrieval-augmented question-answering engine
//! over those snapshots.
//!
//! ## Pipeline
//!
//! ```text
//! index:  files → Chunker → (chunks, symbols) → Embedder → Vector Store
//!                         → AST Builder → KG Store
//! query:  question → Retriever → IG Pruner → Generator
//!                  → answer + sources (+ faithfulness)
//! ```
//!
//! The hard parts live in four subsystems:
//!
//! 1. [`indexing`]: classify files, filter and score code symbols, chunk
//!    documents, build the typed AST graph, persist both.
//! 2. [`retrieval`]: vector similarity, BM25 keyword scoring, and graph
//!    expansion merged into one deterministic ranking.
//! 3. [`igp`]: prune candidates by the information gain they induce on a
//!    prompt completion, measured from model log-probabilities.
//! 4. [`generation`]: compose an evidence prompt, generate, and
//!    optionally verify faithfulness with a retry policy.
//!
//! The MCP/JSON-RPC transport, CLI, and bundle packaging are external
//! collaborators; they drive this crate through
//! [`server::PreflightEngine`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use preflight_core::config::Config;
//! use preflight_core::server::{PreflightEngine, QueryOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> preflight_core::Result<()> {
//! let engine = PreflightEngine::new(Config::builder().storage_root("/var/lib/preflight").build()?)?;
//! engine.startup().await?;
//!
//! let bundle = "5c3f8f3e-9a1b-4c5d-8e2f-7b6a5d4c3b2a";
//! let report = engine
//!     .index_bundle(bundle, std::path::Path::new("/var/lib/preflight/staged"), &CancellationToken::new())
//!     .await;
//! assert!(report.ok);
//!
//! let options = QueryOptions { bundle_id: Some(bundle.into()), ..Default::default() };
//! let answer = engine.query("how does indexing work?", options, &CancellationToken::new()).await;
//! println!("{}", answer.data.unwrap().answer);
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod config;
pub mod domain;
pub mod generation;
pub mod graph;
pub mod igp;
pub mod indexing;
pub mod providers;
pub mod retrieval;
pub mod server;

// Re-export core types for public API
pub use domain::error::{Error, ErrorCode, Result};
pub use domain::types::*;

// Re-export main entry points
pub use server::{Envelope, PreflightEngine, QueryData, QueryOptions};
