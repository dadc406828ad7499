//! Indexing pipeline: classification, filtering, chunking, AST graph
//! building, and the orchestrating indexer.

pub mod ast;
pub mod chunker;
pub mod classify;
pub mod filter;
pub mod indexer;

pub use chunker::Chunker;
pub use classify::classify_repo;
pub use filter::{FileFilter, SkipReason};
pub use indexer::Indexer;
