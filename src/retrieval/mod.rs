//! Hybrid retrieval: BM25 keyword scoring, dense similarity, and
//! knowledge-graph expansion.

pub mod bm25;
pub mod retriever;

pub use bm25::{Bm25Params, Bm25Scorer};
pub use retriever::{RetrievalOutcome, RetrievedChunk, Retriever};
