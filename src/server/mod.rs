//! Transport-agnostic tool surface: the typed response envelope and the
//! engine behind `index_bundle` / `query` / `delete_bundle`.

pub mod envelope;
pub mod tools;

pub use envelope::{Envelope, ErrorBody, Meta, Truncation, SCHEMA_VERSION};
pub use tools::{DeleteReport, PreflightEngine, QueryData, QueryOptions};
