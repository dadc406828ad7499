//! Typed response envelope
//!
//! Every tool response is an [`Envelope`] parameterized by its payload
//! type: `{ok, meta, data|error, warnings?, truncation?, evidence?}` with
//! camelCase wire names and `schemaVersion` pinned to `"2.0"`. The error
//! body always carries a code from the closed set.

use crate::domain::error::{Error, ErrorCode};
use crate::domain::types::{EvidencePointer, Warning};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire schema version of the envelope.
pub const SCHEMA_VERSION: &str = "2.0";

/// Request metadata attached to every envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    /// Tool that produced the response
    pub tool: String,
    /// Envelope schema version
    pub schema_version: String,
    /// Request correlation id
    pub request_id: String,
    /// Wall-clock of the call in milliseconds
    pub time_ms: u64,
    /// Bundle the call operated on, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    /// Whether the response came from a cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_cache: Option<bool>,
}

/// Error body of a failed envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Stable error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Recovery hint, when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Structured extra detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Truncation marker for paginated or capped responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Truncation {
    /// Whether the response was cut short
    pub truncated: bool,
    /// Cursor to resume from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Why truncation happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Total items available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
    /// Items actually returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returned_count: Option<usize>,
}

/// The unified tool response shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// Success flag; `data` is present iff true, `error` iff false
    pub ok: bool,
    /// Request metadata
    pub meta: Meta,
    /// Payload of a successful call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    /// Recoverable problems encountered along the way
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    /// Truncation marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation: Option<Truncation>,
    /// Evidence pointers backing the response
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidencePointer>,
}

impl<T> Envelope<T> {
    fn meta(tool: &str, bundle_id: Option<String>, time_ms: u64) -> Meta {
        Meta {
            tool: tool.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            request_id: Uuid::new_v4().to_string(),
            time_ms,
            bundle_id,
            from_cache: None,
        }
    }

    /// Build a success envelope.
    pub fn success(
        tool: &str,
        bundle_id: Option<String>,
        time_ms: u64,
        data: T,
        warnings: Vec<Warning>,
        evidence: Vec<EvidencePointer>,
    ) -> Self {
        Self {
            ok: true,
            meta: Self::meta(tool, bundle_id, time_ms),
            data: Some(data),
            error: None,
            warnings,
            truncation: None,
            evidence,
        }
    }

    /// Build a failure envelope from a domain error.
    pub fn failure(
        tool: &str,
        bundle_id: Option<String>,
        time_ms: u64,
        error: &Error,
        evidence: Vec<EvidencePointer>,
    ) -> Self {
        Self {
            ok: false,
            meta: Self::meta(tool, bundle_id, time_ms),
            data: None,
            error: Some(ErrorBody {
                code: error.code(),
                message: error.to_string(),
                hint: error.hint(),
                details: None,
            }),
            warnings: vec![],
            truncation: None,
            evidence,
        }
    }
}
