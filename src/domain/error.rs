//! Error handling types
//!
//! All fallible operations in the crate return [`Result`]. The error enum is
//! closed: every variant maps onto one of the stable wire codes
//! in [`ErrorCode`], which is the only failure vocabulary callers see.

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error codes surfaced through the response envelope.
///
/// The set is closed; new failure modes must map onto an existing code.
/// Rendered errors are prefixed `[preflight_error kind=<code>]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The referenced bundle does not exist under the storage root
    BundleNotFound,
    /// A file referenced inside a bundle does not exist
    FileNotFound,
    /// A path or bundle id failed validation
    InvalidPath,
    /// The operating system refused access
    PermissionDenied,
    /// A persisted index artifact is absent or unreadable
    IndexMissingOrCorrupt,
    /// The completion provider cannot return top log-probabilities
    LogprobsUnsupported,
    /// Transient LLM failure (network, 5xx, timeout); retryable
    LlmTransient,
    /// Terminal LLM failure; retries exhausted or non-retryable
    LlmTerminal,
    /// A removed or renamed option was supplied
    DeprecatedParameter,
    /// Anything that has no more specific code
    Unknown,
}

impl ErrorCode {
    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BundleNotFound => "BUNDLE_NOT_FOUND",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::InvalidPath => "INVALID_PATH",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::IndexMissingOrCorrupt => "INDEX_MISSING_OR_CORRUPT",
            Self::LogprobsUnsupported => "LOGPROBS_UNSUPPORTED",
            Self::LlmTransient => "LLM_TRANSIENT",
            Self::LlmTerminal => "LLM_TERMINAL",
            Self::DeprecatedParameter => "DEPRECATED_PARAMETER",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the preflight core
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// JSON parsing or serialization error
    #[error("JSON parsing error: {source}")]
    Json {
        /// The underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// The referenced bundle does not exist
    #[error("bundle not found: {bundle_id}")]
    BundleNotFound {
        /// The bundle id that could not be resolved
        bundle_id: String,
    },

    /// A file referenced inside a bundle does not exist
    #[error("file not found: {path}")]
    FileNotFound {
        /// The missing path, relative to the bundle root
        path: String,
    },

    /// A path or bundle id failed validation
    #[error("invalid path: {message}")]
    InvalidPath {
        /// Description of the rejected input
        message: String,
    },

    /// The operating system refused access
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path access was refused for
        path: String,
    },

    /// A persisted index artifact is absent or unreadable
    #[error("index missing or corrupt: {message}")]
    IndexCorrupt {
        /// What failed to load and why
        message: String,
    },

    /// Embedding provider operation error
    #[error("embedding provider error: {message}")]
    Embedding {
        /// Description of the provider failure
        message: String,
    },

    /// An embedding came back with an unexpected dimension
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbedDimMismatch {
        /// Dimension the namespace was created with
        expected: usize,
        /// Dimension the provider returned
        actual: usize,
    },

    /// The completion provider cannot return top log-probabilities
    #[error("provider does not support top_logprobs: {provider}")]
    LogprobsUnsupported {
        /// Base URL or name of the refusing provider
        provider: String,
    },

    /// Transient LLM failure (network, 5xx, timeout)
    #[error("transient LLM failure: {message}")]
    LlmTransient {
        /// Description of the transient failure
        message: String,
    },

    /// Terminal LLM failure
    #[error("terminal LLM failure: {message}")]
    LlmTerminal {
        /// Description of the terminal failure
        message: String,
    },

    /// A removed or renamed option was supplied
    #[error("deprecated parameter: {name}")]
    DeprecatedParameter {
        /// The offending parameter name
        name: String,
        /// Replacement the caller should use instead
        replacement: String,
    },

    /// Another indexer holds the bundle's write lease
    #[error("bundle is busy: {bundle_id}")]
    BundleBusy {
        /// The contended bundle id
        bundle_id: String,
    },

    /// The enclosing operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Vector store operation error
    #[error("vector store error: {message}")]
    VectorStore {
        /// Description of the vector store failure
        message: String,
    },

    /// Configuration-related error
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// Internal invariant violation
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

impl Error {
    /// Create an embedding provider error
    pub fn embedding<S: Into<String>>(message: S) -> Self {
        Self::Embedding { message: message.into() }
    }

    /// Create a vector store error
    pub fn vector_store<S: Into<String>>(message: S) -> Self {
        Self::VectorStore { message: message.into() }
    }

    /// Create an invalid path error
    pub fn invalid_path<S: Into<String>>(message: S) -> Self {
        Self::InvalidPath { message: message.into() }
    }

    /// Create an index-corrupt error
    pub fn index_corrupt<S: Into<String>>(message: S) -> Self {
        Self::IndexCorrupt { message: message.into() }
    }

    /// Create a transient LLM error
    pub fn llm_transient<S: Into<String>>(message: S) -> Self {
        Self::LlmTransient { message: message.into() }
    }

    /// Create a terminal LLM error
    pub fn llm_terminal<S: Into<String>>(message: S) -> Self {
        Self::LlmTerminal { message: message.into() }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// The stable wire code this error maps onto.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io { source } => match source.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::FileNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
                _ => ErrorCode::Unknown,
            },
            Self::BundleNotFound { .. } => ErrorCode::BundleNotFound,
            Self::FileNotFound { .. } => ErrorCode::FileNotFound,
            Self::InvalidPath { .. } => ErrorCode::InvalidPath,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::IndexCorrupt { .. } => ErrorCode::IndexMissingOrCorrupt,
            Self::LogprobsUnsupported { .. } => ErrorCode::LogprobsUnsupported,
            Self::LlmTransient { .. } => ErrorCode::LlmTransient,
            Self::LlmTerminal { .. } => ErrorCode::LlmTerminal,
            Self::DeprecatedParameter { .. } => ErrorCode::DeprecatedParameter,
            _ => ErrorCode::Unknown,
        }
    }

    /// Recovery hint for errors that have a known next step.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::BundleNotFound { .. } => {
                Some("run index_bundle to create the bundle, or check the storage root".into())
            }
            Self::IndexCorrupt { .. } => Some("run repair_bundle to rebuild the index".into()),
            Self::LogprobsUnsupported { .. } => Some(
                "disable IG pruning (igp.enabled=false) or switch to a provider with top_logprobs"
                    .into(),
            ),
            Self::LlmTransient { .. } => {
                Some("the call is retryable; check provider availability".into())
            }
            Self::BundleBusy { .. } => {
                Some("another indexer holds the write lease; retry later".into())
            }
            Self::DeprecatedParameter { replacement, .. } => {
                Some(format!("use {replacement} instead"))
            }
            _ => None,
        }
    }

    /// Render the error the way plain-text surfaces expect it.
    pub fn render(&self) -> String {
        format!("[preflight_error kind={}] {}", self.code(), self)
    }
}
