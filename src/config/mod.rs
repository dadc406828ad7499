//! Configuration
//!
//! One [`Config`] value type carries every tunable the pipeline reads.
//! Construction is builder-style; deserialization rejects unknown fields so
//! typos in operator-supplied TOML/JSON fail loudly instead of silently
//! falling back to defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use crate::domain::error::{Error, Result};

/// Retrieval mode selectable per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetrieverMode {
    /// Dense similarity only
    Vector,
    /// BM25 keyword scoring only
    Keyword,
    /// Weighted sum of both after per-mode normalization (default)
    #[default]
    Hybrid,
}

/// Pruning strategy applied by the IG pruner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IgpStrategy {
    /// Keep candidates with `IG >= threshold`, preserving retrieval order
    #[default]
    Threshold,
    /// Keep the K candidates with the largest IG
    TopK,
    /// Rank by `γ·IG' + (1−γ)·score'` after normalizing both to [0,1]
    Combined,
}

/// What a second indexer does while a bundle's write lease is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Queue behind the current writer (default)
    #[default]
    Wait,
    /// Fail immediately with `BundleBusy`
    FailFast,
}

/// How the pruner reacts when its query is cancelled mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CancelBehavior {
    /// Return the candidates scored so far, marked `cancelled=true`
    #[default]
    Partial,
    /// Propagate `Error::Cancelled` to the caller
    Propagate,
}

/// Ingestion size limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct LimitsConfig {
    /// Per-file byte cap at normalization time
    pub max_file_bytes: u64,
    /// Total byte cap per bundle
    pub max_total_bytes: u64,
    /// Hard cap on files admitted per bundle
    pub max_total_files: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 512 * 1024,
            max_total_bytes: 50 * 1024 * 1024,
            max_total_files: 5_000,
        }
    }
}

/// Chunking behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct ChunkConfig {
    /// Maximum characters per chunk
    #[validate(range(min = 200, message = "chunks below 200 chars lose context"))]
    pub max_chars: usize,
    /// Overlap between adjacent sliding-window chunks, in characters
    pub overlap: usize,
    /// Per-file size cap at chunking time; larger files are skipped
    pub max_file_bytes: u64,
    /// Index test files as well (suppressed by default)
    pub include_tests: bool,
    /// Index generated files as well (suppressed by default)
    pub include_generated: bool,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: 2_000,
            overlap: 200,
            max_file_bytes: 100 * 1024,
            include_tests: false,
            include_generated: false,
        }
    }
}

/// Symbol admission and quota rules for the AST graph builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct AstFilterConfig {
    /// Per-bundle cap on admitted function nodes
    pub max_functions: usize,
    /// Minimum body length (lines) for undocumented functions
    pub min_function_lines: u32,
    /// Truncation budget for per-symbol content, in characters
    pub max_content_length: usize,
}

impl Default for AstFilterConfig {
    fn default() -> Self {
        Self { max_functions: 500, min_function_lines: 3, max_content_length: 2_000 }
    }
}

/// Hybrid retriever tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct RetrieverConfig {
    /// Default retrieval mode
    pub mode: RetrieverMode,
    /// Candidates returned per query
    pub top_k: usize,
    /// Hybrid weight on the vector score (`s = α·v + (1−α)·k`)
    #[validate(range(min = 0.0, max = 1.0, message = "alpha must be within [0,1]"))]
    pub alpha: f32,
    /// Graph expansion radius; 0 disables graph boosting
    pub max_hops: usize,
    /// Additive boost for graph-neighbor candidates
    #[validate(range(min = 0.0, max = 1.0, message = "graph boost must be within [0,1]"))]
    pub graph_boost: f32,
    /// Fall back to keyword-only retrieval when the embedder refuses
    pub keyword_fallback: bool,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            mode: RetrieverMode::Hybrid,
            top_k: 10,
            alpha: 0.6,
            max_hops: 2,
            graph_boost: 0.1,
            keyword_fallback: false,
        }
    }
}

/// Normalized-uncertainty calculation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct NuConfig {
    /// Top-K log-probabilities requested per token
    #[validate(range(min = 2, message = "entropy needs at least two alternatives"))]
    pub top_k: u8,
    /// Maximum completion tokens observed per probe
    pub max_tokens: u32,
}

impl Default for NuConfig {
    fn default() -> Self {
        Self { top_k: 5, max_tokens: 30 }
    }
}

/// Information-gain pruner tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct IgpConfig {
    /// Master switch; disabled means pass-through
    pub enabled: bool,
    /// Pruning strategy
    pub strategy: IgpStrategy,
    /// Keep threshold for [`IgpStrategy::Threshold`]
    pub threshold: f64,
    /// Keep count for [`IgpStrategy::TopK`]
    pub top_k: usize,
    /// Candidates probed per batch (also the in-flight cap)
    #[validate(range(min = 1, message = "batch size must be positive"))]
    pub batch_size: usize,
    /// IG weight γ for [`IgpStrategy::Combined`]
    #[validate(range(min = 0.0, max = 1.0, message = "ig weight must be within [0,1]"))]
    pub ig_weight: f64,
    /// Per-candidate content budget (characters) in conditioned prompts
    pub content_budget: usize,
    /// Cancellation behavior
    pub on_cancel: CancelBehavior,
    /// Normalized-uncertainty parameters
    #[validate(nested)]
    pub nu: NuConfig,
}

impl Default for IgpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: IgpStrategy::Threshold,
            threshold: 0.0,
            top_k: 10,
            batch_size: 5,
            ig_weight: 0.7,
            content_budget: 1_500,
            on_cancel: CancelBehavior::Partial,
            nu: NuConfig::default(),
        }
    }
}

/// LLM endpoint, timeout, and retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct LlmConfig {
    /// OpenAI-compatible API base (e.g. `https://api.openai.com/v1`)
    pub api_base: String,
    /// Bearer token; absent for unauthenticated local endpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
    /// Retry attempts for transient failures
    pub max_retries: u32,
    /// Exponential backoff base in milliseconds
    pub backoff_base_ms: u64,
    /// Exponential backoff factor
    pub backoff_factor: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:11434/v1".into(),
            api_key: None,
            model: "qwen2.5-coder:7b".into(),
            timeout_ms: 60_000,
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_factor: 2,
        }
    }
}

/// Embedding endpoint selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct EmbeddingConfig {
    /// Provider: `hash` (deterministic local) or `http` (OpenAI-compatible)
    pub provider: String,
    /// API base for the `http` provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Bearer token for the `http` provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model identifier for the `http` provider
    pub model: String,
    /// Vector dimensionality (fixed per bundle)
    #[validate(range(min = 8, message = "embedding dimension must be at least 8"))]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".into(),
            api_base: None,
            api_key: None,
            model: "hash-256".into(),
            dimensions: 256,
        }
    }
}

/// Per-process concurrency caps (semaphore permits).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct ConcurrencyConfig {
    /// In-flight LLM calls
    pub llm: usize,
    /// In-flight embedding calls
    pub embed: usize,
    /// In-flight file operations
    pub file_io: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { llm: 8, embed: 16, file_io: 32 }
    }
}

/// Answer generation and verification tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct GeneratorConfig {
    /// Total prompt character budget for enumerated evidence
    pub prompt_budget_chars: usize,
    /// Faithfulness threshold below which a retry may fire
    #[validate(range(min = 0.0, max = 1.0, message = "threshold must be within [0,1]"))]
    pub faithfulness_threshold: f32,
    /// Retry once with stricter prompting on low faithfulness
    pub retry_on_low_faithfulness: bool,
    /// Maximum answer tokens
    pub max_answer_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            prompt_budget_chars: 12_000,
            faithfulness_threshold: 0.7,
            retry_on_low_faithfulness: true,
            max_answer_tokens: 1_024,
        }
    }
}

/// Storage layout roots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields, default)]
pub struct StorageConfig {
    /// Root directory holding one subdirectory per bundle
    pub root: PathBuf,
    /// Scratch space for staging builds; defaults to `<root>/.tmp`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmp_dir: Option<PathBuf>,
    /// Read-only mirror roots consulted on lookup misses
    pub mirrors: Vec<PathBuf>,
    /// Age after which orphaned staging/deleting directories are reaped
    pub stale_dir_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./preflight-data"),
            tmp_dir: None,
            mirrors: vec![],
            stale_dir_ttl_secs: 3_600,
        }
    }
}

/// Main configuration for the preflight core.
///
/// # Example
///
/// ```rust
/// use preflight_core::config::Config;
///
/// let config = Config::builder()
///     .storage_root("/var/lib/preflight")
///     .build()
///     .unwrap();
/// assert_eq!(config.retriever.top_k, 10);
/// assert!(config.igp.enabled);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, Default)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Ingestion size limits
    #[validate(nested)]
    pub limits: LimitsConfig,
    /// Chunking behavior
    #[validate(nested)]
    pub chunk: ChunkConfig,
    /// AST symbol admission rules
    #[validate(nested)]
    pub ast_filter: AstFilterConfig,
    /// Retriever tuning
    #[validate(nested)]
    pub retriever: RetrieverConfig,
    /// IG pruner tuning
    #[validate(nested)]
    pub igp: IgpConfig,
    /// LLM endpoint and retry policy
    #[validate(nested)]
    pub llm: LlmConfig,
    /// Embedding endpoint
    #[validate(nested)]
    pub embedding: EmbeddingConfig,
    /// Concurrency caps
    #[validate(nested)]
    pub concurrency: ConcurrencyConfig,
    /// Generation and verification
    #[validate(nested)]
    pub generator: GeneratorConfig,
    /// Storage roots
    #[validate(nested)]
    pub storage: StorageConfig,
    /// Indexer contention policy
    pub busy_policy: BusyPolicy,
}

impl Config {
    /// Start building a configuration from defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder { config: Config::default() }
    }

    /// Validate cross-field invariants on top of the derive-level rules.
    pub fn validated(self) -> Result<Self> {
        Validate::validate(&self)
            .map_err(|e| Error::config(format!("invalid configuration: {e}")))?;
        if self.chunk.overlap >= self.chunk.max_chars {
            return Err(Error::config("chunk.overlap must be smaller than chunk.max_chars"));
        }
        if self.embedding.provider == "http" && self.embedding.api_base.is_none() {
            return Err(Error::config("embedding.api_base is required for the http provider"));
        }
        Ok(self)
    }

    /// Effective staging scratch directory.
    pub fn tmp_dir(&self) -> PathBuf {
        self.storage.tmp_dir.clone().unwrap_or_else(|| self.storage.root.join(".tmp"))
    }
}

/// Builder-style construction for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the bundle storage root.
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage.root = root.into();
        self
    }

    /// Replace the retriever section.
    pub fn retriever(mut self, retriever: RetrieverConfig) -> Self {
        self.config.retriever = retriever;
        self
    }

    /// Replace the IG pruner section.
    pub fn igp(mut self, igp: IgpConfig) -> Self {
        self.config.igp = igp;
        self
    }

    /// Replace the LLM section.
    pub fn llm(mut self, llm: LlmConfig) -> Self {
        self.config.llm = llm;
        self
    }

    /// Replace the embedding section.
    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.config.embedding = embedding;
        self
    }

    /// Replace the chunking section.
    pub fn chunk(mut self, chunk: ChunkConfig) -> Self {
        self.config.chunk = chunk;
        self
    }

    /// Replace the generator section.
    pub fn generator(mut self, generator: GeneratorConfig) -> Self {
        self.config.generator = generator;
        self
    }

    /// Set the indexer contention policy.
    pub fn busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.config.busy_policy = policy;
        self
    }

    /// Finish, validating the assembled configuration.
    pub fn build(self) -> Result<Config> {
        self.config.validated()
    }
}
