//! Preflight bundle domain model
//!
//! Defines the value types flowing through the retrieval-and-pruning
//! pipeline, from normalized source files to the chunks that land in the
//! vector store and the evidence pointers cited back to callers.
//!
//! ## Core Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Chunk`] | The atomic unit of retrieval: text + metadata + stable id |
//! | [`ChunkMetadata`] | Namespace filter fields attached to every chunk |
//! | [`NormalizedFile`] | LF-normalized file content with its SHA-256 |
//! | [`EvidencePointer`] | Citation unit surfaced with every answer |
//! | [`TraceLink`] | Directed traceability edge consumed from the trace store |
//! | [`IndexReport`] | Result summary of one indexing run |
//!
//! Chunk ids are deterministic: identical `(bundle, repo, path, range,
//! content)` inputs always produce the same id, which keeps re-indexing
//! idempotent and makes tie-breaks reproducible across runs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use validator::Validate;

/// Origin of a chunk within a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// A whole documentation file
    Doc,
    /// A code symbol or code window
    Code,
    /// A headed section split out of a documentation file
    Section,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Doc => write!(f, "doc"),
            Self::Code => write!(f, "code"),
            Self::Section => write!(f, "section"),
        }
    }
}

/// Where a repo inside a bundle came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    /// Fetched from a GitHub remote
    Github,
    /// Snapshotted from a local working tree
    Local,
    /// Library documentation
    Library,
}

/// Detected character of a repository's content.
///
/// Drives which chunking strategy the indexer applies; see the
/// classification rules on [`crate::indexing::classify_repo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoClassification {
    /// Predominantly source code
    Code,
    /// Predominantly prose (guides, awesome-lists, skill packs)
    Documentation,
    /// A mix of both
    Hybrid,
}

/// Languages the symbol extractors understand.
///
/// Anything else falls through to the generic extractor and sliding-window
/// chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// Rust source
    Rust,
    /// Python source
    Python,
    /// JavaScript source
    JavaScript,
    /// TypeScript source (including `.tsx`)
    TypeScript,
    /// Go source
    Go,
    /// Java source
    Java,
    /// Markdown prose
    Markdown,
    /// JSON data
    Json,
    /// YAML data
    Yaml,
    /// TOML data
    Toml,
    /// Plain text
    PlainText,
    /// Unrecognized extension
    Unknown,
}

impl Language {
    /// Map a file extension (without the dot) to a language tag.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
            "ts" | "mts" | "cts" | "tsx" => Language::TypeScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "md" | "markdown" | "mdx" => Language::Markdown,
            "json" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            "toml" => Language::Toml,
            "txt" | "text" | "rst" => Language::PlainText,
            _ => Language::Unknown,
        }
    }

    /// Whether files of this language count toward the code ratio.
    pub fn is_code(&self) -> bool {
        matches!(
            self,
            Language::Rust
                | Language::Python
                | Language::JavaScript
                | Language::TypeScript
                | Language::Go
                | Language::Java
        )
    }

    /// Whether files of this language are treated as documentation.
    pub fn is_documentation(&self) -> bool {
        matches!(self, Language::Markdown | Language::PlainText)
    }
}

/// Dense vector representation of a text, produced by an embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Embedding {
    /// The embedding vector values
    pub vector: Vec<f32>,
    /// Name of the model that generated this embedding
    pub model: String,
    /// Dimensionality of the embedding vector
    pub dimensions: usize,
}

/// A file inside a repo after normalization.
///
/// Content is always UTF-8 with LF line endings; the hash is taken over the
/// normalized bytes so checkout-time CRLF churn never changes identities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedFile {
    /// Relative posix path within the repo
    pub path: String,
    /// Normalized (LF) content
    pub content: String,
    /// SHA-256 hex digest of the normalized content
    pub sha256: String,
    /// Language tag derived from the extension
    pub language: Language,
}

impl NormalizedFile {
    /// Build a normalized file from raw text, converting CRLF/CR to LF.
    pub fn new(path: impl Into<String>, raw: &str) -> Self {
        let path = path.into();
        let content = normalize_newlines(raw);
        let sha256 = sha256_hex(content.as_bytes());
        let language = path
            .rsplit('.')
            .next()
            .map(Language::from_extension)
            .unwrap_or(Language::Unknown);
        Self { path, content, sha256, language }
    }

}

/// Normalize CRLF and lone CR to LF.
pub fn normalize_newlines(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// SHA-256 hex digest of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Inclusive line range inside a source file (1-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    /// First line of the range
    pub start_line: u32,
    /// Last line of the range (inclusive)
    pub end_line: u32,
}

impl std::fmt::Display for LineRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start_line, self.end_line)
    }
}

/// Symbol attribution for code chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRef {
    /// Symbol name as it appears in source
    pub name: String,
    /// Symbol kind (function, class, ...)
    pub kind: String,
}

/// Namespace and provenance metadata attached to every chunk.
///
/// `bundle_id` must equal the namespace the chunk is stored under; the
/// vector store rejects cross-bundle writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Owning bundle
    pub bundle_id: Uuid,
    /// Owning repo (`owner/name`)
    pub repo_id: String,
    /// What kind of source produced this chunk
    pub source_type: SourceType,
    /// Relative posix path of the source file
    pub file_path: String,
    /// Line range covered by the chunk, when line-addressable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_range: Option<LineRange>,
    /// Symbol this chunk was cut around, for symbol-level code chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<SymbolRef>,
    /// Heading lineage for doc sections (outermost first)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub heading_path: Vec<String>,
    /// Importance score in [0,1] carried over from the AST builder
    #[serde(default)]
    pub importance: f32,
}

/// The atomic unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Chunk {
    /// Deterministic content-addressed id
    #[validate(length(min = 1, message = "chunk id cannot be empty"))]
    pub id: String,
    /// UTF-8 chunk text, bounded by `chunk.max_chars`
    #[validate(length(min = 1, message = "chunk content cannot be empty"))]
    pub content: String,
    /// Namespace and provenance metadata
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Compute the stable chunk id.
    ///
    /// The id is a SHA-256 over `(bundle_id, repo_id, path, start_line,
    /// end_line, sha256(content))`, so it is collision-free under identical
    /// inputs and changes whenever any source byte changes.
    pub fn stable_id(
        bundle_id: &Uuid,
        repo_id: &str,
        path: &str,
        range: LineRange,
        content: &str,
    ) -> String {
        let content_hash = sha256_hex(content.as_bytes());
        let mut hasher = Sha256::new();
        hasher.update(bundle_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(repo_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(path.as_bytes());
        hasher.update(b"\0");
        hasher.update(range.start_line.to_le_bytes());
        hasher.update(range.end_line.to_le_bytes());
        hasher.update(b"\0");
        hasher.update(content_hash.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// `path:start-end` label used in evidence prompts and log lines.
    pub fn location(&self) -> String {
        match self.metadata.line_range {
            Some(range) => format!("{}:{}", self.metadata.file_path, range),
            None => self.metadata.file_path.clone(),
        }
    }
}

/// A chunk paired with a retrieval or pruning score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The retrieved chunk
    pub chunk: Chunk,
    /// Score in [0,1]; 1 is best
    pub score: f32,
}

/// Column-aware range inside an evidence pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRange {
    /// First line (1-indexed)
    pub start_line: u32,
    /// Last line (inclusive)
    pub end_line: u32,
    /// Optional start column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_col: Option<u32>,
    /// Optional end column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_col: Option<u32>,
}

/// Citation unit: every user-visible fact must be traceable to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidencePointer {
    /// Relative posix path of the cited file
    pub path: String,
    /// Cited range within the file
    pub range: EvidenceRange,
    /// Optional resolvable URI for the citation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Optional verbatim snippet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// SHA-256 of the snippet, when a snippet is attached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet_sha256: Option<String>,
}

impl EvidencePointer {
    /// Build an evidence pointer from a chunk, attaching a snippet hash.
    pub fn from_chunk(chunk: &Chunk) -> Self {
        let range = chunk.metadata.line_range.unwrap_or(LineRange { start_line: 1, end_line: 1 });
        Self {
            path: chunk.metadata.file_path.clone(),
            range: EvidenceRange {
                start_line: range.start_line,
                end_line: range.end_line,
                start_col: None,
                end_col: None,
            },
            uri: None,
            snippet: Some(chunk.content.clone()),
            snippet_sha256: Some(sha256_hex(chunk.content.as_bytes())),
        }
    }
}

/// Relation types carried on traceability links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceLinkType {
    /// Target exercises the source in a test
    TestedBy,
    /// Target documents the source
    Documents,
    /// Target implements the source contract
    Implements,
    /// Loose association
    RelatesTo,
    /// Source is an entry point of the target
    EntrypointOf,
    /// Source depends on the target
    DependsOn,
}

/// How a trace link was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceLinkMethod {
    /// Exact structural match
    Exact,
    /// Heuristic match with sub-1.0 confidence
    Heuristic,
}

/// Directed traceability edge between two identifiers.
///
/// Consumed from the trace store; the core never writes these. A link
/// without evidence is invalid and is rejected at deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TraceLink {
    /// Source identifier
    pub src: String,
    /// Target identifier
    pub tgt: String,
    /// Relation type
    #[serde(rename = "type")]
    pub link_type: TraceLinkType,
    /// Confidence in [0,1]
    #[validate(range(min = 0.0, max = 1.0, message = "confidence must be within [0,1]"))]
    pub confidence: f64,
    /// How the link was established
    pub method: TraceLinkMethod,
    /// Supporting evidence (at least one pointer)
    #[validate(length(min = 1, message = "trace links require at least one evidence pointer"))]
    pub evidence: Vec<EvidencePointer>,
}

/// One non-fatal problem recorded during indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexWarning {
    /// File or unit the problem occurred on
    pub path: String,
    /// Human-readable description
    pub message: String,
}

/// Result summary of one indexing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IndexReport {
    /// Chunks written to the vector store
    pub chunks_written: usize,
    /// AST nodes admitted into the knowledge graph
    pub entities: usize,
    /// AST edges admitted into the knowledge graph
    pub relations: usize,
    /// Non-fatal per-file problems
    pub errors: Vec<IndexWarning>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

/// A recoverable problem reported alongside a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    /// Stable warning code (reuses the error-code vocabulary)
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// Whether the operation still produced a usable result
    pub recoverable: bool,
}

/// Per-query statistics returned with every answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryStats {
    /// Candidates returned by the retriever
    pub chunks_retrieved: usize,
    /// Candidates surviving the IG pruner
    pub chunks_after_pruning: usize,
    /// Baseline normalized uncertainty of the bare question
    pub baseline_nu: f64,
    /// LLM batches issued by the pruner
    pub batches_used: usize,
    /// Retrieval wall-clock in milliseconds
    pub retrieval_ms: u64,
    /// Pruning wall-clock in milliseconds
    pub pruning_ms: u64,
    /// Generation wall-clock in milliseconds
    pub generation_ms: u64,
}
