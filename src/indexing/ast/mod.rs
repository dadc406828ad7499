//! AST graph building
//!
//! Per-language extractors produce raw symbols and relations from a file's
//! syntax tree; the [`AstBuilder`] scores, filters, truncates, and applies
//! the per-bundle quota before anything reaches the knowledge graph.
//!
//! ## Extractors
//!
//! | Language | Backend | Extraction |
//! |----------|---------|------------|
//! | TypeScript / JavaScript | tree-sitter | classes, interfaces, enums, functions, methods, heritage, calls |
//! | Python | tree-sitter | classes, functions, methods, superclasses, calls |
//! | Rust | tree-sitter | structs, traits, enums, functions, impl methods, calls |
//! | anything else | regex fallback | brace-matched declarations |
//!
//! Extractors are stateless and selected by file extension through a
//! dispatcher.

pub mod fallback;
pub mod python;
pub mod rust_lang;
pub mod typescript;

use crate::config::AstFilterConfig;
use crate::domain::ast::{AstEdge, AstGraph, AstNode, AstNodeKind, AstRelation};
use crate::domain::error::Result;
use crate::domain::types::{Language, NormalizedFile};
use crate::indexing::classify::{is_entry_file, is_entry_symbol};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

/// A symbol as an extractor saw it, before scoring and filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSymbol {
    /// Symbol name
    pub name: String,
    /// Symbol kind
    pub kind: AstNodeKind,
    /// First line (1-indexed)
    pub start_line: u32,
    /// Last line (inclusive)
    pub end_line: u32,
    /// Whether the symbol is exported
    pub is_exported: bool,
    /// Leading documentation, when present
    pub doc: Option<String>,
    /// Full source text of the symbol
    pub content: String,
}

/// A relation as an extractor saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRelation {
    /// Source symbol name
    pub src: String,
    /// Target symbol name
    pub tgt: String,
    /// Relation type
    pub relation: AstRelation,
}

/// Everything one file yielded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileExtraction {
    /// Symbols in declaration order
    pub symbols: Vec<RawSymbol>,
    /// Relations between symbols (possibly cross-file by name)
    pub relations: Vec<RawRelation>,
}

/// A symbol that survived admission: scored, truncated, chunk-ready.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSymbol {
    /// Symbol name
    pub name: String,
    /// Symbol kind
    pub kind: AstNodeKind,
    /// Declaring file
    pub file_path: String,
    /// First line (1-indexed)
    pub start_line: u32,
    /// Last line (inclusive)
    pub end_line: u32,
    /// Whether the symbol is exported
    pub is_exported: bool,
    /// Leading documentation, when present
    pub doc: Option<String>,
    /// Source text truncated at a natural boundary
    pub content: String,
    /// Importance in [0,1]
    pub importance: f32,
}

/// Stateless per-language symbol extractor.
pub trait SymbolExtractor: Send + Sync {
    /// Extract symbols and relations from one file's source.
    fn extract(&self, source: &str) -> Result<FileExtraction>;
}

static EXTRACTORS: LazyLock<HashMap<Language, Box<dyn SymbolExtractor>>> = LazyLock::new(|| {
    let mut map: HashMap<Language, Box<dyn SymbolExtractor>> = HashMap::new();
    map.insert(Language::TypeScript, Box::new(typescript::TypeScriptExtractor::typescript()));
    map.insert(Language::JavaScript, Box::new(typescript::TypeScriptExtractor::javascript()));
    map.insert(Language::Python, Box::new(python::PythonExtractor::new()));
    map.insert(Language::Rust, Box::new(rust_lang::RustExtractor::new()));
    map
});

static FALLBACK: LazyLock<fallback::FallbackExtractor> =
    LazyLock::new(fallback::FallbackExtractor::new);

/// Pick the extractor for a language; code languages without a dedicated
/// adapter get the regex fallback.
pub fn extractor_for(language: Language) -> &'static dyn SymbolExtractor {
    EXTRACTORS
        .get(&language)
        .map(|b| b.as_ref())
        .unwrap_or_else(|| &*FALLBACK as &dyn SymbolExtractor)
}

static TRIVIAL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(get|set)[A-Z_0-9]|^(get_|set_)[a-z0-9]|^(toString|valueOf|clone|deref)$")
        .expect("trivial-name pattern is valid")
});

/// Line span below which a trivial name is considered "short".
const TRIVIAL_SPAN_LINES: u32 = 10;

/// Scores, filters, truncates, and applies the function quota.
#[derive(Debug, Clone)]
pub struct AstBuilder {
    config: AstFilterConfig,
}

impl AstBuilder {
    /// Create a builder from configuration.
    pub fn new(config: AstFilterConfig) -> Self {
        Self { config }
    }

    /// Run the language extractor for a file, falling back to the regex
    /// extractor on parse failure.
    pub fn extract(&self, file: &NormalizedFile) -> FileExtraction {
        let extractor = extractor_for(file.language);
        match extractor.extract(&file.content) {
            Ok(extraction) => extraction,
            Err(e) => {
                debug!(path = %file.path, error = %e, "extractor failed, using fallback");
                FALLBACK.extract(&file.content).unwrap_or_default()
            }
        }
    }

    /// Apply the admission filter to one file's raw symbols.
    ///
    /// Kept, in order: everything exported or entry-point-named; otherwise
    /// documented symbols; otherwise functions/methods at or above the
    /// minimum span whose names are not trivial accessors.
    pub fn admit(&self, file: &NormalizedFile, extraction: FileExtraction) -> (Vec<ExtractedSymbol>, Vec<RawRelation>) {
        let entry_file = is_entry_file(&file.path);
        let symbols = extraction
            .symbols
            .into_iter()
            .filter(|raw| self.admits(raw))
            .map(|raw| {
                let importance = compute_importance(&raw, entry_file);
                let content = truncate_at_boundary(&raw.content, self.config.max_content_length);
                ExtractedSymbol {
                    name: raw.name,
                    kind: raw.kind,
                    file_path: file.path.clone(),
                    start_line: raw.start_line,
                    end_line: raw.end_line,
                    is_exported: raw.is_exported,
                    doc: raw.doc,
                    content,
                    importance,
                }
            })
            .collect();
        (symbols, extraction.relations)
    }

    fn admits(&self, raw: &RawSymbol) -> bool {
        // Exported symbols and entry points are always kept.
        if raw.is_exported || is_entry_symbol(&raw.name) {
            return true;
        }
        let documented = raw.doc.as_deref().map(|d| !d.trim().is_empty()).unwrap_or(false);
        let span = raw.end_line.saturating_sub(raw.start_line) + 1;

        if matches!(raw.kind, AstNodeKind::Function | AstNodeKind::Method) {
            if span < self.config.min_function_lines && !documented {
                return false;
            }
            if TRIVIAL_NAME.is_match(&raw.name) && !documented && span < TRIVIAL_SPAN_LINES {
                return false;
            }
        }
        true
    }

    /// Enforce the per-bundle function quota: when admitted functions and
    /// methods exceed the cap, keep the highest-importance ones (stable
    /// sort by importance descending, then name ascending). Non-function
    /// kinds are never evicted.
    pub fn apply_quota(&self, symbols: Vec<ExtractedSymbol>) -> Vec<ExtractedSymbol> {
        let function_count = symbols
            .iter()
            .filter(|s| matches!(s.kind, AstNodeKind::Function | AstNodeKind::Method))
            .count();
        if function_count <= self.config.max_functions {
            return symbols;
        }

        let (mut functions, others): (Vec<_>, Vec<_>) = symbols
            .into_iter()
            .partition(|s| matches!(s.kind, AstNodeKind::Function | AstNodeKind::Method));

        functions.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        functions.truncate(self.config.max_functions);

        let mut kept: Vec<ExtractedSymbol> = others.into_iter().chain(functions).collect();
        kept.sort_by(|a, b| {
            (&a.file_path, a.start_line, &a.name).cmp(&(&b.file_path, b.start_line, &b.name))
        });
        kept
    }

    /// Assemble the bundle graph from post-quota symbols and the relations
    /// observed per file. Relations whose endpoints were filtered away are
    /// dropped as dangling edges.
    pub fn build_graph(
        &self,
        symbols: &[ExtractedSymbol],
        relations: &[(String, RawRelation)],
    ) -> AstGraph {
        let mut graph = AstGraph::default();
        for symbol in symbols {
            graph.add_node(AstNode {
                name: symbol.name.clone(),
                kind: symbol.kind,
                file_path: symbol.file_path.clone(),
                start_line: symbol.start_line,
                end_line: symbol.end_line,
                description: symbol.doc.clone(),
                content: Some(symbol.content.clone()),
                importance: symbol.importance,
                is_exported: symbol.is_exported,
            });
        }
        for (src_file, relation) in relations {
            graph.add_edge(AstEdge {
                src: relation.src.clone(),
                tgt: relation.tgt.clone(),
                relation: relation.relation,
                src_file: src_file.clone(),
            });
        }
        graph.prune_dangling_edges();
        graph
    }
}

/// Importance of one raw symbol in [0,1].
///
/// Starts at 0.30; exportedness, documentation, entry-point naming, span,
/// and structural kind add bonuses; capped at 1.0.
pub fn compute_importance(raw: &RawSymbol, entry_file: bool) -> f32 {
    let mut score = 0.30f32;
    if raw.is_exported {
        score += 0.25;
    }
    match raw.doc.as_deref().map(str::trim) {
        Some(doc) if doc.len() >= 50 => score += 0.25,
        Some(doc) if !doc.is_empty() => score += 0.20,
        _ => {}
    }
    if is_entry_symbol(&raw.name) || (entry_file && matches!(raw.kind, AstNodeKind::Function)) {
        score += 0.20;
    }
    let span = raw.end_line.saturating_sub(raw.start_line) + 1;
    if span > 50 {
        score += 0.15;
    } else if span > 20 {
        score += 0.10;
    }
    if matches!(raw.kind, AstNodeKind::Class | AstNodeKind::Interface) {
        score += 0.10;
    }
    score.min(1.0)
}

/// Truncate at a natural boundary (newline, then sentence end) within the
/// budget, appending an ellipsis marker when anything was cut.
pub fn truncate_at_boundary(content: &str, max_len: usize) -> String {
    if content.len() <= max_len {
        return content.to_string();
    }
    // Find a char boundary at or below the budget first.
    let mut cut = max_len;
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = &content[..cut];
    let boundary = head
        .rfind('\n')
        .or_else(|| head.rfind(". "))
        .filter(|&idx| idx > max_len / 2)
        .unwrap_or(cut);
    format!("{}...", head[..boundary].trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, kind: AstNodeKind, lines: u32, exported: bool, doc: Option<&str>) -> RawSymbol {
        RawSymbol {
            name: name.into(),
            kind,
            start_line: 1,
            end_line: lines,
            is_exported: exported,
            doc: doc.map(str::to_string),
            content: "body".into(),
        }
    }

    #[test]
    fn importance_formula_matches_documented_bonuses() {
        // Base only.
        let plain = raw("helper", AstNodeKind::Function, 5, false, None);
        assert!((compute_importance(&plain, false) - 0.30).abs() < 1e-6);

        // Exported + long doc + class bonus.
        let doc = "A long documentation string that certainly exceeds fifty characters in total.";
        let rich = raw("Engine", AstNodeKind::Class, 60, true, Some(doc));
        // 0.30 + 0.25 + 0.25 + 0.15 + 0.10 = 1.05 → capped
        assert!((compute_importance(&rich, false) - 1.0).abs() < 1e-6);

        // Entry-point name.
        let entry = raw("main", AstNodeKind::Function, 5, false, None);
        assert!((compute_importance(&entry, false) - 0.50).abs() < 1e-6);
    }

    #[test]
    fn short_undocumented_functions_are_filtered() {
        let builder = AstBuilder::new(AstFilterConfig::default());
        let file = NormalizedFile::new("src/util.ts", "function tiny() { return 1 }\n");
        let extraction = FileExtraction {
            symbols: vec![raw("tiny", AstNodeKind::Function, 1, false, None)],
            relations: vec![],
        };
        let (kept, _) = builder.admit(&file, extraction);
        assert!(kept.is_empty());
    }

    #[test]
    fn documented_short_functions_survive() {
        let builder = AstBuilder::new(AstFilterConfig::default());
        let file = NormalizedFile::new("src/util.ts", "x\n");
        let extraction = FileExtraction {
            symbols: vec![raw("tiny", AstNodeKind::Function, 1, false, Some("does a thing"))],
            relations: vec![],
        };
        let (kept, _) = builder.admit(&file, extraction);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn trivial_accessors_are_filtered_but_exported_ones_kept() {
        let builder = AstBuilder::new(AstFilterConfig::default());
        let file = NormalizedFile::new("src/model.ts", "x\n");
        let extraction = FileExtraction {
            symbols: vec![
                raw("getName", AstNodeKind::Method, 4, false, None),
                raw("setName", AstNodeKind::Method, 4, true, None),
            ],
            relations: vec![],
        };
        let (kept, _) = builder.admit(&file, extraction);
        let names: Vec<_> = kept.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["setName"]);
    }

    #[test]
    fn quota_keeps_top_importance_with_name_tiebreak() {
        let mut config = AstFilterConfig::default();
        config.max_functions = 2;
        let builder = AstBuilder::new(config);

        let make = |name: &str, importance: f32| ExtractedSymbol {
            name: name.into(),
            kind: AstNodeKind::Function,
            file_path: "src/a.ts".into(),
            start_line: 1,
            end_line: 10,
            is_exported: true,
            doc: None,
            content: "body".into(),
            importance,
        };
        let kept = builder.apply_quota(vec![
            make("zulu", 0.9),
            make("alpha", 0.5),
            make("bravo", 0.5),
        ]);
        let names: Vec<_> = kept.iter().map(|s| s.name.as_str()).collect();
        // zulu wins outright; alpha beats bravo on the name tie-break.
        assert_eq!(names, vec!["alpha", "zulu"]);
    }

    #[test]
    fn quota_never_evicts_classes() {
        let mut config = AstFilterConfig::default();
        config.max_functions = 1;
        let builder = AstBuilder::new(config);
        let class = ExtractedSymbol {
            name: "Engine".into(),
            kind: AstNodeKind::Class,
            file_path: "src/a.ts".into(),
            start_line: 1,
            end_line: 40,
            is_exported: true,
            doc: None,
            content: "class Engine {}".into(),
            importance: 0.1,
        };
        let f = |name: &str| ExtractedSymbol {
            name: name.into(),
            kind: AstNodeKind::Function,
            file_path: "src/a.ts".into(),
            start_line: 50,
            end_line: 60,
            is_exported: true,
            doc: None,
            content: "fn".into(),
            importance: 0.8,
        };
        let kept = builder.apply_quota(vec![class, f("one"), f("two")]);
        assert!(kept.iter().any(|s| s.name == "Engine"));
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn truncation_lands_on_a_boundary_with_marker() {
        let text = "first line\nsecond line\nthird line that runs long";
        let out = truncate_at_boundary(text, 30);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 30 + 3);
        assert!(out.starts_with("first line"));
    }

    #[test]
    fn short_content_is_untouched() {
        assert_eq!(truncate_at_boundary("short", 100), "short");
    }
}
