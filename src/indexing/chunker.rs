//! Document and code chunking
//!
//! Splits normalized files into retrieval units. Documentation goes
//! through heading-aware section splitting that preserves the heading
//! lineage in metadata; code gets one chunk per admitted symbol with a
//! sliding-window fallback for files the extractors produce nothing for.

use crate::config::ChunkConfig;
use crate::domain::types::{
    Chunk, ChunkMetadata, LineRange, NormalizedFile, SourceType, SymbolRef,
};
use crate::indexing::ast::ExtractedSymbol;
use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*$").expect("heading pattern is valid"));

/// Neutral importance assigned to prose chunks; code chunks carry the
/// importance computed by the AST builder.
const DOC_IMPORTANCE: f32 = 0.5;

/// Splits files into chunks with stable ids.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    /// Create a chunker from configuration.
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Split a documentation file into headed sections.
    ///
    /// Files without any heading become a single `doc` chunk (window-split
    /// when oversized); headed files produce one `section` chunk per
    /// heading with the heading lineage recorded outermost-first.
    pub fn chunk_doc(&self, bundle_id: Uuid, repo_id: &str, file: &NormalizedFile) -> Vec<Chunk> {
        let lines: Vec<&str> = file.content.lines().collect();
        let mut sections: Vec<(Vec<String>, usize, usize, Vec<String>)> = Vec::new();

        // (heading level, title) stack for lineage tracking.
        let mut stack: Vec<(usize, String)> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_start = 0usize;
        let mut current_path: Vec<String> = Vec::new();
        let mut saw_heading = false;

        let flush = |sections: &mut Vec<(Vec<String>, usize, usize, Vec<String>)>,
                     body: &mut Vec<String>,
                     start: usize,
                     end: usize,
                     path: &[String]| {
            if body.iter().any(|l| !l.trim().is_empty()) {
                sections.push((std::mem::take(body), start, end, path.to_vec()));
            } else {
                body.clear();
            }
        };

        for (i, line) in lines.iter().enumerate() {
            if let Some(caps) = HEADING.captures(line) {
                saw_heading = true;
                flush(&mut sections, &mut current, current_start, i.saturating_sub(1), &current_path);

                let level = caps[1].len();
                let title = caps[2].to_string();
                while stack.last().map(|(l, _)| *l >= level).unwrap_or(false) {
                    stack.pop();
                }
                stack.push((level, title));
                current_path = stack.iter().map(|(_, t)| t.clone()).collect();
                current_start = i;
            }
            current.push(line.to_string());
        }
        flush(&mut sections, &mut current, current_start, lines.len().saturating_sub(1), &current_path);

        if !saw_heading {
            return self.window_chunks(bundle_id, repo_id, file, SourceType::Doc, &[]);
        }

        let mut chunks = Vec::new();
        for (body, start, end, path) in sections {
            let content = body.join("\n");
            if content.len() <= self.config.max_chars {
                chunks.push(self.make_chunk(
                    bundle_id,
                    repo_id,
                    file,
                    &content,
                    LineRange { start_line: start as u32 + 1, end_line: end as u32 + 1 },
                    SourceType::Section,
                    None,
                    path.clone(),
                    DOC_IMPORTANCE,
                ));
            } else {
                // Oversized section: window-split, keeping the lineage.
                for (window, range) in self.split_lines(&body, start) {
                    chunks.push(self.make_chunk(
                        bundle_id,
                        repo_id,
                        file,
                        &window,
                        range,
                        SourceType::Section,
                        None,
                        path.clone(),
                        DOC_IMPORTANCE,
                    ));
                }
            }
        }
        chunks
    }

    /// Turn admitted symbols into chunks; fall back to sliding windows
    /// when a code file yielded no symbols.
    pub fn chunk_code(
        &self,
        bundle_id: Uuid,
        repo_id: &str,
        file: &NormalizedFile,
        symbols: &[ExtractedSymbol],
    ) -> Vec<Chunk> {
        if symbols.is_empty() {
            return self.window_chunks(bundle_id, repo_id, file, SourceType::Code, &[]);
        }
        symbols
            .iter()
            .map(|symbol| {
                self.make_chunk(
                    bundle_id,
                    repo_id,
                    file,
                    &symbol.content,
                    LineRange { start_line: symbol.start_line, end_line: symbol.end_line },
                    SourceType::Code,
                    Some(SymbolRef { name: symbol.name.clone(), kind: symbol.kind.to_string() }),
                    vec![],
                    symbol.importance,
                )
            })
            .collect()
    }

    /// Fixed-size sliding windows over a whole file.
    fn window_chunks(
        &self,
        bundle_id: Uuid,
        repo_id: &str,
        file: &NormalizedFile,
        source_type: SourceType,
        heading_path: &[String],
    ) -> Vec<Chunk> {
        let lines: Vec<String> = file.content.lines().map(str::to_string).collect();
        if lines.is_empty() {
            return vec![];
        }
        self.split_lines(&lines, 0)
            .into_iter()
            .map(|(window, range)| {
                self.make_chunk(
                    bundle_id,
                    repo_id,
                    file,
                    &window,
                    range,
                    source_type,
                    None,
                    heading_path.to_vec(),
                    DOC_IMPORTANCE,
                )
            })
            .collect()
    }

    /// Greedy line packing into windows of at most `max_chars`, carrying
    /// `overlap` characters of trailing context into the next window.
    fn split_lines(&self, lines: &[String], first_line_idx: usize) -> Vec<(String, LineRange)> {
        let mut out = Vec::new();
        let mut window: Vec<(usize, &str)> = Vec::new();
        let mut window_chars = 0usize;

        let flush =
            |out: &mut Vec<(String, LineRange)>, window: &[(usize, &str)]| {
                if window.is_empty() {
                    return;
                }
                let content: String =
                    window.iter().map(|(_, l)| *l).collect::<Vec<_>>().join("\n");
                if content.trim().is_empty() {
                    return;
                }
                let start = window.first().map(|(i, _)| *i).unwrap_or(0);
                let end = window.last().map(|(i, _)| *i).unwrap_or(start);
                out.push((
                    content,
                    LineRange { start_line: start as u32 + 1, end_line: end as u32 + 1 },
                ));
            };

        for (offset, line) in lines.iter().enumerate() {
            let idx = first_line_idx + offset;
            let line_len = line.len() + 1;
            if window_chars + line_len > self.config.max_chars && !window.is_empty() {
                flush(&mut out, &window);
                // Keep trailing lines as overlap context.
                let mut kept = Vec::new();
                let mut kept_chars = 0usize;
                for &(i, l) in window.iter().rev() {
                    if kept_chars + l.len() + 1 > self.config.overlap {
                        break;
                    }
                    kept_chars += l.len() + 1;
                    kept.push((i, l));
                }
                kept.reverse();
                window = kept;
                window_chars = kept_chars;
            }
            // A single line longer than the budget still has to land
            // somewhere; it becomes its own oversized window.
            window.push((idx, line.as_str()));
            window_chars += line_len;
        }
        flush(&mut out, &window);
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn make_chunk(
        &self,
        bundle_id: Uuid,
        repo_id: &str,
        file: &NormalizedFile,
        content: &str,
        range: LineRange,
        source_type: SourceType,
        symbol: Option<SymbolRef>,
        heading_path: Vec<String>,
        importance: f32,
    ) -> Chunk {
        let id = Chunk::stable_id(&bundle_id, repo_id, &file.path, range, content);
        Chunk {
            id,
            content: content.to_string(),
            metadata: ChunkMetadata {
                bundle_id,
                repo_id: repo_id.to_string(),
                source_type,
                file_path: file.path.clone(),
                line_range: Some(range),
                symbol,
                heading_path,
                importance,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> Uuid {
        Uuid::parse_str("0db9a1f2-4c57-45a8-9f13-58be7c2a10dd").unwrap()
    }

    fn chunker() -> Chunker {
        Chunker::new(ChunkConfig::default())
    }

    #[test]
    fn headed_markdown_splits_into_sections_with_lineage() {
        let file = NormalizedFile::new(
            "docs/guide.md",
            "# Guide\nintro text\n## Setup\ninstall it\n## Usage\nrun it\n",
        );
        let chunks = chunker().chunk_doc(bundle(), "acme/docs", &file);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].metadata.heading_path, vec!["Guide"]);
        assert_eq!(chunks[1].metadata.heading_path, vec!["Guide", "Setup"]);
        assert_eq!(chunks[2].metadata.heading_path, vec!["Guide", "Usage"]);
        assert!(chunks.iter().all(|c| c.metadata.source_type == SourceType::Section));
    }

    #[test]
    fn heading_stack_pops_on_sibling_headings() {
        let file = NormalizedFile::new(
            "docs/deep.md",
            "# Top\n## A\nbody a\n### A1\nbody a1\n## B\nbody b\n",
        );
        let chunks = chunker().chunk_doc(bundle(), "acme/docs", &file);
        let last = chunks.last().unwrap();
        assert_eq!(last.metadata.heading_path, vec!["Top", "B"]);
    }

    #[test]
    fn headingless_files_become_one_doc_chunk() {
        let file = NormalizedFile::new("NOTES.txt", "just a short note\nwith two lines\n");
        let chunks = chunker().chunk_doc(bundle(), "acme/docs", &file);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.source_type, SourceType::Doc);
    }

    #[test]
    fn oversized_sections_are_window_split() {
        let long_line = "word ".repeat(100); // ~500 chars
        let mut content = String::from("# Big\n");
        for _ in 0..10 {
            content.push_str(&long_line);
            content.push('\n');
        }
        let file = NormalizedFile::new("docs/big.md", &content);
        let chunks = chunker().chunk_doc(bundle(), "acme/docs", &file);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.content.len() <= 2_600));
        assert!(chunks.iter().all(|c| c.metadata.heading_path == vec!["Big".to_string()]));
    }

    #[test]
    fn code_without_symbols_falls_back_to_windows() {
        let file = NormalizedFile::new("src/script.ts", "const a = 1;\nconst b = 2;\n");
        let chunks = chunker().chunk_code(bundle(), "acme/api", &file, &[]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.source_type, SourceType::Code);
        assert!(chunks[0].metadata.symbol.is_none());
    }

    #[test]
    fn chunk_ids_are_stable_across_runs() {
        let file = NormalizedFile::new("docs/guide.md", "# Guide\nsome text\n");
        let a = chunker().chunk_doc(bundle(), "acme/docs", &file);
        let b = chunker().chunk_doc(bundle(), "acme/docs", &file);
        assert_eq!(a[0].id, b[0].id);
    }
}
