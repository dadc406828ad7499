//! Fallback symbol extraction using regex patterns
//!
//! Used when no tree-sitter grammar covers a language or parsing fails.
//! Declaration lines are pattern-matched and blocks are closed by brace
//! counting; languages without braces end a block at the next declaration.
//! Patterns are precompiled once at construction.

use super::{FileExtraction, RawSymbol, SymbolExtractor};
use crate::domain::ast::AstNodeKind;
use crate::domain::error::Result;
use regex::Regex;

struct DeclarationPattern {
    regex: Regex,
    kind: AstNodeKind,
}

/// Generic declaration extractor for unsupported languages.
pub struct FallbackExtractor {
    patterns: Vec<DeclarationPattern>,
    export_marker: Regex,
}

impl FallbackExtractor {
    /// Create the extractor with its precompiled pattern set.
    pub fn new() -> Self {
        let spec: &[(&str, AstNodeKind)] = &[
            (r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_]\w*)", AstNodeKind::Class),
            (r"^\s*(?:export\s+)?interface\s+([A-Za-z_]\w*)", AstNodeKind::Interface),
            (r"^\s*(?:export\s+)?enum\s+([A-Za-z_]\w*)", AstNodeKind::Enum),
            (r"^\s*(?:export\s+)?(?:async\s+)?function\s+([A-Za-z_]\w*)", AstNodeKind::Function),
            (r"^\s*(?:pub(?:\([^)]*\))?\s+)?fn\s+([A-Za-z_]\w*)", AstNodeKind::Function),
            (r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)", AstNodeKind::Function),
            (r"^\s*func\s+(?:\([^)]*\)\s+)?([A-Za-z_]\w*)", AstNodeKind::Function),
        ];
        let patterns = spec
            .iter()
            .filter_map(|(pattern, kind)| {
                Regex::new(pattern).ok().map(|regex| DeclarationPattern { regex, kind: *kind })
            })
            .collect();
        Self {
            patterns,
            export_marker: Regex::new(r"^\s*(export\s|pub\s|pub\()").expect("export marker is valid"),
        }
    }

    fn match_declaration(&self, line: &str) -> Option<(String, AstNodeKind)> {
        for pattern in &self.patterns {
            if let Some(caps) = pattern.regex.captures(line) {
                if let Some(name) = caps.get(1) {
                    return Some((name.as_str().to_string(), pattern.kind));
                }
            }
        }
        None
    }
}

impl Default for FallbackExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolExtractor for FallbackExtractor {
    fn extract(&self, source: &str) -> Result<FileExtraction> {
        let lines: Vec<&str> = source.lines().collect();
        let mut out = FileExtraction::default();
        let mut i = 0usize;

        while i < lines.len() {
            let Some((name, kind)) = self.match_declaration(lines[i]) else {
                i += 1;
                continue;
            };

            let doc = leading_comment(&lines, i);
            let is_exported = self.export_marker.is_match(lines[i]);
            let start = i;
            let mut open = 0usize;
            let mut close = 0usize;
            let mut end = i;
            let mut saw_brace = false;

            for (offset, line) in lines[i..].iter().enumerate() {
                // A new declaration before any brace closes the block.
                if offset > 0 && !saw_brace && self.match_declaration(line).is_some() {
                    break;
                }
                open += line.matches('{').count();
                close += line.matches('}').count();
                if open > 0 {
                    saw_brace = true;
                }
                end = i + offset;
                if saw_brace && open == close {
                    break;
                }
            }

            let content = lines[start..=end].join("\n");
            if content.len() >= 20 {
                out.symbols.push(RawSymbol {
                    name,
                    kind,
                    start_line: start as u32 + 1,
                    end_line: end as u32 + 1,
                    is_exported,
                    doc,
                    content,
                });
            }
            i = end + 1;
        }
        Ok(out)
    }
}

/// Comment lines directly above a declaration.
fn leading_comment(lines: &[&str], decl_idx: usize) -> Option<String> {
    let mut collected = Vec::new();
    let mut idx = decl_idx;
    while idx > 0 {
        idx -= 1;
        let trimmed = lines[idx].trim();
        let is_comment = trimmed.starts_with("//")
            || trimmed.starts_with('#')
            || trimmed.starts_with('*')
            || trimmed.starts_with("/*");
        if !is_comment {
            break;
        }
        let cleaned = trimmed
            .trim_start_matches("///")
            .trim_start_matches("//")
            .trim_start_matches("/**")
            .trim_start_matches("/*")
            .trim_start_matches('*')
            .trim_start_matches('#')
            .trim_end_matches("*/")
            .trim();
        if !cleaned.is_empty() {
            collected.push(cleaned.to_string());
        }
    }
    if collected.is_empty() {
        return None;
    }
    collected.reverse();
    Some(collected.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn go_functions_are_matched() {
        let source = "// Serve starts the listener loop and blocks.\nfunc Serve(addr string) error {\n\treturn listen(addr)\n}\n";
        let out = FallbackExtractor::new().extract(source).unwrap();
        assert_eq!(out.symbols.len(), 1);
        assert_eq!(out.symbols[0].name, "Serve");
        assert_eq!(out.symbols[0].kind, AstNodeKind::Function);
        assert!(out.symbols[0].doc.as_deref().unwrap().starts_with("Serve starts"));
    }

    #[test]
    fn braceless_blocks_end_at_next_declaration() {
        let source = "def first(x):\n    return x + 1\n\ndef second(y):\n    return y - 1\n";
        let out = FallbackExtractor::new().extract(source).unwrap();
        let names: Vec<_> = out.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn tiny_fragments_are_ignored() {
        let source = "fn x(){}\n";
        let out = FallbackExtractor::new().extract(source).unwrap();
        assert!(out.symbols.is_empty());
    }

    #[test]
    fn export_markers_are_detected() {
        let source = "export class Router {\n  route() { return 1; }\n}\n";
        let out = FallbackExtractor::new().extract(source).unwrap();
        assert!(out.symbols[0].is_exported);
    }
}
