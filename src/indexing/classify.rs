//! Repository classification
//!
//! Decides which chunking strategy a repo gets by looking at the shape of
//! its file tree: mostly code, mostly prose, or a mix.

use crate::domain::types::{Language, RepoClassification};

/// Ratio below which a repo is considered documentation.
const DOC_RATIO: f64 = 0.10;
/// Ratio at or above which a repo is considered code.
const CODE_RATIO: f64 = 0.30;

/// Names that mark a file as a program entry point.
const ENTRY_STEMS: &[&str] = &["main", "index", "app", "server", "cli", "init"];

/// Whether a relative path names an entry file (`main.*`, `index.*`,
/// `lib.rs`, `mod.rs`).
pub fn is_entry_file(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    if file_name == "lib.rs" || file_name == "mod.rs" {
        return true;
    }
    let stem = file_name.split('.').next().unwrap_or(file_name);
    ENTRY_STEMS.contains(&stem)
}

/// Whether a symbol name reads like an entry point (importance bonus).
pub fn is_entry_symbol(name: &str) -> bool {
    let lower = name.to_lowercase();
    ENTRY_STEMS.iter().any(|stem| lower == *stem)
        || lower == "run"
        || lower == "start"
        || lower.starts_with("bootstrap")
}

/// Documentation indicators that force the `documentation` classification
/// regardless of the code ratio: agent instruction files, skill packs, and
/// awesome-list naming.
fn has_doc_indicator(paths: &[&str]) -> bool {
    paths.iter().any(|path| {
        let lower = path.to_lowercase();
        let file_name = lower.rsplit('/').next().unwrap_or(&lower);
        file_name == "claude.md"
            || lower.split('/').any(|component| component == "skills")
            || lower
                .split('/')
                .next()
                .map(|top| top.contains("awesome"))
                .unwrap_or(false)
    })
}

/// Classify a repo from its (relative) file paths.
///
/// Rules, in order:
/// 1. documentation indicators present, or code ratio below 0.10 →
///    [`RepoClassification::Documentation`]
/// 2. code ratio at or above 0.30 → [`RepoClassification::Code`]
/// 3. otherwise → [`RepoClassification::Hybrid`]
pub fn classify_repo(paths: &[&str]) -> RepoClassification {
    if paths.is_empty() {
        return RepoClassification::Documentation;
    }
    if has_doc_indicator(paths) {
        return RepoClassification::Documentation;
    }

    let code_files = paths
        .iter()
        .filter(|path| {
            path.rsplit('.')
                .next()
                .map(|ext| Language::from_extension(ext).is_code())
                .unwrap_or(false)
        })
        .count();
    let ratio = code_files as f64 / paths.len() as f64;

    if ratio < DOC_RATIO {
        RepoClassification::Documentation
    } else if ratio >= CODE_RATIO {
        RepoClassification::Code
    } else {
        RepoClassification::Hybrid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(ts: usize, md: usize) -> Vec<String> {
        let mut out = Vec::new();
        for i in 0..ts {
            out.push(format!("src/mod_{i}.ts"));
        }
        for i in 0..md {
            out.push(format!("docs/page_{i}.md"));
        }
        out
    }

    fn classify(owned: &[String]) -> RepoClassification {
        let refs: Vec<&str> = owned.iter().map(String::as_str).collect();
        classify_repo(&refs)
    }

    #[test]
    fn all_code_is_code() {
        assert_eq!(classify(&paths(100, 0)), RepoClassification::Code);
    }

    #[test]
    fn all_prose_is_documentation() {
        assert_eq!(classify(&paths(0, 100)), RepoClassification::Documentation);
    }

    #[test]
    fn twenty_percent_code_is_hybrid() {
        // ratio 0.20 sits between the 0.10 and 0.30 thresholds
        assert_eq!(classify(&paths(20, 80)), RepoClassification::Hybrid);
    }

    #[test]
    fn claude_md_forces_documentation() {
        let mut owned = paths(100, 0);
        owned.push("CLAUDE.md".to_string());
        assert_eq!(classify(&owned), RepoClassification::Documentation);
    }

    #[test]
    fn skills_directory_forces_documentation() {
        let mut owned = paths(50, 0);
        owned.push("skills/review/SKILL.md".to_string());
        assert_eq!(classify(&owned), RepoClassification::Documentation);
    }

    #[test]
    fn awesome_prefix_forces_documentation() {
        let owned = vec!["awesome-rust/README.md".to_string(), "awesome-rust/list.md".to_string()];
        assert_eq!(classify(&owned), RepoClassification::Documentation);
    }

    #[test]
    fn entry_files_are_recognized() {
        assert!(is_entry_file("src/main.rs"));
        assert!(is_entry_file("index.ts"));
        assert!(is_entry_file("src/lib.rs"));
        assert!(!is_entry_file("src/helpers.ts"));
    }
}
