//! File admission filtering
//!
//! Decides which files of a normalized tree are worth indexing. Rejections
//! are cheap path/size checks; nothing here reads file contents.

use crate::config::ChunkConfig;
use regex::Regex;
use std::sync::LazyLock;

/// Directory names never descended into.
const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".hg",
    ".svn",
    "dist",
    "build",
    "target",
    "out",
    "__pycache__",
    ".venv",
    "venv",
    ".next",
    ".nuxt",
    "vendor",
    "coverage",
    ".idea",
    ".vscode",
];

/// Exact file names that are lockfiles or tool configuration.
const LOCK_AND_CONFIG_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "Cargo.lock",
    "poetry.lock",
    "Pipfile.lock",
    "go.sum",
    "composer.lock",
    "Gemfile.lock",
    ".gitignore",
    ".gitattributes",
    ".editorconfig",
    ".prettierrc",
    ".eslintrc",
];

static TEST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?x)
        (^|/)(tests?|__tests__|spec|testdata|fixtures)(/|$)
        | \.(test|spec)\.[a-z]+$
        | _test\.[a-z]+$
    ").expect("test pattern is valid")
});

static GENERATED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?x)
        \.(min|bundle)\.(js|css)$
        | \.generated\.[a-z]+$
        | _pb2\.py$
        | \.pb\.go$
        | \.d\.ts$
        | (^|/)generated(/|$)
    ").expect("generated pattern is valid")
});

/// Why a file was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Inside an excluded directory
    ExcludedDir,
    /// A lockfile or tool-config file
    LockOrConfig,
    /// Above the per-file size cap
    TooLarge,
    /// Matches a test-file pattern
    TestFile,
    /// Matches a generated-file pattern
    Generated,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ExcludedDir => "excluded directory",
            Self::LockOrConfig => "lockfile or tool config",
            Self::TooLarge => "exceeds size cap",
            Self::TestFile => "test file",
            Self::Generated => "generated file",
        };
        write!(f, "{s}")
    }
}

/// Path/size admission filter built from the chunking configuration.
#[derive(Debug, Clone)]
pub struct FileFilter {
    max_file_bytes: u64,
    include_tests: bool,
    include_generated: bool,
}

impl FileFilter {
    /// Build a filter from configuration.
    pub fn new(config: &ChunkConfig) -> Self {
        Self {
            max_file_bytes: config.max_file_bytes,
            include_tests: config.include_tests,
            include_generated: config.include_generated,
        }
    }

    /// Whether a directory name should be skipped entirely.
    pub fn is_excluded_dir(name: &str) -> bool {
        EXCLUDED_DIRS.contains(&name)
    }

    /// Check one file; `None` means admit.
    pub fn check(&self, relative_path: &str, size_bytes: u64) -> Option<SkipReason> {
        if relative_path.split('/').any(Self::is_excluded_dir) {
            return Some(SkipReason::ExcludedDir);
        }
        let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
        if LOCK_AND_CONFIG_FILES.contains(&file_name) {
            return Some(SkipReason::LockOrConfig);
        }
        if size_bytes > self.max_file_bytes {
            return Some(SkipReason::TooLarge);
        }
        if !self.include_tests && TEST_PATTERN.is_match(relative_path) {
            return Some(SkipReason::TestFile);
        }
        if !self.include_generated && GENERATED_PATTERN.is_match(relative_path) {
            return Some(SkipReason::Generated);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> FileFilter {
        FileFilter::new(&ChunkConfig::default())
    }

    #[test]
    fn excluded_directories_are_skipped() {
        assert_eq!(
            filter().check("node_modules/lodash/index.js", 100),
            Some(SkipReason::ExcludedDir)
        );
        assert_eq!(filter().check("target/debug/build.rs", 100), Some(SkipReason::ExcludedDir));
    }

    #[test]
    fn lockfiles_are_skipped() {
        assert_eq!(filter().check("package-lock.json", 100), Some(SkipReason::LockOrConfig));
        assert_eq!(filter().check("sub/Cargo.lock", 100), Some(SkipReason::LockOrConfig));
    }

    #[test]
    fn oversized_files_are_skipped() {
        assert_eq!(filter().check("src/huge.ts", 200 * 1024), Some(SkipReason::TooLarge));
        assert_eq!(filter().check("src/ok.ts", 10 * 1024), None);
    }

    #[test]
    fn test_files_are_suppressible() {
        assert_eq!(filter().check("src/auth.test.ts", 100), Some(SkipReason::TestFile));
        assert_eq!(filter().check("tests/auth.rs", 100), Some(SkipReason::TestFile));

        let mut config = ChunkConfig::default();
        config.include_tests = true;
        let permissive = FileFilter::new(&config);
        assert_eq!(permissive.check("src/auth.test.ts", 100), None);
    }

    #[test]
    fn generated_files_are_suppressible() {
        assert_eq!(filter().check("dist_src/app.min.js", 100), Some(SkipReason::Generated));
        assert_eq!(filter().check("proto/model_pb2.py", 100), Some(SkipReason::Generated));

        let mut config = ChunkConfig::default();
        config.include_generated = true;
        let permissive = FileFilter::new(&config);
        assert_eq!(permissive.check("proto/model_pb2.py", 100), None);
    }

    #[test]
    fn ordinary_sources_pass() {
        assert_eq!(filter().check("src/retriever.rs", 4_000), None);
        assert_eq!(filter().check("README.md", 2_000), None);
    }
}
