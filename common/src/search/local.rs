// Local filesystem search

use super::pattern::PatternSet;
use super::Searcher;
use crate::errors::SearchError;
use crate::models::{SearchConfig, SearchResult};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use walkdir::WalkDir;

/// Searches the filesystem of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSearcher;

impl LocalSearcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Searcher for LocalSearcher {
    #[instrument(skip(self, config, cancel), fields(directory = %config.directory))]
    async fn search(
        &self,
        config: &SearchConfig,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, SearchError> {
        let directory = config.directory.clone();
        let includes = config.include_patterns.clone();
        let excludes = config.exclude_patterns.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || search_directory(&directory, &includes, &excludes, &cancel))
            .await
            .map_err(|e| SearchError::dispatch("local", format!("search task failed: {}", e)))?
    }
}

/// Walk `directory` and collect files matching the pattern lists.
///
/// Blocking. Validation problems come back as WARNING results and walk
/// failures as ERROR results; only cancellation is an `Err`.
pub fn search_directory(
    directory: &str,
    include_patterns: &str,
    exclude_patterns: &str,
    cancel: &CancellationToken,
) -> Result<SearchResult, SearchError> {
    let patterns = match PatternSet::new(include_patterns, exclude_patterns) {
        Ok(patterns) => patterns,
        Err(message) => return Ok(SearchResult::error(message)),
    };
    if patterns.is_empty() {
        debug!("No include patterns configured");
        return Ok(SearchResult::empty());
    }

    let base = directory.trim();
    if base.is_empty() {
        return Ok(SearchResult::warning("directory not specified"));
    }
    let base = Path::new(base);
    if !base.is_absolute() {
        return Ok(SearchResult::warning(format!(
            "directory must be absolute: {}",
            directory
        )));
    }
    match std::fs::metadata(base) {
        Err(_) => {
            return Ok(SearchResult::warning(format!(
                "directory does not exist: {}",
                directory
            )))
        }
        Ok(meta) if !meta.is_dir() => {
            return Ok(SearchResult::warning(format!(
                "not a directory: {}",
                directory
            )))
        }
        Ok(_) => {}
    }

    let mut matched = BTreeSet::new();
    for entry in WalkDir::new(base).follow_links(false) {
        if cancel.is_cancelled() {
            return Err(SearchError::Interrupted);
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => return Ok(SearchResult::error(e.to_string())),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(base) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if patterns.is_match(&relative) {
            matched.insert(relative);
        }
    }

    Ok(SearchResult::ok(matched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValidationStatus;
    use std::fs;
    use tempfile::TempDir;

    fn tree(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"x").unwrap();
        }
        dir
    }

    fn run(dir: &str, includes: &str, excludes: &str) -> SearchResult {
        search_directory(dir, includes, excludes, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_finds_matching_files_sorted() {
        let dir = tree(&["b.csv", "a.csv", "c.txt", "sub/d.csv"]);
        let result = run(dir.path().to_str().unwrap(), "**/*.csv", "");
        assert_eq!(result.status, ValidationStatus::Ok);
        let files: Vec<_> = result.matched_files.iter().cloned().collect();
        assert_eq!(files, vec!["a.csv", "b.csv", "sub/d.csv"]);
    }

    #[test]
    fn test_excluded_files_are_dropped() {
        let dir = tree(&["in/a.csv", "in/tmp/b.csv"]);
        let result = run(dir.path().to_str().unwrap(), "in/**", "**/tmp/**");
        assert_eq!(result.count(), 1);
        assert!(result.matched_files.contains("in/a.csv"));
    }

    #[test]
    fn test_directories_are_not_counted() {
        let dir = tree(&["x/y/file"]);
        let result = run(dir.path().to_str().unwrap(), "**", "");
        assert_eq!(result.count(), 1);
    }

    #[test]
    fn test_missing_directory_is_warning() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let result = run(missing.to_str().unwrap(), "*", "");
        assert_eq!(result.count(), 0);
        assert!(matches!(result.status, ValidationStatus::Warning(ref m) if m.contains("does not exist")));
    }

    #[test]
    fn test_file_as_directory_is_warning() {
        let dir = tree(&["plain"]);
        let file = dir.path().join("plain");
        let result = run(file.to_str().unwrap(), "*", "");
        assert!(matches!(result.status, ValidationStatus::Warning(_)));
    }

    #[test]
    fn test_relative_and_empty_directory_are_warnings() {
        assert!(matches!(run("relative/dir", "*", "").status, ValidationStatus::Warning(_)));
        assert!(matches!(run("", "*", "").status, ValidationStatus::Warning(_)));
    }

    #[test]
    fn test_no_patterns_means_no_matches() {
        let dir = tree(&["a", "b"]);
        let result = run(dir.path().to_str().unwrap(), "", "");
        assert_eq!(result, SearchResult::empty());
    }

    #[test]
    fn test_malformed_pattern_is_error() {
        let dir = tree(&["a"]);
        let result = run(dir.path().to_str().unwrap(), "[", "");
        assert!(matches!(result.status, ValidationStatus::Error(_)));
    }

    #[test]
    fn test_cancelled_walk_is_interrupted() {
        let dir = tree(&["a"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = search_directory(dir.path().to_str().unwrap(), "*", "", &cancel).unwrap_err();
        assert_eq!(err, SearchError::Interrupted);
    }

    #[tokio::test]
    async fn test_local_searcher_runs_search() {
        let dir = tree(&["one.csv", "two.csv"]);
        let config = SearchConfig::new(None, dir.path().to_str().unwrap(), "*.csv", "", "1");
        let result = LocalSearcher::new()
            .search(&config, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.count(), 2);
    }
}
