//! Ant-style include/exclude pattern handling.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Characters separating entries of a pattern list.
const SEPARATORS: [char; 4] = [',', ';', '\n', '\r'];

/// Split a user pattern list into its non-blank entries, in order.
pub fn split_patterns(patterns: &str) -> Vec<String> {
    patterns
        .split(SEPARATORS)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(normalize_pattern)
        .collect()
}

/// Normalize one pattern to forward-slash form relative to the base
/// directory. A trailing `/` means "everything below".
pub fn normalize_pattern(raw: &str) -> String {
    let pattern = raw.trim().replace('\\', "/");
    let mut pattern = pattern.trim_start_matches('/').to_string();
    if pattern.ends_with('/') {
        pattern.push_str("**");
    }
    pattern
}

/// Compiled include and exclude sets.
#[derive(Debug, Clone)]
pub struct PatternSet {
    includes: GlobSet,
    excludes: GlobSet,
    include_count: usize,
}

impl PatternSet {
    /// Compile both lists. Fails with the glob error text for a malformed entry.
    pub fn new(include_patterns: &str, exclude_patterns: &str) -> Result<Self, String> {
        let includes = split_patterns(include_patterns);
        let excludes = split_patterns(exclude_patterns);
        Ok(Self {
            include_count: includes.len(),
            includes: build_globset(&includes)?,
            excludes: build_globset(&excludes)?,
        })
    }

    /// No include entry was configured, so nothing can match.
    pub fn is_empty(&self) -> bool {
        self.include_count == 0
    }

    /// `relative` uses `/` separators and no leading slash.
    pub fn is_match(&self, relative: &str) -> bool {
        self.includes.is_match(relative) && !self.excludes.is_match(relative)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, String> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .backslash_escape(false)
            .build()
            .map_err(|e| format!("Invalid pattern '{}': {}", pattern, e))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| e.to_string())
}
