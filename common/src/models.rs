use crate::schedule::CronSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Search configuration
// ============================================================================

/// One node/directory/pattern/threshold rule.
///
/// Every string field may contain `${NAME}` or `$NAME` placeholders which are
/// resolved by [`crate::substitution::PatternExpander`] before each scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Remote agent to search on, `None` for the local machine.
    #[serde(
        default,
        deserialize_with = "deserialize_node",
        skip_serializing_if = "Option::is_none"
    )]
    pub node: Option<String>,
    #[serde(default)]
    pub directory: String,
    /// Separated glob list, see [`crate::search::pattern::split_patterns`].
    #[serde(default, alias = "files")]
    pub include_patterns: String,
    #[serde(default, alias = "ignored_files")]
    pub exclude_patterns: String,
    #[serde(default = "default_threshold", alias = "trigger_number")]
    pub trigger_threshold: String,
}

/// A blank node name means the local machine.
fn normalize_node(node: Option<String>) -> Option<String> {
    node.filter(|n| !n.trim().is_empty())
}

fn deserialize_node<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(normalize_node)
}

pub(crate) fn default_threshold() -> String {
    "1".to_string()
}

impl SearchConfig {
    pub fn new(
        node: Option<String>,
        directory: impl Into<String>,
        include_patterns: impl Into<String>,
        exclude_patterns: impl Into<String>,
        trigger_threshold: impl Into<String>,
    ) -> Self {
        Self {
            node: normalize_node(node),
            directory: directory.into(),
            include_patterns: include_patterns.into(),
            exclude_patterns: exclude_patterns.into(),
            trigger_threshold: trigger_threshold.into(),
        }
    }

    /// True when the search runs on the machine evaluating the trigger.
    pub fn is_local(&self) -> bool {
        self.node.as_deref().map_or(true, |n| n.trim().is_empty())
    }

    /// Parse the threshold. Anything other than a non-negative integer makes
    /// the configuration non-triggering for the cycle.
    pub fn parsed_threshold(&self) -> Option<u64> {
        self.trigger_threshold.trim().parse::<u64>().ok()
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::new(None, "", "", "", default_threshold())
    }
}

impl fmt::Display for SearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SearchConfig[node={},directory={},includePatterns={},excludePatterns={},triggerThreshold={}]",
            self.node.as_deref().unwrap_or("<local>"),
            self.directory,
            self.include_patterns,
            self.exclude_patterns,
            self.trigger_threshold
        )
    }
}

/// Ordered rules of a trigger. The first rule always exists; list order is
/// evaluation priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigList {
    first: SearchConfig,
    additional: Vec<SearchConfig>,
}

impl ConfigList {
    /// Build from user configuration. An empty list yields the single default
    /// rule (no patterns, threshold "1").
    pub fn new(configs: Vec<SearchConfig>) -> Self {
        let mut configs = configs.into_iter();
        let first = configs.next().unwrap_or_default();
        Self {
            first,
            additional: configs.collect(),
        }
    }

    pub fn first(&self) -> &SearchConfig {
        &self.first
    }

    pub fn additional(&self) -> &[SearchConfig] {
        &self.additional
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchConfig> {
        std::iter::once(&self.first).chain(self.additional.iter())
    }

    pub fn len(&self) -> usize {
        1 + self.additional.len()
    }

    /// Never true; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for ConfigList {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

// ============================================================================
// Trigger
// ============================================================================

/// A validated trigger definition: a recurrence plus its ordered rules.
#[derive(Debug, Clone)]
pub struct FilesFoundTrigger {
    pub job: String,
    pub spec: CronSpec,
    pub configs: ConfigList,
}

impl FilesFoundTrigger {
    pub fn new(job: impl Into<String>, spec: CronSpec, configs: Vec<SearchConfig>) -> Self {
        Self {
            job: job.into(),
            spec,
            configs: ConfigList::new(configs),
        }
    }
}

impl fmt::Display for FilesFoundTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilesFoundTrigger[job={},spec={},configs=[", self.job, self.spec)?;
        for (i, config) in self.configs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", config)?;
        }
        f.write_str("]]")
    }
}

// ============================================================================
// Search result
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ValidationStatus {
    Ok,
    Warning(String),
    Error(String),
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::Ok => f.write_str("OK"),
            ValidationStatus::Warning(msg) => write!(f, "WARNING: {}", msg),
            ValidationStatus::Error(msg) => write!(f, "ERROR: {}", msg),
        }
    }
}

/// Outcome of one search. Paths are relative to the base directory, with `/`
/// separators, kept sorted for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub matched_files: BTreeSet<String>,
    pub status: ValidationStatus,
}

impl SearchResult {
    pub fn ok(matched_files: BTreeSet<String>) -> Self {
        Self {
            matched_files,
            status: ValidationStatus::Ok,
        }
    }

    pub fn empty() -> Self {
        Self::ok(BTreeSet::new())
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            matched_files: BTreeSet::new(),
            status: ValidationStatus::Warning(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            matched_files: BTreeSet::new(),
            status: ValidationStatus::Error(message.into()),
        }
    }

    pub fn count(&self) -> usize {
        self.matched_files.len()
    }
}

// ============================================================================
// Causes and job runs
// ============================================================================

/// Why a build was scheduled by this trigger: the expanded values of the
/// winning rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerCause {
    pub node: Option<String>,
    pub directory: String,
    pub include_patterns: String,
    pub exclude_patterns: String,
    pub trigger_threshold: String,
}

impl From<SearchConfig> for TriggerCause {
    fn from(config: SearchConfig) -> Self {
        Self {
            node: config.node,
            directory: config.directory,
            include_patterns: config.include_patterns,
            exclude_patterns: config.exclude_patterns,
            trigger_threshold: config.trigger_threshold,
        }
    }
}

impl fmt::Display for TriggerCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node.as_deref() {
            Some(node) => write!(
                f,
                "Files found on {}: {} in {}",
                node, self.include_patterns, self.directory
            ),
            None => write!(f, "Files found: {} in {}", self.include_patterns, self.directory),
        }
    }
}

/// Causes a job run can carry. The execution system may attach several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cause {
    FilesFound(TriggerCause),
    Manual { user: String },
    Upstream { job: String, run: Uuid },
}

/// A run record as handed back by the job-execution system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: Uuid,
    pub job: String,
    pub causes: Vec<Cause>,
    pub created_at: DateTime<Utc>,
}

impl JobRun {
    pub fn new(job: impl Into<String>, causes: Vec<Cause>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job: job.into(),
            causes,
            created_at: Utc::now(),
        }
    }

    /// First files-found cause attached to this run, if any.
    pub fn files_found_cause(&self) -> Option<&TriggerCause> {
        self.causes.iter().find_map(|cause| match cause {
            Cause::FilesFound(cause) => Some(cause),
            _ => None,
        })
    }
}
