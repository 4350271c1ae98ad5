// Error handling framework

use thiserror::Error;

/// Crontab-related errors. Raised while a trigger is being constructed so an
/// invalid recurrence never reaches the runner.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    #[error("Crontab specification contains no schedule lines")]
    EmptySpecification,

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("No next execution time available for '{0}'")]
    NoNextExecution(String),
}

/// Failures of a single search dispatch.
///
/// Filesystem problems while walking a tree are not errors: they come back as
/// an ERROR-status [`crate::models::SearchResult`]. This enum only covers the
/// dispatch itself, and keeps interruption apart from every other failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("Search dispatch to '{node}' failed: {reason}")]
    Dispatch { node: String, reason: String },

    #[error("Search interrupted")]
    Interrupted,
}

impl SearchError {
    pub fn dispatch(node: impl Into<String>, reason: impl Into<String>) -> Self {
        SearchError::Dispatch {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

/// The only way an evaluation cycle can fail. Every per-configuration failure
/// is absorbed by the evaluator; cancellation is re-raised to the runner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("Evaluation cycle {cycle} interrupted")]
    Interrupted { cycle: u64 },
}

/// Persisted trigger definition errors
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Unsupported trigger definition version {0}")]
    UnsupportedVersion(u32),

    #[error("Trigger definition for job '{job}' is invalid: {source}")]
    InvalidSchedule {
        job: String,
        #[source]
        source: ScheduleError,
    },

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Queue-related errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to connect to queue: {0}")]
    Connection(String),

    #[error("Failed to create stream: {0}")]
    StreamCreation(String),

    #[error("Failed to subscribe: {0}")]
    Subscribe(String),

    #[error("Failed to publish message: {0}")]
    PublishFailed(String),

    #[error("Message serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Queue operation timeout: {0}")]
    Timeout(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::SerializationFailed(err.to_string())
    }
}
