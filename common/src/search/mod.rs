// File search engine: the `Searcher` seam and node-aware dispatch

pub mod local;
pub mod pattern;
pub mod remote;

pub use local::{search_directory, LocalSearcher};
pub use pattern::{normalize_pattern, split_patterns, PatternSet};
pub use remote::{RemoteSearcher, SearchRequest, SearchResponse};

use crate::errors::SearchError;
use crate::models::{SearchConfig, SearchResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs one search for an expanded configuration.
///
/// Implementations must return [`SearchError::Interrupted`] promptly once
/// `cancel` fires.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search(
        &self,
        config: &SearchConfig,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, SearchError>;
}

/// Routes a search to the local machine or to the agent named by `node`.
pub struct SearchDispatcher {
    local: Arc<dyn Searcher>,
    remote: Option<async_nats::Client>,
    subject_prefix: String,
}

impl SearchDispatcher {
    /// Without a NATS `remote` client, remote configurations fail with a
    /// dispatch error.
    pub fn new(
        local: Arc<dyn Searcher>,
        remote: Option<async_nats::Client>,
        subject_prefix: impl Into<String>,
    ) -> Self {
        Self {
            local,
            remote,
            subject_prefix: subject_prefix.into(),
        }
    }

    fn remote_for(&self, node: &str) -> Result<RemoteSearcher, SearchError> {
        match &self.remote {
            Some(client) => Ok(RemoteSearcher::new(client.clone(), &self.subject_prefix, node)),
            None => Err(SearchError::dispatch(node, "no connection to remote agents")),
        }
    }
}

#[async_trait]
impl Searcher for SearchDispatcher {
    async fn search(
        &self,
        config: &SearchConfig,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, SearchError> {
        match config.node.as_deref() {
            Some(node) if !config.is_local() => self.remote_for(node)?.search(config, cancel).await,
            _ => self.local.search(config, cancel).await,
        }
    }
}
