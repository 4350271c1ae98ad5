// Remote search over NATS request/reply

use super::Searcher;
use crate::errors::SearchError;
use crate::models::{SearchConfig, SearchResult, ValidationStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Search request sent to an agent. Values are already expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub request_id: Uuid,
    pub directory: String,
    pub include_patterns: String,
    pub exclude_patterns: String,
}

impl SearchRequest {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            directory: config.directory.clone(),
            include_patterns: config.include_patterns.clone(),
            exclude_patterns: config.exclude_patterns.clone(),
        }
    }
}

/// Agent reply. `interrupted` is set when the agent was shut down mid-walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub request_id: Uuid,
    pub matched_files: BTreeSet<String>,
    pub status: ValidationStatus,
    #[serde(default)]
    pub interrupted: bool,
}

impl SearchResponse {
    pub fn from_result(request_id: Uuid, result: SearchResult) -> Self {
        Self {
            request_id,
            matched_files: result.matched_files,
            status: result.status,
            interrupted: false,
        }
    }

    pub fn interrupted(request_id: Uuid) -> Self {
        Self {
            request_id,
            matched_files: BTreeSet::new(),
            status: ValidationStatus::Error("agent interrupted".to_string()),
            interrupted: true,
        }
    }
}

/// Subject an agent named `node` listens on.
pub fn search_subject(prefix: &str, node: &str) -> String {
    if prefix.is_empty() {
        format!("search.{}", node)
    } else {
        format!("{}.search.{}", prefix, node)
    }
}

/// Runs the search contract on a named agent and waits for the answer.
pub struct RemoteSearcher {
    client: async_nats::Client,
    node: String,
    subject: String,
}

impl RemoteSearcher {
    pub fn new(client: async_nats::Client, subject_prefix: &str, node: impl Into<String>) -> Self {
        let node = node.into();
        Self {
            subject: search_subject(subject_prefix, &node),
            client,
            node,
        }
    }

    fn decode(&self, request_id: Uuid, payload: &[u8]) -> Result<SearchResult, SearchError> {
        let response: SearchResponse = serde_json::from_slice(payload)
            .map_err(|e| SearchError::dispatch(&self.node, format!("malformed response: {}", e)))?;
        if response.request_id != request_id {
            return Err(SearchError::dispatch(
                &self.node,
                format!(
                    "response for request {} does not match {}",
                    response.request_id, request_id
                ),
            ));
        }
        if response.interrupted {
            return Err(SearchError::dispatch(&self.node, "agent interrupted the search"));
        }
        Ok(SearchResult {
            matched_files: response.matched_files,
            status: response.status,
        })
    }
}

#[async_trait]
impl Searcher for RemoteSearcher {
    #[instrument(skip(self, config, cancel), fields(node = %self.node, directory = %config.directory))]
    async fn search(
        &self,
        config: &SearchConfig,
        cancel: &CancellationToken,
    ) -> Result<SearchResult, SearchError> {
        let request = SearchRequest::from_config(config);
        let payload = serde_json::to_vec(&request)
            .map_err(|e| SearchError::dispatch(&self.node, e.to_string()))?;

        debug!(subject = %self.subject, request_id = %request.request_id, "Dispatching remote search");

        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SearchError::Interrupted),
            reply = self.client.request(self.subject.clone(), payload.into()) => reply,
        };
        let message = reply.map_err(|e| SearchError::dispatch(&self.node, e.to_string()))?;

        self.decode(request.request_id, &message.payload)
    }
}
