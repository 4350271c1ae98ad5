// Search agent answering remote search requests for one node

use crate::errors::{QueueError, SearchError};
use crate::models::SearchResult;
use crate::search::local::search_directory;
use crate::search::remote::{search_subject, SearchRequest, SearchResponse};
use futures::StreamExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Serves the search contract for the node named `name`.
#[derive(Debug, Clone)]
pub struct SearchAgent {
    name: String,
}

impl SearchAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Answer one encoded request with one encoded response.
    ///
    /// Never fails: malformed requests are answered with an ERROR status and
    /// a nil request id, shutdown mid-walk with an interrupted response.
    #[instrument(skip(self, payload, cancel), fields(node = %self.name))]
    pub async fn handle(&self, payload: &[u8], cancel: &CancellationToken) -> Vec<u8> {
        let response = match serde_json::from_slice::<SearchRequest>(payload) {
            Ok(request) => self.search(request, cancel).await,
            Err(e) => {
                warn!(error = %e, "Malformed search request");
                SearchResponse::from_result(
                    Uuid::nil(),
                    SearchResult::error(format!("malformed request: {}", e)),
                )
            }
        };

        // A response of plain strings and a tagged enum always serializes.
        serde_json::to_vec(&response).unwrap_or_default()
    }

    async fn search(&self, request: SearchRequest, cancel: &CancellationToken) -> SearchResponse {
        let request_id = request.request_id;
        debug!(
            request_id = %request_id,
            directory = %request.directory,
            "Searching on behalf of scheduler"
        );

        let cancel = cancel.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            search_directory(
                &request.directory,
                &request.include_patterns,
                &request.exclude_patterns,
                &cancel,
            )
        })
        .await;

        match outcome {
            Ok(Ok(result)) => {
                debug!(
                    request_id = %request_id,
                    matched = result.count(),
                    status = %result.status,
                    "Search finished"
                );
                SearchResponse::from_result(request_id, result)
            }
            Ok(Err(SearchError::Interrupted)) => {
                info!(request_id = %request_id, "Search interrupted by shutdown");
                SearchResponse::interrupted(request_id)
            }
            Ok(Err(e)) => SearchResponse::from_result(request_id, SearchResult::error(e.to_string())),
            Err(e) => {
                error!(request_id = %request_id, error = %e, "Search task failed");
                SearchResponse::from_result(
                    request_id,
                    SearchResult::error(format!("search task failed: {}", e)),
                )
            }
        }
    }

    /// Subscribe to this node's subject and answer requests until `cancel`
    /// fires. Agents sharing a name share the load through `queue_group`.
    /// In-flight searches are interrupted and answered before returning.
    #[instrument(skip(self, client, cancel), fields(node = %self.name))]
    pub async fn serve(
        &self,
        client: async_nats::Client,
        subject_prefix: &str,
        queue_group: &str,
        cancel: CancellationToken,
    ) -> Result<(), QueueError> {
        let subject = search_subject(subject_prefix, &self.name);
        let mut subscriber = client
            .queue_subscribe(subject.clone(), queue_group.to_string())
            .await
            .map_err(|e| QueueError::Subscribe(format!("Failed to subscribe to {}: {}", subject, e)))?;

        info!(subject = %subject, queue_group = %queue_group, "Search agent listening");

        let mut in_flight = JoinSet::new();
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = subscriber.next() => message,
            };
            let Some(message) = message else {
                warn!("Subscription closed");
                break;
            };
            let Some(reply) = message.reply.clone() else {
                warn!("Search request without reply subject, ignoring");
                continue;
            };

            let agent = self.clone();
            let client = client.clone();
            let cancel = cancel.child_token();
            in_flight.spawn(async move {
                let response = agent.handle(&message.payload, &cancel).await;
                if let Err(e) = client.publish(reply, response.into()).await {
                    error!(error = %e, "Failed to publish search response");
                }
            });

            // Reap finished handlers so the set does not grow unbounded.
            while in_flight.try_join_next().is_some() {}
        }

        info!(pending = in_flight.len(), "Search agent stopping");
        while in_flight.join_next().await.is_some() {}
        if let Err(e) = client.flush().await {
            warn!(error = %e, "Failed to flush pending responses");
        }
        Ok(())
    }
}
