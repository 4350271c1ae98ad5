// Build scheduling output: the job-execution system's side of a trigger

use crate::errors::QueueError;
use crate::models::{Cause, TriggerCause};
use crate::queue::nats::NatsClient;
use async_nats::jetstream::context::PublishAckFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Message asking the job-execution system to run a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    /// Identifier of the run to create, also used for deduplication
    pub run_id: Uuid,
    pub job: String,
    pub delay_seconds: u64,
    pub causes: Vec<Cause>,
    pub requested_at: DateTime<Utc>,
}

impl BuildRequest {
    pub fn new(job: &str, delay_seconds: u64, cause: TriggerCause) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job: job.to_string(),
            delay_seconds,
            causes: vec![Cause::FilesFound(cause)],
            requested_at: Utc::now(),
        }
    }
}

/// The host job-execution system as seen by a trigger
#[async_trait::async_trait]
pub trait BuildScheduler: Send + Sync {
    /// Ask for `job` to be built after `delay_seconds`, attaching `cause`
    async fn schedule_build(
        &self,
        job: &str,
        delay_seconds: u64,
        cause: TriggerCause,
    ) -> Result<Uuid, QueueError>;
}

/// Publishes build requests to JetStream
pub struct NatsBuildScheduler {
    client: NatsClient,
    publish_timeout: Duration,
}

impl NatsBuildScheduler {
    pub fn new(client: NatsClient) -> Self {
        Self {
            client,
            publish_timeout: Duration::from_secs(5),
        }
    }

    fn subject(&self, job: &str) -> String {
        format!("{}.builds.{}", self.client.config().subject_prefix, job)
    }
}

#[async_trait::async_trait]
impl BuildScheduler for NatsBuildScheduler {
    #[instrument(skip(self, cause))]
    async fn schedule_build(
        &self,
        job: &str,
        delay_seconds: u64,
        cause: TriggerCause,
    ) -> Result<Uuid, QueueError> {
        let request = BuildRequest::new(job, delay_seconds, cause);
        let payload = serde_json::to_vec(&request)?;

        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", request.run_id.to_string().as_str());
        headers.insert("Job", job);

        let publish_future: PublishAckFuture = self
            .client
            .jetstream()
            .publish_with_headers(self.subject(job), headers, payload.into())
            .await
            .map_err(|e| QueueError::PublishFailed(format!("Failed to publish message: {}", e)))?;

        match tokio::time::timeout(self.publish_timeout, publish_future).await {
            Ok(Ok(ack)) => {
                info!(run_id = %request.run_id, sequence = ack.sequence, "Build request published");
                Ok(request.run_id)
            }
            Ok(Err(e)) => Err(QueueError::PublishFailed(format!(
                "Publish not acknowledged: {}",
                e
            ))),
            Err(_) => {
                warn!(run_id = %request.run_id, "Timed out waiting for publish acknowledgement");
                Err(QueueError::Timeout(format!(
                    "No acknowledgement within {:?}",
                    self.publish_timeout
                )))
            }
        }
    }
}
