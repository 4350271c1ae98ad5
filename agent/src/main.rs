// Search agent binary entry point

use anyhow::Result;
use common::agent::SearchAgent;
use common::config::Settings;
use common::telemetry;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    settings
        .validate_agent()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.log_format,
    )?;
    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    info!(node = %settings.agent.name, "Starting files found search agent");

    let client = async_nats::connect(&settings.nats.url).await.map_err(|e| {
        error!(error = %e, "Failed to connect to NATS");
        anyhow::anyhow!("NATS connection error: {}", e)
    })?;
    info!("NATS client initialized");

    let agent = SearchAgent::new(settings.agent.name.clone());
    let cancel = CancellationToken::new();

    let serve_cancel = cancel.clone();
    let subject_prefix = settings.nats.subject_prefix.clone();
    let queue_group = settings.agent.queue_group.clone();
    let agent_handle = tokio::spawn(async move {
        if let Err(e) = agent
            .serve(client, &subject_prefix, &queue_group, serve_cancel)
            .await
        {
            error!(error = %e, "Search agent error");
        }
    });

    // Wait for shutdown signal
    info!("Agent is running. Press Ctrl+C to shutdown gracefully");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, initiating graceful shutdown");
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    }
    cancel.cancel();

    info!("Waiting for in-flight searches to be answered");
    if !wait_for_agent(agent_handle).await {
        anyhow::bail!("Search agent task failed");
    }

    info!("Agent shutdown complete");
    Ok(())
}

/// Join the serving task. Returns false when it panicked or was aborted.
async fn wait_for_agent(handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, panicked = e.is_panic(), "Search agent task did not finish cleanly");
            false
        }
    }
}
