// Scheduler binary entry point

use anyhow::Result;
use common::config::Settings;
use common::queue::{BuildScheduler, NatsBuildScheduler, NatsClient};
use common::scheduler::{EnvironmentSource, FireOutcome, Scheduler, SchedulerEngine, TriggerEvaluator};
use common::search::{LocalSearcher, SearchDispatcher, Searcher};
use common::telemetry;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.log_format,
    )?;
    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    info!("Starting files found scheduler");

    let triggers = settings.build_triggers().map_err(|e| {
        error!(error = %e, "Failed to load trigger definitions");
        anyhow::anyhow!("Trigger definition error: {}", e)
    })?;
    if triggers.is_empty() {
        warn!("No triggers configured");
    }
    for trigger in &triggers {
        info!(trigger = %trigger, "Trigger loaded");
    }

    // Initialize NATS client
    let nats_client = NatsClient::connect(settings.nats.clone()).await.map_err(|e| {
        error!(error = %e, "Failed to initialize NATS client");
        e
    })?;
    nats_client.initialize_stream().await.map_err(|e| {
        error!(error = %e, "Failed to initialize NATS stream");
        e
    })?;
    info!("NATS client initialized");

    let searcher = Arc::new(SearchDispatcher::new(
        Arc::new(LocalSearcher::new()),
        Some(nats_client.client().clone()),
        settings.nats.subject_prefix.clone(),
    )) as Arc<dyn Searcher>;
    let builds = Arc::new(NatsBuildScheduler::new(nats_client)) as Arc<dyn BuildScheduler>;
    let evaluator = Arc::new(TriggerEvaluator::new(searcher, builds));

    let environment = EnvironmentSource {
        globals: settings.variables.clone(),
        include_process_env: settings.scheduler.include_process_env,
    };
    let scheduler = Arc::new(SchedulerEngine::new(triggers, evaluator, environment));

    // `--once` evaluates every trigger a single time and exits
    if std::env::args().any(|arg| arg == "--once") {
        info!("Firing every trigger once");
        for outcome in scheduler.fire_all().await {
            if let FireOutcome::Completed(outcome) = outcome {
                info!(cycle = outcome.cycle(), triggered = outcome.is_triggered(), "Cycle finished");
            }
        }
        return Ok(());
    }

    // Set up graceful shutdown
    let scheduler_for_shutdown = scheduler.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal, initiating graceful shutdown"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        if let Err(e) = scheduler_for_shutdown.stop().await {
            error!(error = %e, "Error during scheduler shutdown");
        }
    });

    scheduler.start().await?;

    info!("Scheduler stopped");
    Ok(())
}
