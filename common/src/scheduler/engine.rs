// Recurring invocation of trigger evaluation

use crate::errors::{EvaluationError, ScheduleError};
use crate::models::FilesFoundTrigger;
use crate::scheduler::evaluator::{CycleOutcome, TriggerEvaluator};
use crate::substitution::{build_environment, Environment};
use crate::telemetry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Where the expansion environment of each cycle comes from.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSource {
    pub globals: Environment,
    pub include_process_env: bool,
}

impl EnvironmentSource {
    /// A fresh environment for one cycle.
    pub fn snapshot(&self) -> Environment {
        build_environment(&self.globals, self.include_process_env)
    }
}

/// Result of asking a runner to fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Completed(CycleOutcome),
    /// A cycle was already running; this fire was coalesced into it.
    Skipped,
    Interrupted { cycle: u64 },
}

/// Marks a runner busy for the lifetime of the guard.
struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl BusyGuard {
    fn try_acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { busy: busy.clone() })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Drives one trigger: sleeps until the next fire time of its crontab, runs
/// a cycle, repeats. Cycles of one runner never overlap.
pub struct TriggerRunner {
    trigger: Arc<FilesFoundTrigger>,
    evaluator: Arc<TriggerEvaluator>,
    environment: EnvironmentSource,
    busy: Arc<AtomicBool>,
}

impl TriggerRunner {
    pub fn new(
        trigger: FilesFoundTrigger,
        evaluator: Arc<TriggerEvaluator>,
        environment: EnvironmentSource,
    ) -> Self {
        Self {
            trigger: Arc::new(trigger),
            evaluator,
            environment,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn trigger(&self) -> &FilesFoundTrigger {
        &self.trigger
    }

    /// Run one cycle now unless one is already in progress.
    #[instrument(skip_all, fields(job = %self.trigger.job))]
    pub async fn fire_now(&self, cancel: &CancellationToken) -> FireOutcome {
        let Some(_guard) = BusyGuard::try_acquire(&self.busy) else {
            telemetry::record_cycle_skipped(&self.trigger.job);
            debug!("Previous cycle still running, skipping fire");
            return FireOutcome::Skipped;
        };

        let environment = self.environment.snapshot();
        match self.evaluator.run_cycle(&self.trigger, &environment, cancel).await {
            Ok(outcome) => FireOutcome::Completed(outcome),
            Err(EvaluationError::Interrupted { cycle }) => {
                telemetry::record_cycle_interrupted(&self.trigger.job);
                FireOutcome::Interrupted { cycle }
            }
        }
    }

    /// Fire on schedule until `cancel` fires.
    ///
    /// Fire times missed while a cycle was running are dropped; the next wait
    /// is computed from the end of the cycle.
    #[instrument(skip_all, fields(job = %self.trigger.job, spec = %self.trigger.spec))]
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ScheduleError> {
        info!(trigger = %self.trigger, "Starting trigger runner");
        let mut last_fire: Option<DateTime<Utc>> = None;

        loop {
            let reference = match last_fire {
                Some(last) => last.max(Utc::now()),
                None => Utc::now(),
            };
            let next = self
                .trigger
                .spec
                .next_after(reference)
                .ok_or_else(|| ScheduleError::NoNextExecution(self.trigger.spec.to_string()))?;
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            debug!(next_fire = %next, wait_ms = wait.as_millis() as u64, "Waiting for next fire");

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Shutdown signal received, stopping trigger runner");
                    break;
                }
                _ = sleep(wait) => {}
            }
            last_fire = Some(next);

            match self.fire_now(&cancel).await {
                FireOutcome::Completed(outcome) => {
                    debug!(cycle = outcome.cycle(), triggered = outcome.is_triggered(), "Cycle completed");
                }
                FireOutcome::Skipped => {}
                FireOutcome::Interrupted { cycle } => {
                    info!(cycle, "Cycle interrupted, stopping trigger runner");
                    break;
                }
            }
        }

        info!("Trigger runner stopped");
        Ok(())
    }
}

/// Scheduler trait for the set of configured triggers
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run all trigger runners until stopped
    async fn start(&self) -> anyhow::Result<()>;

    /// Stop all runners, interrupting in-flight searches
    async fn stop(&self) -> anyhow::Result<()>;

    /// Fire every trigger once, right now
    async fn fire_all(&self) -> Vec<FireOutcome>;
}

/// Owns one runner per trigger definition. Runners share nothing mutable.
pub struct SchedulerEngine {
    runners: Vec<Arc<TriggerRunner>>,
    shutdown: CancellationToken,
}

impl SchedulerEngine {
    pub fn new(
        triggers: Vec<FilesFoundTrigger>,
        evaluator: Arc<TriggerEvaluator>,
        environment: EnvironmentSource,
    ) -> Self {
        let runners = triggers
            .into_iter()
            .map(|trigger| {
                Arc::new(TriggerRunner::new(
                    trigger,
                    evaluator.clone(),
                    environment.clone(),
                ))
            })
            .collect();
        Self {
            runners,
            shutdown: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Scheduler for SchedulerEngine {
    #[instrument(skip(self))]
    async fn start(&self) -> anyhow::Result<()> {
        info!(triggers = self.runners.len(), "Starting scheduler engine");

        let mut tasks = JoinSet::new();
        for runner in &self.runners {
            let runner = runner.clone();
            let cancel = self.shutdown.child_token();
            tasks.spawn(async move {
                let job = runner.trigger().job.clone();
                (job, runner.run(cancel).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((job, Ok(()))) => debug!(job = %job, "Runner finished"),
                Ok((job, Err(e))) => error!(job = %job, error = %e, "Runner stopped with error"),
                Err(e) => error!(error = %e, "Runner task panicked"),
            }
        }

        info!("Scheduler engine stopped");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> anyhow::Result<()> {
        info!("Stopping scheduler engine");
        self.shutdown.cancel();
        Ok(())
    }

    async fn fire_all(&self) -> Vec<FireOutcome> {
        let mut outcomes = Vec::with_capacity(self.runners.len());
        for runner in &self.runners {
            let outcome = runner.fire_now(&self.shutdown).await;
            if matches!(outcome, FireOutcome::Interrupted { .. }) {
                warn!(job = %runner.trigger().job, "Manual fire interrupted");
            }
            outcomes.push(outcome);
        }
        outcomes
    }
}
