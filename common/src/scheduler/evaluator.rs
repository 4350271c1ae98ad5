// Trigger evaluation: one cycle over the ordered rules of a trigger

use crate::errors::{EvaluationError, SearchError};
use crate::models::{FilesFoundTrigger, SearchConfig, TriggerCause, ValidationStatus};
use crate::queue::BuildScheduler;
use crate::search::Searcher;
use crate::substitution::{Environment, PatternExpander};
use crate::telemetry;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// How a cycle ended when it was not interrupted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A rule met its threshold and the build was scheduled.
    Triggered {
        cycle: u64,
        config_index: usize,
        cause: TriggerCause,
        run_id: Uuid,
    },
    /// A rule met its threshold but the build could not be scheduled.
    ScheduleFailed {
        cycle: u64,
        config_index: usize,
        reason: String,
    },
    /// No rule met its threshold.
    Idle { cycle: u64 },
}

impl CycleOutcome {
    pub fn is_triggered(&self) -> bool {
        matches!(self, CycleOutcome::Triggered { .. })
    }

    pub fn cycle(&self) -> u64 {
        match self {
            CycleOutcome::Triggered { cycle, .. }
            | CycleOutcome::ScheduleFailed { cycle, .. }
            | CycleOutcome::Idle { cycle } => *cycle,
        }
    }
}

/// Why a rule did not trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    BelowThreshold { found: usize, threshold: u64 },
    InvalidThreshold(String),
    Validation(String),
    SearchFailed(String),
}

/// Result of evaluating a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigDecision {
    Trigger { found: usize, threshold: u64 },
    Skip(SkipReason),
}

/// Runs cycles: expand, search and decide for each rule in order, stopping
/// at the first rule whose match count reaches its threshold.
pub struct TriggerEvaluator {
    searcher: Arc<dyn Searcher>,
    builds: Arc<dyn BuildScheduler>,
    expander: PatternExpander,
}

impl TriggerEvaluator {
    pub fn new(searcher: Arc<dyn Searcher>, builds: Arc<dyn BuildScheduler>) -> Self {
        Self {
            searcher,
            builds,
            expander: PatternExpander::new(),
        }
    }

    /// Evaluate every rule of `trigger` in order.
    ///
    /// Per-rule failures are logged and skipped. Cancellation ends the cycle
    /// without scheduling anything and is returned as an error.
    #[instrument(skip_all, fields(job = %trigger.job))]
    pub async fn run_cycle(
        &self,
        trigger: &FilesFoundTrigger,
        environment: &Environment,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, EvaluationError> {
        let cycle = telemetry::next_cycle_id();
        telemetry::record_cycle(&trigger.job);

        for (index, config) in trigger.configs.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(cycle, config_index = index, "Cycle interrupted (build not triggered)");
                return Err(EvaluationError::Interrupted { cycle });
            }

            let expanded = self.expander.expand(config, environment);
            debug!(cycle, config_index = index, config = %expanded, "Searching");

            match self.evaluate_config(cycle, index, &expanded, cancel).await? {
                ConfigDecision::Trigger { found, threshold } => {
                    info!(cycle, config_index = index, found, threshold, "Build triggered");
                    return Ok(self.schedule(trigger, cycle, index, expanded).await);
                }
                ConfigDecision::Skip(reason) => {
                    debug!(cycle, config_index = index, reason = ?reason, "Build not triggered");
                }
            }
        }

        debug!(cycle, "No configuration triggered");
        Ok(CycleOutcome::Idle { cycle })
    }

    /// Search and decide for one already expanded rule.
    pub async fn evaluate_config(
        &self,
        cycle: u64,
        index: usize,
        expanded: &SearchConfig,
        cancel: &CancellationToken,
    ) -> Result<ConfigDecision, EvaluationError> {
        let started = Instant::now();
        let outcome = self.searcher.search(expanded, cancel).await;
        telemetry::record_search_duration(started.elapsed().as_secs_f64());

        let result = match outcome {
            Ok(result) => result,
            Err(SearchError::Interrupted) => {
                telemetry::record_search_failure("interrupted");
                info!(cycle, config_index = index, "Thread interrupted (build not triggered)");
                return Err(EvaluationError::Interrupted { cycle });
            }
            Err(err @ SearchError::Dispatch { .. }) => {
                telemetry::record_search_failure("dispatch");
                warn!(cycle, config_index = index, config = %expanded, error = %err, "Search failed");
                return Ok(ConfigDecision::Skip(SkipReason::SearchFailed(err.to_string())));
            }
        };

        match &result.status {
            ValidationStatus::Ok => {}
            ValidationStatus::Warning(message) => {
                debug!(cycle, config_index = index, status = %result.status, "Search validation warning");
                return Ok(ConfigDecision::Skip(SkipReason::Validation(message.clone())));
            }
            ValidationStatus::Error(message) => {
                telemetry::record_search_failure("io");
                warn!(cycle, config_index = index, config = %expanded, status = %result.status, "Search failed");
                return Ok(ConfigDecision::Skip(SkipReason::SearchFailed(message.clone())));
            }
        }

        let Some(threshold) = expanded.parsed_threshold() else {
            debug!(
                cycle,
                config_index = index,
                threshold = %expanded.trigger_threshold,
                "Invalid trigger number (build not triggered)"
            );
            return Ok(ConfigDecision::Skip(SkipReason::InvalidThreshold(
                expanded.trigger_threshold.clone(),
            )));
        };

        let found = result.count();
        debug!(cycle, config_index = index, found, threshold, files = ?result.matched_files, "Result");
        if found as u64 >= threshold {
            Ok(ConfigDecision::Trigger { found, threshold })
        } else {
            Ok(ConfigDecision::Skip(SkipReason::BelowThreshold { found, threshold }))
        }
    }

    async fn schedule(
        &self,
        trigger: &FilesFoundTrigger,
        cycle: u64,
        config_index: usize,
        expanded: SearchConfig,
    ) -> CycleOutcome {
        let cause = TriggerCause::from(expanded);
        match self.builds.schedule_build(&trigger.job, 0, cause.clone()).await {
            Ok(run_id) => {
                telemetry::record_trigger(&trigger.job);
                info!(cycle, config_index, run_id = %run_id, cause = %cause, "Build scheduled");
                CycleOutcome::Triggered {
                    cycle,
                    config_index,
                    cause,
                    run_id,
                }
            }
            Err(e) => {
                telemetry::record_schedule_failure(&trigger.job);
                error!(cycle, config_index, error = %e, "Failed to schedule build");
                CycleOutcome::ScheduleFailed {
                    cycle,
                    config_index,
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::QueueError;
    use crate::models::SearchResult;
    use crate::schedule::CronSpec;
    use crate::search::MockSearcher;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBuilds {
        scheduled: Mutex<Vec<(String, u64, TriggerCause)>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl BuildScheduler for RecordingBuilds {
        async fn schedule_build(
            &self,
            job: &str,
            delay_seconds: u64,
            cause: TriggerCause,
        ) -> Result<Uuid, QueueError> {
            if self.fail {
                return Err(QueueError::PublishFailed("down".to_string()));
            }
            self.scheduled
                .lock()
                .unwrap()
                .push((job.to_string(), delay_seconds, cause));
            Ok(Uuid::new_v4())
        }
    }

    fn files(n: usize) -> SearchResult {
        SearchResult::ok((0..n).map(|i| format!("f{}", i)).collect::<BTreeSet<_>>())
    }

    /// Searcher whose match count is the number in the directory name.
    fn counting_searcher() -> MockSearcher {
        let mut searcher = MockSearcher::new();
        searcher.expect_search().returning(|config, _| {
            let n = config.directory.trim_start_matches('/').parse().unwrap_or(0);
            Ok(files(n))
        });
        searcher
    }

    fn trigger(configs: Vec<SearchConfig>) -> FilesFoundTrigger {
        FilesFoundTrigger::new("job", CronSpec::parse("* * * * *").unwrap(), configs)
    }

    fn rule(matches: usize, threshold: &str) -> SearchConfig {
        SearchConfig::new(None, format!("/{}", matches), "*", "", threshold)
    }

    #[tokio::test]
    async fn test_first_satisfying_config_wins() {
        let builds = Arc::new(RecordingBuilds::default());
        let evaluator = TriggerEvaluator::new(Arc::new(counting_searcher()), builds.clone());
        let trigger = trigger(vec![rule(2, "5"), rule(3, "1"), rule(9, "1")]);

        let outcome = evaluator
            .run_cycle(&trigger, &Environment::new(), &CancellationToken::new())
            .await
            .unwrap();

        match outcome {
            CycleOutcome::Triggered {
                config_index, cause, ..
            } => {
                assert_eq!(config_index, 1);
                assert_eq!(cause.directory, "/3");
            }
            other => panic!("expected trigger, got {:?}", other),
        }
        let scheduled = builds.scheduled.lock().unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, "job");
        assert_eq!(scheduled[0].1, 0);
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        let builds = Arc::new(RecordingBuilds::default());
        let evaluator = TriggerEvaluator::new(Arc::new(counting_searcher()), builds.clone());
        let cancel = CancellationToken::new();

        let at = evaluator
            .evaluate_config(1, 0, &rule(4, "4"), &cancel)
            .await
            .unwrap();
        assert_eq!(at, ConfigDecision::Trigger { found: 4, threshold: 4 });

        let below = evaluator
            .evaluate_config(1, 0, &rule(3, "4"), &cancel)
            .await
            .unwrap();
        assert_eq!(
            below,
            ConfigDecision::Skip(SkipReason::BelowThreshold { found: 3, threshold: 4 })
        );
    }

    #[tokio::test]
    async fn test_cause_uses_expanded_values() {
        let builds = Arc::new(RecordingBuilds::default());
        let evaluator = TriggerEvaluator::new(Arc::new(counting_searcher()), builds.clone());
        let trigger = trigger(vec![SearchConfig::new(None, "/${N}", "*.${EXT}", "", "$T")]);
        let env: Environment = [("N", "2"), ("EXT", "csv"), ("T", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let outcome = evaluator
            .run_cycle(&trigger, &env, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.is_triggered());
        let scheduled = builds.scheduled.lock().unwrap();
        assert_eq!(scheduled[0].2.directory, "/2");
        assert_eq!(scheduled[0].2.include_patterns, "*.csv");
        assert_eq!(scheduled[0].2.trigger_threshold, "2");
    }

    #[tokio::test]
    async fn test_invalid_threshold_skips_to_next_config() {
        let builds = Arc::new(RecordingBuilds::default());
        let evaluator = TriggerEvaluator::new(Arc::new(counting_searcher()), builds.clone());
        let trigger = trigger(vec![rule(5, "lots"), rule(1, "1")]);

        let outcome = evaluator
            .run_cycle(&trigger, &Environment::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, CycleOutcome::Triggered { config_index: 1, .. }));
    }

    #[tokio::test]
    async fn test_warning_and_failures_do_not_stop_evaluation() {
        let mut searcher = MockSearcher::new();
        let mut seq = mockall::Sequence::new();
        searcher
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(SearchResult::warning("directory does not exist")));
        searcher
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(SearchError::dispatch("agent", "no responders")));
        searcher
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(SearchResult::error("permission denied")));
        searcher
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(files(1)));

        let builds = Arc::new(RecordingBuilds::default());
        let evaluator = TriggerEvaluator::new(Arc::new(searcher), builds.clone());
        // threshold 0 on the first rules: a non-OK status must still not trigger
        let trigger = trigger(vec![rule(0, "0"), rule(0, "0"), rule(0, "0"), rule(0, "1")]);

        let outcome = evaluator
            .run_cycle(&trigger, &Environment::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, CycleOutcome::Triggered { config_index: 3, .. }));
    }

    #[tokio::test]
    async fn test_interruption_aborts_cycle() {
        let mut searcher = MockSearcher::new();
        searcher
            .expect_search()
            .times(1)
            .returning(|_, _| Err(SearchError::Interrupted));

        let builds = Arc::new(RecordingBuilds::default());
        let evaluator = TriggerEvaluator::new(Arc::new(searcher), builds.clone());
        let trigger = trigger(vec![rule(0, "1"), rule(5, "1")]);

        let err = evaluator
            .run_cycle(&trigger, &Environment::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationError::Interrupted { .. }));
        assert!(builds.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_searches_nothing() {
        let mut searcher = MockSearcher::new();
        searcher.expect_search().never();
        let builds = Arc::new(RecordingBuilds::default());
        let evaluator = TriggerEvaluator::new(Arc::new(searcher), builds.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = evaluator
            .run_cycle(&trigger(vec![rule(1, "1")]), &Environment::new(), &cancel)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_idle_when_nothing_matches() {
        let builds = Arc::new(RecordingBuilds::default());
        let evaluator = TriggerEvaluator::new(Arc::new(counting_searcher()), builds.clone());
        let outcome = evaluator
            .run_cycle(
                &trigger(vec![rule(0, "1"), rule(1, "2")]),
                &Environment::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, CycleOutcome::Idle { .. }));
        assert!(builds.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_failure_ends_cycle() {
        let builds = Arc::new(RecordingBuilds {
            fail: true,
            ..Default::default()
        });
        let mut searcher = MockSearcher::new();
        searcher.expect_search().times(1).returning(|_, _| Ok(files(1)));
        let evaluator = TriggerEvaluator::new(Arc::new(searcher), builds);

        let outcome = evaluator
            .run_cycle(
                &trigger(vec![rule(1, "1"), rule(1, "1")]),
                &Environment::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, CycleOutcome::ScheduleFailed { config_index: 0, .. }));
    }
}
