// Property-based tests for trigger evaluation

use async_trait::async_trait;
use common::errors::{QueueError, SearchError};
use common::models::{FilesFoundTrigger, SearchConfig, SearchResult, TriggerCause};
use common::queue::BuildScheduler;
use common::schedule::CronSpec;
use common::scheduler::{CycleOutcome, TriggerEvaluator};
use common::search::Searcher;
use common::substitution::Environment;
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Answers each directory `/d<i>` with a fixed number of files and records
/// the directories it was asked about.
struct FixedSearcher {
    counts: HashMap<String, usize>,
    calls: Mutex<Vec<String>>,
}

impl FixedSearcher {
    fn new(counts: &[usize]) -> Self {
        Self {
            counts: counts
                .iter()
                .enumerate()
                .map(|(i, count)| (format!("/d{}", i), *count))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Searcher for FixedSearcher {
    async fn search(
        &self,
        config: &SearchConfig,
        _cancel: &CancellationToken,
    ) -> Result<SearchResult, SearchError> {
        self.calls.lock().unwrap().push(config.directory.clone());
        let count = self.counts.get(&config.directory).copied().unwrap_or(0);
        let files: BTreeSet<String> = (0..count).map(|i| format!("f{}.dat", i)).collect();
        Ok(SearchResult::ok(files))
    }
}

#[derive(Default)]
struct RecordingBuilds {
    scheduled: Mutex<Vec<(String, u64, TriggerCause)>>,
}

#[async_trait]
impl BuildScheduler for RecordingBuilds {
    async fn schedule_build(
        &self,
        job: &str,
        delay_seconds: u64,
        cause: TriggerCause,
    ) -> Result<Uuid, QueueError> {
        self.scheduled
            .lock()
            .unwrap()
            .push((job.to_string(), delay_seconds, cause));
        Ok(Uuid::new_v4())
    }
}

fn trigger(rules: &[(usize, u64)]) -> FilesFoundTrigger {
    let configs = rules
        .iter()
        .enumerate()
        .map(|(i, (_, threshold))| {
            SearchConfig::new(None, format!("/d{}", i), "**", "", threshold.to_string())
        })
        .collect();
    FilesFoundTrigger::new(
        "job",
        CronSpec::parse("*/5 * * * *").unwrap(),
        configs,
    )
}

fn run(
    searcher: Arc<FixedSearcher>,
    builds: Arc<RecordingBuilds>,
    trigger: &FilesFoundTrigger,
) -> CycleOutcome {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let evaluator = TriggerEvaluator::new(searcher, builds);
    runtime
        .block_on(evaluator.run_cycle(trigger, &Environment::new(), &CancellationToken::new()))
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The first rule whose count reaches its threshold wins, later rules are
    /// never searched and exactly one build is scheduled with that rule's
    /// values.
    #[test]
    fn property_first_matching_rule_wins(
        rules in prop::collection::vec((0usize..6, 0u64..6), 1..6),
    ) {
        let counts: Vec<usize> = rules.iter().map(|(count, _)| *count).collect();
        let searcher = Arc::new(FixedSearcher::new(&counts));
        let builds = Arc::new(RecordingBuilds::default());
        let trigger = trigger(&rules);

        let outcome = run(searcher.clone(), builds.clone(), &trigger);

        let expected = rules
            .iter()
            .position(|(count, threshold)| *count as u64 >= *threshold);
        let calls = searcher.calls.lock().unwrap().clone();
        let scheduled = builds.scheduled.lock().unwrap().clone();

        match expected {
            Some(winner) => {
                match outcome {
                    CycleOutcome::Triggered { config_index, ref cause, .. } => {
                        prop_assert_eq!(config_index, winner);
                        prop_assert_eq!(&cause.directory, &format!("/d{}", winner));
                    }
                    other => prop_assert!(false, "expected trigger, got {:?}", other),
                }
                prop_assert_eq!(calls.len(), winner + 1);
                prop_assert_eq!(scheduled.len(), 1);
                prop_assert_eq!(&scheduled[0].0, "job");
                prop_assert_eq!(scheduled[0].1, 0);
                prop_assert_eq!(&scheduled[0].2.trigger_threshold, &rules[winner].1.to_string());
            }
            None => {
                prop_assert!(matches!(outcome, CycleOutcome::Idle { .. }), "expected idle, got {:?}", outcome);
                prop_assert_eq!(calls.len(), rules.len());
                prop_assert!(scheduled.is_empty());
            }
        }
    }

    /// A single rule triggers exactly when its count is at least the threshold.
    #[test]
    fn property_threshold_boundary(count in 0usize..20, threshold in 0u64..20) {
        let searcher = Arc::new(FixedSearcher::new(&[count]));
        let builds = Arc::new(RecordingBuilds::default());
        let trigger = trigger(&[(count, threshold)]);

        let outcome = run(searcher, builds.clone(), &trigger);

        prop_assert_eq!(outcome.is_triggered(), count as u64 >= threshold);
        prop_assert_eq!(builds.scheduled.lock().unwrap().len(), usize::from(outcome.is_triggered()));
    }

    /// Thresholds that are not non-negative integers never trigger, even with
    /// files present.
    #[test]
    fn property_invalid_threshold_never_triggers(
        threshold in prop_oneof!["-[1-9][0-9]{0,3}", "[a-z]{1,6}", "[0-9]+\\.[0-9]+"],
        count in 0usize..10,
    ) {
        let searcher = Arc::new(FixedSearcher::new(&[count]));
        let builds = Arc::new(RecordingBuilds::default());
        let trigger = FilesFoundTrigger::new(
            "job",
            CronSpec::parse("@hourly").unwrap(),
            vec![SearchConfig::new(None, "/d0", "**", "", threshold)],
        );

        let outcome = run(searcher, builds.clone(), &trigger);

        prop_assert!(matches!(outcome, CycleOutcome::Idle { .. }), "expected idle, got {:?}", outcome);
        prop_assert!(builds.scheduled.lock().unwrap().is_empty());
    }
}
