// Trigger evaluation and its recurring invocation

pub mod engine;
pub mod evaluator;

pub use engine::{EnvironmentSource, FireOutcome, Scheduler, SchedulerEngine, TriggerRunner};
pub use evaluator::{ConfigDecision, CycleOutcome, SkipReason, TriggerEvaluator};
