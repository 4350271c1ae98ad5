// Common library for shared code across the scheduler and the search agent

pub mod agent;
pub mod config;
pub mod definition;
pub mod environment;
pub mod errors;
pub mod models;
pub mod queue;
pub mod schedule;
pub mod scheduler;
pub mod search;
pub mod substitution;
pub mod telemetry;
