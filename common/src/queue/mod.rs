// Queue module for NATS integration

pub mod nats;
pub mod publisher;

pub use nats::{NatsClient, NatsConfig};
pub use publisher::{BuildRequest, BuildScheduler, NatsBuildScheduler};
