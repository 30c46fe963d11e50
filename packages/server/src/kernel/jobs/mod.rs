//! Persistent background queue for OTP delivery.

pub mod job;
pub mod queue;
pub mod runner;

pub use job::Job;
pub use queue::{DeliveryQueue, PostgresDeliveryQueue, DEFAULT_MAX_RETRIES};
pub use runner::{JobRunner, JobRunnerConfig};
