//! `stockgate-worker` — the long-running consumer.
//!
//! Wires an at-least-once delivery source to the batch orchestrator: read
//! a batch, process it, acknowledge handled records, and leave retryable
//! ones pending for redelivery.

pub mod config;
pub mod runner;
pub mod source;

#[cfg(feature = "redis")]
pub mod redis_source;

pub use config::WorkerConfig;
pub use runner::{BatchWorker, WorkerHandle, WorkerStats};
pub use source::{BatchSource, InMemorySource, SourceError};

#[cfg(feature = "redis")]
pub use redis_source::RedisStreamSource;
