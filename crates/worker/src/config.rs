//! Worker configuration.
//!
//! One worker serves one event family against one allocations table; both
//! come from the environment at bootstrap.

use std::time::Duration;

use thiserror::Error;

use stockgate_allocation::PaymentOutcome;

/// Environment variable names read by [`WorkerConfig::from_env`].
const ENV_EVENT_FAMILY: &str = "STOCKGATE_EVENT_FAMILY";
const ENV_STREAM_KEY: &str = "STOCKGATE_STREAM_KEY";
const ENV_CONSUMER_GROUP: &str = "STOCKGATE_CONSUMER_GROUP";
const ENV_CONSUMER_NAME: &str = "STOCKGATE_CONSUMER_NAME";
const ENV_ALLOCATIONS_TABLE: &str = "STOCKGATE_ALLOCATIONS_TABLE";
const ENV_STOCK_TABLE: &str = "STOCKGATE_STOCK_TABLE";
const ENV_BATCH_SIZE: &str = "STOCKGATE_BATCH_SIZE";
const ENV_BLOCK_MS: &str = "STOCKGATE_BLOCK_MS";
const ENV_MAX_CONCURRENT: &str = "STOCKGATE_MAX_CONCURRENT";
const ENV_MAX_DELIVERIES: &str = "STOCKGATE_MAX_DELIVERIES";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name}: {message}")]
    Invalid { name: &'static str, message: String },
}

impl ConfigError {
    fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            message: message.into(),
        }
    }
}

/// Worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Event family this worker serves.
    pub outcome: PaymentOutcome,
    /// Delivery stream key.
    pub stream_key: String,
    /// Consumer group (one per event family).
    pub consumer_group: String,
    /// Consumer name within the group (unique per worker instance).
    pub consumer_name: String,
    /// Allocations table the store targets.
    pub allocations_table: String,
    /// Stock counter table the store targets.
    pub stock_table: String,
    /// Max records fetched per batch.
    pub batch_size: usize,
    /// Block timeout while waiting for new records.
    pub block_timeout: Duration,
    /// Sleep after a source error before retrying the read.
    pub poll_interval: Duration,
    /// Records processed concurrently within a batch (1 = sequential).
    pub max_concurrent: usize,
    /// Deliveries after which a record is dead-lettered by the source.
    pub max_deliveries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            outcome: PaymentOutcome::Accepted,
            stream_key: "stockgate:payments".to_string(),
            consumer_group: "allocation.transitions".to_string(),
            consumer_name: format!("consumer-{}", uuid::Uuid::now_v7()),
            allocations_table: "allocations".to_string(),
            stock_table: "warehouse_stock".to_string(),
            batch_size: 10,
            block_timeout: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(500),
            max_concurrent: 4,
            max_deliveries: 5,
        }
    }
}

impl WorkerConfig {
    pub fn with_outcome(mut self, outcome: PaymentOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_stream_key(mut self, key: impl Into<String>) -> Self {
        self.stream_key = key.into();
        self
    }

    pub fn with_consumer(
        mut self,
        group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.consumer_group = group.into();
        self.consumer_name = name.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Load settings from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(ENV_EVENT_FAMILY) {
            config.outcome = parse_outcome(&raw)?;
        }
        if let Ok(v) = std::env::var(ENV_STREAM_KEY) {
            config.stream_key = v;
        }
        if let Ok(v) = std::env::var(ENV_CONSUMER_GROUP) {
            config.consumer_group = v;
        }
        if let Ok(v) = std::env::var(ENV_CONSUMER_NAME) {
            config.consumer_name = v;
        }
        if let Ok(v) = std::env::var(ENV_ALLOCATIONS_TABLE) {
            config.allocations_table = v;
        }
        if let Ok(v) = std::env::var(ENV_STOCK_TABLE) {
            config.stock_table = v;
        }
        if let Ok(raw) = std::env::var(ENV_BATCH_SIZE) {
            config.batch_size = parse_number(ENV_BATCH_SIZE, &raw)?;
        }
        if let Ok(raw) = std::env::var(ENV_BLOCK_MS) {
            config.block_timeout = Duration::from_millis(parse_number(ENV_BLOCK_MS, &raw)?);
        }
        if let Ok(raw) = std::env::var(ENV_MAX_CONCURRENT) {
            config.max_concurrent = parse_number(ENV_MAX_CONCURRENT, &raw)?;
        }
        if let Ok(raw) = std::env::var(ENV_MAX_DELIVERIES) {
            config.max_deliveries = parse_number(ENV_MAX_DELIVERIES, &raw)?;
        }

        Ok(config)
    }
}

fn parse_outcome(raw: &str) -> Result<PaymentOutcome, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "accepted" => Ok(PaymentOutcome::Accepted),
        "rejected" => Ok(PaymentOutcome::Rejected),
        other => Err(ConfigError::invalid(
            ENV_EVENT_FAMILY,
            format!("must be 'accepted' or 'rejected', found '{other}'"),
        )),
    }
}

fn parse_number<T: core::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::invalid(name, format!("not a valid number: '{raw}'")))
}
