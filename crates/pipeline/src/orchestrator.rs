//! Batch orchestration with per-record failure isolation.
//!
//! The orchestrator consumes one delivery batch, runs every record through
//! the [`TransitionService`](crate::service::TransitionService)
//! independently, and returns exactly the record identifiers the transport
//! should redeliver. One record's failure never blocks the rest, and only
//! this layer translates failures into retry decisions:
//!
//! - success → acknowledged
//! - non-transient failure → acknowledged (poison-message avoidance)
//! - transient failure → identifier added to the retry list

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use stockgate_core::{Failure, Outcome};
use stockgate_store::AllocationStore;

use crate::service::TransitionService;

/// One message from the at-least-once delivery transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: String,
    pub body: String,
}

/// An inbound delivery batch. `records` may be absent entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryBatch {
    pub records: Option<Vec<DeliveryRecord>>,
}

impl DeliveryBatch {
    pub fn new(records: Vec<DeliveryRecord>) -> Self {
        Self {
            records: Some(records),
        }
    }
}

/// The identifiers the transport should redeliver; any omitted id is
/// "handled", whether that meant success or a non-transient drop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryList {
    pub retry_ids: Vec<String>,
}

impl RetryList {
    pub fn is_empty(&self) -> bool {
        self.retry_ids.is_empty()
    }
}

/// Runs delivery batches through a [`TransitionService`].
///
/// Records in one batch are causally independent, so sequential and
/// bounded-concurrency processing are both valid; `max_concurrent` selects
/// between them. The pipeline holds no locks either way; cross-record
/// races resolve at the storage guard.
#[derive(Debug)]
pub struct BatchOrchestrator<S> {
    service: Arc<TransitionService<S>>,
    max_concurrent: usize,
}

impl<S> BatchOrchestrator<S>
where
    S: AllocationStore + 'static,
{
    pub fn new(service: TransitionService<S>) -> Self {
        Self {
            service: Arc::new(service),
            max_concurrent: 1,
        }
    }

    /// Process up to `max` records at a time (minimum 1).
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Process one delivery batch to completion.
    ///
    /// An absent or empty `records` collection returns an empty retry list
    /// without invoking anything downstream. Retry identifiers preserve
    /// input order.
    pub async fn process_batch(&self, batch: DeliveryBatch) -> RetryList {
        let records = match batch.records {
            Some(records) if !records.is_empty() => records,
            _ => {
                debug!("empty delivery batch; nothing to do");
                return RetryList::default();
            }
        };

        info!(records = records.len(), "processing delivery batch");

        let retry_ids = if self.max_concurrent > 1 {
            self.process_concurrent(records).await
        } else {
            self.process_sequential(records).await
        };

        RetryList { retry_ids }
    }

    async fn process_sequential(&self, records: Vec<DeliveryRecord>) -> Vec<String> {
        let mut retry_ids = Vec::new();
        for record in records {
            let outcome = self.service.handle(&record.body).await;
            if needs_redelivery(&record.id, outcome) {
                retry_ids.push(record.id);
            }
        }
        retry_ids
    }

    async fn process_concurrent(&self, records: Vec<DeliveryRecord>) -> Vec<String> {
        let gate = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<tokio::task::Id, (usize, String)> = HashMap::new();

        for (index, record) in records.into_iter().enumerate() {
            let service = Arc::clone(&self.service);
            let gate = Arc::clone(&gate);
            let record_id = record.id.clone();

            let handle = tasks.spawn(async move {
                match gate.acquire_owned().await {
                    Ok(_permit) => service.handle(&record.body).await,
                    Err(_) => Err(Failure::unrecognized("concurrency gate closed")),
                }
            });
            pending.insert(handle.id(), (index, record_id));
        }

        let mut retried: Vec<(usize, String)> = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((task_id, outcome)) => {
                    let Some((index, record_id)) = pending.remove(&task_id) else {
                        continue;
                    };
                    if needs_redelivery(&record_id, outcome) {
                        retried.push((index, record_id));
                    }
                }
                // A panicked record task must not poison the batch; treat
                // it as a transient failure of that record alone.
                Err(join_err) => {
                    if let Some((index, record_id)) = pending.remove(&join_err.id()) {
                        error!(
                            record_id,
                            error = %join_err,
                            "record task aborted; scheduling redelivery"
                        );
                        retried.push((index, record_id));
                    }
                }
            }
        }

        retried.sort_by_key(|(index, _)| *index);
        retried.into_iter().map(|(_, id)| id).collect()
    }
}

fn needs_redelivery(record_id: &str, outcome: Outcome<()>) -> bool {
    match outcome {
        Ok(()) => {
            debug!(record_id, "record handled");
            false
        }
        Err(failure) if failure.is_transient() => {
            warn!(record_id, error = %failure, "transient failure; scheduling redelivery");
            true
        }
        Err(failure) => {
            warn!(record_id, error = %failure, "non-transient failure; dropping record");
            false
        }
    }
}
