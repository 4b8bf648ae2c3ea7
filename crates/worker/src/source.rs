//! Delivery source boundary.
//!
//! A [`BatchSource`] hands the worker batches of at-least-once records and
//! takes back the split between handled ids (acknowledge) and retry ids
//! (leave pending so the transport redelivers them).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use stockgate_pipeline::DeliveryRecord;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source connection error: {0}")]
    Connection(String),

    #[error("source command error: {0}")]
    Command(String),

    #[error("source entry malformed: {0}")]
    Malformed(String),
}

/// At-least-once, per-message-acknowledgment delivery source.
pub trait BatchSource {
    /// Fetch the next batch; empty when nothing is ready.
    fn next_batch(&mut self) -> Result<Vec<DeliveryRecord>, SourceError>;

    /// Report the fate of a processed batch: `handled` ids are
    /// acknowledged, `retry` ids stay pending for redelivery.
    fn resolve(&mut self, handled: &[String], retry: &[String]) -> Result<(), SourceError>;
}

impl<B> BatchSource for Arc<Mutex<B>>
where
    B: BatchSource,
{
    fn next_batch(&mut self) -> Result<Vec<DeliveryRecord>, SourceError> {
        self.lock()
            .map_err(|_| SourceError::Command("source lock poisoned".to_string()))?
            .next_batch()
    }

    fn resolve(&mut self, handled: &[String], retry: &[String]) -> Result<(), SourceError> {
        self.lock()
            .map_err(|_| SourceError::Command("source lock poisoned".to_string()))?
            .resolve(handled, retry)
    }
}

/// In-memory source for tests/dev.
///
/// Retried records come back on the next `next_batch` call; acknowledged
/// records are gone for good.
#[derive(Debug, Default)]
pub struct InMemorySource {
    queue: VecDeque<DeliveryRecord>,
    in_flight: Vec<DeliveryRecord>,
    acknowledged: Vec<String>,
    batch_size: usize,
}

impl InMemorySource {
    pub fn new(records: Vec<DeliveryRecord>, batch_size: usize) -> Self {
        Self {
            queue: records.into(),
            in_flight: Vec::new(),
            acknowledged: Vec::new(),
            batch_size: batch_size.max(1),
        }
    }

    /// Ids acknowledged so far, in acknowledgment order.
    pub fn acknowledged(&self) -> &[String] {
        &self.acknowledged
    }

    /// Records still queued or awaiting resolution.
    pub fn outstanding(&self) -> usize {
        self.queue.len() + self.in_flight.len()
    }
}

impl BatchSource for InMemorySource {
    fn next_batch(&mut self) -> Result<Vec<DeliveryRecord>, SourceError> {
        while self.in_flight.len() < self.batch_size {
            match self.queue.pop_front() {
                Some(record) => self.in_flight.push(record),
                None => break,
            }
        }
        Ok(self.in_flight.clone())
    }

    fn resolve(&mut self, handled: &[String], retry: &[String]) -> Result<(), SourceError> {
        let mut still_pending = Vec::new();
        for record in self.in_flight.drain(..) {
            if handled.iter().any(|id| *id == record.id) {
                self.acknowledged.push(record.id);
            } else if retry.iter().any(|id| *id == record.id) {
                // Redelivered on the next read, like a pending stream entry.
                still_pending.push(record);
            } else {
                self.acknowledged.push(record.id);
            }
        }
        self.in_flight = still_pending;
        Ok(())
    }
}
