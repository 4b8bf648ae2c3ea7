//! Redis Streams-backed delivery source (at-least-once).
//!
//! Semantics:
//! - **Durable delivery**: entries persist until acknowledged (`XACK`).
//! - **Per-message acknowledgment**: handled ids are ACK'd one by one;
//!   retry ids stay in the pending entries list and are claimed again once
//!   their idle time passes.
//! - **Consumer groups**: one group per event family, named consumers
//!   within it, so workers scale horizontally.
//! - **Dead-letter handling**: entries delivered more than the configured
//!   cap move to `<stream>:dlq` and are ACK'd; a message that keeps
//!   failing transiently must not redeliver forever.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use stockgate_pipeline::DeliveryRecord;

use crate::config::WorkerConfig;
use crate::source::{BatchSource, SourceError};

/// Field of a stream entry holding the JSON delivery envelope.
const BODY_FIELD: &str = "body";

#[derive(Debug, Clone)]
pub struct RedisStreamSource {
    client: Arc<redis::Client>,
    stream_key: String,
    dlq_key: String,
    group: String,
    consumer: String,
    batch_size: usize,
    block_ms: u64,
    pending_idle_ms: u64,
    max_deliveries: u64,
}

impl RedisStreamSource {
    /// Connect and ensure the consumer group exists (idempotent).
    pub fn new(redis_url: impl AsRef<str>, config: &WorkerConfig) -> Result<Self, SourceError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        let source = Self {
            client: Arc::new(client),
            stream_key: config.stream_key.clone(),
            dlq_key: format!("{}:dlq", config.stream_key),
            group: config.consumer_group.clone(),
            consumer: config.consumer_name.clone(),
            batch_size: config.batch_size,
            block_ms: config.block_timeout.as_millis() as u64,
            pending_idle_ms: config.block_timeout.as_millis() as u64 * 10,
            max_deliveries: u64::from(config.max_deliveries),
        };
        source.ensure_group()?;
        Ok(source)
    }

    fn connection(&self) -> Result<redis::Connection, SourceError> {
        self.client
            .get_connection()
            .map_err(|e| SourceError::Connection(e.to_string()))
    }

    fn ensure_group(&self) -> Result<(), SourceError> {
        let mut conn = self.connection()?;

        // BUSYGROUP means the group already exists; ignore it.
        let _: Result<String, _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query(&mut conn);

        Ok(())
    }

    /// Claim overdue pending entries for this consumer.
    ///
    /// Entries past the delivery cap are dead-lettered instead of
    /// returned.
    fn claim_pending(
        &self,
        conn: &mut redis::Connection,
    ) -> Result<Vec<DeliveryRecord>, SourceError> {
        let pending: Vec<(String, String, u64, u64)> = match redis::cmd("XPENDING")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg("-")
            .arg("+")
            .arg(self.batch_size)
            .arg(&self.consumer)
            .query(conn)
        {
            Ok(entries) => entries,
            Err(_) => return Ok(vec![]),
        };

        if pending.is_empty() {
            return Ok(vec![]);
        }

        let deliveries: HashMap<String, u64> = pending
            .iter()
            .map(|(id, _, _, count)| (id.clone(), *count))
            .collect();
        let ids: Vec<&String> = pending.iter().map(|(id, _, _, _)| id).collect();

        let claimed: Vec<redis::Value> = redis::cmd("XCLAIM")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(self.pending_idle_ms)
            .arg(&ids)
            .query(conn)
            .unwrap_or_default();

        let mut records = Vec::new();
        for entry in claimed {
            let record = match parse_entry(entry) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "skipping unparsable pending entry");
                    continue;
                }
            };

            let delivered = deliveries.get(&record.id).copied().unwrap_or(1);
            if delivered > self.max_deliveries {
                self.dead_letter(conn, &record, delivered)?;
            } else {
                records.push(record);
            }
        }

        Ok(records)
    }

    fn read_new(&self, conn: &mut redis::Connection) -> Result<Vec<DeliveryRecord>, SourceError> {
        let reply: Option<HashMap<String, Vec<redis::Value>>> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(self.batch_size)
            .arg("BLOCK")
            .arg(self.block_ms)
            .arg("STREAMS")
            .arg(&self.stream_key)
            .arg(">")
            .query(conn)
            .map_err(|e| SourceError::Command(format!("XREADGROUP failed: {e}")))?;

        let entries = reply
            .and_then(|mut streams| streams.remove(&self.stream_key))
            .unwrap_or_default();

        let mut records = Vec::new();
        for entry in entries {
            match parse_entry(entry) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "skipping unparsable stream entry"),
            }
        }
        Ok(records)
    }

    fn dead_letter(
        &self,
        conn: &mut redis::Connection,
        record: &DeliveryRecord,
        deliveries: u64,
    ) -> Result<(), SourceError> {
        let _: String = redis::cmd("XADD")
            .arg(&self.dlq_key)
            .arg("*")
            .arg("original_message_id")
            .arg(&record.id)
            .arg("deliveries")
            .arg(deliveries)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .arg(BODY_FIELD)
            .arg(&record.body)
            .query(conn)
            .map_err(|e| SourceError::Command(format!("DLQ XADD failed: {e}")))?;

        // ACK removes it from the pending list; the DLQ copy is the record
        // of what happened.
        self.ack(conn, std::slice::from_ref(&record.id))?;

        warn!(
            message_id = %record.id,
            deliveries,
            "message moved to dead-letter stream"
        );
        Ok(())
    }

    fn ack(&self, conn: &mut redis::Connection, ids: &[String]) -> Result<(), SourceError> {
        if ids.is_empty() {
            return Ok(());
        }

        let _: u64 = redis::cmd("XACK")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(ids)
            .query(conn)
            .map_err(|e| SourceError::Command(format!("XACK failed: {e}")))?;

        Ok(())
    }
}

impl BatchSource for RedisStreamSource {
    #[instrument(skip(self), fields(stream = %self.stream_key, group = %self.group))]
    fn next_batch(&mut self) -> Result<Vec<DeliveryRecord>, SourceError> {
        let mut conn = self.connection()?;

        // Unacknowledged entries first: those are the retries.
        let pending = self.claim_pending(&mut conn)?;
        if !pending.is_empty() {
            debug!(count = pending.len(), "claimed pending entries");
            return Ok(pending);
        }

        self.read_new(&mut conn)
    }

    fn resolve(&mut self, handled: &[String], retry: &[String]) -> Result<(), SourceError> {
        if !retry.is_empty() {
            // Not ACK'd on purpose: the stream redelivers them once their
            // pending idle time passes.
            debug!(count = retry.len(), "leaving retryable entries pending");
        }

        let mut conn = self.connection()?;
        self.ack(&mut conn, handled)
    }
}

/// Entry format: `[message_id, [field1, value1, field2, value2, ...]]`.
fn parse_entry(entry: redis::Value) -> Result<DeliveryRecord, SourceError> {
    let parts: Vec<redis::Value> = match entry {
        redis::Value::Bulk(parts) => parts,
        _ => return Err(SourceError::Malformed("entry is not an array".to_string())),
    };

    let [id_value, fields_value] = parts.as_slice() else {
        return Err(SourceError::Malformed(format!(
            "entry has {} parts, expected 2",
            parts.len()
        )));
    };

    let id = match id_value {
        redis::Value::Data(data) => String::from_utf8_lossy(data).to_string(),
        _ => return Err(SourceError::Malformed("message id is not a string".to_string())),
    };

    let fields = match fields_value {
        redis::Value::Bulk(fields) => fields,
        _ => return Err(SourceError::Malformed("fields are not an array".to_string())),
    };

    for pair in fields.chunks(2) {
        if let [redis::Value::Data(key), redis::Value::Data(value)] = pair {
            if key.as_slice() == BODY_FIELD.as_bytes() {
                return Ok(DeliveryRecord {
                    id,
                    body: String::from_utf8_lossy(value).to_string(),
                });
            }
        }
    }

    Err(SourceError::Malformed(format!(
        "entry {id} has no '{BODY_FIELD}' field"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(s: &str) -> redis::Value {
        redis::Value::Data(s.as_bytes().to_vec())
    }

    #[test]
    fn parses_a_well_formed_entry() {
        let entry = redis::Value::Bulk(vec![
            data("1718000000000-0"),
            redis::Value::Bulk(vec![
                data("source"),
                data("payments"),
                data("body"),
                data(r#"{"detail":{}}"#),
            ]),
        ]);

        let record = parse_entry(entry).unwrap();
        assert_eq!(record.id, "1718000000000-0");
        assert_eq!(record.body, r#"{"detail":{}}"#);
    }

    #[test]
    fn rejects_entries_without_a_body() {
        let entry = redis::Value::Bulk(vec![
            data("1718000000000-0"),
            redis::Value::Bulk(vec![data("other"), data("x")]),
        ]);
        assert!(parse_entry(entry).is_err());
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(parse_entry(redis::Value::Nil).is_err());
        assert!(parse_entry(redis::Value::Bulk(vec![data("id-only")])).is_err());
    }
}
