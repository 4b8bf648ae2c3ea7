//! Worker loop: delivery source → batch orchestrator → resolution.
//!
//! The loop runs on a background thread and drives the async pipeline
//! through a Tokio runtime handle. Redelivered records are re-processed
//! from scratch; the guarded write being the sole mutation point is what
//! makes that safe.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Instant;

use tokio::runtime::Handle;
use tracing::{debug, error, info};

use stockgate_pipeline::{BatchOrchestrator, DeliveryBatch};
use stockgate_store::AllocationStore;

use crate::config::WorkerConfig;
use crate::source::BatchSource;

/// Handle to control a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    /// Current worker statistics.
    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub batches_processed: u64,
    pub records_processed: u64,
    pub records_retried: u64,
    pub uptime_secs: u64,
}

/// Background batch worker.
pub struct BatchWorker;

impl BatchWorker {
    /// Spawn the worker loop on a background thread.
    ///
    /// The runtime handle drives the async pipeline; the thread itself
    /// never blocks inside the runtime.
    pub fn spawn<S, B>(
        orchestrator: BatchOrchestrator<S>,
        source: B,
        runtime: Handle,
        config: WorkerConfig,
    ) -> WorkerHandle
    where
        S: AllocationStore + 'static,
        B: BatchSource + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = Arc::clone(&stats);

        let join = thread::Builder::new()
            .name("stockgate-worker".to_string())
            .spawn(move || {
                worker_loop(orchestrator, source, runtime, config, shutdown_rx, stats_clone);
            })
            .expect("failed to spawn worker thread");

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn worker_loop<S, B>(
    orchestrator: BatchOrchestrator<S>,
    mut source: B,
    runtime: Handle,
    config: WorkerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) where
    S: AllocationStore + 'static,
    B: BatchSource,
{
    info!(family = %config.outcome, "worker started");
    let started = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        {
            let mut s = stats.lock().unwrap();
            s.uptime_secs = started.elapsed().as_secs();
        }

        match source.next_batch() {
            Ok(records) if records.is_empty() => {
                thread::sleep(config.poll_interval);
            }
            Ok(records) => {
                let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

                let retry = runtime.block_on(
                    orchestrator.process_batch(DeliveryBatch::new(records)),
                );

                let handled: Vec<String> = ids
                    .iter()
                    .filter(|id| !retry.retry_ids.contains(id))
                    .cloned()
                    .collect();

                {
                    let mut s = stats.lock().unwrap();
                    s.batches_processed += 1;
                    s.records_processed += ids.len() as u64;
                    s.records_retried += retry.retry_ids.len() as u64;
                }

                if let Err(e) = source.resolve(&handled, &retry.retry_ids) {
                    error!(error = %e, "failed to resolve batch");
                } else {
                    debug!(
                        handled = handled.len(),
                        retried = retry.retry_ids.len(),
                        "batch resolved"
                    );
                }
            }
            Err(e) => {
                error!(error = %e, "failed to read batch");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(family = %config.outcome, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use stockgate_allocation::{
        Allocation, AllocationStatus, PaymentOutcome, TransitionCommand,
    };
    use stockgate_core::{Failure, OrderId, Outcome, Sku};
    use stockgate_pipeline::{DeliveryRecord, TransitionService};
    use stockgate_store::InMemoryAllocationStore;

    use crate::source::InMemorySource;

    fn body(order_id: &str) -> String {
        serde_json::json!({
            "detail": {"dynamodb": {"NewImage": {
                "eventName": "PAYMENT_ACCEPTED",
                "orderId": order_id,
                "sku": "mockSku",
                "units": 2,
                "price": 10.33,
                "userId": "mockUserId",
                "createdAt": "2024-01-01T00:00:00Z",
                "updatedAt": "2024-01-02T00:00:00Z"
            }}}
        })
        .to_string()
    }

    fn record(id: &str, body: String) -> DeliveryRecord {
        DeliveryRecord {
            id: id.to_string(),
            body,
        }
    }

    fn test_config() -> WorkerConfig {
        WorkerConfig::default().with_outcome(PaymentOutcome::Accepted)
    }

    fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn worker_processes_and_acknowledges_records() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let store = Arc::new(InMemoryAllocationStore::new());
        store.put(
            Allocation::new(
                "mockOrderId",
                "mockSku",
                "mockUserId",
                2,
                10.33,
                "2024-01-01T00:00:00Z",
                "2024-01-01T00:00:00Z",
                AllocationStatus::Allocated,
            )
            .unwrap(),
        );

        let orchestrator = BatchOrchestrator::new(TransitionService::new(
            Arc::clone(&store),
            PaymentOutcome::Accepted,
        ));

        let source = Arc::new(Mutex::new(InMemorySource::new(
            vec![
                record("msg-1", body("mockOrderId")),
                record("msg-2", "garbage".to_string()),
            ],
            10,
        )));

        let handle = BatchWorker::spawn(
            orchestrator,
            Arc::clone(&source),
            runtime.handle().clone(),
            test_config(),
        );

        // Both records resolve as handled: one success, one dropped poison.
        assert!(wait_until(Duration::from_secs(5), || {
            source.lock().unwrap().acknowledged().len() == 2
        }));

        let stats = handle.stats();
        assert!(stats.batches_processed >= 1);
        assert_eq!(stats.records_retried, 0);
        handle.shutdown();

        let stored = runtime
            .block_on(store.get(
                &OrderId::parse("mockOrderId").unwrap(),
                &Sku::parse("mockSku").unwrap(),
            ))
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), AllocationStatus::Completed);
    }

    /// Store whose reads always fail with a transport fault.
    struct DownStore;

    #[async_trait]
    impl AllocationStore for DownStore {
        async fn get(&self, _: &OrderId, _: &Sku) -> Outcome<Option<Allocation>> {
            Err(Failure::unrecognized("connection refused"))
        }

        async fn apply_guarded(&self, _: &TransitionCommand) -> Outcome<()> {
            Err(Failure::unrecognized("connection refused"))
        }
    }

    #[test]
    fn transient_failures_stay_pending_in_the_source() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let orchestrator = BatchOrchestrator::new(TransitionService::new(
            DownStore,
            PaymentOutcome::Accepted,
        ));

        let source = Arc::new(Mutex::new(InMemorySource::new(
            vec![record("msg-1", body("mockOrderId"))],
            10,
        )));

        let handle = BatchWorker::spawn(
            orchestrator,
            Arc::clone(&source),
            runtime.handle().clone(),
            test_config(),
        );

        assert!(wait_until(Duration::from_secs(5), || {
            handle.stats().records_retried >= 1
        }));
        handle.shutdown();

        let source = source.lock().unwrap();
        assert!(source.acknowledged().is_empty());
        assert_eq!(source.outstanding(), 1);
    }

    #[test]
    fn shutdown_joins_cleanly() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let orchestrator = BatchOrchestrator::new(TransitionService::new(
            InMemoryAllocationStore::new(),
            PaymentOutcome::Accepted,
        ));
        let source = InMemorySource::new(vec![], 10);

        let handle = BatchWorker::spawn(
            orchestrator,
            source,
            runtime.handle().clone(),
            test_config(),
        );
        thread::sleep(Duration::from_millis(50));
        handle.shutdown();
    }
}
