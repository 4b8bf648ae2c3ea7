use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use stockgate_allocation::{Allocation, AllocationStatus, PaymentOutcome};
use stockgate_pipeline::{BatchOrchestrator, DeliveryBatch, DeliveryRecord, TransitionService};
use stockgate_store::InMemoryAllocationStore;

fn body(order_id: &str) -> String {
    json!({
        "detail": {"dynamodb": {"NewImage": {
            "eventName": "PAYMENT_ACCEPTED",
            "orderId": order_id,
            "sku": "benchSku",
            "units": 2,
            "price": 10.33,
            "userId": "benchUserId",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-02T00:00:00Z"
        }}}
    })
    .to_string()
}

fn setup(
    size: usize,
    max_concurrent: usize,
) -> (
    BatchOrchestrator<Arc<InMemoryAllocationStore>>,
    DeliveryBatch,
) {
    let store = Arc::new(InMemoryAllocationStore::new());
    let mut records = Vec::with_capacity(size);

    for i in 0..size {
        let order_id = format!("order-{i:06}");
        store.put(
            Allocation::new(
                &order_id,
                "benchSku",
                "benchUserId",
                2,
                10.33,
                "2024-01-01T00:00:00Z",
                "2024-01-01T00:00:00Z",
                AllocationStatus::Allocated,
            )
            .unwrap(),
        );
        records.push(DeliveryRecord {
            id: format!("msg-{i:06}"),
            body: body(&order_id),
        });
    }

    let orchestrator =
        BatchOrchestrator::new(TransitionService::new(store, PaymentOutcome::Accepted))
            .with_max_concurrent(max_concurrent);

    (orchestrator, DeliveryBatch::new(records))
}

fn bench_process_batch(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("process_batch");

    for &size in &[8usize, 64] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("sequential", size), &size, |b, &size| {
            b.iter_batched(
                || setup(size, 1),
                |(orchestrator, batch)| runtime.block_on(orchestrator.process_batch(batch)),
                BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("concurrent_8", size), &size, |b, &size| {
            b.iter_batched(
                || setup(size, 8),
                |(orchestrator, batch)| runtime.block_on(orchestrator.process_batch(batch)),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_process_batch);
criterion_main!(benches);
