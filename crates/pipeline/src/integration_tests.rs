//! Integration tests for the full pipeline.
//!
//! Tests: delivery body → validation → fetch → command → guarded write,
//! over the in-memory store.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;

    use stockgate_allocation::{
        Allocation, AllocationStatus, PaymentOutcome, TransitionCommand,
    };
    use stockgate_core::{Failure, FailureKind, OrderId, Outcome, Sku};
    use stockgate_store::{AllocationStore, InMemoryAllocationStore};

    use crate::orchestrator::{BatchOrchestrator, DeliveryBatch, DeliveryRecord};
    use crate::service::TransitionService;

    fn body(event_name: &str, order_id: &str) -> String {
        json!({
            "detail": {"dynamodb": {"NewImage": {
                "eventName": event_name,
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

    fn seeded(order_id: &str, status: AllocationStatus) -> Allocation {
        Allocation::new(
            order_id,
            "mockSku",
            "mockUserId",
            2,
            10.33,
            "2024-01-01T00:00:00Z",
            "2024-01-01T00:00:00Z",
            status,
        )
        .unwrap()
    }

    fn key(order_id: &str) -> (OrderId, Sku) {
        (
            OrderId::parse(order_id).unwrap(),
            Sku::parse("mockSku").unwrap(),
        )
    }

    #[tokio::test]
    async fn accepted_event_completes_the_example_allocation() {
        let store = Arc::new(InMemoryAllocationStore::new());
        store.put(seeded("mockOrderId", AllocationStatus::Allocated));
        let service = TransitionService::new(Arc::clone(&store), PaymentOutcome::Accepted);

        service
            .handle(&body("PAYMENT_ACCEPTED", "mockOrderId"))
            .await
            .unwrap();

        let (order_id, sku) = key("mockOrderId");
        let stored = store.get(&order_id, &sku).await.unwrap().unwrap();
        assert_eq!(stored.status(), AllocationStatus::Completed);
        assert_eq!(store.stock_level(&sku), 0);
    }

    #[tokio::test]
    async fn rejected_event_deallocates_and_returns_two_units() {
        let store = Arc::new(InMemoryAllocationStore::new());
        store.put(seeded("mockOrderId", AllocationStatus::Allocated));
        let service = TransitionService::new(Arc::clone(&store), PaymentOutcome::Rejected);

        service
            .handle(&body("PAYMENT_REJECTED", "mockOrderId"))
            .await
            .unwrap();

        let (order_id, sku) = key("mockOrderId");
        let stored = store.get(&order_id, &sku).await.unwrap().unwrap();
        assert_eq!(stored.status(), AllocationStatus::Deallocated);
        assert_eq!(store.stock_level(&sku), 2);
    }

    #[tokio::test]
    async fn completed_allocation_rejects_either_event() {
        for outcome in [PaymentOutcome::Accepted, PaymentOutcome::Rejected] {
            let store = Arc::new(InMemoryAllocationStore::new());
            store.put(seeded("mockOrderId", AllocationStatus::Completed));
            let service = TransitionService::new(Arc::clone(&store), outcome);

            let err = service
                .handle(&body(outcome.event_name(), "mockOrderId"))
                .await
                .unwrap_err();

            assert!(err.is_kind(FailureKind::InvalidTransition));
            assert!(!err.is_transient());

            let (order_id, sku) = key("mockOrderId");
            let stored = store.get(&order_id, &sku).await.unwrap().unwrap();
            assert_eq!(stored.status(), AllocationStatus::Completed);
            assert_eq!(store.stock_level(&sku), 0);
        }
    }

    /// What one record of a generated batch should do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Case {
        SuccessExisting,
        Transient,
        BadBody,
        Absent,
        GuardFails,
    }

    impl Case {
        fn from_index(index: u8) -> Self {
            match index % 5 {
                0 => Case::SuccessExisting,
                1 => Case::Transient,
                2 => Case::BadBody,
                3 => Case::Absent,
                _ => Case::GuardFails,
            }
        }
    }

    struct ScriptedStore {
        inner: InMemoryAllocationStore,
        failing_orders: Vec<String>,
    }

    #[async_trait]
    impl AllocationStore for ScriptedStore {
        async fn get(&self, order_id: &OrderId, sku: &Sku) -> Outcome<Option<Allocation>> {
            if self.failing_orders.iter().any(|o| o == order_id.as_str()) {
                return Err(Failure::unrecognized("socket hang up"));
            }
            self.inner.get(order_id, sku).await
        }

        async fn apply_guarded(&self, command: &TransitionCommand) -> Outcome<()> {
            self.inner.apply_guarded(command).await
        }
    }

    fn scripted_batch(cases: &[Case]) -> (ScriptedStore, DeliveryBatch, Vec<String>) {
        let mut store = ScriptedStore {
            inner: InMemoryAllocationStore::new(),
            failing_orders: Vec::new(),
        };
        let mut records = Vec::new();
        let mut expected_retry = Vec::new();

        for (i, case) in cases.iter().enumerate() {
            let order_id = format!("order-{i:04}");
            let record_id = format!("msg-{i:04}");
            let record_body = match case {
                Case::BadBody => "garbage".to_string(),
                _ => body("PAYMENT_ACCEPTED", &order_id),
            };

            match case {
                Case::SuccessExisting => {
                    store.inner.put(seeded(&order_id, AllocationStatus::Allocated));
                }
                Case::GuardFails => {
                    store.inner.put(seeded(&order_id, AllocationStatus::Deallocated));
                }
                Case::Transient => {
                    store.failing_orders.push(order_id.clone());
                    expected_retry.push(record_id.clone());
                }
                Case::BadBody | Case::Absent => {}
            }

            records.push(DeliveryRecord {
                id: record_id,
                body: record_body,
            });
        }

        (store, DeliveryBatch::new(records), expected_retry)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Exactly the transient positions come back, in input order, in
        /// both processing modes.
        #[test]
        fn retry_classification_is_mode_independent(raw in prop::collection::vec(0u8..5, 0..12)) {
            let cases: Vec<Case> = raw.iter().copied().map(Case::from_index).collect();
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let (store, batch, expected) = scripted_batch(&cases);
            let sequential = runtime.block_on(
                BatchOrchestrator::new(TransitionService::new(store, PaymentOutcome::Accepted))
                    .process_batch(batch),
            );

            let (store, batch, _) = scripted_batch(&cases);
            let concurrent = runtime.block_on(
                BatchOrchestrator::new(TransitionService::new(store, PaymentOutcome::Accepted))
                    .with_max_concurrent(4)
                    .process_batch(batch),
            );

            prop_assert_eq!(&sequential.retry_ids, &expected);
            prop_assert_eq!(&concurrent.retry_ids, &expected);
        }
    }
}
