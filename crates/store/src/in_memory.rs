use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use stockgate_allocation::{Allocation, TransitionCommand};
use stockgate_core::{Failure, OrderId, Outcome, Sku};

use super::r#trait::AllocationStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AllocationKey {
    order_id: OrderId,
    sku: Sku,
}

/// In-memory allocation store.
///
/// Intended for tests/dev. The guarded write holds both locks for its full
/// duration, so the record update and the stock increment are atomic.
#[derive(Debug, Default)]
pub struct InMemoryAllocationStore {
    records: RwLock<HashMap<AllocationKey, Allocation>>,
    stock: RwLock<HashMap<Sku, i64>>,
}

impl InMemoryAllocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record (what the upstream allocation process would write).
    pub fn put(&self, allocation: Allocation) {
        let key = AllocationKey {
            order_id: allocation.order_id().clone(),
            sku: allocation.sku().clone(),
        };
        self.records
            .write()
            .expect("records lock poisoned")
            .insert(key, allocation);
    }

    /// Current stock counter for a SKU (0 when never incremented).
    pub fn stock_level(&self, sku: &Sku) -> i64 {
        self.stock
            .read()
            .expect("stock lock poisoned")
            .get(sku)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl AllocationStore for InMemoryAllocationStore {
    async fn get(&self, order_id: &OrderId, sku: &Sku) -> Outcome<Option<Allocation>> {
        let records = self
            .records
            .read()
            .map_err(|_| Failure::unrecognized("records lock poisoned"))?;

        let key = AllocationKey {
            order_id: order_id.clone(),
            sku: sku.clone(),
        };
        Ok(records.get(&key).cloned())
    }

    async fn apply_guarded(&self, command: &TransitionCommand) -> Outcome<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| Failure::unrecognized("records lock poisoned"))?;
        let mut stock = self
            .stock
            .write()
            .map_err(|_| Failure::unrecognized("stock lock poisoned"))?;

        let key = AllocationKey {
            order_id: command.order_id().clone(),
            sku: command.sku().clone(),
        };

        let current = records.get(&key);
        let matches_guard = current.is_some_and(|rec| rec.status() == command.from_status());
        if !matches_guard {
            return Err(Failure::invalid_transition(format!(
                "({}, {}): expected status {}, found {}",
                command.order_id(),
                command.sku(),
                command.from_status(),
                current.map_or("<absent>", |rec| rec.status().as_str()),
            )));
        }

        // Safe: the guard above proved the record exists.
        let rec = current.cloned().ok_or_else(|| Failure::unrecognized("record vanished"))?;
        let updated = Allocation::new(
            rec.order_id().as_str(),
            rec.sku().as_str(),
            rec.user_id().as_str(),
            rec.units(),
            rec.price(),
            rec.created_at(),
            command.updated_at(),
            command.to_status(),
        )?;
        records.insert(key, updated);

        if let Some(delta) = command.stock_delta() {
            *stock.entry(command.sku().clone()).or_insert(0) += delta;
        }

        Ok(())
    }
}
