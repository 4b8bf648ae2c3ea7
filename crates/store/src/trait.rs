use std::sync::Arc;

use async_trait::async_trait;

use stockgate_allocation::{Allocation, TransitionCommand};
use stockgate_core::{OrderId, Outcome, Sku};

/// Fetch-by-key and guarded-write operations over allocation records.
///
/// ## Outcome contract
///
/// - `get`: an absent record is a **valid non-error outcome** (`Ok(None)`):
///   duplicate delivery after completion, or no allocation ever existed.
///   A structurally invalid record read back maps to non-transient
///   `InvalidArguments`; transport/storage faults map to transient
///   `Unrecognized`.
/// - `apply_guarded`: one durable write: "set status/updated_at on
///   (order, SKU) only if the current status equals the command's expected
///   pre-status". When the command carries a stock delta, the allocation
///   update and the stock increment commit as **one atomic multi-record
///   write** or not at all. A failed precondition maps to non-transient
///   `InvalidTransition` (a stale precondition never resolves by
///   retrying); any other fault maps to transient `Unrecognized`.
///
/// ## Implementation requirements
///
/// Implementations must surface "precondition failed" distinguishably from
/// every other fault; that distinction is exactly what the pipeline maps
/// to the retry/no-retry decision. No external locking exists; the
/// precondition check is the only synchronization primitive, which is what
/// makes horizontal scaling of consumers safe.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Fetch the allocation for one (order, SKU) key.
    async fn get(&self, order_id: &OrderId, sku: &Sku) -> Outcome<Option<Allocation>>;

    /// Apply one guarded transition write.
    async fn apply_guarded(&self, command: &TransitionCommand) -> Outcome<()>;
}

#[async_trait]
impl<S> AllocationStore for Arc<S>
where
    S: AllocationStore + ?Sized,
{
    async fn get(&self, order_id: &OrderId, sku: &Sku) -> Outcome<Option<Allocation>> {
        (**self).get(order_id, sku).await
    }

    async fn apply_guarded(&self, command: &TransitionCommand) -> Outcome<()> {
        (**self).apply_guarded(command).await
    }
}
