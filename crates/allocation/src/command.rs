//! Immutable transition commands.
//!
//! A [`TransitionCommand`] describes exactly one guarded write: the key,
//! the expected pre-status, the target status, and (for rejections) the
//! compensating stock increment. It exists only between the builder and
//! the store; it is never persisted.

use chrono::Utc;

use stockgate_core::{Failure, OrderId, Outcome, Sku};

use crate::allocation::{Allocation, AllocationStatus};
use crate::event::{PaymentEvent, PaymentOutcome};

/// Fixes the target status, expected pre-status, and compensation for one
/// event family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionDirection {
    from: AllocationStatus,
    to: AllocationStatus,
    returns_stock: bool,
}

impl TransitionDirection {
    /// Direction for a payment outcome: accepted completes the allocation,
    /// rejected deallocates it and returns its units to the stock pool.
    pub const fn for_outcome(outcome: PaymentOutcome) -> Self {
        match outcome {
            PaymentOutcome::Accepted => Self {
                from: AllocationStatus::Allocated,
                to: AllocationStatus::Completed,
                returns_stock: false,
            },
            PaymentOutcome::Rejected => Self {
                from: AllocationStatus::Allocated,
                to: AllocationStatus::Deallocated,
                returns_stock: true,
            },
        }
    }

    pub const fn from_status(&self) -> AllocationStatus {
        self.from
    }

    pub const fn to_status(&self) -> AllocationStatus {
        self.to
    }

    pub const fn returns_stock(&self) -> bool {
        self.returns_stock
    }
}

/// An immutable, fully-validated description of one guarded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCommand {
    order_id: OrderId,
    sku: Sku,
    units: i64,
    updated_at: String,
    from_status: AllocationStatus,
    to_status: AllocationStatus,
    stock_delta: Option<i64>,
}

impl TransitionCommand {
    /// Build the command for transitioning `current` as directed by the
    /// event's family.
    ///
    /// The stored allocation is authoritative: `units` is copied from it,
    /// not from the event, and the event's `units`/`price` are never
    /// compared against the stored values. The event only triggers the
    /// transition; it must refer to the same (order, SKU) key as the
    /// stored record.
    ///
    /// Stamps `updated_at` with the current processing time.
    pub fn build(
        current: &Allocation,
        event: &PaymentEvent,
        direction: TransitionDirection,
    ) -> Outcome<Self> {
        if event.order_id() != current.order_id() || event.sku() != current.sku() {
            return Err(Failure::invalid_arguments(format!(
                "key mismatch: event ({}, {}) vs stored ({}, {})",
                event.order_id(),
                event.sku(),
                current.order_id(),
                current.sku()
            )));
        }

        let stock_delta = direction.returns_stock().then(|| current.units());

        Ok(Self {
            order_id: current.order_id().clone(),
            sku: current.sku().clone(),
            units: current.units(),
            updated_at: Utc::now().to_rfc3339(),
            from_status: direction.from_status(),
            to_status: direction.to_status(),
            stock_delta,
        })
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn units(&self) -> i64 {
        self.units
    }

    pub fn updated_at(&self) -> &str {
        &self.updated_at
    }

    /// Expected pre-status; the guarded write's only precondition.
    pub fn from_status(&self) -> AllocationStatus {
        self.from_status
    }

    pub fn to_status(&self) -> AllocationStatus {
        self.to_status
    }

    /// Compensating stock increment, present only for rejections.
    pub fn stock_delta(&self) -> Option<i64> {
        self.stock_delta
    }
}
