//! Per-record transition pipeline.
//!
//! One call, one record, at most one guarded write:
//!
//! ```text
//! body
//!   ↓
//! 1. Validate the wire event (strict, non-transient on violation)
//!   ↓
//! 2. Fetch the stored allocation by (order, SKU)
//!   ↓
//! 3. Absent → success no-op (duplicate delivery or no allocation; both
//!    unresolvable by key and harmless to skip)
//!   ↓
//! 4. Build the immutable transition command
//!   ↓
//! 5. Guarded write (the precondition is the only synchronization)
//! ```
//!
//! Every failure is propagated unchanged; only the orchestrator translates
//! failures into retry decisions.

use tracing::{debug, instrument};

use stockgate_allocation::{
    EventValidator, PaymentOutcome, TransitionCommand, TransitionDirection,
};
use stockgate_core::Outcome;
use stockgate_store::AllocationStore;

/// Applies one payment-outcome family to stored allocations.
#[derive(Debug)]
pub struct TransitionService<S> {
    store: S,
    validator: EventValidator,
    direction: TransitionDirection,
}

impl<S> TransitionService<S>
where
    S: AllocationStore,
{
    /// A service handles exactly one event family; its validator and
    /// transition direction are fixed at construction.
    pub fn new(store: S, outcome: PaymentOutcome) -> Self {
        Self {
            store,
            validator: EventValidator::new(outcome),
            direction: TransitionDirection::for_outcome(outcome),
        }
    }

    pub fn outcome(&self) -> PaymentOutcome {
        self.validator.expected()
    }

    /// Process one delivery body to completion.
    #[instrument(skip_all, fields(family = %self.validator.expected()), err)]
    pub async fn handle(&self, body: &str) -> Outcome<()> {
        let event = self.validator.parse(body)?;

        let current = self.store.get(event.order_id(), event.sku()).await?;
        let Some(current) = current else {
            debug!(
                order_id = %event.order_id(),
                sku = %event.sku(),
                "no allocation for key; acknowledging without a write"
            );
            return Ok(());
        };

        let command = TransitionCommand::build(&current, &event, self.direction)?;
        self.store.apply_guarded(&command).await
    }
}
