use serde::{Deserialize, Serialize};

use stockgate_core::{field, Failure, OrderId, Outcome, Sku, UserId};

/// Allocation status lifecycle.
///
/// Only `ALLOCATED` records may transition; the other statuses are terminal
/// for this pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    Allocated,
    Completed,
    PaymentRejected,
    Deallocated,
}

impl AllocationStatus {
    /// Stable wire/storage literal for this status.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AllocationStatus::Allocated => "ALLOCATED",
            AllocationStatus::Completed => "COMPLETED",
            AllocationStatus::PaymentRejected => "PAYMENT_REJECTED",
            AllocationStatus::Deallocated => "DEALLOCATED",
        }
    }

    /// Parse a status literal read back from storage.
    pub fn parse(raw: &str) -> Outcome<Self> {
        match raw {
            "ALLOCATED" => Ok(AllocationStatus::Allocated),
            "COMPLETED" => Ok(AllocationStatus::Completed),
            "PAYMENT_REJECTED" => Ok(AllocationStatus::PaymentRejected),
            "DEALLOCATED" => Ok(AllocationStatus::Deallocated),
            other => Err(Failure::invalid_arguments(format!(
                "status: unknown value '{other}'"
            ))),
        }
    }

    /// Whether a payment outcome may still move this record.
    pub const fn may_transition(&self) -> bool {
        matches!(self, AllocationStatus::Allocated)
    }
}

impl core::fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The reserved-stock record for one (order, SKU) pair.
///
/// Created by the upstream allocation process; this pipeline reads it and
/// conditionally mutates `status`/`updated_at`, never deletes it.
///
/// Construction goes through [`Allocation::new`], which enforces every
/// field invariant. Storage is a trust boundary of its own, so records
/// read back are rebuilt through the same constructor; a value of this
/// type is always structurally valid.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    order_id: OrderId,
    sku: Sku,
    user_id: UserId,
    units: i64,
    price: f64,
    created_at: String,
    updated_at: String,
    status: AllocationStatus,
}

impl Allocation {
    /// Validating constructor; the only way to obtain an `Allocation`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: &str,
        sku: &str,
        user_id: &str,
        units: i64,
        price: f64,
        created_at: &str,
        updated_at: &str,
        status: AllocationStatus,
    ) -> Outcome<Self> {
        Ok(Self {
            order_id: OrderId::parse(order_id)?,
            sku: Sku::parse(sku)?,
            user_id: UserId::parse(user_id)?,
            units: field::units("units", units)?,
            price: field::price("price", price)?,
            created_at: field::text("createdAt", created_at)?,
            updated_at: field::text("updatedAt", updated_at)?,
            status,
        })
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    pub fn sku(&self) -> &Sku {
        &self.sku
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn units(&self) -> i64 {
        self.units
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn updated_at(&self) -> &str {
        &self.updated_at
    }

    pub fn status(&self) -> AllocationStatus {
        self.status
    }
}

/// Per-SKU available-unit counter, owned by the warehouse context.
///
/// This pipeline only increments it, atomically with a rejection
/// transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseStock {
    pub sku: Sku,
    pub available: i64,
}
