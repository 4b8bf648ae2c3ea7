use stockgate_core::{field, OrderId, Outcome, Sku, UserId};

/// The two payment outcomes this pipeline reacts to.
///
/// One worker serves one outcome; the wire discriminator of every message
/// it consumes must match `event_name()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentOutcome {
    Accepted,
    Rejected,
}

impl PaymentOutcome {
    /// Wire discriminator for this event family.
    pub const fn event_name(&self) -> &'static str {
        match self {
            PaymentOutcome::Accepted => "PAYMENT_ACCEPTED",
            PaymentOutcome::Rejected => "PAYMENT_REJECTED",
        }
    }
}

impl core::fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.event_name())
    }
}

/// A validated payment-outcome event.
///
/// Transient: it arrives in a delivery envelope, triggers at most one
/// guarded write, and is never persisted. Carries exactly the seven fields
/// of the upstream event; nothing else survives validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEvent {
    order_id: OrderId,
    sku: Sku,
    user_id: UserId,
    units: i64,
    price: f64,
    created_at: String,
    updated_at: String,
}

impl PaymentEvent {
    /// Validating constructor over untrusted raw fields.
    pub fn new(
        order_id: &str,
        sku: &str,
        user_id: &str,
        units: i64,
        price: f64,
        created_at: &str,
        updated_at: &str,
    ) -> Outcome<Self> {
        Ok(Self {
            order_id: OrderId::parse(order_id)?,
            sku: Sku::parse(sku)?,
            user_id: UserId::parse(user_id)?,
            units: field::units("units", units)?,
            price: field::price("price", price)?,
            created_at: field::text("createdAt", created_at)?,
            updated_at: field::text("updatedAt", updated_at)?,
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_distinct_literals() {
        assert_eq!(PaymentOutcome::Accepted.event_name(), "PAYMENT_ACCEPTED");
        assert_eq!(PaymentOutcome::Rejected.event_name(), "PAYMENT_REJECTED");
    }

    #[test]
    fn constructor_validates_every_field() {
        let event = PaymentEvent::new(
            "mockOrderId",
            "mockSku",
            "mockUserId",
            2,
            10.33,
            "2024-01-01T00:00:00Z",
            "2024-01-02T00:00:00Z",
        )
        .unwrap();
        assert_eq!(event.sku().as_str(), "mockSku");
        assert_eq!(event.units(), 2);

        assert!(PaymentEvent::new("mockOrderId", "s", "mockUserId", 2, 10.33, "t1", "t2").is_err());
        assert!(
            PaymentEvent::new("mockOrderId", "mockSku", "mockUserId", 0, 10.33, "2024", "2024")
                .is_err()
        );
    }
}
