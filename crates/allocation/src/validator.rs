//! Strict parsing of untrusted delivery payloads into typed events.
//!
//! The inbound body is a JSON envelope from the upstream change-stream
//! relay: `{"detail": {"dynamodb": {"NewImage": <event fields>}}}`. Every
//! violation is non-transient: redelivery cannot fix a structurally
//! invalid message, and classifying it transient would loop it forever.

use serde::Deserialize;
use serde_json::{Map, Value};

use stockgate_core::{Failure, Outcome};

use crate::event::{PaymentEvent, PaymentOutcome};

#[derive(Debug, Deserialize)]
struct DeliveryEnvelope {
    detail: Detail,
}

#[derive(Debug, Deserialize)]
struct Detail {
    dynamodb: ChangeCapture,
}

#[derive(Debug, Deserialize)]
struct ChangeCapture {
    #[serde(rename = "NewImage")]
    new_image: Value,
}

/// Parses one delivery body into a [`PaymentEvent`] of a fixed family.
///
/// A validator is pinned to the single event family its worker serves;
/// any other discriminator value is rejected, including the other known
/// payment event.
#[derive(Debug, Clone, Copy)]
pub struct EventValidator {
    expected: PaymentOutcome,
}

impl EventValidator {
    pub fn new(expected: PaymentOutcome) -> Self {
        Self { expected }
    }

    pub fn expected(&self) -> PaymentOutcome {
        self.expected
    }

    /// Parse and validate an untrusted delivery body.
    pub fn parse(&self, body: &str) -> Outcome<PaymentEvent> {
        let envelope: DeliveryEnvelope = serde_json::from_str(body)
            .map_err(|e| Failure::invalid_arguments(format!("envelope: {e}")))?;

        let image = envelope
            .detail
            .dynamodb
            .new_image
            .as_object()
            .ok_or_else(|| Failure::invalid_arguments("NewImage: expected an object"))?;

        let name = text_field(image, "eventName")?.trim().to_string();
        if name != self.expected.event_name() {
            return Err(Failure::invalid_arguments(format!(
                "eventName: expected {}, found '{name}'",
                self.expected.event_name()
            )));
        }

        PaymentEvent::new(
            text_field(image, "orderId")?,
            text_field(image, "sku")?,
            text_field(image, "userId")?,
            int_field(image, "units")?,
            number_field(image, "price")?,
            text_field(image, "createdAt")?,
            text_field(image, "updatedAt")?,
        )
    }
}

fn text_field<'a>(image: &'a Map<String, Value>, name: &str) -> Outcome<&'a str> {
    image
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| Failure::invalid_arguments(format!("{name}: missing or not a string")))
}

fn int_field(image: &Map<String, Value>, name: &str) -> Outcome<i64> {
    image
        .get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| Failure::invalid_arguments(format!("{name}: missing or not an integer")))
}

fn number_field(image: &Map<String, Value>, name: &str) -> Outcome<f64> {
    image
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| Failure::invalid_arguments(format!("{name}: missing or not a number")))
}
