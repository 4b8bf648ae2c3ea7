//! `stockgate-observability` — logging/tracing wiring.

mod tracing_init;

pub use tracing_init::{init, init_with_default_filter};
