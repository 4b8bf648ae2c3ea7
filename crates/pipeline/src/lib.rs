//! `stockgate-pipeline` — the transition pipeline itself.
//!
//! [`TransitionService`] turns one untrusted delivery body into at most one
//! guarded write; [`BatchOrchestrator`] runs a delivery batch through it
//! with per-record failure isolation and produces the identifiers the
//! transport should redeliver.

pub mod orchestrator;
pub mod service;

mod integration_tests;

pub use orchestrator::{BatchOrchestrator, DeliveryBatch, DeliveryRecord, RetryList};
pub use service::TransitionService;
