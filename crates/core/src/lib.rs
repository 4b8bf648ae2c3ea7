//! `stockgate-core` — pipeline foundation building blocks.
//!
//! This crate contains the **shared vocabulary** of the transition pipeline
//! (no infrastructure concerns): the success/failure algebra, the failure
//! taxonomy, and the validated identifier types.

pub mod field;
pub mod id;
pub mod outcome;

pub use id::{OrderId, Sku, UserId};
pub use outcome::{Failure, FailureKind, Outcome};
