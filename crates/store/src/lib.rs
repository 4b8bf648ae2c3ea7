//! `stockgate-store` — guarded persistence boundary.
//!
//! This crate defines the [`AllocationStore`] port and its two
//! implementations, without leaking storage assumptions into the domain:
//! the guarded write's expected-pre-status check is the pipeline's only
//! synchronization primitive.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryAllocationStore;
pub use postgres::{PostgresAllocationStore, PostgresStoreConfig};
pub use r#trait::AllocationStore;
