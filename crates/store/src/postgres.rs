//! Postgres-backed allocation store.
//!
//! The guarded write is a conditional `UPDATE ... WHERE status = <expected>`;
//! PostgreSQL reports zero affected rows when the precondition no longer
//! holds, which is exactly the signal the pipeline needs. Rejection
//! transitions wrap the allocation update and the stock increment in one
//! transaction, committed together or not at all.
//!
//! ## Expected schema
//!
//! ```sql
//! CREATE TABLE allocations (
//!     order_id   TEXT NOT NULL,
//!     sku        TEXT NOT NULL,
//!     user_id    TEXT NOT NULL,
//!     units      BIGINT NOT NULL CHECK (units >= 1),
//!     price      DOUBLE PRECISION NOT NULL CHECK (price >= 0),
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     status     TEXT NOT NULL,
//!     PRIMARY KEY (order_id, sku)
//! );
//!
//! CREATE TABLE warehouse_stock (
//!     sku       TEXT PRIMARY KEY,
//!     available BIGINT NOT NULL DEFAULT 0
//! );
//! ```
//!
//! ## Error mapping
//!
//! | Condition | Failure kind | Transient |
//! |-----------|--------------|-----------|
//! | Conditional update affected zero rows | `InvalidTransition` | no |
//! | Record read back fails validation | `InvalidArguments` | no |
//! | Column missing or mistyped on read | `InvalidArguments` | no |
//! | Any other sqlx error (connection, timeout, pool closed, ...) | `Unrecognized` | yes |

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use stockgate_allocation::{Allocation, AllocationStatus, TransitionCommand};
use stockgate_core::{Failure, OrderId, Outcome, Sku};

use super::r#trait::AllocationStore;

/// Target table names for one worker, supplied by bootstrap.
#[derive(Debug, Clone)]
pub struct PostgresStoreConfig {
    allocations_table: String,
    stock_table: String,
}

impl Default for PostgresStoreConfig {
    fn default() -> Self {
        Self {
            allocations_table: "allocations".to_string(),
            stock_table: "warehouse_stock".to_string(),
        }
    }
}

impl PostgresStoreConfig {
    pub fn with_allocations_table(mut self, name: impl Into<String>) -> Self {
        self.allocations_table = name.into();
        self
    }

    pub fn with_stock_table(mut self, name: impl Into<String>) -> Self {
        self.stock_table = name.into();
        self
    }

    pub fn allocations_table(&self) -> &str {
        &self.allocations_table
    }

    pub fn stock_table(&self) -> &str {
        &self.stock_table
    }

    fn validate(&self) -> Outcome<()> {
        ensure_identifier(&self.allocations_table)?;
        ensure_identifier(&self.stock_table)
    }
}

/// Table names are interpolated into SQL, so they must be plain
/// identifiers, never caller-controlled strings with quoting tricks.
fn ensure_identifier(name: &str) -> Outcome<()> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if head_ok && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(Failure::invalid_arguments(format!(
            "table name '{name}' is not a valid identifier"
        )))
    }
}

/// Postgres-backed allocation store.
///
/// Thread-safe: all operations go through the sqlx connection pool.
#[derive(Debug, Clone)]
pub struct PostgresAllocationStore {
    pool: PgPool,
    config: PostgresStoreConfig,
}

impl PostgresAllocationStore {
    pub fn new(pool: PgPool, config: PostgresStoreConfig) -> Outcome<Self> {
        config.validate()?;
        Ok(Self { pool, config })
    }

    #[instrument(skip(self), fields(order_id = %order_id, sku = %sku), err)]
    async fn fetch(&self, order_id: &OrderId, sku: &Sku) -> Outcome<Option<Allocation>> {
        let query = format!(
            "SELECT order_id, sku, user_id, units, price, created_at, updated_at, status \
             FROM {} WHERE order_id = $1 AND sku = $2",
            self.config.allocations_table
        );

        let row = sqlx::query(&query)
            .bind(order_id.as_str())
            .bind(sku.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Failure::unrecognized(format!("get: {e}")))?;

        match row {
            None => Ok(None),
            Some(row) => decode_allocation(&row).map(Some),
        }
    }

    #[instrument(
        skip(self, command),
        fields(
            order_id = %command.order_id(),
            sku = %command.sku(),
            from = %command.from_status(),
            to = %command.to_status()
        ),
        err
    )]
    async fn write_guarded(&self, command: &TransitionCommand) -> Outcome<()> {
        let update = format!(
            "UPDATE {} SET status = $1, updated_at = $2 \
             WHERE order_id = $3 AND sku = $4 AND status = $5",
            self.config.allocations_table
        );

        match command.stock_delta() {
            None => {
                let result = sqlx::query(&update)
                    .bind(command.to_status().as_str())
                    .bind(command.updated_at())
                    .bind(command.order_id().as_str())
                    .bind(command.sku().as_str())
                    .bind(command.from_status().as_str())
                    .execute(&self.pool)
                    .await
                    .map_err(|e| Failure::unrecognized(format!("apply_guarded: {e}")))?;

                ensure_precondition(result.rows_affected(), command)
            }
            Some(delta) => {
                let upsert = format!(
                    "INSERT INTO {table} (sku, available) VALUES ($1, $2) \
                     ON CONFLICT (sku) DO UPDATE \
                     SET available = {table}.available + EXCLUDED.available",
                    table = self.config.stock_table
                );

                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| Failure::unrecognized(format!("begin: {e}")))?;

                let result = sqlx::query(&update)
                    .bind(command.to_status().as_str())
                    .bind(command.updated_at())
                    .bind(command.order_id().as_str())
                    .bind(command.sku().as_str())
                    .bind(command.from_status().as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| Failure::unrecognized(format!("apply_guarded: {e}")))?;

                if result.rows_affected() == 0 {
                    // Roll back before reporting; nothing may be committed.
                    tx.rollback()
                        .await
                        .map_err(|e| Failure::unrecognized(format!("rollback: {e}")))?;
                    return ensure_precondition(0, command);
                }

                sqlx::query(&upsert)
                    .bind(command.sku().as_str())
                    .bind(delta)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| Failure::unrecognized(format!("stock increment: {e}")))?;

                tx.commit()
                    .await
                    .map_err(|e| Failure::unrecognized(format!("commit: {e}")))
            }
        }
    }
}

fn ensure_precondition(rows_affected: u64, command: &TransitionCommand) -> Outcome<()> {
    if rows_affected == 0 {
        return Err(Failure::invalid_transition(format!(
            "({}, {}): no record with status {}",
            command.order_id(),
            command.sku(),
            command.from_status()
        )));
    }
    Ok(())
}

fn decode_allocation(row: &sqlx::postgres::PgRow) -> Outcome<Allocation> {
    let text = |column: &str| -> Outcome<String> {
        row.try_get::<String, _>(column)
            .map_err(|e| Failure::invalid_arguments(format!("column {column}: {e}")))
    };

    let status_raw = text("status")?;
    let units: i64 = row
        .try_get("units")
        .map_err(|e| Failure::invalid_arguments(format!("column units: {e}")))?;
    let price: f64 = row
        .try_get("price")
        .map_err(|e| Failure::invalid_arguments(format!("column price: {e}")))?;

    // Storage is a trust boundary: rebuild through the validating
    // constructor so a corrupt row surfaces as non-transient.
    Allocation::new(
        &text("order_id")?,
        &text("sku")?,
        &text("user_id")?,
        units,
        price,
        &text("created_at")?,
        &text("updated_at")?,
        AllocationStatus::parse(&status_raw)?,
    )
}

#[async_trait]
impl AllocationStore for PostgresAllocationStore {
    async fn get(&self, order_id: &OrderId, sku: &Sku) -> Outcome<Option<Allocation>> {
        self.fetch(order_id, sku).await
    }

    async fn apply_guarded(&self, command: &TransitionCommand) -> Outcome<()> {
        self.write_guarded(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PostgresStoreConfig::default().validate().is_ok());
    }

    #[test]
    fn config_rejects_non_identifier_table_names() {
        let config = PostgresStoreConfig::default().with_allocations_table("allocations; DROP");
        assert!(config.validate().is_err());

        let config = PostgresStoreConfig::default().with_stock_table("1stock");
        assert!(config.validate().is_err());

        let config = PostgresStoreConfig::default().with_allocations_table("allocations_v2");
        assert!(config.validate().is_ok());
    }
}
