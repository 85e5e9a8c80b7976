//! Postgres adapters for the item, invoice and balance stores.
//!
//! Expected schema (migrations live with the deployment, not here):
//!
//! ```sql
//! CREATE TABLE items (
//!     id          UUID PRIMARY KEY,
//!     name        TEXT NOT NULL,
//!     unit        TEXT NOT NULL,
//!     amount      NUMERIC NOT NULL CHECK (amount >= 0),
//!     price_buy   NUMERIC NOT NULL,
//!     price_sale  NUMERIC NOT NULL,
//!     deleted_at  TIMESTAMPTZ
//! );
//!
//! CREATE TABLE recipe_edges (
//!     composite_id          UUID NOT NULL REFERENCES items(id),
//!     component_id          UUID NOT NULL REFERENCES items(id),
//!     quantity_per_portion  NUMERIC NOT NULL CHECK (quantity_per_portion > 0),
//!     notes                 TEXT,
//!     position              INT NOT NULL,
//!     PRIMARY KEY (composite_id, component_id)
//! );
//!
//! CREATE TABLE invoices (
//!     id                 UUID PRIMARY KEY,
//!     invoice_type       TEXT NOT NULL,
//!     total              NUMERIC NOT NULL,
//!     created_at         TIMESTAMPTZ NOT NULL,
//!     has_product_lines  BOOLEAN NOT NULL DEFAULT FALSE
//! );
//!
//! CREATE TABLE period_balances (
//!     period_type               TEXT NOT NULL,
//!     period_start              DATE NOT NULL,
//!     total_invoice_sale        NUMERIC NOT NULL,
//!     total_invoice_buy         NUMERIC NOT NULL,
//!     balance_invoice           NUMERIC NOT NULL,
//!     total_product_price_sale  NUMERIC NOT NULL,
//!     total_product_price_buy   NUMERIC NOT NULL,
//!     balance_product           NUMERIC NOT NULL,
//!     updated_at                TIMESTAMPTZ NOT NULL,
//!     PRIMARY KEY (period_type, period_start)
//! );
//! ```

mod balances;
mod invoices;
mod items;

pub use balances::PostgresBalanceStore;
pub use invoices::PostgresInvoiceStore;
pub use items::PostgresItemStore;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::InfraError;

/// Open a connection pool for all adapters.
pub async fn connect(database_url: &str) -> Result<PgPool, InfraError> {
    Ok(PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?)
}

/// Flatten an sqlx error into the message carried by the store error types.
pub(crate) fn describe_sqlx_error(operation: &str, err: sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => format!("database error in {operation} ({code}): {}", db_err.message()),
            None => format!("database error in {operation}: {}", db_err.message()),
        },
        sqlx::Error::PoolClosed => format!("connection pool closed in {operation}"),
        sqlx::Error::RowNotFound => format!("unexpected row not found in {operation}"),
        other => format!("sqlx error in {operation}: {other}"),
    }
}
