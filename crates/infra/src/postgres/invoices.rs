use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use hotelpos_accounting::{Invoice, InvoiceKind, InvoiceStore, LedgerStoreError};
use hotelpos_core::InvoiceId;

use super::describe_sqlx_error;

/// Read-only view of invoice headers.
#[derive(Debug, Clone)]
pub struct PostgresInvoiceStore {
    pool: Arc<PgPool>,
}

impl PostgresInvoiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn decode_invoice(row: &PgRow) -> Result<Invoice, LedgerStoreError> {
    let backend = |e: sqlx::Error| LedgerStoreError::Backend(describe_sqlx_error("decode_invoice", e));

    let id: Uuid = row.try_get("id").map_err(backend)?;
    let code: String = row.try_get("invoice_type").map_err(backend)?;
    let kind = InvoiceKind::from_code(&code)
        .map_err(|e| LedgerStoreError::Backend(format!("invoice {id}: {e}")))?;

    Ok(Invoice {
        id: InvoiceId::from_uuid(id),
        kind,
        total: row.try_get("total").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        has_product_lines: row.try_get("has_product_lines").map_err(backend)?,
    })
}

#[async_trait]
impl InvoiceStore for PostgresInvoiceStore {
    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, LedgerStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, invoice_type, total, created_at, has_product_lines
            FROM invoices
            WHERE id = $1
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| LedgerStoreError::Backend(describe_sqlx_error("get_invoice", e)))?;

        row.as_ref().map(decode_invoice).transpose()
    }

    async fn created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, LedgerStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, invoice_type, total, created_at, has_product_lines
            FROM invoices
            WHERE created_at >= $1 AND created_at < $2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| LedgerStoreError::Backend(describe_sqlx_error("invoices_created_between", e)))?;

        rows.iter().map(decode_invoice).collect()
    }
}
