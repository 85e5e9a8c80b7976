use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use hotelpos_accounting::{
    BalanceStore, BalanceUpdate, LedgerStoreError, PeriodBalance, PeriodKey, PeriodType,
};

use super::describe_sqlx_error;

/// Period balance rows in Postgres.
///
/// `upsert_with` creates the row with `INSERT .. ON CONFLICT DO NOTHING`, then
/// takes `SELECT .. FOR UPDATE` and writes inside the same transaction, so
/// recomputations of one period serialize on the row lock.
#[derive(Debug, Clone)]
pub struct PostgresBalanceStore {
    pool: Arc<PgPool>,
}

impl PostgresBalanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn backend(operation: &str) -> impl FnOnce(sqlx::Error) -> LedgerStoreError + '_ {
    move |e| LedgerStoreError::Backend(describe_sqlx_error(operation, e))
}

const BALANCE_COLUMNS: &str = "period_type, period_start, total_invoice_sale, total_invoice_buy, \
     balance_invoice, total_product_price_sale, total_product_price_buy, balance_product, updated_at";

fn decode_balance(row: &PgRow) -> Result<PeriodBalance, LedgerStoreError> {
    let code: String = row.try_get("period_type").map_err(backend("decode_balance"))?;
    let period_type = PeriodType::from_code(&code)
        .map_err(|e| LedgerStoreError::Backend(format!("corrupt balance row: {e}")))?;

    let read = || -> Result<PeriodBalance, sqlx::Error> {
        Ok(PeriodBalance {
            key: PeriodKey {
                period_type,
                period_start: row.try_get("period_start")?,
            },
            total_invoice_sale: row.try_get("total_invoice_sale")?,
            total_invoice_buy: row.try_get("total_invoice_buy")?,
            balance_invoice: row.try_get("balance_invoice")?,
            total_product_price_sale: row.try_get("total_product_price_sale")?,
            total_product_price_buy: row.try_get("total_product_price_buy")?,
            balance_product: row.try_get("balance_product")?,
            updated_at: row.try_get("updated_at")?,
        })
    };
    read().map_err(backend("decode_balance"))
}

#[async_trait]
impl BalanceStore for PostgresBalanceStore {
    #[instrument(skip(self, update), fields(period = %key), err)]
    async fn upsert_with(
        &self,
        key: PeriodKey,
        update: BalanceUpdate,
    ) -> Result<PeriodBalance, LedgerStoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(backend("begin_transaction"))?;

        sqlx::query(
            r#"
            INSERT INTO period_balances (
                period_type, period_start,
                total_invoice_sale, total_invoice_buy, balance_invoice,
                total_product_price_sale, total_product_price_buy, balance_product,
                updated_at
            )
            VALUES ($1, $2, 0, 0, 0, 0, 0, 0, $3)
            ON CONFLICT (period_type, period_start) DO NOTHING
            "#,
        )
        .bind(key.period_type.code())
        .bind(key.period_start)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(backend("create_balance_row"))?;

        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM period_balances \
             WHERE period_type = $1 AND period_start = $2 FOR UPDATE"
        ))
        .bind(key.period_type.code())
        .bind(key.period_start)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend("lock_balance_row"))?;

        let mut balance = decode_balance(&row)?;
        balance.apply(update, now);

        sqlx::query(
            r#"
            UPDATE period_balances SET
                total_invoice_sale = $3,
                total_invoice_buy = $4,
                balance_invoice = $5,
                total_product_price_sale = $6,
                total_product_price_buy = $7,
                balance_product = $8,
                updated_at = $9
            WHERE period_type = $1 AND period_start = $2
            "#,
        )
        .bind(key.period_type.code())
        .bind(key.period_start)
        .bind(balance.total_invoice_sale)
        .bind(balance.total_invoice_buy)
        .bind(balance.balance_invoice)
        .bind(balance.total_product_price_sale)
        .bind(balance.total_product_price_buy)
        .bind(balance.balance_product)
        .bind(balance.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend("update_balance_row"))?;

        tx.commit().await.map_err(backend("commit_transaction"))?;
        Ok(balance)
    }

    async fn get(&self, key: PeriodKey) -> Result<Option<PeriodBalance>, LedgerStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM period_balances WHERE period_type = $1 AND period_start = $2"
        ))
        .bind(key.period_type.code())
        .bind(key.period_start)
        .fetch_optional(&*self.pool)
        .await
        .map_err(backend("get_balance"))?;

        row.as_ref().map(decode_balance).transpose()
    }

    async fn list(&self, period_type: PeriodType) -> Result<Vec<PeriodBalance>, LedgerStoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BALANCE_COLUMNS} FROM period_balances WHERE period_type = $1 ORDER BY period_start"
        ))
        .bind(period_type.code())
        .fetch_all(&*self.pool)
        .await
        .map_err(backend("list_balances"))?;

        rows.iter().map(decode_balance).collect()
    }
}
