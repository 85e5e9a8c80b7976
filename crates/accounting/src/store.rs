//! Invoice read model and balance row storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use hotelpos_core::InvoiceId;

use crate::balance::{BalanceUpdate, PeriodBalance};
use crate::invoice::Invoice;
use crate::period::{PeriodKey, PeriodType};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerStoreError {
    #[error("ledger store lock poisoned")]
    Poisoned,

    #[error("ledger storage failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, LedgerStoreError>;

    /// Invoices with `from <= created_at < to`.
    async fn created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, LedgerStoreError>;
}

/// Balance rows keyed by period.
///
/// `upsert_with` must create the row if absent and apply the update while
/// holding an exclusive lock on that row, so two recomputations of the same
/// period never interleave their writes.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn upsert_with(
        &self,
        key: PeriodKey,
        update: BalanceUpdate,
    ) -> Result<PeriodBalance, LedgerStoreError>;

    async fn get(&self, key: PeriodKey) -> Result<Option<PeriodBalance>, LedgerStoreError>;

    /// Rows of one period type, oldest first.
    async fn list(&self, period_type: PeriodType) -> Result<Vec<PeriodBalance>, LedgerStoreError>;
}

#[async_trait]
impl<S> InvoiceStore for Arc<S>
where
    S: InvoiceStore + ?Sized,
{
    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, LedgerStoreError> {
        (**self).get(id).await
    }

    async fn created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, LedgerStoreError> {
        (**self).created_between(from, to).await
    }
}

#[async_trait]
impl<S> BalanceStore for Arc<S>
where
    S: BalanceStore + ?Sized,
{
    async fn upsert_with(
        &self,
        key: PeriodKey,
        update: BalanceUpdate,
    ) -> Result<PeriodBalance, LedgerStoreError> {
        (**self).upsert_with(key, update).await
    }

    async fn get(&self, key: PeriodKey) -> Result<Option<PeriodBalance>, LedgerStoreError> {
        (**self).get(key).await
    }

    async fn list(&self, period_type: PeriodType) -> Result<Vec<PeriodBalance>, LedgerStoreError> {
        (**self).list(period_type).await
    }
}

/// In-memory invoice read model for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceStore {
    inner: RwLock<HashMap<InvoiceId, Invoice>>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, invoice: Invoice) -> Result<(), LedgerStoreError> {
        let mut map = self.inner.write().map_err(|_| LedgerStoreError::Poisoned)?;
        map.insert(invoice.id, invoice);
        Ok(())
    }

    pub fn remove(&self, id: InvoiceId) -> Result<Option<Invoice>, LedgerStoreError> {
        let mut map = self.inner.write().map_err(|_| LedgerStoreError::Poisoned)?;
        Ok(map.remove(&id))
    }
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>, LedgerStoreError> {
        let map = self.inner.read().map_err(|_| LedgerStoreError::Poisoned)?;
        Ok(map.get(&id).cloned())
    }

    async fn created_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Invoice>, LedgerStoreError> {
        let map = self.inner.read().map_err(|_| LedgerStoreError::Poisoned)?;
        Ok(map
            .values()
            .filter(|i| from <= i.created_at && i.created_at < to)
            .cloned()
            .collect())
    }
}

/// In-memory balance rows; the map mutex stands in for the row lock.
#[derive(Debug, Default)]
pub struct InMemoryBalanceStore {
    rows: Mutex<BTreeMap<PeriodKey, PeriodBalance>>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn upsert_with(
        &self,
        key: PeriodKey,
        update: BalanceUpdate,
    ) -> Result<PeriodBalance, LedgerStoreError> {
        let now = Utc::now();
        let mut rows = self.rows.lock().map_err(|_| LedgerStoreError::Poisoned)?;
        let row = rows.entry(key).or_insert_with(|| PeriodBalance::empty(key, now));
        row.apply(update, now);
        Ok(row.clone())
    }

    async fn get(&self, key: PeriodKey) -> Result<Option<PeriodBalance>, LedgerStoreError> {
        let rows = self.rows.lock().map_err(|_| LedgerStoreError::Poisoned)?;
        Ok(rows.get(&key).cloned())
    }

    async fn list(&self, period_type: PeriodType) -> Result<Vec<PeriodBalance>, LedgerStoreError> {
        let rows = self.rows.lock().map_err(|_| LedgerStoreError::Poisoned)?;
        Ok(rows
            .values()
            .filter(|r| r.key.period_type == period_type)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn upsert_creates_then_updates_in_place() {
        let store = InMemoryBalanceStore::new();
        let key = PeriodKey::containing(PeriodType::Monthly, Utc::now()).unwrap();

        store
            .upsert_with(key, BalanceUpdate::Invoices { sale: Decimal::TEN, buy: Decimal::ONE })
            .await
            .unwrap();
        let row = store
            .upsert_with(key, BalanceUpdate::Products { sale: Decimal::TWO, buy: Decimal::ONE })
            .await
            .unwrap();

        assert_eq!(row.total_invoice_sale, Decimal::TEN);
        assert_eq!(row.balance_product, Decimal::ONE);
        assert_eq!(store.list(PeriodType::Monthly).await.unwrap().len(), 1);
        assert!(store.list(PeriodType::Daily).await.unwrap().is_empty());
    }
}
