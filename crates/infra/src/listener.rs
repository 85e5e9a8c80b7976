//! Ledger event listener.
//!
//! Turns invoice mutations into balance recomputation:
//!
//! - **Per invoice, sequential**: a second event for an invoice whose balances
//!   are being recomputed waits for that recomputation, then runs its own.
//!   Different invoices proceed in parallel.
//! - **Valuation, system-wide single flight**: the stock valuation step runs
//!   at most once at a time across the process. Callers busy-poll a flag with
//!   a short sleep until it is free.
//!
//! The invoice lock is released before the valuation step, so a slow
//! valuation never holds up the next recomputation of the same invoice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use hotelpos_accounting::{
    BalanceEngine, BalanceError, BalanceResult, BalanceStore, Invoice, InvoiceStore, LedgerEvent,
    PeriodBalance,
};
use hotelpos_core::InvoiceId;
use hotelpos_events::{Event, EventHandler, KeyedLocks};
use hotelpos_inventory::ItemStore;

pub struct LedgerListener<I, B, S> {
    engine: BalanceEngine<I, B, S>,
    invoice_locks: KeyedLocks<InvoiceId>,
    valuation_running: AtomicBool,
    poll_interval: Duration,
}

/// Clears the valuation flag on drop, including on error or panic.
struct ValuationSlot<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ValuationSlot<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl<I, B, S> LedgerListener<I, B, S>
where
    I: InvoiceStore,
    B: BalanceStore,
    S: ItemStore,
{
    pub fn new(engine: BalanceEngine<I, B, S>, poll_interval: Duration) -> Self {
        Self {
            engine,
            invoice_locks: KeyedLocks::new(),
            valuation_running: AtomicBool::new(false),
            poll_interval,
        }
    }

    pub fn engine(&self) -> &BalanceEngine<I, B, S> {
        &self.engine
    }

    /// A detail line of `invoice_id` was created or deleted.
    pub async fn on_detail_changed(&self, invoice_id: InvoiceId, is_product_line: bool) -> BalanceResult<()> {
        {
            let _invoice = self.invoice_locks.lock(invoice_id).await;
            let rows = self.engine.update_balance_by_invoice_id(invoice_id).await?;
            debug!(invoice_id = %invoice_id, rows = rows.len(), "invoice balances recomputed");
        }

        if is_product_line {
            self.run_valuation().await?;
        }
        Ok(())
    }

    /// `invoice` was deleted; it must already be gone from the invoice store.
    pub async fn on_invoice_deleted(&self, invoice: &Invoice, had_products: bool) -> BalanceResult<()> {
        {
            let _invoice = self.invoice_locks.lock(invoice.id).await;
            let rows = self.engine.remove_invoice_from_balance(invoice).await?;
            debug!(invoice_id = %invoice.id, rows = rows.len(), "deleted invoice removed from balances");
        }

        if had_products {
            self.run_valuation().await?;
        }
        Ok(())
    }

    /// Run the stock valuation once no other valuation is in flight.
    pub async fn run_valuation(&self) -> BalanceResult<Vec<PeriodBalance>> {
        let _slot = self.acquire_valuation_slot().await;
        self.engine.update_balance_with_current_products().await
    }

    pub fn valuation_in_flight(&self) -> bool {
        self.valuation_running.load(Ordering::Acquire)
    }

    async fn acquire_valuation_slot(&self) -> ValuationSlot<'_> {
        while self
            .valuation_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tokio::time::sleep(self.poll_interval).await;
        }
        ValuationSlot {
            flag: &self.valuation_running,
        }
    }
}

#[async_trait]
impl<I, B, S> EventHandler<LedgerEvent> for LedgerListener<I, B, S>
where
    I: InvoiceStore,
    B: BalanceStore,
    S: ItemStore,
{
    type Error = BalanceError;

    async fn handle(&self, event: LedgerEvent) -> Result<(), Self::Error> {
        match &event {
            LedgerEvent::DetailCreated {
                invoice_id,
                is_product_line,
                ..
            }
            | LedgerEvent::DetailDeleted {
                invoice_id,
                is_product_line,
                ..
            } => self.on_detail_changed(*invoice_id, *is_product_line).await?,
            LedgerEvent::InvoiceDeleted {
                invoice,
                had_products,
                ..
            } => self.on_invoice_deleted(invoice, *had_products).await?,
        }

        info!(
            invoice_id = %event.invoice_id(),
            event_type = event.event_type(),
            "ledger event handled"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotelpos_accounting::{InMemoryBalanceStore, InMemoryInvoiceStore, InvoiceKind, PeriodKey, PeriodType};
    use hotelpos_inventory::InMemoryItemStore;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    type Listener = LedgerListener<Arc<InMemoryInvoiceStore>, Arc<InMemoryBalanceStore>, Arc<InMemoryItemStore>>;

    fn listener() -> (Listener, Arc<InMemoryInvoiceStore>) {
        let invoices = Arc::new(InMemoryInvoiceStore::new());
        let engine = BalanceEngine::new(
            invoices.clone(),
            Arc::new(InMemoryBalanceStore::new()),
            Arc::new(InMemoryItemStore::new()),
        );
        (LedgerListener::new(engine, Duration::from_millis(1)), invoices)
    }

    #[tokio::test]
    async fn detail_event_recomputes_invoice_buckets() {
        let (listener, invoices) = listener();
        let invoice = Invoice::new(InvoiceKind::Sale, Decimal::new(4250, 2), chrono::Utc::now());
        invoices.insert(invoice.clone()).unwrap();

        listener
            .handle(LedgerEvent::detail_created(invoice.id, false))
            .await
            .unwrap();

        let key = PeriodKey::containing(PeriodType::Daily, invoice.created_at).unwrap();
        let row = listener.engine().balance(key).await.unwrap().unwrap();
        assert_eq!(row.total_invoice_sale, Decimal::new(4250, 2));
        assert!(!listener.valuation_in_flight());
    }

    #[tokio::test]
    async fn missing_invoice_is_reported_to_the_caller() {
        let (listener, _) = listener();
        let err = listener
            .handle(LedgerEvent::detail_deleted(InvoiceId::new(), true))
            .await
            .unwrap_err();
        assert!(matches!(err, BalanceError::Domain(_)));
    }
}
