use std::sync::Arc;

use tracing::info;

use hotelpos_accounting::{BalanceEngine, BalanceStore, InvoiceStore, LedgerEvent};
use hotelpos_events::{EventBus, EventEnvelope, InMemoryBusError, InMemoryEventBus};
use hotelpos_infra::{AppConfig, LedgerListener, ListenerWorker, ValuationJob, WorkerHandle};
use hotelpos_inventory::ItemStore;

/// In-process bus carrying ledger events from invoice writers to the listener.
pub type LedgerBus = InMemoryEventBus<EventEnvelope<LedgerEvent>>;

/// Running ledger pipeline: bus, listener and its two background workers.
pub struct Daemon<I, B, S> {
    bus: Arc<LedgerBus>,
    listener: Arc<LedgerListener<I, B, S>>,
    workers: Vec<WorkerHandle>,
}

impl<I, B, S> Daemon<I, B, S>
where
    I: InvoiceStore + 'static,
    B: BalanceStore + 'static,
    S: ItemStore + 'static,
{
    /// Must be called inside a Tokio runtime.
    pub fn start(config: &AppConfig, engine: BalanceEngine<I, B, S>) -> Self {
        let bus = Arc::new(LedgerBus::new());
        let listener = Arc::new(LedgerListener::new(engine, config.valuation_poll));

        let workers = vec![
            ListenerWorker::spawn("ledger-listener", &bus, listener.clone()),
            ValuationJob::spawn(listener.clone(), config.valuation_interval),
        ];
        info!(
            valuation_interval_secs = config.valuation_interval.as_secs(),
            "ledger pipeline started"
        );

        Self {
            bus,
            listener,
            workers,
        }
    }

    pub fn bus(&self) -> Arc<LedgerBus> {
        self.bus.clone()
    }

    pub fn listener(&self) -> &LedgerListener<I, B, S> {
        &self.listener
    }

    pub fn publish(&self, event: LedgerEvent) -> Result<(), InMemoryBusError> {
        self.bus.publish(EventEnvelope::wrap(event))
    }

    pub async fn shutdown(self) {
        for worker in self.workers {
            let name = worker.name();
            worker.shutdown().await;
            info!(worker = name, "worker stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use hotelpos_accounting::{
        InMemoryBalanceStore, InMemoryInvoiceStore, Invoice, InvoiceKind, PeriodKey, PeriodType,
    };
    use hotelpos_inventory::InMemoryItemStore;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn published_events_reach_the_balances() {
        let invoices = Arc::new(InMemoryInvoiceStore::new());
        let engine = BalanceEngine::new(
            invoices.clone(),
            Arc::new(InMemoryBalanceStore::new()),
            Arc::new(InMemoryItemStore::new()),
        );
        let daemon = Daemon::start(&AppConfig::default(), engine);

        let invoice = Invoice::new(InvoiceKind::Purchase, Decimal::new(1999, 2), Utc::now());
        invoices.insert(invoice.clone()).unwrap();
        daemon.publish(LedgerEvent::detail_created(invoice.id, false)).unwrap();

        let key = PeriodKey::containing(PeriodType::Monthly, invoice.created_at).unwrap();
        let mut buy = Decimal::ZERO;
        for _ in 0..200 {
            if let Some(row) = daemon.listener().engine().balance(key).await.unwrap() {
                buy = row.total_invoice_buy;
                if !buy.is_zero() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        daemon.shutdown().await;

        assert_eq!(buy, Decimal::new(1999, 2));
    }
}
