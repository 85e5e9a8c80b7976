use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use hotelpos_accounting::{BalanceStore, InvoiceStore};
use hotelpos_inventory::ItemStore;

use super::WorkerHandle;
use crate::listener::LedgerListener;

/// Periodic stock valuation.
///
/// Goes through the listener's single-flight flag, so it never overlaps a
/// valuation triggered by a ledger event.
#[derive(Debug)]
pub struct ValuationJob;

impl ValuationJob {
    pub fn spawn<I, B, S>(listener: Arc<LedgerListener<I, B, S>>, every: Duration) -> WorkerHandle
    where
        I: InvoiceStore + 'static,
        B: BalanceStore + 'static,
        S: ItemStore + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => match listener.run_valuation().await {
                        Ok(rows) => info!(rows = rows.len(), "scheduled valuation finished"),
                        Err(err) => error!(error = %err, "scheduled valuation failed"),
                    },
                }
            }
        });

        WorkerHandle::new("valuation-job", shutdown_tx, join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotelpos_accounting::{
        BalanceEngine, InMemoryBalanceStore, InMemoryInvoiceStore, PeriodKey, PeriodType,
    };
    use hotelpos_inventory::{InMemoryItemStore, Item};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn first_tick_values_stock_immediately() {
        let items = Arc::new(InMemoryItemStore::new());
        items
            .save(Item::new("Coffee beans", "kg").with_stock(Decimal::TWO).with_prices(Decimal::TEN, Decimal::from(25)))
            .await
            .unwrap();
        let engine = BalanceEngine::new(
            Arc::new(InMemoryInvoiceStore::new()),
            Arc::new(InMemoryBalanceStore::new()),
            items,
        );
        let listener = Arc::new(LedgerListener::new(engine, Duration::from_millis(1)));

        let job = ValuationJob::spawn(listener.clone(), Duration::from_secs(3600));
        let key = PeriodKey::containing(PeriodType::Daily, chrono::Utc::now()).unwrap();
        let mut row = None;
        for _ in 0..100 {
            row = listener.engine().balance(key).await.unwrap();
            if row.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        job.shutdown().await;

        let row = row.unwrap();
        assert_eq!(row.total_product_price_sale, Decimal::from(50));
        assert_eq!(row.balance_product, Decimal::from(30));
    }
}
