use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use hotelpos_accounting::{BalanceEngine, InMemoryBalanceStore, InMemoryInvoiceStore};
use hotelpos_app::Daemon;
use hotelpos_infra::AppConfig;
use hotelpos_infra::postgres::{self, PostgresBalanceStore, PostgresInvoiceStore, PostgresItemStore};
use hotelpos_inventory::InMemoryItemStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("loading configuration")?;
    hotelpos_observability::init_with(config.log_format);

    match config.database_url.clone() {
        Some(url) => {
            let pool = postgres::connect(&url).await.context("connecting to postgres")?;
            info!("using postgres stores");
            let engine = BalanceEngine::new(
                PostgresInvoiceStore::new(pool.clone()),
                PostgresBalanceStore::new(pool.clone()),
                PostgresItemStore::new(pool),
            );
            run(Daemon::start(&config, engine)).await
        }
        None => {
            tracing::warn!("HOTELPOS_DATABASE_URL not set; using in-memory stores");
            let engine = BalanceEngine::new(
                Arc::new(InMemoryInvoiceStore::new()),
                Arc::new(InMemoryBalanceStore::new()),
                Arc::new(InMemoryItemStore::new()),
            );
            run(Daemon::start(&config, engine)).await
        }
    }
}

async fn run<I, B, S>(daemon: Daemon<I, B, S>) -> anyhow::Result<()>
where
    I: hotelpos_accounting::InvoiceStore + 'static,
    B: hotelpos_accounting::BalanceStore + 'static,
    S: hotelpos_inventory::ItemStore + 'static,
{
    info!("hotelpos running, press Ctrl+C to exit");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;

    info!("shutting down");
    daemon.shutdown().await;
    Ok(())
}
