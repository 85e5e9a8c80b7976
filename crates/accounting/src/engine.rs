//! Balance recalculation.
//!
//! Every recomputation is a full re-scan of its period followed by one upsert,
//! so running it again (or after a missed event) always converges to the same
//! row.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use hotelpos_core::{DomainError, InvoiceId, round_money};
use hotelpos_inventory::ItemStore;

use crate::balance::{BalanceUpdate, PeriodBalance};
use crate::error::BalanceResult;
use crate::invoice::{Invoice, InvoiceKind};
use crate::period::{PeriodKey, PeriodType};
use crate::store::{BalanceStore, InvoiceStore};

pub struct BalanceEngine<I, B, S> {
    invoices: I,
    balances: B,
    items: S,
}

impl<I, B, S> BalanceEngine<I, B, S>
where
    I: InvoiceStore,
    B: BalanceStore,
    S: ItemStore,
{
    pub fn new(invoices: I, balances: B, items: S) -> Self {
        Self {
            invoices,
            balances,
            items,
        }
    }

    pub fn invoices(&self) -> &I {
        &self.invoices
    }

    /// Re-sum every invoice of the bucket starting at `period_start` and store
    /// the invoice half of its row.
    ///
    /// `period_start` is snapped to the start of its bucket first.
    pub async fn recalculate_balance_for_period(
        &self,
        period_type: PeriodType,
        period_start: NaiveDate,
    ) -> BalanceResult<PeriodBalance> {
        let key = PeriodKey::for_date(period_type, period_start)?;
        let (from, to) = key.range()?;
        let invoices = self.invoices.created_between(from, to).await?;

        let (sale, buy) = invoices
            .iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(sale, buy), inv| match inv.kind {
                InvoiceKind::Sale => (sale + inv.total, buy),
                InvoiceKind::Purchase => (sale, buy + inv.total),
            });

        let row = self
            .balances
            .upsert_with(
                key,
                BalanceUpdate::Invoices {
                    sale: round_money(sale),
                    buy: round_money(buy),
                },
            )
            .await?;

        debug!(
            period = %key,
            invoices = invoices.len(),
            balance = %row.balance_invoice,
            "period balance recalculated"
        );
        Ok(row)
    }

    /// Value current stock and write the snapshot into today's bucket of
    /// every period type.
    pub async fn update_balance_with_current_products(&self) -> BalanceResult<Vec<PeriodBalance>> {
        self.update_balance_with_current_products_at(Utc::now()).await
    }

    /// Same as [`Self::update_balance_with_current_products`] with "today"
    /// taken from `at`.
    ///
    /// The weekly, monthly and yearly rows receive the same point-in-time
    /// snapshot as the daily one; they are not aggregates over their period.
    pub async fn update_balance_with_current_products_at(
        &self,
        at: DateTime<Utc>,
    ) -> BalanceResult<Vec<PeriodBalance>> {
        let items = self.items.list_live().await?;
        let (sale, buy) = items
            .iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(sale, buy), item| {
                (sale + item.amount * item.price_sale, buy + item.amount * item.price_buy)
            });
        let update = BalanceUpdate::Products {
            sale: round_money(sale),
            buy: round_money(buy),
        };

        let mut rows = Vec::with_capacity(PeriodType::ALL.len());
        for period_type in PeriodType::ALL {
            let key = PeriodKey::containing(period_type, at)?;
            rows.push(self.balances.upsert_with(key, update).await?);
        }

        info!(items = items.len(), sale = %round_money(sale), buy = %round_money(buy), "stock valuation updated");
        Ok(rows)
    }

    /// Recompute the four buckets containing the invoice's creation time.
    pub async fn update_balance_by_invoice_id(
        &self,
        invoice_id: InvoiceId,
    ) -> BalanceResult<Vec<PeriodBalance>> {
        let invoice = self
            .invoices
            .get(invoice_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("invoice {invoice_id}")))?;
        self.recalculate_containing(invoice.created_at).await
    }

    /// Recompute the buckets a deleted invoice used to count in.
    ///
    /// The invoice must already be gone from the store for its amount to drop
    /// out of the totals.
    pub async fn remove_invoice_from_balance(
        &self,
        invoice: &Invoice,
    ) -> BalanceResult<Vec<PeriodBalance>> {
        self.recalculate_containing(invoice.created_at).await
    }

    pub async fn balance(&self, key: PeriodKey) -> BalanceResult<Option<PeriodBalance>> {
        Ok(self.balances.get(key).await?)
    }

    pub async fn balances(&self, period_type: PeriodType) -> BalanceResult<Vec<PeriodBalance>> {
        Ok(self.balances.list(period_type).await?)
    }

    async fn recalculate_containing(&self, at: DateTime<Utc>) -> BalanceResult<Vec<PeriodBalance>> {
        let mut rows = Vec::with_capacity(PeriodType::ALL.len());
        for period_type in PeriodType::ALL {
            rows.push(
                self.recalculate_balance_for_period(period_type, at.date_naive())
                    .await?,
            );
        }
        Ok(rows)
    }
}
