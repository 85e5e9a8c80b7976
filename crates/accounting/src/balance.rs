use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::period::PeriodKey;

/// Aggregate sale/buy totals for one period bucket.
///
/// Rows are only written through [`PeriodBalance::apply`], which keeps each
/// `balance_*` field equal to its sale total minus its buy total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBalance {
    pub key: PeriodKey,
    pub total_invoice_sale: Decimal,
    pub total_invoice_buy: Decimal,
    pub balance_invoice: Decimal,
    /// Sale value of current stock when the valuation last ran.
    pub total_product_price_sale: Decimal,
    pub total_product_price_buy: Decimal,
    pub balance_product: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// One half of a balance row, replaced as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceUpdate {
    Invoices { sale: Decimal, buy: Decimal },
    Products { sale: Decimal, buy: Decimal },
}

impl PeriodBalance {
    pub fn empty(key: PeriodKey, at: DateTime<Utc>) -> Self {
        Self {
            key,
            total_invoice_sale: Decimal::ZERO,
            total_invoice_buy: Decimal::ZERO,
            balance_invoice: Decimal::ZERO,
            total_product_price_sale: Decimal::ZERO,
            total_product_price_buy: Decimal::ZERO,
            balance_product: Decimal::ZERO,
            updated_at: at,
        }
    }

    pub fn apply(&mut self, update: BalanceUpdate, at: DateTime<Utc>) {
        match update {
            BalanceUpdate::Invoices { sale, buy } => {
                self.total_invoice_sale = sale;
                self.total_invoice_buy = buy;
                self.balance_invoice = sale - buy;
            }
            BalanceUpdate::Products { sale, buy } => {
                self.total_product_price_sale = sale;
                self.total_product_price_buy = buy;
                self.balance_product = sale - buy;
            }
        }
        self.updated_at = at;
    }

    pub fn is_consistent(&self) -> bool {
        self.balance_invoice == self.total_invoice_sale - self.total_invoice_buy
            && self.balance_product == self.total_product_price_sale - self.total_product_price_buy
    }
}
