//! Period balances.
//!
//! Sale and purchase invoice totals plus a stock valuation snapshot, kept per
//! daily, weekly, monthly and yearly bucket.

pub mod balance;
pub mod engine;
pub mod error;
pub mod events;
pub mod invoice;
pub mod period;
pub mod store;

pub use balance::{BalanceUpdate, PeriodBalance};
pub use engine::BalanceEngine;
pub use error::{BalanceError, BalanceResult};
pub use events::LedgerEvent;
pub use invoice::{Invoice, InvoiceKind};
pub use period::{PeriodKey, PeriodType};
pub use store::{
    BalanceStore, InMemoryBalanceStore, InMemoryInvoiceStore, InvoiceStore, LedgerStoreError,
};
