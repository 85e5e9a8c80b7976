use thiserror::Error;

use hotelpos_core::DomainError;
use hotelpos_inventory::StoreError;

use crate::store::LedgerStoreError;

pub type BalanceResult<T> = Result<T, BalanceError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Ledger(#[from] LedgerStoreError),

    #[error("item valuation failed: {0}")]
    Items(#[from] StoreError),
}
