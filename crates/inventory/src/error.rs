use thiserror::Error;

use hotelpos_core::{DomainError, ErrorKind};

use crate::store::StoreError;

pub type InventoryResult<T> = Result<T, InventoryError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for InventoryError {
    fn from(err: StoreError) -> Self {
        match err {
            // A lost race on a conditional decrement is still a stock shortage to the caller.
            StoreError::StockConflict(shortfalls) => {
                Self::Domain(DomainError::InsufficientStock(shortfalls))
            }
            StoreError::MissingItem(id) => Self::Domain(DomainError::not_found(format!("item {id}"))),
            StoreError::InvalidItem(err) => Self::Domain(err),
            other => Self::Store(other),
        }
    }
}

impl InventoryError {
    /// `None` for infrastructure failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            InventoryError::Domain(e) => Some(e.kind()),
            InventoryError::Store(_) => None,
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            InventoryError::Domain(e) => Some(e),
            InventoryError::Store(_) => None,
        }
    }
}
