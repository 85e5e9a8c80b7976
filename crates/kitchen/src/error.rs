use thiserror::Error;

use hotelpos_core::{DomainError, ErrorKind};
use hotelpos_inventory::{InventoryError, StoreError};

use crate::store::OrderStoreError;

pub type KitchenResult<T> = Result<T, KitchenError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KitchenError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Stock(StoreError),

    #[error(transparent)]
    Orders(#[from] OrderStoreError),
}

impl From<InventoryError> for KitchenError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::Domain(e) => Self::Domain(e),
            InventoryError::Store(e) => Self::Stock(e),
        }
    }
}

impl KitchenError {
    /// `None` for storage failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            KitchenError::Domain(e) => Some(e.kind()),
            KitchenError::Stock(_) | KitchenError::Orders(_) => None,
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            KitchenError::Domain(e) => Some(e),
            _ => None,
        }
    }
}
