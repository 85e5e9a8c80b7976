//! Domain error model.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::ItemId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// One leaf ingredient that cannot cover a requested consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub item_id: ItemId,
    pub name: String,
    pub unit: String,
    pub required: Decimal,
    pub available: Decimal,
    /// `required - available`, never negative.
    pub missing: Decimal,
}

impl Shortfall {
    pub fn new(
        item_id: ItemId,
        name: impl Into<String>,
        unit: impl Into<String>,
        required: Decimal,
        available: Decimal,
    ) -> Self {
        let missing = (required - available).max(Decimal::ZERO);
        Self {
            item_id,
            name: name.into(),
            unit: unit.into(),
            required,
            available,
            missing,
        }
    }
}

impl core::fmt::Display for Shortfall {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} (required {} {unit}, available {} {unit}, missing {} {unit})",
            self.name,
            self.required.normalize(),
            self.available.normalize(),
            self.missing.normalize(),
            unit = self.unit,
        )
    }
}

fn describe_shortfalls(items: &[Shortfall]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Coarse classification used by callers that only care how to surface an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidRequest,
    Conflict,
}

/// Domain-level error.
///
/// Deterministic business failures only. Storage and transport failures are
/// modelled by the crates that own those seams.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated (e.g. illegal state transition).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A conflict occurred (e.g. concurrent stock change).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Leaf stock cannot cover the requested consumption.
    #[error("insufficient stock: {}", describe_shortfalls(.0))]
    InsufficientStock(Vec<Shortfall>),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::Validation(_)
            | DomainError::InvariantViolation(_)
            | DomainError::InvalidId(_)
            | DomainError::InsufficientStock(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Itemized shortfalls when this is an insufficient-stock failure.
    pub fn shortfalls(&self) -> Option<&[Shortfall]> {
        match self {
            DomainError::InsufficientStock(items) => Some(items),
            _ => None,
        }
    }
}
