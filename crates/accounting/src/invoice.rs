use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hotelpos_core::{DomainError, DomainResult, InvoiceId};

/// Direction of an invoice as far as balances are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceKind {
    Sale,
    Purchase,
}

impl InvoiceKind {
    pub fn code(&self) -> &'static str {
        match self {
            InvoiceKind::Sale => "sale",
            InvoiceKind::Purchase => "purchase",
        }
    }

    /// Parse an invoice-type code. Unknown codes are `NotFound`.
    pub fn from_code(code: &str) -> DomainResult<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "sale" => Ok(InvoiceKind::Sale),
            "purchase" => Ok(InvoiceKind::Purchase),
            _ => Err(DomainError::not_found(format!("invoice type {code:?}"))),
        }
    }
}

/// Invoice header as read by the balance engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub kind: InvoiceKind,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    /// At least one detail line references a stocked item.
    pub has_product_lines: bool,
}

impl Invoice {
    pub fn new(kind: InvoiceKind, total: Decimal, created_at: DateTime<Utc>) -> Self {
        Self {
            id: InvoiceId::new(),
            kind,
            total,
            created_at,
            has_product_lines: false,
        }
    }

    pub fn with_product_lines(mut self) -> Self {
        self.has_product_lines = true;
        self
    }
}
