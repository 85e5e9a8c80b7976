use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hotelpos_core::{DomainError, DomainResult, ItemId};

/// A sellable or ingredient unit and its stock ledger balance.
///
/// `amount` is the only ledger state in the system: it is decremented by
/// ingredient consumption and by sale invoices, incremented by restoration and
/// purchase invoices. Whether an item is composite is not stored here; it is
/// derived from the recipe edges held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    /// Unit of measure ("kg", "l", "pc", ...).
    pub unit: String,
    /// Current stock, never negative.
    pub amount: Decimal,
    pub price_buy: Decimal,
    pub price_sale: Decimal,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            name: name.into(),
            unit: unit.into(),
            amount: Decimal::ZERO,
            price_buy: Decimal::ZERO,
            price_sale: Decimal::ZERO,
            deleted_at: None,
        }
    }

    pub fn with_stock(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_prices(mut self, price_buy: Decimal, price_sale: Decimal) -> Self {
        self.price_buy = price_buy;
        self.price_sale = price_sale;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Check the field-level invariants before the item is persisted.
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("item name cannot be empty"));
        }
        if self.amount < Decimal::ZERO {
            return Err(DomainError::invariant("stock cannot go negative"));
        }
        if self.price_buy < Decimal::ZERO || self.price_sale < Decimal::ZERO {
            return Err(DomainError::validation("prices cannot be negative"));
        }
        Ok(())
    }
}

/// Directed recipe edge: one portion of `composite_id` needs
/// `quantity_per_portion` of `component_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeEdge {
    pub composite_id: ItemId,
    pub component_id: ItemId,
    pub quantity_per_portion: Decimal,
    pub notes: Option<String>,
}

/// Caller input for one edge of a recipe replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeComponent {
    pub component_id: ItemId,
    pub quantity_per_portion: Decimal,
    pub notes: Option<String>,
}

impl RecipeComponent {
    pub fn new(component_id: ItemId, quantity_per_portion: Decimal) -> Self {
        Self {
            component_id,
            quantity_per_portion,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// One signed stock movement. Negative deltas are conditional decrements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub item_id: ItemId,
    pub delta: Decimal,
}

impl StockChange {
    pub fn decrement(item_id: ItemId, quantity: Decimal) -> Self {
        Self {
            item_id,
            delta: -quantity,
        }
    }

    pub fn increment(item_id: ItemId, quantity: Decimal) -> Self {
        Self {
            item_id,
            delta: quantity,
        }
    }
}
