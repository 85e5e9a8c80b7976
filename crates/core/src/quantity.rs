//! Decimal precision rules for stock quantities and money.
//!
//! Quantities are carried at 3 decimal places and money at 2, both rounded
//! half away from zero.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DomainError, DomainResult};

/// Decimal places kept for stock quantities (kg, l, pieces...).
pub const QUANTITY_DECIMAL_PLACES: u32 = 3;

/// Decimal places kept for monetary amounts.
pub const MONEY_DECIMAL_PLACES: u32 = 2;

#[inline]
pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(QUANTITY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

#[inline]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Reject zero and negative values for a named field.
pub fn ensure_positive(value: Decimal, field: &str) -> DomainResult<Decimal> {
    if value <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "{field} must be positive, got {value}"
        )));
    }
    Ok(value)
}
