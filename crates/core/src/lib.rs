//! `hotelpos-core`: domain building blocks.
//!
//! Identifiers, the shared error taxonomy and decimal precision rules. No IO.

pub mod error;
pub mod id;
pub mod quantity;

pub use error::{DomainError, DomainResult, ErrorKind, Shortfall};
pub use id::{InvoiceId, ItemId, OrderId, OrderLineId};
pub use quantity::{ensure_positive, round_money, round_quantity};
