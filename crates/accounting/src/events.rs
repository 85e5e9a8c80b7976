use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hotelpos_core::InvoiceId;
use hotelpos_events::Event;

use crate::invoice::Invoice;

/// Invoice mutations that make balances stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    DetailCreated {
        invoice_id: InvoiceId,
        is_product_line: bool,
        occurred_at: DateTime<Utc>,
    },
    DetailDeleted {
        invoice_id: InvoiceId,
        is_product_line: bool,
        occurred_at: DateTime<Utc>,
    },
    /// Carries the header because the invoice is already gone from the store.
    InvoiceDeleted {
        invoice: Invoice,
        had_products: bool,
        occurred_at: DateTime<Utc>,
    },
}

impl LedgerEvent {
    pub fn detail_created(invoice_id: InvoiceId, is_product_line: bool) -> Self {
        Self::DetailCreated {
            invoice_id,
            is_product_line,
            occurred_at: Utc::now(),
        }
    }

    pub fn detail_deleted(invoice_id: InvoiceId, is_product_line: bool) -> Self {
        Self::DetailDeleted {
            invoice_id,
            is_product_line,
            occurred_at: Utc::now(),
        }
    }

    pub fn invoice_deleted(invoice: Invoice) -> Self {
        Self::InvoiceDeleted {
            had_products: invoice.has_product_lines,
            invoice,
            occurred_at: Utc::now(),
        }
    }

    pub fn invoice_id(&self) -> InvoiceId {
        match self {
            LedgerEvent::DetailCreated { invoice_id, .. }
            | LedgerEvent::DetailDeleted { invoice_id, .. } => *invoice_id,
            LedgerEvent::InvoiceDeleted { invoice, .. } => invoice.id,
        }
    }

    /// Whether stock valuation must be refreshed after the invoice recompute.
    pub fn touches_products(&self) -> bool {
        match self {
            LedgerEvent::DetailCreated { is_product_line, .. }
            | LedgerEvent::DetailDeleted { is_product_line, .. } => *is_product_line,
            LedgerEvent::InvoiceDeleted { had_products, .. } => *had_products,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::DetailCreated { .. } => "detail.created",
            LedgerEvent::DetailDeleted { .. } => "detail.deleted",
            LedgerEvent::InvoiceDeleted { .. } => "invoice.deleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::DetailCreated { occurred_at, .. }
            | LedgerEvent::DetailDeleted { occurred_at, .. }
            | LedgerEvent::InvoiceDeleted { occurred_at, .. } => *occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::InvoiceKind;
    use hotelpos_events::EventEnvelope;
    use rust_decimal::Decimal;

    #[test]
    fn deleted_invoice_event_carries_product_flag() {
        let invoice = Invoice::new(InvoiceKind::Purchase, Decimal::ONE, Utc::now()).with_product_lines();
        let event = LedgerEvent::invoice_deleted(invoice.clone());

        assert_eq!(event.event_type(), "invoice.deleted");
        assert_eq!(event.invoice_id(), invoice.id);
        assert!(event.touches_products());
    }

    #[test]
    fn envelope_payload_is_tagged_json() {
        let id = InvoiceId::new();
        let envelope = EventEnvelope::wrap(LedgerEvent::detail_created(id, false));

        let json = envelope.payload_json().unwrap();
        assert_eq!(envelope.event_type(), "detail.created");
        assert_eq!(json["type"], "detail_created");
        assert_eq!(json["invoice_id"], id.to_string());
    }
}
