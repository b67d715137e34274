//! Payment and shipping detail records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Money;

/// Payment bookkeeping for an order.
///
/// A fixed structure with optional fields; populated as the payment moves
/// through its lifecycle, never merged ad hoc.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Gateway transaction reference recorded on successful verification.
    pub transaction_id: Option<String>,

    /// The last issued payment intent reference.
    pub payment_intent_id: Option<String>,

    /// When the payment was captured.
    pub paid_at: Option<DateTime<Utc>>,

    /// Refund reference recorded by the refund engine.
    pub refund_id: Option<String>,

    /// Amount refunded.
    pub refund_amount: Option<Money>,

    /// When the refund was committed.
    pub refunded_at: Option<DateTime<Utc>>,

    /// Why the refund happened.
    pub refund_reason: Option<String>,
}

/// Shipment information recorded when an order leaves the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingDetails {
    /// Carrier handling the shipment.
    pub carrier: Option<String>,

    /// Carrier tracking number.
    pub tracking_number: Option<String>,

    /// When the order shipped.
    pub shipped_at: DateTime<Utc>,
}
