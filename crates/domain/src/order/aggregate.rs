//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{ActorId, OrderId, Version};
use serde::{Deserialize, Serialize};

use crate::catalog::StockAdjustment;

use super::{
    Money, OrderAmounts, OrderCharges, OrderError, OrderItem, OrderNumber, OrderStatus,
    PaymentDetails, PaymentMethod, PaymentStatus, ShippingDetails, StatusHistoryEntry,
};

/// A refund to apply against a completed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Reference assigned to this refund.
    pub refund_id: String,

    /// Amount to refund.
    pub amount: Money,

    /// Why the refund happened.
    pub reason: String,
}

/// Order aggregate root.
///
/// An order is created once, then mutated only through status-history-appending
/// transitions. `Delivered` and `Cancelled` are terminal for the order status,
/// though payment fields may still change when a refund lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    id: OrderId,

    /// Current version for optimistic concurrency.
    #[serde(default)]
    version: Version,

    /// The purchasing actor; immutable after creation.
    owner_id: ActorId,

    /// Human-readable order number, assigned at creation.
    order_number: OrderNumber,

    /// Frozen product snapshots at order time.
    items: Vec<OrderItem>,

    /// Monetary breakdown, recomputed at creation.
    amounts: OrderAmounts,

    /// Fulfillment state.
    order_status: OrderStatus,

    /// Payment state.
    payment_status: PaymentStatus,

    /// How the customer pays.
    payment_method: PaymentMethod,

    /// Payment bookkeeping.
    payment_details: PaymentDetails,

    /// Append-only audit trail of state transitions.
    status_history: Vec<StatusHistoryEntry>,

    /// Reference to the shipping address held by the address book.
    shipping_address_id: String,

    /// Shipment information, once the order ships.
    shipping_details: Option<ShippingDetails>,

    /// When the order was created.
    created_at: DateTime<Utc>,

    /// When the order was cancelled, if it was.
    cancelled_at: Option<DateTime<Utc>>,

    /// When the order was delivered, if it was.
    delivered_at: Option<DateTime<Utc>>,
}

// Query methods
impl Order {
    /// Returns the order ID.
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Returns the current version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Sets the version. Called by the store after a committed write.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Returns the owning actor.
    pub fn owner_id(&self) -> ActorId {
        self.owner_id
    }

    /// Returns the order number.
    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    /// Returns the line items.
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Returns the monetary breakdown.
    pub fn amounts(&self) -> &OrderAmounts {
        &self.amounts
    }

    /// Returns the total amount charged for the order.
    pub fn total_amount(&self) -> Money {
        self.amounts.total_amount
    }

    /// Returns the fulfillment status.
    pub fn order_status(&self) -> OrderStatus {
        self.order_status
    }

    /// Returns the payment status.
    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    /// Returns the payment method.
    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    /// Returns the payment bookkeeping record.
    pub fn payment_details(&self) -> &PaymentDetails {
        &self.payment_details
    }

    /// Returns the status history, oldest first.
    pub fn status_history(&self) -> &[StatusHistoryEntry] {
        &self.status_history
    }

    /// Returns the shipping address reference.
    pub fn shipping_address_id(&self) -> &str {
        &self.shipping_address_id
    }

    /// Returns the shipment information, if the order shipped.
    pub fn shipping_details(&self) -> Option<&ShippingDetails> {
        self.shipping_details.as_ref()
    }

    /// Returns when the order was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the order was cancelled, if it was.
    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    /// Returns when the order was delivered, if it was.
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    /// Returns true if the order status is terminal.
    pub fn is_terminal(&self) -> bool {
        self.order_status.is_terminal()
    }

    /// Stock reservations for this order: one negative delta per line item
    /// that carries a `(size, color)` variant.
    pub fn reservation_adjustments(&self) -> Vec<StockAdjustment> {
        self.items
            .iter()
            .filter_map(|item| {
                item.variant().map(|(size, color)| {
                    StockAdjustment::reserve(item.product_id.clone(), size, color, item.quantity)
                })
            })
            .collect()
    }

    /// Stock restorations for this order: the exact reverse of
    /// [`Order::reservation_adjustments`].
    pub fn restoration_adjustments(&self) -> Vec<StockAdjustment> {
        self.items
            .iter()
            .filter_map(|item| {
                item.variant().map(|(size, color)| {
                    StockAdjustment::restore(item.product_id.clone(), size, color, item.quantity)
                })
            })
            .collect()
    }
}

// Command methods
impl Order {
    /// Creates a new order.
    ///
    /// Validates every item, recomputes the amounts, assigns a fresh order
    /// number, and appends the initial history entry. When `starts_paid` is
    /// set (the COD policy decision made by the caller's configuration), the
    /// payment is marked completed immediately.
    pub fn create(
        owner_id: ActorId,
        items: Vec<OrderItem>,
        shipping_address_id: impl Into<String>,
        payment_method: PaymentMethod,
        charges: OrderCharges,
        starts_paid: bool,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyOrder);
        }

        for item in &items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.to_string(),
                });
            }
            if !item.effective_unit_price().is_positive() {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id.to_string(),
                    cents: item.effective_unit_price().cents(),
                });
            }
        }

        let amounts = OrderAmounts::compute(&items, charges)?;

        let (payment_status, paid_at) = if starts_paid {
            (PaymentStatus::Completed, Some(now))
        } else {
            (PaymentStatus::Pending, None)
        };

        Ok(Self {
            id: OrderId::new(),
            version: Version::initial(),
            owner_id,
            order_number: OrderNumber::generate(),
            items,
            amounts,
            order_status: OrderStatus::Pending,
            payment_status,
            payment_method,
            payment_details: PaymentDetails {
                paid_at,
                ..PaymentDetails::default()
            },
            status_history: vec![StatusHistoryEntry::new(
                OrderStatus::Pending,
                now,
                Some("order created".to_string()),
            )],
            shipping_address_id: shipping_address_id.into(),
            shipping_details: None,
            created_at: now,
            cancelled_at: None,
            delivered_at: None,
        })
    }

    /// Moves the order to `next` per the allowed-transition table.
    ///
    /// Stamps `delivered_at` / `cancelled_at` and appends exactly one history
    /// entry. The caller commits the mutation conditionally on the version it
    /// read, so a concurrent transition on the same order cannot also apply.
    pub fn transition_order_status(
        &mut self,
        next: OrderStatus,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.order_status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: self.order_status,
                to: next,
            });
        }

        self.order_status = next;
        match next {
            OrderStatus::Delivered => self.delivered_at = Some(now),
            OrderStatus::Cancelled => self.cancelled_at = Some(now),
            _ => {}
        }
        self.push_history(next, now, note);
        Ok(())
    }

    /// Records shipment information. No history entry; the accompanying
    /// `Shipped` transition carries that.
    pub fn set_shipping_details(&mut self, details: ShippingDetails) {
        self.shipping_details = Some(details);
    }

    /// Records a freshly issued payment intent reference.
    ///
    /// Repeat calls simply replace the reference; stock and history are
    /// untouched, which is what makes intent creation freely retryable.
    pub fn reissue_payment_intent(&mut self, intent_ref: impl Into<String>) {
        self.payment_details.payment_intent_id = Some(intent_ref.into());
    }

    /// Records a positive verification verdict.
    ///
    /// Marks the payment completed and, if the order is still `Pending`,
    /// advances it to `Confirmed`. Appends exactly one history entry either
    /// way.
    pub fn record_payment_success(
        &mut self,
        transaction_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self
            .payment_status
            .can_transition_to(PaymentStatus::Completed)
        {
            return Err(OrderError::InvalidPaymentTransition {
                from: self.payment_status,
                to: PaymentStatus::Completed,
            });
        }

        self.payment_status = PaymentStatus::Completed;
        self.payment_details.paid_at = Some(now);
        if transaction_id.is_some() {
            self.payment_details.transaction_id = transaction_id;
        }

        let note = Some("payment completed".to_string());
        if self.order_status == OrderStatus::Pending {
            self.order_status = OrderStatus::Confirmed;
            self.push_history(OrderStatus::Confirmed, now, note);
        } else {
            self.push_history(self.order_status, now, note);
        }
        Ok(())
    }

    /// Records a negative verification verdict.
    ///
    /// The payment moves to `Failed` (retry stays possible); the order status
    /// is unchanged. Appends exactly one history entry.
    pub fn record_payment_failure(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.payment_status.can_transition_to(PaymentStatus::Failed) {
            return Err(OrderError::InvalidPaymentTransition {
                from: self.payment_status,
                to: PaymentStatus::Failed,
            });
        }

        self.payment_status = PaymentStatus::Failed;
        self.push_history(
            self.order_status,
            now,
            Some("payment failed".to_string()),
        );
        Ok(())
    }

    /// Reverses a completed payment.
    ///
    /// Marks the payment refunded, records the refund metadata, and cancels
    /// the order unless it is already in a terminal state. Appends exactly
    /// one history entry. Stock restoration is the caller's half of the same
    /// transaction.
    pub fn apply_refund(
        &mut self,
        refund: RefundRequest,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        match self.payment_status {
            PaymentStatus::Refunded => return Err(OrderError::AlreadyRefunded),
            PaymentStatus::Completed => {}
            other => return Err(OrderError::NotPaid {
                payment_status: other,
            }),
        }

        if refund.amount > self.amounts.total_amount {
            return Err(OrderError::RefundExceedsTotal {
                requested: refund.amount,
                total: self.amounts.total_amount,
            });
        }

        self.payment_status = PaymentStatus::Refunded;
        self.payment_details.refund_id = Some(refund.refund_id);
        self.payment_details.refund_amount = Some(refund.amount);
        self.payment_details.refunded_at = Some(now);
        self.payment_details.refund_reason = Some(refund.reason.clone());

        let note = Some(format!("payment refunded: {}", refund.reason));
        if self.order_status.can_transition_to(OrderStatus::Cancelled) {
            self.order_status = OrderStatus::Cancelled;
            self.cancelled_at = Some(now);
            self.push_history(OrderStatus::Cancelled, now, note);
        } else {
            // Already cancelled or delivered; the order status stays put.
            self.push_history(self.order_status, now, note);
        }
        Ok(())
    }

    fn push_history(&mut self, status: OrderStatus, now: DateTime<Utc>, note: Option<String>) {
        self.status_history
            .push(StatusHistoryEntry::new(status, now, note));
    }
}
