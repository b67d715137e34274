//! Order aggregate and related types.

mod aggregate;
mod amounts;
mod payment;
mod state;
mod value_objects;

pub use aggregate::{Order, RefundRequest};
pub use amounts::{OrderAmounts, OrderCharges};
pub use payment::{PaymentDetails, ShippingDetails};
pub use state::{OrderStatus, PaymentStatus, StatusHistoryEntry};
pub use value_objects::{IdempotencyKey, Money, OrderItem, OrderNumber, PaymentMethod, ProductId};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// An order must contain at least one item.
    #[error("Order must contain at least one item")]
    EmptyOrder,

    /// Item quantity must be greater than zero.
    #[error("Invalid quantity for product {product_id}: quantity must be greater than zero")]
    InvalidQuantity { product_id: String },

    /// Item price must be positive.
    #[error("Invalid price for product {product_id}: {cents} cents")]
    InvalidPrice { product_id: String, cents: i64 },

    /// The computed order total would be negative.
    #[error("Order total would be negative: {cents} cents")]
    NegativeTotal { cents: i64 },

    /// The requested order status transition is not in the allowed table.
    #[error("Invalid order status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The requested payment status transition is not in the allowed table.
    #[error("Invalid payment status transition: {from} -> {to}")]
    InvalidPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// Refund requested on an order whose payment is not completed.
    #[error("Payment is {payment_status}, not completed; nothing to refund")]
    NotPaid { payment_status: PaymentStatus },

    /// Refund requested on an already refunded order.
    #[error("Payment has already been refunded")]
    AlreadyRefunded,

    /// Refund amount exceeds the order total.
    #[error("Refund amount {requested} exceeds order total {total}")]
    RefundExceedsTotal { requested: Money, total: Money },
}
