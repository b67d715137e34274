//! Domain layer for the order-processing core.
//!
//! This crate provides the order aggregate and the types surrounding it:
//! - Order document with computed amounts and append-only status history
//! - Order and payment state machines with explicit transition tables
//! - Catalog snapshot types and the stock mutation request
//! - Typed domain errors for invariant violations

pub mod catalog;
pub mod order;

pub use catalog::{Product, StockAdjustment, StockVariant};
pub use order::{
    IdempotencyKey, Money, Order, OrderAmounts, OrderCharges, OrderError, OrderItem, OrderNumber,
    OrderStatus, PaymentDetails, PaymentMethod, PaymentStatus, ProductId, RefundRequest,
    ShippingDetails, StatusHistoryEntry,
};
