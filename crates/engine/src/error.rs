//! Engine error taxonomy.

use common::{ActorId, OrderId};
use domain::{Money, OrderError, ProductId};
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by the engine's compound operations.
///
/// Every variant carries enough context to act on (order id, offending
/// variant) and maps to a stable machine code via [`EngineError::code`].
/// Exactly [`EngineError::is_retryable`] failures are worth retrying;
/// everything else is terminal for the given input.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The actor is neither the order's owner nor staff.
    #[error("Actor {actor_id} is not allowed to access order {order_id}")]
    Forbidden {
        actor_id: ActorId,
        order_id: OrderId,
    },

    /// The operation is not legal for the order's current status.
    #[error("Operation not legal for order {order_id}: {reason}")]
    InvalidState { order_id: OrderId, reason: String },

    /// The product does not exist in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The `(size, color)` pair is not a variant of the product.
    #[error("Variant {size}/{color} not found for product {product_id}")]
    VariantNotFound {
        product_id: ProductId,
        size: String,
        color: String,
    },

    /// A stock decrement would take the variant quantity below zero.
    #[error(
        "Insufficient stock for {product_id} {size}/{color}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        size: String,
        color: String,
        requested: u32,
        available: u32,
    },

    /// A payment intent was requested for an already paid order.
    #[error("Order {0} has already been paid")]
    AlreadyPaid(OrderId),

    /// A refund was requested for an already refunded order.
    #[error("Order {0} has already been refunded")]
    AlreadyRefunded(OrderId),

    /// The refund amount exceeds the order total.
    #[error("Refund amount {requested} exceeds total {total} for order {order_id}")]
    AmountExceedsTotal {
        order_id: OrderId,
        requested: Money,
        total: Money,
    },

    /// A concurrent writer won the race on this order. Retry with
    /// refreshed state.
    #[error("Concurrent modification of order {order_id}; retry with refreshed state")]
    StateConflict { order_id: OrderId },

    /// The compound operation exceeded its time bound and was aborted
    /// cleanly; nothing was committed.
    #[error("Operation '{operation}' timed out; transaction aborted")]
    TransactionTimeout { operation: &'static str },

    /// The external payment verifier was unreachable or errored.
    #[error("Payment verifier failure: {0}")]
    ExternalVerifierFailure(String),

    /// The request failed domain validation before touching the store.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] OrderError),

    /// An infrastructure fault in the store.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// A serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Stable machine-readable code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Forbidden { .. } => "FORBIDDEN",
            EngineError::InvalidState { .. } => "INVALID_STATE",
            EngineError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            EngineError::VariantNotFound { .. } => "VARIANT_NOT_FOUND",
            EngineError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            EngineError::AlreadyPaid(_) => "ALREADY_PAID",
            EngineError::AlreadyRefunded(_) => "ALREADY_REFUNDED",
            EngineError::AmountExceedsTotal { .. } => "AMOUNT_EXCEEDS_TOTAL",
            EngineError::StateConflict { .. } => "STATE_CONFLICT",
            EngineError::TransactionTimeout { .. } => "TRANSACTION_TIMEOUT",
            EngineError::ExternalVerifierFailure(_) => "EXTERNAL_VERIFIER_FAILURE",
            EngineError::InvalidRequest(_) => "INVALID_REQUEST",
            EngineError::Store(_) => "STORE_ERROR",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// True for failures the caller should retry (with backoff); terminal
    /// failures must not be retried unmodified.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StateConflict { .. } | EngineError::TransactionTimeout { .. }
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VersionConflict { order_id, .. } => EngineError::StateConflict { order_id },
            StoreError::OrderNotFound(id) => EngineError::NotFound(id),
            StoreError::ProductNotFound(id) => EngineError::ProductNotFound(id),
            StoreError::VariantNotFound {
                product_id,
                size,
                color,
            } => EngineError::VariantNotFound {
                product_id,
                size,
                color,
            },
            StoreError::InsufficientStock {
                product_id,
                size,
                color,
                requested,
                available,
            } => EngineError::InsufficientStock {
                product_id,
                size,
                color,
                requested,
                available,
            },
            other => EngineError::Store(other),
        }
    }
}

/// Maps a domain error raised while mutating a specific order to the
/// engine taxonomy, attaching the order's identity.
pub(crate) fn order_error(order_id: OrderId, e: OrderError) -> EngineError {
    match e {
        OrderError::AlreadyRefunded => EngineError::AlreadyRefunded(order_id),
        OrderError::RefundExceedsTotal { requested, total } => EngineError::AmountExceedsTotal {
            order_id,
            requested,
            total,
        },
        OrderError::NotPaid { payment_status } => EngineError::InvalidState {
            order_id,
            reason: format!("payment is {}, not completed", payment_status),
        },
        OrderError::InvalidTransition { from, to } => EngineError::InvalidState {
            order_id,
            reason: format!("order status cannot move from {} to {}", from, to),
        },
        OrderError::InvalidPaymentTransition { from, to } => EngineError::InvalidState {
            order_id,
            reason: format!("payment status cannot move from {} to {}", from, to),
        },
        other => EngineError::InvalidRequest(other),
    }
}
