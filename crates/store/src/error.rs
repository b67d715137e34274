use common::{OrderId, Version};
use domain::{IdempotencyKey, ProductId};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional order write lost an optimistic-concurrency race.
    #[error(
        "Version conflict for order {order_id}: expected version {expected}, found {actual}"
    )]
    VersionConflict {
        order_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// The order was not found in the store.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// An order with this ID already exists.
    #[error("Order already exists: {0}")]
    OrderAlreadyExists(OrderId),

    /// An order with this order number already exists.
    #[error("Duplicate order number: {0}")]
    DuplicateOrderNumber(String),

    /// The idempotency key was already consumed by an earlier insert.
    #[error("Idempotency key already used: {key}")]
    IdempotencyKeyReplay { key: IdempotencyKey },

    /// The product was not found in the store.
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

    /// The staged transaction is malformed (empty, or conflicting writes).
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
