use async_trait::async_trait;
use common::OrderId;
use domain::{IdempotencyKey, Order, Product, ProductId, StockAdjustment};

use crate::error::{Result, StoreError};
use crate::transaction::Transaction;

/// Core trait for store implementations.
///
/// The store is the only shared mutable state between concurrent operations.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// Retrieves an order by ID.
    ///
    /// The returned document carries the version the read observed; a
    /// subsequent conditional write against that version detects any
    /// intervening commit.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Looks up the order created under an idempotency key, if any.
    async fn find_order_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<OrderId>>;

    /// Retrieves a product snapshot by ID.
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Inserts or replaces a product with its variant stock records.
    ///
    /// Catalog seeding only; order-time stock mutation goes through
    /// [`Store::adjust_stock`].
    async fn upsert_product(&self, product: Product) -> Result<()>;

    /// Atomically adjusts one stock variant by a signed delta.
    ///
    /// This is the single primitive every component uses to mutate stock; a
    /// read-then-write against the variant quantity is never exposed. Fails
    /// with `InsufficientStock` when the delta would take the quantity below
    /// zero, `VariantNotFound` when the `(size, color)` pair is absent.
    async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<()>;

    /// Applies a set of stock adjustments as independent per-variant atomic
    /// operations.
    ///
    /// Deliberately NOT a cross-variant transaction: variants are independent
    /// resources, and one failing adjustment must not block the rest of a
    /// batch restock. The result vector is index-aligned with the input.
    async fn adjust_stock_batch(
        &self,
        adjustments: Vec<StockAdjustment>,
    ) -> Vec<Result<()>> {
        let mut results = Vec::with_capacity(adjustments.len());
        for adjustment in adjustments {
            results.push(self.adjust_stock(adjustment).await);
        }
        results
    }

    /// Commits a staged transaction: every operation applies, or none do.
    ///
    /// Each operation is validated against current state before any mutation
    /// becomes visible; a failure surfaces the first offending operation's
    /// error and leaves the store untouched.
    async fn commit(&self, tx: Transaction) -> Result<()>;
}

/// Extension trait providing convenience methods for stores.
#[async_trait]
pub trait StoreExt: Store {
    /// Retrieves an order, failing with `OrderNotFound` if absent.
    async fn get_existing_order(&self, id: OrderId) -> Result<Order> {
        self.get_order(id)
            .await?
            .ok_or(StoreError::OrderNotFound(id))
    }

    /// Retrieves a product, failing with `ProductNotFound` if absent.
    async fn get_existing_product(&self, id: &ProductId) -> Result<Product> {
        self.get_product(id)
            .await?
            .ok_or_else(|| StoreError::ProductNotFound(id.clone()))
    }
}

// Blanket implementation for all Store implementations
impl<T: Store + ?Sized> StoreExt for T {}
