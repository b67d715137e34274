use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, Version};
use domain::{IdempotencyKey, Order, Product, ProductId, StockAdjustment};
use tokio::sync::RwLock;

use crate::{
    error::{Result, StoreError},
    store::Store,
    transaction::{Operation, Transaction, validate_transaction},
};

#[derive(Default)]
struct Inner {
    orders: HashMap<OrderId, Order>,
    order_numbers: HashSet<String>,
    products: HashMap<ProductId, Product>,
    idempotency_keys: HashMap<IdempotencyKey, OrderId>,
}

/// In-memory store implementation.
///
/// Holds everything behind a single `RwLock`, which makes the commit
/// semantics easy to see: a commit takes the write guard, validates every
/// staged operation against current state, and only then applies them. This
/// implementation is the reference for what `commit` promises; the
/// PostgreSQL implementation mirrors it with SQL transactions.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.inner.read().await.orders.len()
    }

    /// Clears all orders, products, and idempotency keys.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.orders.clear();
        inner.order_numbers.clear();
        inner.products.clear();
        inner.idempotency_keys.clear();
    }
}

type StagedStock = HashMap<(ProductId, String, String), i64>;

/// Applies one adjustment to the staged quantities, validating against the
/// staged value so that several adjustments to one variant within a commit
/// compose correctly.
fn stage_adjustment(
    products: &HashMap<ProductId, Product>,
    staged: &mut StagedStock,
    adjustment: &StockAdjustment,
) -> Result<()> {
    let key = (
        adjustment.product_id.clone(),
        adjustment.size.clone(),
        adjustment.color.clone(),
    );

    let current = match staged.get(&key) {
        Some(quantity) => *quantity,
        None => {
            let product = products
                .get(&adjustment.product_id)
                .ok_or_else(|| StoreError::ProductNotFound(adjustment.product_id.clone()))?;
            let variant = product
                .variant(&adjustment.size, &adjustment.color)
                .ok_or_else(|| StoreError::VariantNotFound {
                    product_id: adjustment.product_id.clone(),
                    size: adjustment.size.clone(),
                    color: adjustment.color.clone(),
                })?;
            variant.quantity as i64
        }
    };

    let next = current + adjustment.delta;
    if next < 0 {
        return Err(StoreError::InsufficientStock {
            product_id: adjustment.product_id.clone(),
            size: adjustment.size.clone(),
            color: adjustment.color.clone(),
            requested: adjustment.delta.unsigned_abs() as u32,
            available: current as u32,
        });
    }

    staged.insert(key, next);
    Ok(())
}

fn apply_staged(products: &mut HashMap<ProductId, Product>, staged: StagedStock) {
    for ((product_id, size, color), quantity) in staged {
        if let Some(product) = products.get_mut(&product_id)
            && let Some(variant) = product
                .variants
                .iter_mut()
                .find(|v| v.size == size && v.color == color)
        {
            variant.quantity = quantity as u32;
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner.orders.get(&id).cloned())
    }

    async fn find_order_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<OrderId>> {
        let inner = self.inner.read().await;
        Ok(inner.idempotency_keys.get(key).copied())
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let inner = self.inner.read().await;
        Ok(inner.products.get(id).cloned())
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<()> {
        let mut inner = self.inner.write().await;
        let mut staged = StagedStock::new();
        stage_adjustment(&inner.products, &mut staged, &adjustment)?;
        apply_staged(&mut inner.products, staged);
        Ok(())
    }

    async fn commit(&self, tx: Transaction) -> Result<()> {
        validate_transaction(&tx)?;

        let mut inner = self.inner.write().await;

        // Phase 1: validate every operation against current state.
        let mut staged_stock = StagedStock::new();
        for op in tx.operations() {
            match op {
                Operation::InsertOrder {
                    order,
                    idempotency_key,
                } => {
                    if inner.orders.contains_key(&order.id()) {
                        return Err(StoreError::OrderAlreadyExists(order.id()));
                    }
                    if inner
                        .order_numbers
                        .contains(order.order_number().as_str())
                    {
                        return Err(StoreError::DuplicateOrderNumber(
                            order.order_number().to_string(),
                        ));
                    }
                    if let Some(key) = idempotency_key
                        && inner.idempotency_keys.contains_key(key)
                    {
                        return Err(StoreError::IdempotencyKeyReplay { key: key.clone() });
                    }
                }
                Operation::UpdateOrder {
                    expected_version,
                    order,
                } => {
                    let current = inner
                        .orders
                        .get(&order.id())
                        .ok_or(StoreError::OrderNotFound(order.id()))?;
                    if current.version() != *expected_version {
                        return Err(StoreError::VersionConflict {
                            order_id: order.id(),
                            expected: *expected_version,
                            actual: current.version(),
                        });
                    }
                }
                Operation::AdjustStock(adjustment) => {
                    stage_adjustment(&inner.products, &mut staged_stock, adjustment)?;
                }
            }
        }

        // Phase 2: apply. Nothing below can fail.
        for op in tx.into_operations() {
            match op {
                Operation::InsertOrder {
                    mut order,
                    idempotency_key,
                } => {
                    order.set_version(Version::first());
                    inner
                        .order_numbers
                        .insert(order.order_number().to_string());
                    if let Some(key) = idempotency_key {
                        inner.idempotency_keys.insert(key, order.id());
                    }
                    inner.orders.insert(order.id(), order);
                }
                Operation::UpdateOrder {
                    expected_version,
                    mut order,
                } => {
                    order.set_version(expected_version.next());
                    inner.orders.insert(order.id(), order);
                }
                Operation::AdjustStock(_) => {}
            }
        }
        apply_staged(&mut inner.products, staged_stock);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::ActorId;
    use domain::{Money, OrderCharges, OrderItem, PaymentMethod, StockVariant};

    fn product(id: &str, quantity: u32) -> Product {
        Product {
            id: ProductId::new(id),
            name: "Tee".to_string(),
            unit_price: Money::from_cents(50000),
            discount_unit_price: None,
            variants: vec![StockVariant {
                size: "M".to_string(),
                color: "Red".to_string(),
                quantity,
            }],
        }
    }

    fn order(sku: &str, quantity: u32) -> Order {
        Order::create(
            ActorId::new(),
            vec![OrderItem {
                product_id: ProductId::new(sku),
                name: "Tee".to_string(),
                quantity,
                unit_price: Money::from_cents(50000),
                discount_unit_price: None,
                size: Some("M".to_string()),
                color: Some("Red".to_string()),
            }],
            "ADDR-1",
            PaymentMethod::Card,
            OrderCharges::default(),
            false,
            Utc::now(),
        )
        .unwrap()
    }

    async fn stock_of(store: &InMemoryStore, id: &str) -> u32 {
        store
            .get_product(&ProductId::new(id))
            .await
            .unwrap()
            .unwrap()
            .variant("M", "Red")
            .unwrap()
            .quantity
    }

    #[tokio::test]
    async fn insert_order_assigns_first_version() {
        let store = InMemoryStore::new();
        let o = order("P1", 1);
        let id = o.id();

        store
            .commit(Transaction::new().insert_order(o, None))
            .await
            .unwrap();

        let stored = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(stored.version(), Version::first());
    }

    #[tokio::test]
    async fn insert_same_order_twice_fails() {
        let store = InMemoryStore::new();
        let o = order("P1", 1);

        store
            .commit(Transaction::new().insert_order(o.clone(), None))
            .await
            .unwrap();

        let result = store
            .commit(Transaction::new().insert_order(o, None))
            .await;
        assert!(matches!(result, Err(StoreError::OrderAlreadyExists(_))));
    }

    #[tokio::test]
    async fn update_bumps_version() {
        let store = InMemoryStore::new();
        let o = order("P1", 1);
        let id = o.id();
        store
            .commit(Transaction::new().insert_order(o, None))
            .await
            .unwrap();

        let stored = store.get_order(id).await.unwrap().unwrap();
        store
            .commit(Transaction::new().update_order(stored.version(), stored))
            .await
            .unwrap();

        let updated = store.get_order(id).await.unwrap().unwrap();
        assert_eq!(updated.version(), Version::new(2));
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = InMemoryStore::new();
        let o = order("P1", 1);
        let id = o.id();
        store
            .commit(Transaction::new().insert_order(o, None))
            .await
            .unwrap();

        let first_read = store.get_order(id).await.unwrap().unwrap();
        let second_read = first_read.clone();

        store
            .commit(Transaction::new().update_order(first_read.version(), first_read))
            .await
            .unwrap();

        let result = store
            .commit(Transaction::new().update_order(second_read.version(), second_read))
            .await;
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn update_missing_order_fails() {
        let store = InMemoryStore::new();
        let o = order("P1", 1);

        let result = store
            .commit(Transaction::new().update_order(Version::first(), o))
            .await;
        assert!(matches!(result, Err(StoreError::OrderNotFound(_))));
    }

    #[tokio::test]
    async fn adjust_stock_decrements_and_increments() {
        let store = InMemoryStore::new();
        store.upsert_product(product("P1", 5)).await.unwrap();

        store
            .adjust_stock(StockAdjustment::reserve(ProductId::new("P1"), "M", "Red", 2))
            .await
            .unwrap();
        assert_eq!(stock_of(&store, "P1").await, 3);

        store
            .adjust_stock(StockAdjustment::restore(ProductId::new("P1"), "M", "Red", 2))
            .await
            .unwrap();
        assert_eq!(stock_of(&store, "P1").await, 5);
    }

    #[tokio::test]
    async fn adjust_stock_never_goes_negative() {
        let store = InMemoryStore::new();
        store.upsert_product(product("P1", 5)).await.unwrap();

        let result = store
            .adjust_stock(StockAdjustment::reserve(
                ProductId::new("P1"),
                "M",
                "Red",
                10,
            ))
            .await;

        match result {
            Err(StoreError::InsufficientStock {
                requested,
                available,
                ..
            }) => {
                assert_eq!(requested, 10);
                assert_eq!(available, 5);
            }
            other => panic!("expected InsufficientStock, got {:?}", other.err()),
        }
        assert_eq!(stock_of(&store, "P1").await, 5);
    }

    #[tokio::test]
    async fn adjust_stock_unknown_variant_fails() {
        let store = InMemoryStore::new();
        store.upsert_product(product("P1", 5)).await.unwrap();

        let result = store
            .adjust_stock(StockAdjustment::reserve(
                ProductId::new("P1"),
                "XL",
                "Green",
                1,
            ))
            .await;
        assert!(matches!(result, Err(StoreError::VariantNotFound { .. })));
    }

    #[tokio::test]
    async fn adjust_stock_unknown_product_fails() {
        let store = InMemoryStore::new();
        let result = store
            .adjust_stock(StockAdjustment::reserve(
                ProductId::new("NOPE"),
                "M",
                "Red",
                1,
            ))
            .await;
        assert!(matches!(result, Err(StoreError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let store = InMemoryStore::new();
        store.upsert_product(product("P1", 5)).await.unwrap();

        let o = order("P1", 1);
        let id = o.id();

        // Second adjustment overdraws; the insert and the first adjustment
        // must not become visible.
        let tx = Transaction::new()
            .insert_order(o, None)
            .adjust_stock(StockAdjustment::reserve(ProductId::new("P1"), "M", "Red", 2))
            .adjust_stock(StockAdjustment::reserve(ProductId::new("P1"), "M", "Red", 4));

        let result = store.commit(tx).await;
        assert!(matches!(result, Err(StoreError::InsufficientStock { .. })));
        assert!(store.get_order(id).await.unwrap().is_none());
        assert_eq!(stock_of(&store, "P1").await, 5);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn staged_adjustments_compose_within_commit() {
        let store = InMemoryStore::new();
        store.upsert_product(product("P1", 5)).await.unwrap();

        let tx = Transaction::new()
            .adjust_stock(StockAdjustment::reserve(ProductId::new("P1"), "M", "Red", 3))
            .adjust_stock(StockAdjustment::restore(ProductId::new("P1"), "M", "Red", 1));

        store.commit(tx).await.unwrap();
        assert_eq!(stock_of(&store, "P1").await, 3);
    }

    #[tokio::test]
    async fn idempotency_key_replay_rejected() {
        let store = InMemoryStore::new();
        let key = IdempotencyKey::new("retry-1");

        let first = order("P1", 1);
        let first_id = first.id();
        store
            .commit(Transaction::new().insert_order(first, Some(key.clone())))
            .await
            .unwrap();

        let result = store
            .commit(Transaction::new().insert_order(order("P1", 1), Some(key.clone())))
            .await;
        assert!(matches!(
            result,
            Err(StoreError::IdempotencyKeyReplay { .. })
        ));

        let found = store.find_order_by_idempotency_key(&key).await.unwrap();
        assert_eq!(found, Some(first_id));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn batch_adjustments_are_independent() {
        let store = InMemoryStore::new();
        store.upsert_product(product("P1", 5)).await.unwrap();
        store.upsert_product(product("P2", 2)).await.unwrap();

        let results = store
            .adjust_stock_batch(vec![
                StockAdjustment::reserve(ProductId::new("P1"), "M", "Red", 1),
                StockAdjustment::reserve(ProductId::new("P2"), "M", "Red", 5),
                StockAdjustment::restore(ProductId::new("P2"), "M", "Red", 1),
            ])
            .await;

        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        // the failing middle adjustment did not block its neighbors
        assert_eq!(stock_of(&store, "P1").await, 4);
        assert_eq!(stock_of(&store, "P2").await, 3);
    }

    #[tokio::test]
    async fn empty_commit_rejected() {
        let store = InMemoryStore::new();
        let result = store.commit(Transaction::new()).await;
        assert!(matches!(result, Err(StoreError::InvalidTransaction(_))));
    }
}
