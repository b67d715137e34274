//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and require Docker, so they
//! are `#[ignore]`d by default. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{ActorId, Version};
use domain::{
    Money, Order, OrderCharges, OrderItem, PaymentMethod, Product, ProductId, StockAdjustment,
    StockVariant,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{PostgresStore, Store, StoreError, Transaction};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!("../../../migrations/001_create_order_tables.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn fresh_store() -> PostgresStore {
    let info = get_container_info().await;
    let pool = PgPool::connect(&info.connection_string).await.unwrap();

    // Each test starts from clean tables.
    sqlx::raw_sql(
        "TRUNCATE idempotency_keys, orders, stock_variants, products RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

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

async fn stock_of(store: &PostgresStore, id: &str) -> u32 {
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
#[ignore = "requires Docker"]
#[serial]
async fn insert_and_read_back_order() {
    let store = fresh_store().await;
    let o = order("P1", 2);
    let id = o.id();

    store
        .commit(Transaction::new().insert_order(o.clone(), None))
        .await
        .unwrap();

    let stored = store.get_order(id).await.unwrap().unwrap();
    assert_eq!(stored.id(), id);
    assert_eq!(stored.version(), Version::first());
    assert_eq!(stored.order_number(), o.order_number());
    assert_eq!(stored.total_amount(), o.total_amount());
    assert_eq!(stored.status_history().len(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn conditional_update_detects_conflict() {
    let store = fresh_store().await;
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

    let stored = store.get_order(id).await.unwrap().unwrap();
    assert_eq!(stored.version(), Version::new(2));
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn guarded_stock_update_enforces_non_negative() {
    let store = fresh_store().await;
    store.upsert_product(product("P1", 5)).await.unwrap();

    store
        .adjust_stock(StockAdjustment::reserve(ProductId::new("P1"), "M", "Red", 3))
        .await
        .unwrap();
    assert_eq!(stock_of(&store, "P1").await, 2);

    let result = store
        .adjust_stock(StockAdjustment::reserve(ProductId::new("P1"), "M", "Red", 3))
        .await;
    match result {
        Err(StoreError::InsufficientStock {
            requested,
            available,
            ..
        }) => {
            assert_eq!(requested, 3);
            assert_eq!(available, 2);
        }
        other => panic!("expected InsufficientStock, got {:?}", other.err()),
    }
    assert_eq!(stock_of(&store, "P1").await, 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn unknown_variant_and_product_classified() {
    let store = fresh_store().await;
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
#[ignore = "requires Docker"]
#[serial]
async fn failed_commit_rolls_back_everything() {
    let store = fresh_store().await;
    store.upsert_product(product("P1", 5)).await.unwrap();

    let o = order("P1", 1);
    let id = o.id();

    let tx = Transaction::new()
        .insert_order(o, None)
        .adjust_stock(StockAdjustment::reserve(ProductId::new("P1"), "M", "Red", 2))
        .adjust_stock(StockAdjustment::reserve(ProductId::new("P1"), "M", "Red", 9));

    let result = store.commit(tx).await;
    assert!(matches!(result, Err(StoreError::InsufficientStock { .. })));

    assert!(store.get_order(id).await.unwrap().is_none());
    assert_eq!(stock_of(&store, "P1").await, 5);
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn idempotency_key_replay_detected() {
    let store = fresh_store().await;
    let key = domain::IdempotencyKey::new("retry-1");

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
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn upsert_product_replaces_variants() {
    let store = fresh_store().await;
    store.upsert_product(product("P1", 5)).await.unwrap();

    let mut updated = product("P1", 7);
    updated.variants.push(StockVariant {
        size: "L".to_string(),
        color: "Blue".to_string(),
        quantity: 3,
    });
    store.upsert_product(updated).await.unwrap();

    let stored = store
        .get_product(&ProductId::new("P1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.variants.len(), 2);
    assert_eq!(stored.variant("M", "Red").unwrap().quantity, 7);
    assert_eq!(stored.variant("L", "Blue").unwrap().quantity, 3);
}
