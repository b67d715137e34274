use async_trait::async_trait;
use common::{OrderId, Version};
use domain::{IdempotencyKey, Money, Order, Product, ProductId, StockAdjustment, StockVariant};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    error::{Result, StoreError},
    store::Store,
    transaction::{Operation, Transaction, validate_transaction},
};

/// PostgreSQL-backed store implementation.
///
/// Orders live as JSONB documents alongside a `version` column used for the
/// conditional updates; stock variants live in a relational table so the
/// non-negative guarantee can ride on a single guarded `UPDATE`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let doc: serde_json::Value = row.try_get("doc")?;
        let version: i64 = row.try_get("version")?;

        let mut order: Order = serde_json::from_value(doc)?;
        order.set_version(Version::new(version));
        Ok(order)
    }
}

/// The guarded stock update. Affects one row exactly when the variant exists
/// and the delta keeps the quantity non-negative; affecting zero rows is the
/// failure signal, classified afterwards.
const ADJUST_STOCK_SQL: &str = "UPDATE stock_variants \
     SET quantity = quantity + $4 \
     WHERE product_id = $1 AND size = $2 AND color = $3 AND quantity + $4 >= 0";

/// Distinguishes why a guarded stock update affected zero rows.
async fn classify_stock_failure<'c, E>(executor: E, adjustment: &StockAdjustment) -> StoreError
where
    E: sqlx::Executor<'c, Database = sqlx::Postgres>,
{
    let row = sqlx::query(
        "SELECT (SELECT quantity FROM stock_variants \
                 WHERE product_id = $1 AND size = $2 AND color = $3) AS quantity, \
                EXISTS(SELECT 1 FROM products WHERE id = $1) AS product_exists",
    )
    .bind(adjustment.product_id.as_str())
    .bind(&adjustment.size)
    .bind(&adjustment.color)
    .fetch_one(executor)
    .await;

    let row = match row {
        Ok(row) => row,
        Err(e) => return StoreError::Database(e),
    };

    let quantity: Option<i64> = match row.try_get("quantity") {
        Ok(quantity) => quantity,
        Err(e) => return StoreError::Database(e),
    };
    let product_exists: bool = match row.try_get("product_exists") {
        Ok(exists) => exists,
        Err(e) => return StoreError::Database(e),
    };

    match quantity {
        Some(available) => StoreError::InsufficientStock {
            product_id: adjustment.product_id.clone(),
            size: adjustment.size.clone(),
            color: adjustment.color.clone(),
            requested: adjustment.delta.unsigned_abs() as u32,
            available: available as u32,
        },
        None if product_exists => StoreError::VariantNotFound {
            product_id: adjustment.product_id.clone(),
            size: adjustment.size.clone(),
            color: adjustment.color.clone(),
        },
        None => StoreError::ProductNotFound(adjustment.product_id.clone()),
    }
}

fn map_order_insert_error(e: sqlx::Error, order: &Order) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.constraint() == Some("orders_pkey") {
            return StoreError::OrderAlreadyExists(order.id());
        }
        if db_err.constraint() == Some("orders_order_number_key") {
            return StoreError::DuplicateOrderNumber(order.order_number().to_string());
        }
    }
    StoreError::Database(e)
}

fn map_key_insert_error(e: sqlx::Error, key: &IdempotencyKey) -> StoreError {
    // Two racing inserts with the same key: the loser hits the primary key.
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.constraint() == Some("idempotency_keys_pkey")
    {
        return StoreError::IdempotencyKeyReplay { key: key.clone() };
    }
    StoreError::Database(e)
}

#[async_trait]
impl Store for PostgresStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT doc, version FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_order(row)?)),
            None => Ok(None),
        }
    }

    async fn find_order_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<OrderId>> {
        let order_id: Option<Uuid> =
            sqlx::query_scalar("SELECT order_id FROM idempotency_keys WHERE key = $1")
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(order_id.map(OrderId::from_uuid))
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT name, unit_price_cents, discount_unit_price_cents FROM products WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let variant_rows = sqlx::query(
            "SELECT size, color, quantity FROM stock_variants \
             WHERE product_id = $1 ORDER BY size, color",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut variants = Vec::with_capacity(variant_rows.len());
        for variant_row in variant_rows {
            variants.push(StockVariant {
                size: variant_row.try_get("size")?,
                color: variant_row.try_get("color")?,
                quantity: variant_row.try_get::<i64, _>("quantity")? as u32,
            });
        }

        Ok(Some(Product {
            id: id.clone(),
            name: row.try_get("name")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            discount_unit_price: row
                .try_get::<Option<i64>, _>("discount_unit_price_cents")?
                .map(Money::from_cents),
            variants,
        }))
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        let mut db = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO products (id, name, unit_price_cents, discount_unit_price_cents) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 unit_price_cents = EXCLUDED.unit_price_cents, \
                 discount_unit_price_cents = EXCLUDED.discount_unit_price_cents",
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.unit_price.cents())
        .bind(product.discount_unit_price.map(|m| m.cents()))
        .execute(&mut *db)
        .await?;

        sqlx::query("DELETE FROM stock_variants WHERE product_id = $1")
            .bind(product.id.as_str())
            .execute(&mut *db)
            .await?;

        for variant in &product.variants {
            sqlx::query(
                "INSERT INTO stock_variants (product_id, size, color, quantity) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(product.id.as_str())
            .bind(&variant.size)
            .bind(&variant.color)
            .bind(variant.quantity as i64)
            .execute(&mut *db)
            .await?;
        }

        db.commit().await?;
        Ok(())
    }

    async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<()> {
        let updated = sqlx::query(ADJUST_STOCK_SQL)
            .bind(adjustment.product_id.as_str())
            .bind(&adjustment.size)
            .bind(&adjustment.color)
            .bind(adjustment.delta)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 1 {
            Ok(())
        } else {
            Err(classify_stock_failure(&self.pool, &adjustment).await)
        }
    }

    #[tracing::instrument(skip_all, fields(ops = tx.len()))]
    async fn commit(&self, tx: Transaction) -> Result<()> {
        validate_transaction(&tx)?;

        let mut db = self.pool.begin().await?;

        for op in tx.into_operations() {
            match op {
                Operation::InsertOrder {
                    mut order,
                    idempotency_key,
                } => {
                    if let Some(key) = &idempotency_key {
                        let existing: Option<Uuid> = sqlx::query_scalar(
                            "SELECT order_id FROM idempotency_keys WHERE key = $1",
                        )
                        .bind(key.as_str())
                        .fetch_optional(&mut *db)
                        .await?;

                        if existing.is_some() {
                            return Err(StoreError::IdempotencyKeyReplay { key: key.clone() });
                        }
                    }

                    order.set_version(Version::first());
                    let doc = serde_json::to_value(&order)?;

                    sqlx::query(
                        "INSERT INTO orders (id, order_number, owner_id, version, doc, created_at) \
                         VALUES ($1, $2, $3, $4, $5, $6)",
                    )
                    .bind(order.id().as_uuid())
                    .bind(order.order_number().as_str())
                    .bind(order.owner_id().as_uuid())
                    .bind(order.version().as_i64())
                    .bind(&doc)
                    .bind(order.created_at())
                    .execute(&mut *db)
                    .await
                    .map_err(|e| map_order_insert_error(e, &order))?;

                    if let Some(key) = idempotency_key {
                        sqlx::query("INSERT INTO idempotency_keys (key, order_id) VALUES ($1, $2)")
                            .bind(key.as_str())
                            .bind(order.id().as_uuid())
                            .execute(&mut *db)
                            .await
                            .map_err(|e| map_key_insert_error(e, &key))?;
                    }
                }
                Operation::UpdateOrder {
                    expected_version,
                    mut order,
                } => {
                    order.set_version(expected_version.next());
                    let doc = serde_json::to_value(&order)?;

                    let updated = sqlx::query(
                        "UPDATE orders SET doc = $3, version = $4, updated_at = now() \
                         WHERE id = $1 AND version = $2",
                    )
                    .bind(order.id().as_uuid())
                    .bind(expected_version.as_i64())
                    .bind(&doc)
                    .bind(order.version().as_i64())
                    .execute(&mut *db)
                    .await?
                    .rows_affected();

                    if updated != 1 {
                        let actual: Option<i64> =
                            sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                                .bind(order.id().as_uuid())
                                .fetch_optional(&mut *db)
                                .await?;

                        return Err(match actual {
                            Some(actual) => StoreError::VersionConflict {
                                order_id: order.id(),
                                expected: expected_version,
                                actual: Version::new(actual),
                            },
                            None => StoreError::OrderNotFound(order.id()),
                        });
                    }
                }
                Operation::AdjustStock(adjustment) => {
                    let updated = sqlx::query(ADJUST_STOCK_SQL)
                        .bind(adjustment.product_id.as_str())
                        .bind(&adjustment.size)
                        .bind(&adjustment.color)
                        .bind(adjustment.delta)
                        .execute(&mut *db)
                        .await?
                        .rows_affected();

                    if updated != 1 {
                        // A zero-row update is not a statement error, so the
                        // transaction is still usable for the classification
                        // queries; dropping it afterwards rolls everything back.
                        return Err(classify_stock_failure(&mut *db, &adjustment).await);
                    }
                }
            }
        }

        db.commit().await?;
        Ok(())
    }
}
