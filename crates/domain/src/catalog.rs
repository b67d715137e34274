//! Catalog snapshot types and the stock mutation request.
//!
//! Stock is tracked per product variant, a `(size, color)` pair. The catalog
//! supplies immutable product snapshots at order-creation time; everything
//! the order keeps afterwards is frozen into its line items.

use serde::{Deserialize, Serialize};

use crate::order::{Money, OrderError, OrderItem, ProductId};

/// Stock record for one variant of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockVariant {
    /// Variant size (e.g. "M").
    pub size: String,

    /// Variant color (e.g. "Red").
    pub color: String,

    /// Units on hand. Never negative.
    pub quantity: u32,
}

/// A product as the catalog sees it.
///
/// The set of `(size, color)` pairs behaves as a mapping keyed by the pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier (SKU).
    pub id: ProductId,

    /// Display name.
    pub name: String,

    /// Current list price per unit.
    pub unit_price: Money,

    /// Current discounted price per unit, if any.
    pub discount_unit_price: Option<Money>,

    /// Per-variant stock records.
    pub variants: Vec<StockVariant>,
}

impl Product {
    /// Looks up the variant for a `(size, color)` pair.
    pub fn variant(&self, size: &str, color: &str) -> Option<&StockVariant> {
        self.variants
            .iter()
            .find(|v| v.size == size && v.color == color)
    }

    /// Freezes this product into an order line item.
    ///
    /// Fails with [`OrderError::InvalidQuantity`] for a zero quantity; stock
    /// sufficiency is the store's check, made atomically at commit time.
    pub fn freeze_item(
        &self,
        quantity: u32,
        size: Option<String>,
        color: Option<String>,
    ) -> Result<OrderItem, OrderError> {
        if quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: self.id.to_string(),
            });
        }

        Ok(OrderItem {
            product_id: self.id.clone(),
            name: self.name.clone(),
            quantity,
            unit_price: self.unit_price,
            discount_unit_price: self.discount_unit_price,
            size,
            color,
        })
    }
}

/// An ephemeral request to change the stock of one variant.
///
/// Negative deltas reserve stock (order placement); positive deltas restore
/// it (refund or cancellation). Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    /// The product whose variant changes.
    pub product_id: ProductId,

    /// Variant size.
    pub size: String,

    /// Variant color.
    pub color: String,

    /// Signed quantity change.
    pub delta: i64,
}

impl StockAdjustment {
    /// A reservation: decrements the variant by `quantity`.
    pub fn reserve(
        product_id: ProductId,
        size: impl Into<String>,
        color: impl Into<String>,
        quantity: u32,
    ) -> Self {
        Self {
            product_id,
            size: size.into(),
            color: color.into(),
            delta: -(quantity as i64),
        }
    }

    /// A restoration: increments the variant by `quantity`.
    pub fn restore(
        product_id: ProductId,
        size: impl Into<String>,
        color: impl Into<String>,
        quantity: u32,
    ) -> Self {
        Self {
            product_id,
            size: size.into(),
            color: color.into(),
            delta: quantity as i64,
        }
    }
}
