//! Staged multi-document transactions.

use std::collections::HashSet;

use common::Version;
use domain::{IdempotencyKey, Order, StockAdjustment};

use crate::error::StoreError;

/// A single staged mutation inside a [`Transaction`].
#[derive(Debug, Clone)]
pub enum Operation {
    /// Insert a new order document.
    ///
    /// Fails if the order ID or order number already exists, or if the
    /// idempotency key was already consumed by an earlier insert.
    InsertOrder {
        order: Order,
        idempotency_key: Option<IdempotencyKey>,
    },

    /// Replace an order document, conditional on its current version.
    ///
    /// A stale `expected_version` loses the race and the whole transaction
    /// fails with `VersionConflict`.
    UpdateOrder {
        expected_version: Version,
        order: Order,
    },

    /// Atomically adjust one stock variant by a signed delta.
    ///
    /// Fails with `InsufficientStock` if the resulting quantity would be
    /// negative, `VariantNotFound` if the pair is absent.
    AdjustStock(StockAdjustment),
}

/// An explicit transaction scope: the full set of mutations one compound
/// operation wants committed together.
///
/// Passed by value into [`crate::Store::commit`]; there is no ambient
/// transaction context. Either every staged operation applies, or none do.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    ops: Vec<Operation>,
}

impl Transaction {
    /// Creates an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages an order insert.
    pub fn insert_order(mut self, order: Order, idempotency_key: Option<IdempotencyKey>) -> Self {
        self.ops.push(Operation::InsertOrder {
            order,
            idempotency_key,
        });
        self
    }

    /// Stages a conditional order update.
    pub fn update_order(mut self, expected_version: Version, order: Order) -> Self {
        self.ops.push(Operation::UpdateOrder {
            expected_version,
            order,
        });
        self
    }

    /// Stages a single stock adjustment.
    pub fn adjust_stock(mut self, adjustment: StockAdjustment) -> Self {
        self.ops.push(Operation::AdjustStock(adjustment));
        self
    }

    /// Stages a set of stock adjustments.
    pub fn adjust_stock_all(
        mut self,
        adjustments: impl IntoIterator<Item = StockAdjustment>,
    ) -> Self {
        self.ops
            .extend(adjustments.into_iter().map(Operation::AdjustStock));
        self
    }

    /// Returns the staged operations.
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Consumes the transaction, returning the staged operations.
    pub fn into_operations(self) -> Vec<Operation> {
        self.ops
    }

    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns the number of staged operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Validates a transaction before any of it is applied.
///
/// A transaction must stage at least one operation and at most one write per
/// order document; two staged writes to the same order would make the commit
/// order-dependent.
pub fn validate_transaction(tx: &Transaction) -> Result<(), StoreError> {
    if tx.is_empty() {
        return Err(StoreError::InvalidTransaction(
            "cannot commit an empty transaction".to_string(),
        ));
    }

    let mut written_orders = HashSet::new();
    for op in tx.operations() {
        let order_id = match op {
            Operation::InsertOrder { order, .. } => order.id(),
            Operation::UpdateOrder { order, .. } => order.id(),
            Operation::AdjustStock(_) => continue,
        };
        if !written_orders.insert(order_id) {
            return Err(StoreError::InvalidTransaction(format!(
                "multiple writes staged for order {}",
                order_id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::ActorId;
    use domain::{Money, OrderCharges, OrderItem, PaymentMethod, ProductId};

    fn order() -> Order {
        Order::create(
            ActorId::new(),
            vec![OrderItem {
                product_id: ProductId::new("SKU-001"),
                name: "Widget".to_string(),
                quantity: 1,
                unit_price: Money::from_cents(1000),
                discount_unit_price: None,
                size: None,
                color: None,
            }],
            "ADDR-1",
            PaymentMethod::Card,
            OrderCharges::default(),
            false,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_builder_accumulates_operations() {
        let o = order();
        let tx = Transaction::new()
            .insert_order(o, None)
            .adjust_stock(StockAdjustment::reserve(
                ProductId::new("SKU-001"),
                "M",
                "Red",
                1,
            ));

        assert_eq!(tx.len(), 2);
        assert!(!tx.is_empty());
    }

    #[test]
    fn test_empty_transaction_rejected() {
        let result = validate_transaction(&Transaction::new());
        assert!(matches!(result, Err(StoreError::InvalidTransaction(_))));
    }

    #[test]
    fn test_double_write_to_same_order_rejected() {
        let o = order();
        let version = o.version();
        let tx = Transaction::new()
            .update_order(version, o.clone())
            .update_order(version, o);

        let result = validate_transaction(&tx);
        assert!(matches!(result, Err(StoreError::InvalidTransaction(_))));
    }

    #[test]
    fn test_multiple_stock_adjustments_allowed() {
        let tx = Transaction::new()
            .adjust_stock(StockAdjustment::reserve(
                ProductId::new("P1"),
                "M",
                "Red",
                1,
            ))
            .adjust_stock(StockAdjustment::restore(
                ProductId::new("P1"),
                "M",
                "Red",
                2,
            ));

        assert!(validate_transaction(&tx).is_ok());
    }
}
