//! Order amount computation.

use serde::{Deserialize, Serialize};

use super::{Money, OrderError, OrderItem};

/// Charges applied on top of the item subtotal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCharges {
    /// Shipping charge for the order.
    pub shipping_charge: Money,

    /// Tax applied to the order.
    pub tax: Money,

    /// Order-level discount.
    pub discount: Money,
}

/// The monetary breakdown of an order.
///
/// Always recomputed from the line items and charges; never trusted from
/// caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAmounts {
    /// Sum of line totals at effective unit prices.
    pub items_total: Money,

    /// Shipping charge.
    pub shipping_charge: Money,

    /// Tax.
    pub tax: Money,

    /// Order-level discount.
    pub discount: Money,

    /// `items_total + shipping_charge + tax - discount`. Never negative.
    pub total_amount: Money,
}

impl OrderAmounts {
    /// Computes the amounts for a set of items and charges.
    ///
    /// Fails with [`OrderError::NegativeTotal`] if the discount exceeds the
    /// rest of the order.
    pub fn compute(items: &[OrderItem], charges: OrderCharges) -> Result<Self, OrderError> {
        let mut items_total = Money::zero();
        for item in items {
            items_total += item.line_total();
        }

        let total_amount =
            items_total + charges.shipping_charge + charges.tax - charges.discount;

        if total_amount.is_negative() {
            return Err(OrderError::NegativeTotal {
                cents: total_amount.cents(),
            });
        }

        Ok(Self {
            items_total,
            shipping_charge: charges.shipping_charge,
            tax: charges.tax,
            discount: charges.discount,
            total_amount,
        })
    }
}
