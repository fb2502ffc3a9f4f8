//! Immutable point-in-time copies of a customer's cart.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::{CustomerId, LineItem, Money, StockKey};

/// Reasons a cart cannot be snapshotted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid quantity for {key}: {quantity}")]
    InvalidQuantity { key: StockKey, quantity: u32 },

    #[error("Invalid price for {key}: {price}")]
    InvalidPrice { key: StockKey, price: Money },

    /// The same product size appears on two lines.
    #[error("Duplicate cart line: {key}")]
    DuplicateLine { key: StockKey },

    /// A line total or the subtotal does not fit in the amount type.
    #[error("Cart amount out of range")]
    AmountOverflow,
}

/// The cart exactly as the customer submitted it for checkout.
///
/// Fields are private: a snapshot cannot change after it has been taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    customer_id: CustomerId,
    items: Vec<LineItem>,
    subtotal: Money,
    taken_at: DateTime<Utc>,
}

impl CartSnapshot {
    pub fn new(
        customer_id: CustomerId,
        items: Vec<LineItem>,
        taken_at: DateTime<Utc>,
    ) -> Result<Self, CartError> {
        if items.is_empty() {
            return Err(CartError::EmptyCart);
        }

        let mut seen = HashSet::with_capacity(items.len());
        let mut subtotal = Money::zero();
        for item in &items {
            let key = item.stock_key();
            if item.quantity == 0 {
                return Err(CartError::InvalidQuantity {
                    key,
                    quantity: item.quantity,
                });
            }
            if !item.unit_price.is_positive() {
                return Err(CartError::InvalidPrice {
                    key,
                    price: item.unit_price,
                });
            }
            if !seen.insert(key.clone()) {
                return Err(CartError::DuplicateLine { key });
            }
            subtotal = item
                .total()
                .and_then(|line| subtotal.checked_add(line))
                .ok_or(CartError::AmountOverflow)?;
        }

        Ok(Self {
            customer_id,
            items,
            subtotal,
            taken_at,
        })
    }

    pub fn customer_id(&self) -> &CustomerId {
        &self.customer_id
    }

    /// Lines in the order the customer added them.
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }
}

/// Largest per-unit difference between a snapshot price and the catalog
/// price that is still accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceTolerance(Money);

impl PriceTolerance {
    pub fn new(max_drift: Money) -> Self {
        Self(max_drift)
    }

    /// Snapshot prices must match the catalog exactly.
    pub fn exact() -> Self {
        Self(Money::zero())
    }

    pub fn max_drift(&self) -> Money {
        self.0
    }

    pub fn is_within(&self, snapshot_price: Money, current_price: Money) -> bool {
        snapshot_price.abs_diff(current_price) <= self.0
    }
}
