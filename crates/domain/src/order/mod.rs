//! Order attempt aggregate and its lifecycle.

mod aggregate;
mod commands;
mod events;
mod service;
mod status;
mod value_objects;

pub use aggregate::{Order, StatusEntry};
pub use commands::*;
pub use events::{
    AttemptInitiatedData, FulfilmentAdvancedData, OrderCancelledData, OrderEvent,
    PaymentConfirmedData, PaymentFailedData, PaymentRequestedData, StockReservedData,
};
pub use service::OrderService;
pub use status::{OrderStatus, UnknownStatus};
pub use value_objects::{
    CustomerId, LineItem, Money, OrderNumber, ProductId, ShippingAddress, Size, StockKey,
};

use thiserror::Error;

/// Errors raised by order commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The lifecycle does not allow `from -> to`.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order attempt already initiated")]
    AlreadyInitiated,

    #[error("Order attempt not initiated")]
    NotInitiated,

    #[error("Invalid shipping address: {field} is required")]
    InvalidAddress { field: &'static str },

    /// The payment amount differs from the attempt total.
    #[error("Amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: Money, actual: Money },

    /// A confirmation referenced a different gateway order than the one requested.
    #[error("Gateway order mismatch: expected {expected}, got {actual}")]
    GatewayOrderMismatch { expected: String, actual: String },
}

impl OrderError {
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, OrderError::InvalidTransition { .. })
    }
}
