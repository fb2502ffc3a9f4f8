//! Checkout error taxonomy.

use domain::{CartError, DomainError, Money, OrderError, OrderStatus, ProductId, StockKey};
use inventory::LedgerError;
use payment::PaymentError;
use thiserror::Error;

use crate::services::CatalogError;

/// Errors surfaced by the coordinator.
///
/// [`CheckoutError::kind`] is the stable machine-readable name handed to
/// clients; [`CheckoutError::is_retryable`] tells them whether trying again
/// can help.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Snapshot price no longer matches the catalog, or the product is gone.
    #[error("Stale cart: {product_id}: {reason}")]
    StaleCart { product_id: ProductId, reason: String },

    #[error("Invalid cart: {0}")]
    InvalidCart(#[from] CartError),

    #[error("Invalid shipping address: {field} is required")]
    InvalidAddress { field: &'static str },

    #[error("Insufficient stock for {key}: requested {requested}, available {available}")]
    InsufficientStock {
        key: StockKey,
        requested: u32,
        available: u32,
    },

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Callback signature invalid")]
    SignatureInvalid,

    #[error("Callback amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: Money, actual: Money },

    #[error("Unknown payment intent: {0}")]
    UnknownIntent(String),

    /// A verified payment arrived for an attempt that can no longer take it.
    #[error("Payment closed: {0}")]
    PaymentClosed(String),

    /// The order was moved by a concurrent writer, or the move is not allowed.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),

    #[error("Payment error: {0}")]
    Payment(PaymentError),

    #[error("Domain error: {0}")]
    Domain(DomainError),
}

impl CheckoutError {
    pub fn kind(&self) -> &'static str {
        match self {
            CheckoutError::StaleCart { .. } => "stale_cart",
            CheckoutError::InvalidCart(_) => "invalid_cart",
            CheckoutError::InvalidAddress { .. } => "invalid_address",
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::GatewayUnavailable(_) => "gateway_unavailable",
            CheckoutError::InvalidAmount(_) => "invalid_amount",
            CheckoutError::CatalogUnavailable(_) => "catalog_unavailable",
            CheckoutError::SignatureInvalid => "signature_invalid",
            CheckoutError::AmountMismatch { .. } => "amount_mismatch",
            CheckoutError::UnknownIntent(_) => "unknown_intent",
            CheckoutError::PaymentClosed(_) => "payment_closed",
            CheckoutError::InvalidTransition { .. } => "invalid_transition",
            CheckoutError::NotFound(_) => "not_found",
            CheckoutError::Ledger(_) | CheckoutError::Payment(_) | CheckoutError::Domain(_) => {
                "internal"
            }
        }
    }

    /// The same request may succeed later ("try again").
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::InsufficientStock { .. }
                | CheckoutError::GatewayUnavailable(_)
                | CheckoutError::CatalogUnavailable(_)
        )
    }

    /// Possible forgery. Logged, never described to the caller.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            CheckoutError::SignatureInvalid
                | CheckoutError::AmountMismatch { .. }
                | CheckoutError::UnknownIntent(_)
        )
    }
}

impl From<LedgerError> for CheckoutError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientStock {
                key,
                requested,
                available,
            } => CheckoutError::InsufficientStock {
                key,
                requested,
                available,
            },
            other => CheckoutError::Ledger(other),
        }
    }
}

impl From<PaymentError> for CheckoutError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::GatewayUnavailable(msg) => CheckoutError::GatewayUnavailable(msg),
            PaymentError::InvalidAmount(msg) => CheckoutError::InvalidAmount(msg),
            PaymentError::SignatureInvalid => CheckoutError::SignatureInvalid,
            PaymentError::AmountMismatch { expected, actual } => {
                CheckoutError::AmountMismatch { expected, actual }
            }
            PaymentError::UnknownIntent(id) => CheckoutError::UnknownIntent(id),
            PaymentError::IntentClosed(msg) => CheckoutError::PaymentClosed(msg),
            other => CheckoutError::Payment(other),
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Order(OrderError::InvalidTransition { from, to }) => {
                CheckoutError::InvalidTransition { from, to }
            }
            DomainError::Order(OrderError::InvalidAddress { field }) => {
                CheckoutError::InvalidAddress { field }
            }
            other => CheckoutError::Domain(other),
        }
    }
}

impl From<OrderError> for CheckoutError {
    fn from(e: OrderError) -> Self {
        DomainError::Order(e).into()
    }
}

impl From<CatalogError> for CheckoutError {
    fn from(e: CatalogError) -> Self {
        CheckoutError::CatalogUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
