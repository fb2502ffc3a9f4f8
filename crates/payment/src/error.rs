use common::AggregateId;
use domain::Money;
use thiserror::Error;

/// Failures talking to the payment gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Transport failure, timeout or a 5xx response.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway refused the request (4xx).
    #[error("Gateway rejected request: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum IntentStoreError {
    #[error("Payment intent already exists for attempt {0}")]
    Duplicate(AggregateId),

    #[error("Invalid stored intent: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors raised by the Payment Intent Manager.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The gateway could not be reached. Retryable.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Zero or negative amount, or the gateway rejected the amount.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The callback signature does not match.
    #[error("Callback signature invalid")]
    SignatureInvalid,

    /// The callback reports a different amount than the intent.
    #[error("Callback amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: Money, actual: Money },

    /// No intent for the callback's gateway order.
    #[error("Unknown payment intent: {0}")]
    UnknownIntent(String),

    /// The intent was already failed, or verified for another payment.
    #[error("Payment intent closed: {0}")]
    IntentClosed(String),

    #[error("Intent store error: {0}")]
    Store(#[from] IntentStoreError),
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::GatewayUnavailable(_))
    }

    /// Rejections that may indicate a forged callback. Never shown in detail.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            PaymentError::SignatureInvalid
                | PaymentError::AmountMismatch { .. }
                | PaymentError::UnknownIntent(_)
        )
    }
}

impl From<GatewayError> for PaymentError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unavailable(msg) => PaymentError::GatewayUnavailable(msg),
            GatewayError::Rejected(msg) => PaymentError::InvalidAmount(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
