//! Outbound gateway calls.

mod memory;
mod razorpay;

pub use memory::InMemoryPaymentGateway;
pub use razorpay::{RAZORPAY_API_BASE, RazorpayGateway};

use async_trait::async_trait;
use domain::Money;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// The gateway's order, which the customer pays against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: Money,
    pub currency: String,
}

/// Third-party payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a gateway order for `amount`. `receipt` is our reference.
    async fn create_order(
        &self,
        amount: Money,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError>;
}

/// Lets callers pick a gateway at runtime behind `Arc<dyn PaymentGateway>`.
#[async_trait]
impl<G: PaymentGateway + ?Sized> PaymentGateway for std::sync::Arc<G> {
    async fn create_order(
        &self,
        amount: Money,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        (**self).create_order(amount, currency, receipt).await
    }
}
