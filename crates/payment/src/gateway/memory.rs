use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use domain::Money;

use super::{GatewayOrder, PaymentGateway};
use crate::error::GatewayError;

#[derive(Debug, Default)]
struct GatewayState {
    orders: Vec<GatewayOrder>,
    fail_unavailable: bool,
    fail_rejected: bool,
}

/// In-process gateway for tests and local runs.
///
/// Gateway order ids are sequential: `order_0001`, `order_0002`, ...
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent calls fail as if the gateway were down.
    pub fn set_unavailable(&self, fail: bool) {
        self.lock().fail_unavailable = fail;
    }

    /// Makes subsequent calls fail with a 4xx-style rejection.
    pub fn set_rejecting(&self, fail: bool) {
        self.lock().fail_rejected = fail;
    }

    pub fn orders(&self) -> Vec<GatewayOrder> {
        self.lock().orders.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_order(
        &self,
        amount: Money,
        currency: &str,
        _receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let mut state = self.lock();
        if state.fail_unavailable {
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }
        if state.fail_rejected {
            return Err(GatewayError::Rejected("amount rejected".to_string()));
        }

        let order = GatewayOrder {
            id: format!("order_{:04}", state.orders.len() + 1),
            amount,
            currency: currency.to_string(),
        };
        state.orders.push(order.clone());
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn orders_get_sequential_ids() {
        let gateway = InMemoryPaymentGateway::new();

        let first = gateway
            .create_order(Money::from_rupees(999), "INR", "r1")
            .await
            .unwrap();
        let second = gateway
            .create_order(Money::from_rupees(5), "INR", "r2")
            .await
            .unwrap();

        assert_eq!(first.id, "order_0001");
        assert_eq!(second.id, "order_0002");
        assert_eq!(gateway.orders().len(), 2);
    }

    #[tokio::test]
    async fn failure_toggles() {
        let gateway = InMemoryPaymentGateway::new();

        gateway.set_unavailable(true);
        assert!(matches!(
            gateway.create_order(Money::from_rupees(1), "INR", "r").await,
            Err(GatewayError::Unavailable(_))
        ));

        gateway.set_unavailable(false);
        gateway.set_rejecting(true);
        assert!(matches!(
            gateway.create_order(Money::from_rupees(1), "INR", "r").await,
            Err(GatewayError::Rejected(_))
        ));
        assert!(gateway.orders().is_empty());
    }
}
