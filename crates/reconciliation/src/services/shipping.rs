//! Shipping notifications.

use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::OrderNumber;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
#[error("Shipping notification failed: {0}")]
pub struct ShippingError(pub String);

/// Told about every newly confirmed order so it can be picked and packed.
///
/// Notification is best effort: a failure is logged and does not undo the
/// confirmation.
#[async_trait]
pub trait ShippingService: Send + Sync {
    async fn order_confirmed(
        &self,
        order_number: &OrderNumber,
        attempt_id: AggregateId,
    ) -> Result<(), ShippingError>;
}

#[derive(Debug, Default)]
struct ShippingState {
    notified: Vec<OrderNumber>,
    fail: bool,
}

/// Records notifications in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShippingService {
    state: Arc<RwLock<ShippingState>>,
}

impl InMemoryShippingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_failing(&self, fail: bool) {
        self.state.write().await.fail = fail;
    }

    /// Order numbers notified so far, in call order.
    pub async fn notified(&self) -> Vec<OrderNumber> {
        self.state.read().await.notified.clone()
    }
}

#[async_trait]
impl ShippingService for InMemoryShippingService {
    async fn order_confirmed(
        &self,
        order_number: &OrderNumber,
        attempt_id: AggregateId,
    ) -> Result<(), ShippingError> {
        let mut state = self.state.write().await;
        if state.fail {
            return Err(ShippingError(format!(
                "shipping unavailable for attempt {attempt_id}"
            )));
        }
        state.notified.push(order_number.clone());
        Ok(())
    }
}
