use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use tokio::sync::RwLock;

use super::IntentStore;
use crate::error::IntentStoreError;
use crate::intent::{IntentStatus, PaymentIntent};

/// In-memory intent store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIntentStore {
    intents: Arc<RwLock<HashMap<AggregateId, PaymentIntent>>>,
}

impl InMemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.intents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.intents.read().await.is_empty()
    }
}

#[async_trait]
impl IntentStore for InMemoryIntentStore {
    async fn insert(&self, intent: &PaymentIntent) -> Result<(), IntentStoreError> {
        let mut intents = self.intents.write().await;
        if intents.contains_key(&intent.attempt_id)
            || intents
                .values()
                .any(|i| i.gateway_order_id == intent.gateway_order_id)
        {
            return Err(IntentStoreError::Duplicate(intent.attempt_id));
        }
        intents.insert(intent.attempt_id, intent.clone());
        Ok(())
    }

    async fn get(&self, attempt_id: AggregateId) -> Result<Option<PaymentIntent>, IntentStoreError> {
        Ok(self.intents.read().await.get(&attempt_id).cloned())
    }

    async fn find_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentIntent>, IntentStoreError> {
        Ok(self
            .intents
            .read()
            .await
            .values()
            .find(|i| i.gateway_order_id == gateway_order_id)
            .cloned())
    }

    async fn transition(
        &self,
        attempt_id: AggregateId,
        from: &[IntentStatus],
        to: IntentStatus,
        payment_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<PaymentIntent>, IntentStoreError> {
        let mut intents = self.intents.write().await;
        let Some(intent) = intents.get_mut(&attempt_id) else {
            return Ok(None);
        };
        if !from.contains(&intent.status) {
            return Ok(None);
        }

        intent.status = to;
        if let Some(payment_id) = payment_id {
            intent.gateway_payment_id = Some(payment_id.to_string());
        }
        intent.updated_at = at;
        Ok(Some(intent.clone()))
    }
}
