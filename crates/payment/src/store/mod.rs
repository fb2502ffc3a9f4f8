//! Durable payment intent records.

mod memory;
mod postgres;

pub use memory::InMemoryIntentStore;
pub use postgres::PostgresIntentStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;

use crate::error::IntentStoreError;
use crate::intent::{IntentStatus, PaymentIntent};

/// Storage for payment intents, one per order attempt.
#[async_trait]
pub trait IntentStore: Send + Sync {
    /// Stores a new intent. Fails with `Duplicate` if the attempt already has one.
    async fn insert(&self, intent: &PaymentIntent) -> Result<(), IntentStoreError>;

    async fn get(&self, attempt_id: AggregateId) -> Result<Option<PaymentIntent>, IntentStoreError>;

    async fn find_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentIntent>, IntentStoreError>;

    /// Compare-and-set on the status.
    ///
    /// Moves the intent to `to` only if its current status is one of `from`,
    /// recording `payment_id` when given. Returns the updated intent, or
    /// `None` if the status did not match (another writer got there first).
    async fn transition(
        &self,
        attempt_id: AggregateId,
        from: &[IntentStatus],
        to: IntentStatus,
        payment_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<PaymentIntent>, IntentStoreError>;
}
