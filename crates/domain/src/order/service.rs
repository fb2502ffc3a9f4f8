//! Order service: the only writer of order attempts.

use std::collections::HashSet;
use std::sync::Arc;

use common::{AggregateId, Clock, SystemClock};
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

use super::{
    AdvanceFulfilment, AwaitPayment, CancelOrder, ConfirmPayment, FailPayment, InitiateAttempt,
    MarkReserved, Order, OrderNumber,
};

/// Event type written when an attempt becomes an order.
const PLACED_EVENT: &str = "PaymentConfirmed";

/// High-level API over the order command handler.
///
/// Timestamps for every transition come from the injected [`Clock`].
pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
    clock: Arc<dyn Clock>,
}

impl<S: EventStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            handler: CommandHandler::new(store),
            clock,
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    #[tracing::instrument(skip(self, cmd), fields(attempt_id = %cmd.attempt_id))]
    pub async fn initiate_attempt(
        &self,
        cmd: InitiateAttempt,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        let result = self
            .handler
            .execute(cmd.attempt_id, |order| {
                order.initiate(
                    cmd.attempt_id,
                    &cmd.snapshot,
                    cmd.shipping_address.clone(),
                    now,
                )
            })
            .await?;
        record_transition(&result);
        Ok(result)
    }

    #[tracing::instrument(skip(self, cmd), fields(attempt_id = %cmd.attempt_id))]
    pub async fn mark_reserved(
        &self,
        cmd: MarkReserved,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        let result = self
            .handler
            .execute(cmd.attempt_id, |order| {
                order.mark_reserved(cmd.reservation_ids.clone(), now)
            })
            .await?;
        record_transition(&result);
        Ok(result)
    }

    #[tracing::instrument(skip(self, cmd), fields(attempt_id = %cmd.attempt_id))]
    pub async fn await_payment(
        &self,
        cmd: AwaitPayment,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        let result = self
            .handler
            .execute(cmd.attempt_id, |order| {
                order.await_payment(cmd.gateway_order_id.clone(), cmd.amount, now)
            })
            .await?;
        record_transition(&result);
        Ok(result)
    }

    #[tracing::instrument(skip(self, cmd), fields(attempt_id = %cmd.attempt_id))]
    pub async fn confirm_payment(
        &self,
        cmd: ConfirmPayment,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        let result = self
            .handler
            .execute(cmd.attempt_id, |order| {
                order.confirm_payment(&cmd.gateway_order_id, cmd.payment_reference.clone(), now)
            })
            .await?;
        record_transition(&result);
        Ok(result)
    }

    #[tracing::instrument(skip(self, cmd), fields(attempt_id = %cmd.attempt_id, status = %cmd.status))]
    pub async fn advance_fulfilment(
        &self,
        cmd: AdvanceFulfilment,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        let result = self
            .handler
            .execute(cmd.attempt_id, |order| {
                order.advance(cmd.status, cmd.note.clone(), now)
            })
            .await?;
        record_transition(&result);
        Ok(result)
    }

    #[tracing::instrument(skip(self, cmd), fields(attempt_id = %cmd.attempt_id))]
    pub async fn cancel(&self, cmd: CancelOrder) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        let result = self
            .handler
            .execute(cmd.attempt_id, |order| {
                order.cancel(cmd.reason.clone(), cmd.cancelled_by.clone(), now)
            })
            .await?;
        record_transition(&result);
        Ok(result)
    }

    #[tracing::instrument(skip(self, cmd), fields(attempt_id = %cmd.attempt_id))]
    pub async fn fail_payment(
        &self,
        cmd: FailPayment,
    ) -> Result<CommandResult<Order>, DomainError> {
        let now = self.clock.now();
        let result = self
            .handler
            .execute(cmd.attempt_id, |order| {
                order.fail_payment(cmd.reason.clone(), now)
            })
            .await?;
        record_transition(&result);
        Ok(result)
    }

    /// Loads an attempt in any status.
    pub async fn get_attempt(&self, attempt_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(attempt_id).await
    }

    /// Loads an order. Attempts that never reached `Confirmed` are not orders.
    pub async fn get_order(&self, attempt_id: AggregateId) -> Result<Option<Order>, DomainError> {
        Ok(self
            .handler
            .load_existing(attempt_id)
            .await?
            .filter(Order::is_placed))
    }

    /// Looks up a placed order by its external number.
    ///
    /// The number encodes the attempt id, so this is a single stream load.
    pub async fn find_by_order_number(
        &self,
        order_number: &OrderNumber,
    ) -> Result<Option<Order>, DomainError> {
        let Some(attempt_id) = order_number.attempt_id() else {
            return Ok(None);
        };
        Ok(self
            .get_order(attempt_id)
            .await?
            .filter(|order| order.order_number() == Some(order_number)))
    }

    /// All placed orders, oldest confirmation first.
    pub async fn list_orders(&self) -> Result<Vec<Order>, DomainError> {
        let placed = self.handler.store().events_by_type(PLACED_EVENT).await?;
        let mut seen = HashSet::new();
        let mut orders = Vec::with_capacity(placed.len());
        for envelope in placed {
            if !seen.insert(envelope.aggregate_id) {
                continue;
            }
            if let Some(order) = self.get_order(envelope.aggregate_id).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }
}

fn record_transition(result: &CommandResult<Order>) {
    let status = result.aggregate.status();
    metrics::counter!("order_transitions_total", "status" => status.as_str()).increment(1);
    tracing::debug!(
        attempt_id = ?result.aggregate.id(),
        %status,
        version = %result.new_version,
        "order transition recorded"
    );
}
