//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Aggregate, DomainEvent};
use crate::cart::CartSnapshot;

use super::events::{
    AttemptInitiatedData, FulfilmentAdvancedData, OrderCancelledData, PaymentConfirmedData,
    PaymentFailedData, PaymentRequestedData, StockReservedData,
};
use super::{
    CustomerId, LineItem, Money, OrderError, OrderEvent, OrderNumber, OrderStatus,
    ShippingAddress,
};

/// One entry of the append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

/// A checkout attempt and, once payment is verified, the order it became.
///
/// The aggregate id is the attempt id. Until `Confirmed` the attempt is not
/// an order: it has no order number and read paths that list orders skip it.
#[derive(Debug, Clone, Default)]
pub struct Order {
    id: Option<AggregateId>,
    version: Version,
    customer_id: Option<CustomerId>,
    items: Vec<LineItem>,
    total_amount: Money,
    shipping_address: Option<ShippingAddress>,
    status: OrderStatus,
    history: Vec<StatusEntry>,
    reservation_ids: Vec<Uuid>,
    gateway_order_id: Option<String>,
    payment_reference: Option<String>,
    order_number: Option<OrderNumber>,
    confirmed_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        self.history.push(StatusEntry {
            status: event.status(),
            at: event.occurred_at(),
            note: event.note(),
        });
        self.status = event.status();

        match event {
            OrderEvent::AttemptInitiated(data) => {
                self.id = Some(data.attempt_id);
                self.customer_id = Some(data.customer_id);
                self.items = data.items;
                self.total_amount = data.total_amount;
                self.shipping_address = Some(data.shipping_address);
            }
            OrderEvent::StockReserved(data) => {
                self.reservation_ids = data.reservation_ids;
            }
            OrderEvent::PaymentRequested(data) => {
                self.gateway_order_id = Some(data.gateway_order_id);
            }
            OrderEvent::PaymentConfirmed(data) => {
                self.order_number = Some(data.order_number);
                self.payment_reference = Some(data.payment_reference);
                self.confirmed_at = Some(data.confirmed_at);
            }
            OrderEvent::FulfilmentAdvanced(_)
            | OrderEvent::OrderCancelled(_)
            | OrderEvent::PaymentFailed(_) => {}
        }
    }
}

// Query methods
impl Order {
    pub fn customer_id(&self) -> Option<&CustomerId> {
        self.customer_id.as_ref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Items frozen from the cart snapshot.
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn shipping_address(&self) -> Option<&ShippingAddress> {
        self.shipping_address.as_ref()
    }

    /// Every status the attempt has been in, oldest first.
    pub fn history(&self) -> &[StatusEntry] {
        &self.history
    }

    pub fn reservation_ids(&self) -> &[Uuid] {
        &self.reservation_ids
    }

    pub fn gateway_order_id(&self) -> Option<&str> {
        self.gateway_order_id.as_deref()
    }

    /// Gateway payment id of the verified callback.
    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    /// True once payment was verified. Only placed attempts are orders.
    pub fn is_placed(&self) -> bool {
        self.order_number.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Command methods (return events)
impl Order {
    /// Starts an attempt from a validated cart snapshot.
    pub fn initiate(
        &self,
        attempt_id: AggregateId,
        snapshot: &CartSnapshot,
        shipping_address: ShippingAddress,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyInitiated);
        }
        shipping_address.validate()?;

        Ok(vec![OrderEvent::AttemptInitiated(AttemptInitiatedData {
            attempt_id,
            customer_id: snapshot.customer_id().clone(),
            items: snapshot.items().to_vec(),
            total_amount: snapshot.subtotal(),
            shipping_address,
            initiated_at: at,
        })])
    }

    /// Records that every cart line holds a reservation.
    pub fn mark_reserved(
        &self,
        reservation_ids: Vec<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::Reserved)?;

        Ok(vec![OrderEvent::StockReserved(StockReservedData {
            reservation_ids,
            reserved_at: at,
        })])
    }

    /// Records the gateway intent the customer will pay against.
    pub fn await_payment(
        &self,
        gateway_order_id: impl Into<String>,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::AwaitingPayment)?;
        if amount != self.total_amount {
            return Err(OrderError::AmountMismatch {
                expected: self.total_amount,
                actual: amount,
            });
        }

        Ok(vec![OrderEvent::PaymentRequested(PaymentRequestedData {
            gateway_order_id: gateway_order_id.into(),
            amount,
            requested_at: at,
        })])
    }

    /// Turns the attempt into an order after a verified gateway callback.
    pub fn confirm_payment(
        &self,
        gateway_order_id: &str,
        payment_reference: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let attempt_id = self.ensure_transition(OrderStatus::Confirmed)?;
        let expected = self.gateway_order_id.as_deref().unwrap_or_default();
        if expected != gateway_order_id {
            return Err(OrderError::GatewayOrderMismatch {
                expected: expected.to_string(),
                actual: gateway_order_id.to_string(),
            });
        }

        Ok(vec![OrderEvent::PaymentConfirmed(PaymentConfirmedData {
            order_number: OrderNumber::generate(attempt_id, at),
            payment_reference: payment_reference.into(),
            gateway_order_id: gateway_order_id.to_string(),
            confirmed_at: at,
        })])
    }

    /// Applies a shipping status update.
    ///
    /// Only fulfilment statuses are accepted here; `Confirmed` can only be
    /// reached through [`Order::confirm_payment`].
    pub fn advance(
        &self,
        status: OrderStatus,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if !status.is_fulfilment() {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.ensure_transition(status)?;

        Ok(vec![OrderEvent::FulfilmentAdvanced(FulfilmentAdvancedData {
            status,
            note,
            at,
        })])
    }

    pub fn cancel(
        &self,
        reason: impl Into<String>,
        cancelled_by: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::Cancelled)?;

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelledData {
            previous_status: self.status,
            reason: reason.into(),
            cancelled_by,
            cancelled_at: at,
        })])
    }

    /// Gives up on payment, typically because the reservation expired.
    pub fn fail_payment(
        &self,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::PaymentFailed)?;

        Ok(vec![OrderEvent::PaymentFailed(PaymentFailedData {
            reason: reason.into(),
            failed_at: at,
        })])
    }

    fn ensure_transition(&self, to: OrderStatus) -> Result<AggregateId, OrderError> {
        let id = self.id.ok_or(OrderError::NotInitiated)?;
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(id)
    }
}
