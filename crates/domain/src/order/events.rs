//! Order domain events.
//!
//! Each event moves the attempt to exactly one new status and becomes one
//! entry of its status history.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::DomainEvent;

use super::{CustomerId, LineItem, Money, OrderNumber, OrderStatus, ShippingAddress};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// A checkout attempt started from a validated cart snapshot.
    AttemptInitiated(AttemptInitiatedData),

    /// Every line of the cart holds a stock reservation.
    StockReserved(StockReservedData),

    /// A gateway payment intent exists and the customer may pay.
    PaymentRequested(PaymentRequestedData),

    /// The gateway callback was verified; the attempt is now an order.
    PaymentConfirmed(PaymentConfirmedData),

    /// Shipping reported progress.
    FulfilmentAdvanced(FulfilmentAdvancedData),

    OrderCancelled(OrderCancelledData),

    /// No verified payment arrived before the reservation expired.
    PaymentFailed(PaymentFailedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::AttemptInitiated(_) => "AttemptInitiated",
            OrderEvent::StockReserved(_) => "StockReserved",
            OrderEvent::PaymentRequested(_) => "PaymentRequested",
            OrderEvent::PaymentConfirmed(_) => "PaymentConfirmed",
            OrderEvent::FulfilmentAdvanced(_) => "FulfilmentAdvanced",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::PaymentFailed(_) => "PaymentFailed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::AttemptInitiated(data) => data.initiated_at,
            OrderEvent::StockReserved(data) => data.reserved_at,
            OrderEvent::PaymentRequested(data) => data.requested_at,
            OrderEvent::PaymentConfirmed(data) => data.confirmed_at,
            OrderEvent::FulfilmentAdvanced(data) => data.at,
            OrderEvent::OrderCancelled(data) => data.cancelled_at,
            OrderEvent::PaymentFailed(data) => data.failed_at,
        }
    }
}

impl OrderEvent {
    /// The status this event moves the attempt into.
    pub fn status(&self) -> OrderStatus {
        match self {
            OrderEvent::AttemptInitiated(_) => OrderStatus::AttemptInitiated,
            OrderEvent::StockReserved(_) => OrderStatus::Reserved,
            OrderEvent::PaymentRequested(_) => OrderStatus::AwaitingPayment,
            OrderEvent::PaymentConfirmed(_) => OrderStatus::Confirmed,
            OrderEvent::FulfilmentAdvanced(data) => data.status,
            OrderEvent::OrderCancelled(_) => OrderStatus::Cancelled,
            OrderEvent::PaymentFailed(_) => OrderStatus::PaymentFailed,
        }
    }

    /// Free-text note recorded in the status history.
    pub fn note(&self) -> Option<String> {
        match self {
            OrderEvent::AttemptInitiated(_) => None,
            OrderEvent::StockReserved(data) => {
                Some(format!("{} reservation(s) held", data.reservation_ids.len()))
            }
            OrderEvent::PaymentRequested(data) => {
                Some(format!("gateway order {}", data.gateway_order_id))
            }
            OrderEvent::PaymentConfirmed(data) => {
                Some(format!("payment {}", data.payment_reference))
            }
            OrderEvent::FulfilmentAdvanced(data) => data.note.clone(),
            OrderEvent::OrderCancelled(data) => Some(data.reason.clone()),
            OrderEvent::PaymentFailed(data) => Some(data.reason.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptInitiatedData {
    pub attempt_id: AggregateId,
    pub customer_id: CustomerId,

    /// Frozen copy of the cart snapshot lines.
    pub items: Vec<LineItem>,
    pub total_amount: Money,
    pub shipping_address: ShippingAddress,
    pub initiated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReservedData {
    /// Ledger reservation ids, one per cart line.
    pub reservation_ids: Vec<Uuid>,
    pub reserved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequestedData {
    pub gateway_order_id: String,
    pub amount: Money,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmedData {
    pub order_number: OrderNumber,

    /// Gateway payment id of the verified callback.
    pub payment_reference: String,
    pub gateway_order_id: String,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfilmentAdvancedData {
    pub status: OrderStatus,
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledData {
    /// Status at the moment of cancellation; decides release vs restock.
    pub previous_status: OrderStatus,
    pub reason: String,
    pub cancelled_by: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}
