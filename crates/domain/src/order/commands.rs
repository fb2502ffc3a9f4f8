//! Order commands.

use common::AggregateId;
use uuid::Uuid;

use crate::cart::CartSnapshot;
use crate::command::Command;

use super::{Money, Order, OrderStatus, ShippingAddress};

macro_rules! order_command {
    ($name:ident) => {
        impl Command for $name {
            type Aggregate = Order;

            fn aggregate_id(&self) -> AggregateId {
                self.attempt_id
            }
        }
    };
}

/// Starts a checkout attempt from a cart snapshot.
#[derive(Debug, Clone)]
pub struct InitiateAttempt {
    pub attempt_id: AggregateId,
    pub snapshot: CartSnapshot,
    pub shipping_address: ShippingAddress,
}

impl InitiateAttempt {
    /// Creates the command with a freshly generated attempt id.
    pub fn new(snapshot: CartSnapshot, shipping_address: ShippingAddress) -> Self {
        Self {
            attempt_id: AggregateId::new(),
            snapshot,
            shipping_address,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MarkReserved {
    pub attempt_id: AggregateId,
    pub reservation_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct AwaitPayment {
    pub attempt_id: AggregateId,
    pub gateway_order_id: String,
    pub amount: Money,
}

/// Confirms payment. Only issued after the gateway callback was verified.
#[derive(Debug, Clone)]
pub struct ConfirmPayment {
    pub attempt_id: AggregateId,
    pub gateway_order_id: String,
    pub payment_reference: String,
}

#[derive(Debug, Clone)]
pub struct AdvanceFulfilment {
    pub attempt_id: AggregateId,
    pub status: OrderStatus,
    /// Optional carrier-supplied note.
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub attempt_id: AggregateId,
    pub reason: String,
    pub cancelled_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FailPayment {
    pub attempt_id: AggregateId,
    pub reason: String,
}

order_command!(InitiateAttempt);
order_command!(MarkReserved);
order_command!(AwaitPayment);
order_command!(ConfirmPayment);
order_command!(AdvanceFulfilment);
order_command!(CancelOrder);
order_command!(FailPayment);
