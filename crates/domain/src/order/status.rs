//! Order status machine.

use serde::{Deserialize, Serialize};

/// Where an order attempt is in its lifecycle.
///
/// ```text
/// AttemptInitiated ─► Reserved ─► AwaitingPayment ─► Confirmed ─► Processing ─► Packed
///        │               │            │      │           │            │           │
///        │               │            │      └─► PaymentFailed        │           ▼
///        └───────────────┴────────────┴──────────────────┴────────────┴──► Cancelled
///
/// Packed ─► Shipped ─► OutForDelivery ─► Delivered
/// ```
///
/// The three statuses before `Confirmed` advance one step at a time. From
/// `Confirmed` on, fulfilment may skip ahead (a carrier can report `Shipped`
/// without a `Packed` scan) but never move back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    AttemptInitiated,
    Reserved,
    AwaitingPayment,
    Confirmed,
    Processing,
    Packed,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
    PaymentFailed,
}

impl OrderStatus {
    /// Position in the main sequence, `None` for the terminal side branches.
    fn rank(&self) -> Option<u8> {
        match self {
            OrderStatus::AttemptInitiated => Some(0),
            OrderStatus::Reserved => Some(1),
            OrderStatus::AwaitingPayment => Some(2),
            OrderStatus::Confirmed => Some(3),
            OrderStatus::Processing => Some(4),
            OrderStatus::Packed => Some(5),
            OrderStatus::Shipped => Some(6),
            OrderStatus::OutForDelivery => Some(7),
            OrderStatus::Delivered => Some(8),
            OrderStatus::Cancelled | OrderStatus::PaymentFailed => None,
        }
    }

    /// Returns true if the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match next {
            OrderStatus::Cancelled => self.can_cancel(),
            OrderStatus::PaymentFailed => *self == OrderStatus::AwaitingPayment,
            _ => match (self.rank(), next.rank()) {
                (Some(from), Some(to)) if next.is_fulfilment() => {
                    from >= OrderStatus::Confirmed.rank().unwrap_or(u8::MAX) && to > from
                }
                (Some(from), Some(to)) => to == from + 1,
                _ => false,
            },
        }
    }

    /// Cancellation is allowed until the parcel leaves the warehouse.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::AttemptInitiated
                | OrderStatus::Reserved
                | OrderStatus::AwaitingPayment
                | OrderStatus::Confirmed
                | OrderStatus::Processing
                | OrderStatus::Packed
        )
    }

    /// Statuses reported by shipping after confirmation.
    pub fn is_fulfilment(&self) -> bool {
        matches!(
            self,
            OrderStatus::Processing
                | OrderStatus::Packed
                | OrderStatus::Shipped
                | OrderStatus::OutForDelivery
                | OrderStatus::Delivered
        )
    }

    /// Statuses in which stock is held as an uncommitted reservation.
    pub fn holds_reservation(&self) -> bool {
        matches!(self, OrderStatus::Reserved | OrderStatus::AwaitingPayment)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::PaymentFailed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::AttemptInitiated => "ATTEMPT_INITIATED",
            OrderStatus::Reserved => "RESERVED",
            OrderStatus::AwaitingPayment => "AWAITING_PAYMENT",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Packed => "PACKED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for status names that do not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_ascii_uppercase().as_str() {
            "ATTEMPT_INITIATED" => OrderStatus::AttemptInitiated,
            "RESERVED" => OrderStatus::Reserved,
            "AWAITING_PAYMENT" => OrderStatus::AwaitingPayment,
            "CONFIRMED" => OrderStatus::Confirmed,
            "PROCESSING" => OrderStatus::Processing,
            "PACKED" => OrderStatus::Packed,
            "SHIPPED" => OrderStatus::Shipped,
            "OUT_FOR_DELIVERY" => OrderStatus::OutForDelivery,
            "DELIVERED" => OrderStatus::Delivered,
            "CANCELLED" => OrderStatus::Cancelled,
            "PAYMENT_FAILED" => OrderStatus::PaymentFailed,
            _ => return Err(UnknownStatus(s.to_string())),
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    const ALL: [OrderStatus; 11] = [
        AttemptInitiated,
        Reserved,
        AwaitingPayment,
        Confirmed,
        Processing,
        Packed,
        Shipped,
        OutForDelivery,
        Delivered,
        Cancelled,
        PaymentFailed,
    ];

    #[test]
    fn pre_payment_statuses_advance_one_step() {
        assert!(AttemptInitiated.can_transition_to(Reserved));
        assert!(Reserved.can_transition_to(AwaitingPayment));
        assert!(AwaitingPayment.can_transition_to(Confirmed));

        assert!(!AttemptInitiated.can_transition_to(AwaitingPayment));
        assert!(!Reserved.can_transition_to(Confirmed));
        assert!(!AttemptInitiated.can_transition_to(Confirmed));
    }

    #[test]
    fn fulfilment_never_starts_before_confirmation() {
        assert!(!AwaitingPayment.can_transition_to(Processing));
        assert!(!Reserved.can_transition_to(Shipped));
    }

    #[test]
    fn fulfilment_may_skip_forward() {
        assert!(Confirmed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Confirmed.can_transition_to(Delivered));
        assert!(OutForDelivery.can_transition_to(Delivered));
    }

    #[test]
    fn no_status_moves_backwards() {
        assert!(!Shipped.can_transition_to(Confirmed));
        assert!(!Shipped.can_transition_to(Packed));
        assert!(!Delivered.can_transition_to(Processing));
        assert!(!Confirmed.can_transition_to(AwaitingPayment));
        for status in ALL {
            assert!(!status.can_transition_to(status), "{status} -> {status}");
            assert!(!status.can_transition_to(AttemptInitiated));
        }
    }

    #[test]
    fn terminal_statuses_have_no_exits() {
        for terminal in [Cancelled, PaymentFailed, Delivered] {
            assert!(terminal.is_terminal());
            for next in ALL {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn cancellation_only_before_shipping() {
        for status in [AttemptInitiated, Reserved, AwaitingPayment, Confirmed, Processing, Packed] {
            assert!(status.can_transition_to(Cancelled), "{status}");
        }
        for status in [Shipped, OutForDelivery, Delivered, Cancelled, PaymentFailed] {
            assert!(!status.can_transition_to(Cancelled), "{status}");
        }
    }

    #[test]
    fn payment_failure_only_while_awaiting_payment() {
        for status in ALL {
            assert_eq!(
                status.can_transition_to(PaymentFailed),
                status == AwaitingPayment,
                "{status}"
            );
        }
    }

    #[test]
    fn parse_and_display_agree() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), Shipped);
        assert!("LOST".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn serializes_in_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&OutForDelivery).unwrap(),
            "\"OUT_FOR_DELIVERY\""
        );
    }
}
