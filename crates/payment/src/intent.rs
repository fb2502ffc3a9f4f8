use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::Money;
use serde::{Deserialize, Serialize};

/// Lifecycle of a payment intent.
///
/// `Created -> AwaitingCallback -> Verified`, with `Failed` reachable from
/// either open status. `Verified` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    Created,
    AwaitingCallback,
    Verified,
    Failed,
}

impl IntentStatus {
    pub const OPEN: [IntentStatus; 2] = [IntentStatus::Created, IntentStatus::AwaitingCallback];

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Created => "created",
            IntentStatus::AwaitingCallback => "awaiting_callback",
            IntentStatus::Verified => "verified",
            IntentStatus::Failed => "failed",
        }
    }

    pub(crate) fn from_db(s: &str) -> Option<Self> {
        match s {
            "created" => Some(IntentStatus::Created),
            "awaiting_callback" => Some(IntentStatus::AwaitingCallback),
            "verified" => Some(IntentStatus::Verified),
            "failed" => Some(IntentStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The gateway-side record of an expected payment for one order attempt.
///
/// The amount never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub attempt_id: AggregateId,
    pub gateway_order_id: String,
    pub amount: Money,
    pub currency: String,
    pub status: IntentStatus,
    /// Set once a callback was verified.
    pub gateway_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An inbound gateway callback, as delivered (possibly more than once).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayCallback {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    /// Hex HMAC-SHA256 over `order_id|payment_id`.
    pub signature: String,
    /// Captured amount, when the gateway reports it.
    #[serde(default)]
    pub amount: Option<Money>,
}

/// A callback whose signature checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub intent: PaymentIntent,
    pub payment_id: String,
    /// The same payment was already verified by an earlier delivery.
    pub replay: bool,
}
