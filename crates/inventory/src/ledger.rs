use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::AggregateId;
use domain::StockKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// Expiry applied to new reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationPolicy {
    pub ttl: Duration,
}

impl ReservationPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn expires_at(&self, reserved_at: DateTime<Utc>) -> DateTime<Utc> {
        reserved_at + self.ttl
    }
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(15),
        }
    }
}

/// A hold on stock returned by [`InventoryLedger::reserve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationHandle {
    pub id: Uuid,
    pub attempt_id: AggregateId,
    pub key: StockKey,
    pub quantity: u32,
    pub expires_at: DateTime<Utc>,
}

impl ReservationHandle {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Reserved,
    Committed,
    Released,
}

impl ReservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Reserved => "reserved",
            ReservationState::Committed => "committed",
            ReservationState::Released => "released",
        }
    }

    pub(crate) fn from_db(s: &str) -> Option<Self> {
        match s {
            "reserved" => Some(ReservationState::Reserved),
            "committed" => Some(ReservationState::Committed),
            "released" => Some(ReservationState::Released),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reservation together with where it ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub handle: ReservationHandle,
    pub state: ReservationState,
}

/// Stock counts for one product size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockLevel {
    /// Physical units in the warehouse, committed sales already deducted.
    pub on_hand: u32,
    /// Units held by open reservations.
    pub reserved: u32,
}

impl StockLevel {
    pub fn available(&self) -> u32 {
        self.on_hand.saturating_sub(self.reserved)
    }
}

/// Authoritative stock with atomic reserve/commit/release.
///
/// All operations on one [`StockKey`] are linearizable: two reservations
/// whose combined quantity exceeds the available stock never both succeed.
/// Implementations must not hold any lock across calls.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Holds `quantity` units for `attempt_id` until the policy expiry.
    ///
    /// Fails with `InsufficientStock` without reserving anything if fewer
    /// units are available.
    async fn reserve(
        &self,
        key: &StockKey,
        quantity: u32,
        attempt_id: AggregateId,
    ) -> Result<ReservationHandle>;

    /// Turns a reservation into a permanent decrement. Committing an already
    /// committed reservation is a no-op.
    async fn commit(&self, handle: &ReservationHandle) -> Result<()>;

    /// Returns reserved units to available stock. Releasing an already
    /// released reservation is a no-op.
    async fn release(&self, handle: &ReservationHandle) -> Result<()>;

    /// Open reservations whose expiry is at or before `now`.
    async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<ReservationHandle>>;

    /// Releases every open reservation past its expiry and returns them.
    async fn expire(&self, now: DateTime<Utc>) -> Result<Vec<ReservationHandle>>;

    /// Creates a stock entry if it does not exist. Returns true if created.
    async fn seed(&self, key: &StockKey, on_hand: u32) -> Result<bool>;

    /// Adds units back to physical stock, e.g. after a cancelled order.
    async fn restock(&self, key: &StockKey, quantity: u32) -> Result<()>;

    async fn stock_level(&self, key: &StockKey) -> Result<StockLevel>;

    async fn reservations_for_attempt(&self, attempt_id: AggregateId) -> Result<Vec<Reservation>>;
}

pub(crate) fn record_reserve_outcome(outcome: &'static str) {
    metrics::counter!("stock_reservations_total", "outcome" => outcome).increment(1);
}
