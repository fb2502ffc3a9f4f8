use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, Clock, SystemClock};
use domain::StockKey;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ledger::record_reserve_outcome;
use crate::{
    InventoryLedger, LedgerError, Reservation, ReservationHandle, ReservationPolicy,
    ReservationState, Result, StockLevel,
};

#[derive(Debug, Default)]
struct LedgerState {
    levels: HashMap<StockKey, StockLevel>,
    reservations: HashMap<Uuid, Reservation>,
}

impl LedgerState {
    /// Moves an open reservation to `target`. Returns false if it was
    /// already in `target`.
    fn settle(&mut self, id: Uuid, target: ReservationState) -> Result<bool> {
        let reservation = self
            .reservations
            .get_mut(&id)
            .ok_or(LedgerError::UnknownReservation(id))?;

        match reservation.state {
            ReservationState::Reserved => {}
            state if state == target => return Ok(false),
            state => return Err(LedgerError::ReservationSettled { id, state }),
        }

        let handle = &reservation.handle;
        let level = self
            .levels
            .get_mut(&handle.key)
            .ok_or_else(|| LedgerError::UnknownStock(handle.key.clone()))?;
        level.reserved -= handle.quantity;
        if target == ReservationState::Committed {
            level.on_hand -= handle.quantity;
        }
        reservation.state = target;
        Ok(true)
    }
}

/// In-memory ledger.
///
/// A single lock serializes every operation, which makes the availability
/// check and the reservation one atomic step.
#[derive(Debug, Clone)]
pub struct InMemoryInventoryLedger {
    state: Arc<Mutex<LedgerState>>,
    policy: ReservationPolicy,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryInventoryLedger {
    fn default() -> Self {
        Self::new(ReservationPolicy::default(), Arc::new(SystemClock))
    }
}

impl InMemoryInventoryLedger {
    pub fn new(policy: ReservationPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::default(),
            policy,
            clock,
        }
    }

    /// Number of reservations still holding stock.
    pub async fn open_reservations(&self) -> usize {
        self.state
            .lock()
            .await
            .reservations
            .values()
            .filter(|r| r.state == ReservationState::Reserved)
            .count()
    }
}

#[async_trait]
impl InventoryLedger for InMemoryInventoryLedger {
    #[tracing::instrument(skip(self), fields(key = %key))]
    async fn reserve(
        &self,
        key: &StockKey,
        quantity: u32,
        attempt_id: AggregateId,
    ) -> Result<ReservationHandle> {
        if quantity == 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }

        let mut state = self.state.lock().await;
        let level = state
            .levels
            .get_mut(key)
            .ok_or_else(|| LedgerError::UnknownStock(key.clone()))?;

        if level.available() < quantity {
            record_reserve_outcome("insufficient");
            return Err(LedgerError::InsufficientStock {
                key: key.clone(),
                requested: quantity,
                available: level.available(),
            });
        }
        level.reserved += quantity;

        let handle = ReservationHandle {
            id: Uuid::new_v4(),
            attempt_id,
            key: key.clone(),
            quantity,
            expires_at: self.policy.expires_at(self.clock.now()),
        };
        state.reservations.insert(
            handle.id,
            Reservation {
                handle: handle.clone(),
                state: ReservationState::Reserved,
            },
        );
        record_reserve_outcome("reserved");
        Ok(handle)
    }

    #[tracing::instrument(skip(self, handle), fields(reservation_id = %handle.id))]
    async fn commit(&self, handle: &ReservationHandle) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.settle(handle.id, ReservationState::Committed)? {
            tracing::debug!("reservation already committed");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, handle), fields(reservation_id = %handle.id))]
    async fn release(&self, handle: &ReservationHandle) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.settle(handle.id, ReservationState::Released)? {
            tracing::debug!("reservation already released");
        }
        Ok(())
    }

    async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<ReservationHandle>> {
        let state = self.state.lock().await;
        let mut expired: Vec<_> = state
            .reservations
            .values()
            .filter(|r| r.state == ReservationState::Reserved && r.handle.is_expired(now))
            .map(|r| r.handle.clone())
            .collect();
        expired.sort_by_key(|h| h.expires_at);
        Ok(expired)
    }

    async fn expire(&self, now: DateTime<Utc>) -> Result<Vec<ReservationHandle>> {
        let mut state = self.state.lock().await;
        let due: Vec<_> = state
            .reservations
            .values()
            .filter(|r| r.state == ReservationState::Reserved && r.handle.is_expired(now))
            .map(|r| r.handle.clone())
            .collect();
        for handle in &due {
            state.settle(handle.id, ReservationState::Released)?;
        }
        if !due.is_empty() {
            metrics::counter!("reservations_expired_total").increment(due.len() as u64);
            tracing::info!(count = due.len(), "released expired reservations");
        }
        Ok(due)
    }

    async fn seed(&self, key: &StockKey, on_hand: u32) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.levels.contains_key(key) {
            return Ok(false);
        }
        state.levels.insert(
            key.clone(),
            StockLevel {
                on_hand,
                reserved: 0,
            },
        );
        Ok(true)
    }

    async fn restock(&self, key: &StockKey, quantity: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        let level = state
            .levels
            .get_mut(key)
            .ok_or_else(|| LedgerError::UnknownStock(key.clone()))?;
        level.on_hand += quantity;
        Ok(())
    }

    async fn stock_level(&self, key: &StockKey) -> Result<StockLevel> {
        let state = self.state.lock().await;
        state
            .levels
            .get(key)
            .copied()
            .ok_or_else(|| LedgerError::UnknownStock(key.clone()))
    }

    async fn reservations_for_attempt(&self, attempt_id: AggregateId) -> Result<Vec<Reservation>> {
        let state = self.state.lock().await;
        let mut reservations: Vec<_> = state
            .reservations
            .values()
            .filter(|r| r.handle.attempt_id == attempt_id)
            .cloned()
            .collect();
        reservations.sort_by_key(|r| r.handle.key.clone());
        Ok(reservations)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use common::ManualClock;

    use super::*;

    fn key() -> StockKey {
        StockKey::new("A", "M")
    }

    async fn ledger_with(stock: u32) -> (InMemoryInventoryLedger, ManualClock) {
        let clock = ManualClock::default();
        let ledger = InMemoryInventoryLedger::new(
            ReservationPolicy::new(Duration::minutes(15)),
            Arc::new(clock.clone()),
        );
        ledger.seed(&key(), stock).await.unwrap();
        (ledger, clock)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_reservations_never_oversell() {
        let (ledger, _) = ledger_with(5).await;

        let tasks = (0..32).map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.reserve(&key(), 1, AggregateId::new()).await })
        });
        let results: Vec<_> = futures_util::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let insufficient = results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::InsufficientStock { .. })))
            .count();
        assert_eq!(succeeded, 5);
        assert_eq!(insufficient, 27);

        let level = ledger.stock_level(&key()).await.unwrap();
        assert_eq!(level.reserved, 5);
        assert_eq!(level.available(), 0);
    }

    #[tokio::test]
    async fn reserve_is_all_or_nothing_per_call() {
        let (ledger, _) = ledger_with(2).await;

        let err = ledger.reserve(&key(), 3, AggregateId::new()).await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));
        assert_eq!(ledger.stock_level(&key()).await.unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn commit_is_idempotent() {
        let (ledger, _) = ledger_with(2).await;
        let handle = ledger.reserve(&key(), 2, AggregateId::new()).await.unwrap();

        ledger.commit(&handle).await.unwrap();
        ledger.commit(&handle).await.unwrap();

        let level = ledger.stock_level(&key()).await.unwrap();
        assert_eq!(level.on_hand, 0);
        assert_eq!(level.reserved, 0);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let (ledger, _) = ledger_with(4).await;
        let handle = ledger.reserve(&key(), 3, AggregateId::new()).await.unwrap();

        ledger.release(&handle).await.unwrap();
        ledger.release(&handle).await.unwrap();

        let level = ledger.stock_level(&key()).await.unwrap();
        assert_eq!(level.on_hand, 4);
        assert_eq!(level.available(), 4);
    }

    #[tokio::test]
    async fn commit_after_release_is_rejected() {
        let (ledger, _) = ledger_with(1).await;
        let handle = ledger.reserve(&key(), 1, AggregateId::new()).await.unwrap();
        ledger.release(&handle).await.unwrap();

        let err = ledger.commit(&handle).await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::ReservationSettled {
                state: ReservationState::Released,
                ..
            }
        ));
        assert_eq!(ledger.stock_level(&key()).await.unwrap().on_hand, 1);
    }

    #[tokio::test]
    async fn expiry_releases_only_overdue_reservations() {
        let (ledger, clock) = ledger_with(3).await;
        let early = ledger.reserve(&key(), 1, AggregateId::new()).await.unwrap();
        clock.advance(Duration::minutes(10));
        let late = ledger.reserve(&key(), 1, AggregateId::new()).await.unwrap();

        clock.advance(Duration::minutes(6));
        assert_eq!(ledger.expired(clock.now()).await.unwrap(), vec![early.clone()]);
        let released = ledger.expire(clock.now()).await.unwrap();

        assert_eq!(released, vec![early]);
        assert_eq!(ledger.stock_level(&key()).await.unwrap().reserved, 1);
        assert_eq!(ledger.open_reservations().await, 1);
        assert!(!late.is_expired(clock.now()));
    }

    #[tokio::test]
    async fn restock_returns_units_after_commit() {
        let (ledger, _) = ledger_with(2).await;
        let handle = ledger.reserve(&key(), 2, AggregateId::new()).await.unwrap();
        ledger.commit(&handle).await.unwrap();

        ledger.restock(&key(), 2).await.unwrap();

        assert_eq!(ledger.stock_level(&key()).await.unwrap().available(), 2);
    }

    #[tokio::test]
    async fn seed_does_not_overwrite() {
        let (ledger, _) = ledger_with(2).await;
        assert!(!ledger.seed(&key(), 50).await.unwrap());
        assert_eq!(ledger.stock_level(&key()).await.unwrap().on_hand, 2);
    }

    #[tokio::test]
    async fn unknown_key_and_zero_quantity_are_rejected() {
        let (ledger, _) = ledger_with(2).await;
        let missing = StockKey::new("B", "XL");

        assert!(matches!(
            ledger.reserve(&missing, 1, AggregateId::new()).await,
            Err(LedgerError::UnknownStock(_))
        ));
        assert!(matches!(
            ledger.reserve(&key(), 0, AggregateId::new()).await,
            Err(LedgerError::InvalidQuantity(0))
        ));
    }

    #[tokio::test]
    async fn reservations_are_listed_per_attempt() {
        let (ledger, _) = ledger_with(5).await;
        ledger.seed(&StockKey::new("B", "S"), 5).await.unwrap();
        let attempt = AggregateId::new();
        ledger.reserve(&key(), 1, attempt).await.unwrap();
        let b = ledger
            .reserve(&StockKey::new("B", "S"), 2, attempt)
            .await
            .unwrap();
        ledger.reserve(&key(), 1, AggregateId::new()).await.unwrap();
        ledger.commit(&b).await.unwrap();

        let listed = ledger.reservations_for_attempt(attempt).await.unwrap();

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].handle.key, key());
        assert_eq!(listed[0].state, ReservationState::Reserved);
        assert_eq!(listed[1].state, ReservationState::Committed);
    }
}
