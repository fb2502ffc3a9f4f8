use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, Clock, SystemClock};
use domain::StockKey;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::ledger::record_reserve_outcome;
use crate::{
    InventoryLedger, LedgerError, Reservation, ReservationHandle, ReservationPolicy,
    ReservationState, Result, StockLevel,
};

/// PostgreSQL-backed ledger.
///
/// Reservation is a single conditional `UPDATE` on the stock row, so the
/// database serializes concurrent reservations on the same key. Settlement
/// flips the reservation row with a conditional `UPDATE ... WHERE state =
/// 'reserved'` in the same transaction as the stock adjustment.
#[derive(Clone)]
pub struct PostgresInventoryLedger {
    pool: PgPool,
    policy: ReservationPolicy,
    clock: Arc<dyn Clock>,
}

impl PostgresInventoryLedger {
    pub fn new(pool: PgPool, policy: ReservationPolicy) -> Self {
        Self::with_clock(pool, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: PgPool, policy: ReservationPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            policy,
            clock,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_handle(row: &PgRow) -> Result<ReservationHandle> {
        let product_id: String = row.try_get("product_id")?;
        let size: String = row.try_get("size")?;
        Ok(ReservationHandle {
            id: row.try_get("id")?,
            attempt_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("attempt_id")?),
            key: StockKey::new(product_id, size.as_str()),
            quantity: to_quantity(row.try_get("quantity")?),
            expires_at: row.try_get("expires_at")?,
        })
    }

    async fn settle(&self, id: Uuid, target: ReservationState) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let changed = Self::settle_in(&mut tx, id, target, self.clock.now()).await?;
        tx.commit().await?;
        Ok(changed)
    }

    async fn settle_in(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        target: ReservationState,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            UPDATE stock_reservations
            SET state = $2, settled_at = $3
            WHERE id = $1 AND state = 'reserved'
            RETURNING product_id, size, quantity
            "#,
        )
        .bind(id)
        .bind(target.as_str())
        .bind(now)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(row) = row else {
            let state: Option<String> =
                sqlx::query_scalar("SELECT state FROM stock_reservations WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await?;
            return match state.as_deref().and_then(ReservationState::from_db) {
                None => Err(LedgerError::UnknownReservation(id)),
                Some(state) if state == target => Ok(false),
                Some(state) => Err(LedgerError::ReservationSettled { id, state }),
            };
        };

        let product_id: String = row.try_get("product_id")?;
        let size: String = row.try_get("size")?;
        let quantity: i64 = row.try_get("quantity")?;
        let on_hand_delta = if target == ReservationState::Committed {
            quantity
        } else {
            0
        };

        sqlx::query(
            r#"
            UPDATE stock_levels
            SET reserved = reserved - $3, on_hand = on_hand - $4
            WHERE product_id = $1 AND size = $2
            "#,
        )
        .bind(&product_id)
        .bind(&size)
        .bind(quantity)
        .bind(on_hand_delta)
        .execute(&mut **tx)
        .await?;

        Ok(true)
    }

    async fn select_expired(&self, now: DateTime<Utc>) -> Result<Vec<ReservationHandle>> {
        let rows = sqlx::query(
            r#"
            SELECT id, attempt_id, product_id, size, quantity, expires_at
            FROM stock_reservations
            WHERE state = 'reserved' AND expires_at <= $1
            ORDER BY expires_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_handle).collect()
    }
}

fn to_quantity(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[async_trait]
impl InventoryLedger for PostgresInventoryLedger {
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

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE stock_levels
            SET reserved = reserved + $3
            WHERE product_id = $1 AND size = $2 AND on_hand - reserved >= $3
            "#,
        )
        .bind(key.product_id.as_str())
        .bind(key.size.as_str())
        .bind(i64::from(quantity))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let available: Option<i64> = sqlx::query_scalar(
                "SELECT on_hand - reserved FROM stock_levels WHERE product_id = $1 AND size = $2",
            )
            .bind(key.product_id.as_str())
            .bind(key.size.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            return match available {
                None => Err(LedgerError::UnknownStock(key.clone())),
                Some(available) => {
                    record_reserve_outcome("insufficient");
                    Err(LedgerError::InsufficientStock {
                        key: key.clone(),
                        requested: quantity,
                        available: to_quantity(available),
                    })
                }
            };
        }

        let now = self.clock.now();
        let handle = ReservationHandle {
            id: Uuid::new_v4(),
            attempt_id,
            key: key.clone(),
            quantity,
            expires_at: self.policy.expires_at(now),
        };

        sqlx::query(
            r#"
            INSERT INTO stock_reservations (id, attempt_id, product_id, size, quantity, state, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, 'reserved', $6, $7)
            "#,
        )
        .bind(handle.id)
        .bind(attempt_id.as_uuid())
        .bind(key.product_id.as_str())
        .bind(key.size.as_str())
        .bind(i64::from(quantity))
        .bind(handle.expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        record_reserve_outcome("reserved");
        Ok(handle)
    }

    #[tracing::instrument(skip(self, handle), fields(reservation_id = %handle.id))]
    async fn commit(&self, handle: &ReservationHandle) -> Result<()> {
        if !self.settle(handle.id, ReservationState::Committed).await? {
            tracing::debug!("reservation already committed");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, handle), fields(reservation_id = %handle.id))]
    async fn release(&self, handle: &ReservationHandle) -> Result<()> {
        if !self.settle(handle.id, ReservationState::Released).await? {
            tracing::debug!("reservation already released");
        }
        Ok(())
    }

    async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<ReservationHandle>> {
        self.select_expired(now).await
    }

    async fn expire(&self, now: DateTime<Utc>) -> Result<Vec<ReservationHandle>> {
        let mut released = Vec::new();
        for handle in self.select_expired(now).await? {
            // A concurrent commit may have settled it since the select.
            match self.settle(handle.id, ReservationState::Released).await {
                Ok(true) => released.push(handle),
                Ok(false) | Err(LedgerError::ReservationSettled { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        if !released.is_empty() {
            metrics::counter!("reservations_expired_total").increment(released.len() as u64);
            tracing::info!(count = released.len(), "released expired reservations");
        }
        Ok(released)
    }

    async fn seed(&self, key: &StockKey, on_hand: u32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO stock_levels (product_id, size, on_hand, reserved)
            VALUES ($1, $2, $3, 0)
            ON CONFLICT (product_id, size) DO NOTHING
            "#,
        )
        .bind(key.product_id.as_str())
        .bind(key.size.as_str())
        .bind(i64::from(on_hand))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn restock(&self, key: &StockKey, quantity: u32) -> Result<()> {
        let result = sqlx::query(
            "UPDATE stock_levels SET on_hand = on_hand + $3 WHERE product_id = $1 AND size = $2",
        )
        .bind(key.product_id.as_str())
        .bind(key.size.as_str())
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::UnknownStock(key.clone()));
        }
        Ok(())
    }

    async fn stock_level(&self, key: &StockKey) -> Result<StockLevel> {
        let row = sqlx::query(
            "SELECT on_hand, reserved FROM stock_levels WHERE product_id = $1 AND size = $2",
        )
        .bind(key.product_id.as_str())
        .bind(key.size.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::UnknownStock(key.clone()))?;

        Ok(StockLevel {
            on_hand: to_quantity(row.try_get("on_hand")?),
            reserved: to_quantity(row.try_get("reserved")?),
        })
    }

    async fn reservations_for_attempt(&self, attempt_id: AggregateId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, attempt_id, product_id, size, quantity, expires_at, state
            FROM stock_reservations
            WHERE attempt_id = $1
            ORDER BY product_id, size
            "#,
        )
        .bind(attempt_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let state: String = row.try_get("state")?;
                Ok(Reservation {
                    handle: Self::row_to_handle(row)?,
                    state: ReservationState::from_db(&state)
                        .unwrap_or(ReservationState::Released),
                })
            })
            .collect()
    }
}
