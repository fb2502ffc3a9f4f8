use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::Money;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::IntentStore;
use crate::error::IntentStoreError;
use crate::intent::{IntentStatus, PaymentIntent};

const UNIQUE_VIOLATION: &str = "23505";

const INTENT_COLUMNS: &str = "attempt_id, gateway_order_id, amount, currency, status, \
     gateway_payment_id, created_at, updated_at";

/// PostgreSQL-backed intent store (`payment_intents` table).
#[derive(Clone)]
pub struct PostgresIntentStore {
    pool: PgPool,
}

impl PostgresIntentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_intent(row: PgRow) -> Result<PaymentIntent, IntentStoreError> {
        let status: String = row.try_get("status")?;
        Ok(PaymentIntent {
            attempt_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("attempt_id")?),
            gateway_order_id: row.try_get("gateway_order_id")?,
            amount: Money::from_paise(row.try_get("amount")?),
            currency: row.try_get("currency")?,
            status: IntentStatus::from_db(&status)
                .ok_or_else(|| IntentStoreError::Corrupt(format!("unknown status {status}")))?,
            gateway_payment_id: row.try_get("gateway_payment_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl IntentStore for PostgresIntentStore {
    async fn insert(&self, intent: &PaymentIntent) -> Result<(), IntentStoreError> {
        sqlx::query(
            r#"
            INSERT INTO payment_intents
                (attempt_id, gateway_order_id, amount, currency, status, gateway_payment_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(intent.attempt_id.as_uuid())
        .bind(&intent.gateway_order_id)
        .bind(intent.amount.paise())
        .bind(&intent.currency)
        .bind(intent.status.as_str())
        .bind(&intent.gateway_payment_id)
        .bind(intent.created_at)
        .bind(intent.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
            {
                return IntentStoreError::Duplicate(intent.attempt_id);
            }
            IntentStoreError::Database(e)
        })?;
        Ok(())
    }

    async fn get(&self, attempt_id: AggregateId) -> Result<Option<PaymentIntent>, IntentStoreError> {
        sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE attempt_id = $1"
        ))
        .bind(attempt_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_intent)
        .transpose()
    }

    async fn find_by_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentIntent>, IntentStoreError> {
        sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE gateway_order_id = $1"
        ))
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_intent)
        .transpose()
    }

    async fn transition(
        &self,
        attempt_id: AggregateId,
        from: &[IntentStatus],
        to: IntentStatus,
        payment_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<PaymentIntent>, IntentStoreError> {
        let from: Vec<&str> = from.iter().map(IntentStatus::as_str).collect();
        sqlx::query(&format!(
            r#"
            UPDATE payment_intents
            SET status = $3,
                gateway_payment_id = COALESCE($4, gateway_payment_id),
                updated_at = $5
            WHERE attempt_id = $1 AND status = ANY($2)
            RETURNING {INTENT_COLUMNS}
            "#
        ))
        .bind(attempt_id.as_uuid())
        .bind(&from)
        .bind(to.as_str())
        .bind(payment_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_intent)
        .transpose()
    }
}
