use domain::StockKey;
use thiserror::Error;
use uuid::Uuid;

use crate::ReservationState;

/// Errors raised by the inventory ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Not enough unreserved stock at call time. Nothing was reserved.
    #[error("Insufficient stock for {key}: requested {requested}, available {available}")]
    InsufficientStock {
        key: StockKey,
        requested: u32,
        available: u32,
    },

    #[error("Unknown stock key: {0}")]
    UnknownStock(StockKey),

    #[error("Unknown reservation: {0}")]
    UnknownReservation(Uuid),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),

    /// The reservation was already settled the other way (committing a
    /// released hold, or releasing a committed one).
    #[error("Reservation {id} is already {state}")]
    ReservationSettled { id: Uuid, state: ReservationState },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl LedgerError {
    /// Stock may free up, so the caller can try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::InsufficientStock { .. })
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
