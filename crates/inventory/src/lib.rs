//! Inventory ledger.
//!
//! Stock is tracked per product size as `on_hand` (physical units not yet
//! shipped) and `reserved` (units held by open checkouts). A reservation
//! never succeeds unless `on_hand - reserved` covers it, so reserved plus
//! committed quantity can never exceed physical stock.

pub mod error;
pub mod ledger;
pub mod memory;
pub mod postgres;

pub use error::{LedgerError, Result};
pub use ledger::{
    InventoryLedger, Reservation, ReservationHandle, ReservationPolicy, ReservationState,
    StockLevel,
};
pub use memory::InMemoryInventoryLedger;
pub use postgres::PostgresInventoryLedger;
