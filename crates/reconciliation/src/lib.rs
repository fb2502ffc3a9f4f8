//! Checkout reconciliation.
//!
//! Ties the order lifecycle, the inventory ledger and payment intents
//! together:
//!
//! 1. `checkout` validates prices, reserves every line and creates a payment intent
//! 2. `handle_callback` verifies the gateway callback, commits stock and places the order
//! 3. `sweep_expired` fails attempts whose reservations ran out before payment
//!
//! Cancellation releases held stock, or restocks it once an order was placed.

pub mod coordinator;
pub mod error;
pub mod services;
pub mod sweeper;

pub use coordinator::{
    CallbackOutcome, CheckoutTicket, CoordinatorConfig, ReconciliationCoordinator, SweepReport,
};
pub use error::{CheckoutError, Result};
pub use services::{
    CatalogEntry, CatalogError, CatalogService, InMemoryCatalog, InMemoryShippingService,
    ShippingError, ShippingService,
};
pub use sweeper::{ExpirySweeper, SweeperHandle};
