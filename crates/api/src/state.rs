//! Shared application state and the storage backends it can run on.

use std::sync::Arc;

use common::{Clock, SystemClock};
use domain::OrderService;
use event_store::{EventStore, EventStoreError, InMemoryEventStore, PostgresEventStore};
use inventory::{
    InMemoryInventoryLedger, InventoryLedger, LedgerError, PostgresInventoryLedger,
};
use payment::{
    InMemoryIntentStore, IntentStore, PaymentGateway, PaymentIntentManager, PostgresIntentStore,
};
use reconciliation::{
    CatalogEntry, CatalogError, InMemoryCatalog, InMemoryShippingService,
    ReconciliationCoordinator,
};
use sqlx::PgPool;
use thiserror::Error;

use crate::config::Config;

/// Gateway chosen at start-up (Razorpay or in-process).
pub type SharedGateway = Arc<dyn PaymentGateway>;

/// The stores one deployment runs on.
pub trait Backend: Send + Sync + 'static {
    type Events: EventStore + 'static;
    type Ledger: InventoryLedger + 'static;
    type Intents: IntentStore + 'static;
}

pub struct InMemoryBackend;

impl Backend for InMemoryBackend {
    type Events = InMemoryEventStore;
    type Ledger = InMemoryInventoryLedger;
    type Intents = InMemoryIntentStore;
}

pub struct PostgresBackend;

impl Backend for PostgresBackend {
    type Events = PostgresEventStore;
    type Ledger = PostgresInventoryLedger;
    type Intents = PostgresIntentStore;
}

pub type Coordinator<B> = ReconciliationCoordinator<
    <B as Backend>::Events,
    <B as Backend>::Ledger,
    SharedGateway,
    <B as Backend>::Intents,
>;

/// Shared application state accessible from all handlers.
pub struct AppState<B: Backend> {
    pub coordinator: Arc<Coordinator<B>>,
    /// Public gateway key handed to the paying client.
    pub gateway_key_id: String,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads the catalog seed named by `CATALOG_FILE`, if any.
pub fn load_catalog(config: &Config) -> Result<Vec<CatalogEntry>, StartupError> {
    let Some(path) = &config.catalog_file else {
        return Ok(Vec::new());
    };
    let json = std::fs::read_to_string(path)?;
    let entries = InMemoryCatalog::parse_entries(&json)?;
    tracing::info!(path = %path.display(), products = entries.len(), "catalog loaded");
    Ok(entries)
}

/// Builds state on in-memory stores.
pub async fn in_memory_state(
    config: &Config,
    catalog: &[CatalogEntry],
    gateway: SharedGateway,
    clock: Arc<dyn Clock>,
) -> Result<Arc<AppState<InMemoryBackend>>, StartupError> {
    let ledger = InMemoryInventoryLedger::new(config.reservation_policy(), clock.clone());
    assemble::<InMemoryBackend>(
        config,
        catalog,
        InMemoryEventStore::new(),
        ledger,
        InMemoryIntentStore::new(),
        gateway,
        clock,
    )
    .await
}

/// Builds state on Postgres and applies pending migrations.
pub async fn postgres_state(
    config: &Config,
    catalog: &[CatalogEntry],
    pool: PgPool,
    gateway: SharedGateway,
) -> Result<Arc<AppState<PostgresBackend>>, StartupError> {
    let events = PostgresEventStore::new(pool.clone());
    events.run_migrations().await?;
    let ledger = PostgresInventoryLedger::new(pool.clone(), config.reservation_policy());
    assemble::<PostgresBackend>(
        config,
        catalog,
        events,
        ledger,
        PostgresIntentStore::new(pool),
        gateway,
        Arc::new(SystemClock),
    )
    .await
}

async fn assemble<B: Backend>(
    config: &Config,
    catalog: &[CatalogEntry],
    events: B::Events,
    ledger: B::Ledger,
    intents: B::Intents,
    gateway: SharedGateway,
    clock: Arc<dyn Clock>,
) -> Result<Arc<AppState<B>>, StartupError> {
    let mut seeded = 0;
    for entry in catalog {
        for (key, count) in entry.stock_keys() {
            if ledger.seed(&key, count).await? {
                seeded += 1;
            }
        }
    }
    if seeded > 0 {
        tracing::info!(seeded, "stock entries seeded");
    }

    let payments = PaymentIntentManager::with_clock(
        gateway,
        intents,
        config.razorpay_key_secret.clone(),
        clock.clone(),
    );
    let coordinator = ReconciliationCoordinator::new(
        OrderService::with_clock(events, clock.clone()),
        ledger,
        payments,
        Arc::new(InMemoryCatalog::from_entries(catalog)),
        Arc::new(InMemoryShippingService::new()),
        config.coordinator_config(),
        clock,
    );

    Ok(Arc::new(AppState {
        coordinator: Arc::new(coordinator),
        gateway_key_id: config.razorpay_key_id.clone(),
    }))
}
