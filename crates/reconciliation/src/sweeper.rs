//! Background expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use event_store::EventStore;
use inventory::InventoryLedger;
use payment::{IntentStore, PaymentGateway};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::coordinator::ReconciliationCoordinator;

/// Runs [`ReconciliationCoordinator::sweep_expired`] on a fixed interval.
pub struct ExpirySweeper<S, L, G, P>
where
    S: EventStore,
    L: InventoryLedger,
    G: PaymentGateway,
    P: IntentStore,
{
    coordinator: Arc<ReconciliationCoordinator<S, L, G, P>>,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Stops a running [`ExpirySweeper`].
#[derive(Clone)]
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    /// Asks the sweeper to stop after the pass in progress. Returns false if
    /// it had already stopped.
    pub async fn shutdown(&self) -> bool {
        self.shutdown_tx.send(()).await.is_ok()
    }
}

impl<S, L, G, P> ExpirySweeper<S, L, G, P>
where
    S: EventStore,
    L: InventoryLedger,
    G: PaymentGateway,
    P: IntentStore,
{
    pub fn new(
        coordinator: Arc<ReconciliationCoordinator<S, L, G, P>>,
        interval: Duration,
    ) -> (Self, SweeperHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let sweeper = ExpirySweeper {
            coordinator,
            interval,
            shutdown_rx,
        };
        (sweeper, SweeperHandle { shutdown_tx })
    }

    /// Sweeps until shut down. Spawn this as a background task.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "expiry sweeper starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.coordinator.sweep_expired().await {
                        Ok(report) if report.expired_attempts == 0 => {
                            debug!("no expired reservations");
                        }
                        Ok(_) => {}
                        Err(e) => error!(?e, "expiry sweep failed"),
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("expiry sweeper shutting down");
                    break;
                }
            }
        }

        info!("expiry sweeper stopped");
    }
}
