//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::state::{AppState, Backend, SharedGateway};
use common::SystemClock;
use metrics_exporter_prometheus::PrometheusHandle;
use payment::{InMemoryPaymentGateway, RazorpayGateway};
use reconciliation::ExpirySweeper;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn build_gateway(config: &Config) -> SharedGateway {
    if config.uses_razorpay() {
        tracing::info!(key_id = %config.razorpay_key_id, "using Razorpay gateway");
        Arc::new(RazorpayGateway::with_base_url(
            config.razorpay_base_url.clone(),
            config.razorpay_key_id.clone(),
            config.razorpay_key_secret.clone(),
        ))
    } else {
        tracing::warn!("RAZORPAY_KEY_ID not set, using in-process payment gateway");
        Arc::new(InMemoryPaymentGateway::new())
    }
}

/// Serves until a shutdown signal, then stops the expiry sweeper.
async fn serve<B: Backend>(state: Arc<AppState<B>>, config: &Config, metrics: PrometheusHandle) {
    let (sweeper, sweeper_handle) =
        ExpirySweeper::new(state.coordinator.clone(), config.sweep_interval());
    let sweeper_task = tokio::spawn(sweeper.run());

    let app = api::create_app(state, metrics);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    sweeper_handle.shutdown().await;
    if let Err(e) = sweeper_task.await {
        tracing::error!(error = %e, "expiry sweeper task failed");
    }
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Catalog seed and payment gateway
    let catalog = api::state::load_catalog(&config).expect("failed to load catalog");
    let gateway = build_gateway(&config);

    // 4. Stores, then serve
    match &config.database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url)
                .await
                .expect("failed to connect to Postgres");
            let state = api::state::postgres_state(&config, &catalog, pool, gateway)
                .await
                .expect("failed to initialise Postgres state");
            serve(state, &config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, running on in-memory stores");
            let state =
                api::state::in_memory_state(&config, &catalog, gateway, Arc::new(SystemClock))
                    .await
                    .expect("failed to initialise in-memory state");
            serve(state, &config, metrics_handle).await;
        }
    }
}
