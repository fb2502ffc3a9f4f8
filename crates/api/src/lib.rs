//! HTTP API for the storefront checkout core.
//!
//! Exposes checkout, the payment callback, order queries and fulfilment
//! updates, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::{AppState, Backend};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<B: Backend>(state: Arc<AppState<B>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/checkout", post(routes::checkout::start::<B>))
        .route("/checkout/{attempt_id}", get(routes::checkout::status::<B>))
        .route("/payments/callback", post(routes::payments::callback::<B>))
        .route("/orders", get(routes::orders::list::<B>))
        .route("/orders/{order_number}", get(routes::orders::get::<B>))
        .route("/orders/{order_number}/cancel", post(routes::orders::cancel::<B>))
        .route(
            "/orders/{order_number}/fulfilment",
            post(routes::orders::fulfilment::<B>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
