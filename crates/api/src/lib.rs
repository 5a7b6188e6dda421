//! HTTP API server with observability for the salon booking system.
//!
//! Provides REST endpoints for slot availability, slot locks, bookings and
//! saga records, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, LogFormat};
pub use error::ApiError;
pub use identity::Caller;
pub use state::{AppState, Application, StartupError, StorageBackend};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/slots", get(routes::slots::list))
        .route("/slots/{id}", get(routes::slots::get))
        .route(
            "/slots/{id}/lock",
            post(routes::slots::lock).delete(routes::slots::unlock),
        )
        .route("/locks/purge", post(routes::slots::purge_locks))
        .route(
            "/bookings",
            post(routes::bookings::create).get(routes::bookings::list),
        )
        .route("/bookings/{id}", get(routes::bookings::get))
        .route("/bookings/{id}/cancel", post(routes::bookings::cancel))
        .route("/salons/{id}/bookings", get(routes::bookings::for_salon))
        .route("/sagas/{id}", get(routes::sagas::get))
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
