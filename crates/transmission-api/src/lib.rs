//! # transmission-api — Shipment Tracking Service
//!
//! Axum service exposing shipments and everything attached to them over a
//! JSON:API surface.
//!
//! ## API Surface
//!
//! | Prefix                                  | Module                           |
//! |-----------------------------------------|----------------------------------|
//! | `/shipments`, `/shipments/{id}`         | [`routes::shipments`]            |
//! | `/shipments/{id}/actions`, `/history`   | [`routes::shipments`]            |
//! | `/shipments/{id}/tags`, `/notes`        | [`routes::tags`], [`routes::notes`] |
//! | `/shipments/{id}/permission_links`      | [`routes::permission_links`]     |
//! | `/access_requests`, `/shipments/{id}/access_requests` | [`routes::access_requests`] |
//! | `/shipments/{id}/documents`, `/documents/events` | [`routes::documents`]   |
//! | `/imports`                              | [`routes::imports`]              |
//! | `/devices/{id}/*`, `/shipments/{id}/tracking`, `/telemetry` | [`routes::devices`] |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → BodyLimit → Handler
//! ```
//!
//! Authentication is an extractor ([`auth::RequestContext`]) rather than a
//! layer: some routes accept anonymous callers holding a permission link,
//! and device routes authenticate by signature.

pub mod access;
pub mod auth;
pub mod config;
pub mod db;
pub mod devices;
pub mod error;
pub mod extractors;
pub mod history;
pub mod jsonapi;
pub mod middleware;
pub mod openapi;
pub mod records;
pub mod routes;
pub mod state;
pub mod storage;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

/// Request bodies above this are rejected with 413.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Assemble the application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::shipments::router())
        .merge(routes::tags::router())
        .merge(routes::notes::router())
        .merge(routes::permission_links::router())
        .merge(routes::access_requests::router())
        .merge(routes::documents::router())
        .merge(routes::imports::router())
        .merge(routes::devices::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(BODY_LIMIT));

    let probes = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(prometheus_metrics));

    Router::new()
        .merge(probes)
        .merge(api)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .with_state(state)
}

/// GET /metrics — Prometheus text exposition.
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let Some(handle) = &state.metrics else {
        return (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response();
    };
    gauge_store_sizes(&state);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
        .into_response()
}

/// Refresh record-count gauges on each scrape.
fn gauge_store_sizes(state: &AppState) {
    for (kind, count) in [
        ("shipment", state.shipments.len()),
        ("device", state.devices.len()),
        ("access_request", state.access_requests.len()),
        ("document", state.documents.len()),
        ("import", state.imports.len()),
        ("tracking", state.tracking.len()),
        ("telemetry", state.telemetry.len()),
    ] {
        metrics::gauge!("transmission_records", "kind" => kind).set(count as f64);
    }
}

/// Liveness probe — 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe — 503 when the configured database is unreachable.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }
    (StatusCode::OK, "ready").into_response()
}
