//! # Request Metrics
//!
//! Records `http_requests_total` and `http_request_duration_seconds` through
//! the `metrics` facade. The binary installs a Prometheus recorder and
//! serves its rendering at `GET /metrics`; without a recorder the macros are
//! no-ops.
//!
//! Labels are the method, the path with identifiers collapsed to `{id}`, and
//! the status class (`2xx`, `4xx`, ...).

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

pub const REQUESTS_TOTAL: &str = "http_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Replace UUID path segments with `{id}`.
///
/// Prevents cardinality explosion in Prometheus labels.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if uuid::Uuid::parse_str(segment).is_ok() {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `2xx`, `4xx`, ...
pub fn status_class(status: u16) -> String {
    format!("{}xx", status / 100)
}

/// Middleware that records HTTP request metrics.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = status_class(response.status().as_u16());
    metrics::counter!(REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status)
        .increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "method" => method, "path" => path)
        .record(start.elapsed().as_secs_f64());

    response
}
