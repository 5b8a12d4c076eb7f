//! Prometheus metrics: HTTP request tracking, booking outcomes and lot occupancy.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::ledger::LedgerError;
use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const RESERVATIONS_TOTAL: &str = "reservations_total";
pub const OCCUPIED_SLOTS: &str = "occupied_slots";
pub const SLOTS_TOTAL: &str = "slots_total";

/// Install the global Prometheus recorder. Call once at startup.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        RESERVATIONS_TOTAL,
        "Booking attempts by outcome (created/slot_occupied/overlapping/rejected/cancelled)"
    );
    describe_gauge!(OCCUPIED_SLOTS, "Slots held by a reservation at scrape time");
    describe_gauge!(SLOTS_TOTAL, "Slots in the catalogue");

    Ok(handle)
}

/// GET /metrics
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Response {
    let Some(handle) = state.metrics_handle.as_ref() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized").into_response();
    };

    gauge!(SLOTS_TOTAL).set(state.ledger.catalogue().len() as f64);
    match state.ledger.occupied_count(state.now()).await {
        Ok(count) => gauge!(OCCUPIED_SLOTS).set(count as f64),
        Err(e) => tracing::warn!("Failed to compute occupancy for metrics: {}", e),
    }

    (StatusCode::OK, handle.render()).into_response()
}

/// Counts requests and records latency, labelled by route template.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status)
        .increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

/// Label for a booking attempt; `None` means it was admitted.
pub fn booking_outcome(rejection: Option<&LedgerError>) -> &'static str {
    match rejection {
        None => "created",
        Some(LedgerError::SlotOccupied { .. }) => "slot_occupied",
        Some(LedgerError::OverlappingBooking) => "overlapping",
        Some(LedgerError::Database(_)) => "error",
        Some(_) => "rejected",
    }
}

pub fn record_booking(outcome: &'static str) {
    counter!(RESERVATIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_cancellation() {
    counter!(RESERVATIONS_TOTAL, "outcome" => "cancelled").increment(1);
}
