//! Prometheus metrics endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::metrics;
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    update_metrics_from_state(&state);

    match metrics::encode_metrics() {
        Ok(output) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            output,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Refresh the gauges from live state before scraping
fn update_metrics_from_state(state: &AppState) {
    let conn_stats = state.registry.stats();
    metrics::CONNECTIONS_TOTAL.set(conn_stats.total_connections as i64);
    metrics::ROOMS_ACTIVE.set(conn_stats.rooms.len() as i64);

    for (room, members) in &conn_stats.rooms {
        metrics::ROOM_MEMBERS
            .with_label_values(&[room])
            .set(*members as i64);
    }

    metrics::ADMISSION_ADDRESSES.set(state.admission.stats().tracked_addresses as i64);
}
