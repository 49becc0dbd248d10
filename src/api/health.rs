//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::gateway::AdmissionStats;
use crate::relay::RelayStatsSnapshot;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: ConnectionHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealthResponse {
    pub total: usize,
    pub rooms: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStatsResponse,
    pub admission: AdmissionStats,
    pub relay: RelayStatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatsResponse {
    pub total_connections: usize,
    pub rooms: std::collections::HashMap<String, usize>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let conn_stats = state.registry.stats();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: ConnectionHealthResponse {
            total: conn_stats.total_connections,
            rooms: conn_stats.rooms.len(),
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let conn_stats = state.registry.stats();

    Json(StatsResponse {
        connections: ConnectionStatsResponse {
            total_connections: conn_stats.total_connections,
            rooms: conn_stats.rooms,
        },
        admission: state.admission.stats(),
        relay: state.relay.stats(),
    })
}
