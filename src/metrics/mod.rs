//! Prometheus metrics for the relay service.
//!
//! Covers the admission gateway (admitted/rejected by reason), the live
//! connection and room gauges, and the relay fan-out counters.

mod helpers;

pub use helpers::{encode_metrics, GatewayMetrics, RelayMetrics, WsMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "storesync";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Total WebSocket connections opened since start
    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    /// Total WebSocket connections closed since start
    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Number of active connections
    pub static ref CONNECTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Number of active connections"
    ).unwrap();

    /// Number of rooms with at least one member
    pub static ref ROOMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_rooms_active", METRIC_PREFIX),
        "Number of rooms with at least one member"
    ).unwrap();

    /// Members per room
    pub static ref ROOM_MEMBERS: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_room_members", METRIC_PREFIX),
        "Number of members per room",
        &["room"]
    ).unwrap();

    /// Source addresses currently holding admission slots
    pub static ref ADMISSION_ADDRESSES: IntGauge = register_int_gauge!(
        format!("{}_admission_addresses", METRIC_PREFIX),
        "Source addresses currently holding admission slots"
    ).unwrap();

    // ============================================================================
    // Gateway Metrics
    // ============================================================================

    /// Total admitted connection attempts
    pub static ref GATEWAY_ADMITTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_gateway_admitted_total", METRIC_PREFIX),
        "Total admitted connection attempts"
    ).unwrap();

    /// Total rejected connection attempts by reason
    pub static ref GATEWAY_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_gateway_rejected_total", METRIC_PREFIX),
        "Total rejected connection attempts",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Relay Metrics
    // ============================================================================

    /// Total relay events received by event type
    pub static ref RELAY_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_relay_events_total", METRIC_PREFIX),
        "Total relay events received",
        &["event"]
    ).unwrap();

    /// Total frames delivered to recipients
    pub static ref RELAY_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_relay_delivered_total", METRIC_PREFIX),
        "Total frames delivered to recipients"
    ).unwrap();

    /// Total frames that missed their recipient
    pub static ref RELAY_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_relay_failed_total", METRIC_PREFIX),
        "Total frames that missed their recipient"
    ).unwrap();

    /// Total relay events dropped by the throttle guard
    pub static ref RELAY_THROTTLED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_relay_throttled_total", METRIC_PREFIX),
        "Total relay events dropped by the throttle guard"
    ).unwrap();

    /// Total relay events dropped for a missing store id
    pub static ref RELAY_INVALID_TOTAL: IntCounter = register_int_counter!(
        format!("{}_relay_invalid_total", METRIC_PREFIX),
        "Total relay events dropped for a missing store id"
    ).unwrap();

    // ============================================================================
    // WebSocket Event Metrics
    // ============================================================================

    /// Total room membership events by event type
    pub static ref WS_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_events_total", METRIC_PREFIX),
        "Total room membership events",
        &["event"]
    ).unwrap();

    /// Total inbound frames dropped as malformed or unknown
    pub static ref WS_EVENTS_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_ws_events_dropped_total", METRIC_PREFIX),
        "Total inbound frames dropped as malformed or unknown"
    ).unwrap();
}
