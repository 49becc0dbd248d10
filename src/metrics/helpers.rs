//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    GATEWAY_ADMITTED_TOTAL, GATEWAY_REJECTED_TOTAL, RELAY_DELIVERED_TOTAL, RELAY_EVENTS_TOTAL,
    RELAY_FAILED_TOTAL, RELAY_INVALID_TOTAL, RELAY_THROTTLED_TOTAL, WS_EVENTS_DROPPED_TOTAL,
    WS_EVENTS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording gateway metrics
pub struct GatewayMetrics;

impl GatewayMetrics {
    /// Record an admitted connection attempt
    pub fn record_admitted() {
        GATEWAY_ADMITTED_TOTAL.inc();
    }

    /// Record a rejected attempt; `reason` matches the handshake code
    pub fn record_rejected(reason: &str) {
        GATEWAY_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Helper struct for recording relay metrics
pub struct RelayMetrics;

impl RelayMetrics {
    /// Record a received relay event by wire name
    pub fn record_event(event: &str) {
        RELAY_EVENTS_TOTAL.with_label_values(&[event]).inc();
    }

    /// Record successful deliveries
    pub fn record_delivered(count: u64) {
        RELAY_DELIVERED_TOTAL.inc_by(count);
    }

    /// Record recipients that missed the event
    pub fn record_failed(count: u64) {
        RELAY_FAILED_TOTAL.inc_by(count);
    }

    /// Record a throttled event
    pub fn record_throttled() {
        RELAY_THROTTLED_TOTAL.inc();
    }

    /// Record an event dropped for a missing store id
    pub fn record_invalid() {
        RELAY_INVALID_TOTAL.inc();
    }
}

/// Helper struct for recording room membership metrics
pub struct WsMetrics;

impl WsMetrics {
    /// Record a join-store event
    pub fn record_join() {
        WS_EVENTS_TOTAL.with_label_values(&["join-store"]).inc();
    }

    /// Record a leave-store event
    pub fn record_leave() {
        WS_EVENTS_TOTAL.with_label_values(&["leave-store"]).inc();
    }

    /// Record a dropped malformed or unknown frame
    pub fn record_dropped() {
        WS_EVENTS_DROPPED_TOTAL.inc();
    }
}
