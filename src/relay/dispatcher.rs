use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::connections::{ConnectionHandle, ConnectionRegistry};
use crate::metrics::RelayMetrics;
use crate::throttle::EventThrottle;
use crate::websocket::{OutboundFrame, ServerMessage, SyncPayload};

/// Member-set size at which the outbound frame is serialized once and shared
const PRESERIALIZATION_THRESHOLD: usize = 4;

/// Whether the originating connection receives its own event back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    ExcludeSender,
    IncludeSender,
}

/// Outcome of one relay attempt. Throttled and invalid events perform no
/// room lookup and no delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered { delivered: usize, failed: usize },
    Throttled,
    InvalidPayload,
}

impl RelayOutcome {
    pub fn delivered(&self) -> usize {
        match self {
            RelayOutcome::Delivered { delivered, .. } => *delivered,
            _ => 0,
        }
    }
}

#[derive(Debug, Default)]
struct RelayCounters {
    transactions: AtomicU64,
    item_syncs: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    throttled: AtomicU64,
    invalid: AtomicU64,
}

/// Snapshot of relay statistics
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatsSnapshot {
    pub transactions: u64,
    pub item_syncs: u64,
    pub delivered: u64,
    pub failed: u64,
    pub throttled: u64,
    pub invalid: u64,
}

/// Fans sync events out to the sender's store peers.
pub struct SyncRelay {
    registry: Arc<ConnectionRegistry>,
    throttle: Arc<EventThrottle>,
    counters: RelayCounters,
}

impl SyncRelay {
    pub fn new(registry: Arc<ConnectionRegistry>, throttle: Arc<EventThrottle>) -> Self {
        Self {
            registry,
            throttle,
            counters: RelayCounters::default(),
        }
    }

    /// Get relay statistics
    pub fn stats(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            transactions: self.counters.transactions.load(Ordering::Relaxed),
            item_syncs: self.counters.item_syncs.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            throttled: self.counters.throttled.load(Ordering::Relaxed),
            invalid: self.counters.invalid.load(Ordering::Relaxed),
        }
    }

    /// Relay a transaction event to the sender's store peers. The sender
    /// itself is excluded: this event means "a peer changed something".
    #[tracing::instrument(name = "relay.sync_transaction", skip(self, payload), fields(sender = %sender_id))]
    pub fn relay_transaction(&self, sender_id: Uuid, payload: SyncPayload) -> RelayOutcome {
        self.counters.transactions.fetch_add(1, Ordering::Relaxed);
        RelayMetrics::record_event("sync-transaction");
        self.relay(
            sender_id,
            payload,
            DeliveryMode::ExcludeSender,
            ServerMessage::SyncTransaction,
        )
    }

    /// Relay a catalog-level item sync to the whole room, the sender
    /// included, so the originating terminal reflects the accepted state too.
    #[tracing::instrument(name = "relay.sync_item", skip(self, payload), fields(sender = %sender_id))]
    pub fn relay_item_sync(&self, sender_id: Uuid, payload: SyncPayload) -> RelayOutcome {
        self.counters.item_syncs.fetch_add(1, Ordering::Relaxed);
        RelayMetrics::record_event("sync-item");
        self.relay(
            sender_id,
            payload,
            DeliveryMode::IncludeSender,
            ServerMessage::SyncItem,
        )
    }

    fn relay(
        &self,
        sender_id: Uuid,
        payload: SyncPayload,
        mode: DeliveryMode,
        make_message: fn(SyncPayload) -> ServerMessage,
    ) -> RelayOutcome {
        // The guard runs before validation and room lookup; a throttled call
        // must stay invisible to the sender
        if !self.throttle.check_and_record(sender_id).is_allowed() {
            self.counters.throttled.fetch_add(1, Ordering::Relaxed);
            RelayMetrics::record_throttled();
            tracing::debug!(sender = %sender_id, "Sync event throttled");
            return RelayOutcome::Throttled;
        }

        let Some(store_id) = payload.store_id.clone() else {
            self.counters.invalid.fetch_add(1, Ordering::Relaxed);
            RelayMetrics::record_invalid();
            tracing::warn!(sender = %sender_id, "Sync payload missing storeId, event dropped");
            return RelayOutcome::InvalidPayload;
        };

        let room = store_id.room_key();
        let members = self.registry.members_of(&room);
        let recipients: Vec<Arc<ConnectionHandle>> = match mode {
            DeliveryMode::ExcludeSender => members
                .into_iter()
                .filter(|member| member.id != sender_id)
                .collect(),
            DeliveryMode::IncludeSender => members,
        };

        let (delivered, failed) = fan_out(&recipients, &make_message(payload));

        self.counters
            .delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.counters.failed.fetch_add(failed as u64, Ordering::Relaxed);
        RelayMetrics::record_delivered(delivered as u64);
        RelayMetrics::record_failed(failed as u64);

        tracing::debug!(
            sender = %sender_id,
            room = %room,
            delivered = delivered,
            failed = failed,
            "Relayed sync event"
        );

        RelayOutcome::Delivered { delivered, failed }
    }
}

/// Dispatch one frame to each recipient independently. Delivery is
/// fire-and-forget into the per-connection outbound queue: a recipient whose
/// queue is full or already closed misses the event without delaying anyone
/// else, and nothing is reported back to the sender.
fn fan_out(recipients: &[Arc<ConnectionHandle>], message: &ServerMessage) -> (usize, usize) {
    if recipients.is_empty() {
        return (0, 0);
    }

    // Serialize once for larger member sets instead of per recipient
    let frame = if recipients.len() >= PRESERIALIZATION_THRESHOLD {
        match OutboundFrame::preserialized(message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "Failed to pre-serialize frame, sending raw");
                OutboundFrame::Raw(message.clone())
            }
        }
    } else {
        OutboundFrame::Raw(message.clone())
    };

    let mut delivered = 0;
    let mut failed = 0;
    for recipient in recipients {
        if recipient.send_frame(frame.clone()) {
            delivered += 1;
        } else {
            failed += 1;
        }
    }

    (delivered, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn create_relay(window: Duration) -> (Arc<ConnectionRegistry>, SyncRelay) {
        let registry = Arc::new(ConnectionRegistry::new());
        let throttle = Arc::new(EventThrottle::new(window));
        let relay = SyncRelay::new(registry.clone(), throttle);
        (registry, relay)
    }

    fn connect(
        registry: &ConnectionRegistry,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = registry.register(IpAddr::V4(Ipv4Addr::LOCALHOST), tx);
        (handle, rx)
    }

    fn payload(store: i64) -> SyncPayload {
        serde_json::from_value(json!({"storeId": store, "userId": "u1"})).unwrap()
    }

    #[tokio::test]
    async fn test_transaction_excludes_sender() {
        let (registry, relay) = create_relay(Duration::ZERO);
        let (a, mut a_rx) = connect(&registry);
        let (b, mut b_rx) = connect(&registry);
        registry.join(a.id, "store-7").await;
        registry.join(b.id, "store-7").await;

        let outcome = relay.relay_transaction(a.id, payload(7));
        assert_eq!(outcome, RelayOutcome::Delivered { delivered: 1, failed: 0 });

        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_item_sync_includes_sender() {
        let (registry, relay) = create_relay(Duration::ZERO);
        let (a, mut a_rx) = connect(&registry);
        let (b, mut b_rx) = connect(&registry);
        registry.join(a.id, "store-7").await;
        registry.join(b.id, "store-7").await;

        let outcome = relay.relay_item_sync(a.id, payload(7));
        assert_eq!(outcome, RelayOutcome::Delivered { delivered: 2, failed: 0 });

        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_missing_store_id_dropped() {
        let (registry, relay) = create_relay(Duration::ZERO);
        let (a, _a_rx) = connect(&registry);
        registry.join(a.id, "store-7").await;

        let empty: SyncPayload = serde_json::from_value(json!({"userId": "u1"})).unwrap();
        assert_eq!(relay.relay_transaction(a.id, empty), RelayOutcome::InvalidPayload);
        assert_eq!(relay.stats().invalid, 1);
    }

    #[tokio::test]
    async fn test_throttled_event_skips_delivery() {
        let (registry, relay) = create_relay(Duration::from_secs(60));
        let (a, _a_rx) = connect(&registry);
        let (b, mut b_rx) = connect(&registry);
        registry.join(a.id, "store-7").await;
        registry.join(b.id, "store-7").await;

        assert_eq!(
            relay.relay_transaction(a.id, payload(7)),
            RelayOutcome::Delivered { delivered: 1, failed: 0 }
        );
        assert_eq!(relay.relay_transaction(a.id, payload(7)), RelayOutcome::Throttled);

        // Only the first event reached the peer
        assert!(b_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_err());
        assert_eq!(relay.stats().throttled, 1);
    }

    #[tokio::test]
    async fn test_closed_recipient_counts_as_failed() {
        let (registry, relay) = create_relay(Duration::ZERO);
        let (a, _a_rx) = connect(&registry);
        let (b, b_rx) = connect(&registry);
        registry.join(a.id, "store-7").await;
        registry.join(b.id, "store-7").await;

        drop(b_rx);
        assert_eq!(
            relay.relay_transaction(a.id, payload(7)),
            RelayOutcome::Delivered { delivered: 0, failed: 1 }
        );
    }

    #[tokio::test]
    async fn test_relay_to_unknown_room_delivers_nothing() {
        let (registry, relay) = create_relay(Duration::ZERO);
        let (a, _a_rx) = connect(&registry);

        assert_eq!(
            relay.relay_transaction(a.id, payload(99)),
            RelayOutcome::Delivered { delivered: 0, failed: 0 }
        );
    }
}
