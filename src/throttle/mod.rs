//! Per-connection relay-event throttling.

use std::time::{Duration, SystemTime};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

/// Outcome of a throttle check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allowed,
    Throttled,
}

impl ThrottleDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleDecision::Allowed)
    }
}

/// Caps how often a single connection may trigger relay events.
///
/// One last-accepted timestamp per connection, shared across event types.
/// Entries are created lazily on the first relay event and removed when the
/// connection disconnects, so the map never outgrows the active connection
/// set.
pub struct EventThrottle {
    last_accepted: DashMap<Uuid, i64>,
    window_ms: i64,
}

impl EventThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            last_accepted: DashMap::new(),
            window_ms: window.as_millis() as i64,
        }
    }

    /// Current time in milliseconds
    pub fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    /// Accept the event iff the window has elapsed since the previous
    /// accepted event; on acceptance the current time becomes the new
    /// last-accepted timestamp. Throttled events must be dropped silently by
    /// the caller.
    pub fn check_and_record(&self, connection_id: Uuid) -> ThrottleDecision {
        self.check_and_record_at(connection_id, Self::now_millis())
    }

    fn check_and_record_at(&self, connection_id: Uuid, now: i64) -> ThrottleDecision {
        match self.last_accepted.entry(connection_id) {
            Entry::Vacant(entry) => {
                entry.insert(now);
                ThrottleDecision::Allowed
            }
            Entry::Occupied(mut entry) => {
                if now.saturating_sub(*entry.get()) >= self.window_ms {
                    entry.insert(now);
                    ThrottleDecision::Allowed
                } else {
                    ThrottleDecision::Throttled
                }
            }
        }
    }

    /// Drop the state of a disconnected connection
    pub fn forget(&self, connection_id: Uuid) {
        self.last_accepted.remove(&connection_id);
    }

    /// Number of connections currently tracked
    pub fn tracked(&self) -> usize {
        self.last_accepted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_throttle() -> EventThrottle {
        EventThrottle::new(Duration::from_millis(200))
    }

    #[test]
    fn test_first_event_allowed() {
        let throttle = create_throttle();
        let id = Uuid::new_v4();

        assert!(throttle.check_and_record_at(id, 1_000).is_allowed());
    }

    #[test]
    fn test_event_inside_window_throttled() {
        let throttle = create_throttle();
        let id = Uuid::new_v4();

        assert!(throttle.check_and_record_at(id, 1_000).is_allowed());
        assert_eq!(
            throttle.check_and_record_at(id, 1_050),
            ThrottleDecision::Throttled
        );
        // A throttled event does not push the window forward
        assert_eq!(
            throttle.check_and_record_at(id, 1_199),
            ThrottleDecision::Throttled
        );
        assert!(throttle.check_and_record_at(id, 1_200).is_allowed());
    }

    #[test]
    fn test_connections_throttled_independently() {
        let throttle = create_throttle();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(throttle.check_and_record_at(a, 1_000).is_allowed());
        assert!(throttle.check_and_record_at(b, 1_001).is_allowed());
        assert!(!throttle.check_and_record_at(a, 1_002).is_allowed());
    }

    #[test]
    fn test_forget_clears_state() {
        let throttle = create_throttle();
        let id = Uuid::new_v4();

        assert!(throttle.check_and_record_at(id, 1_000).is_allowed());
        assert_eq!(throttle.tracked(), 1);

        throttle.forget(id);
        assert_eq!(throttle.tracked(), 0);

        // A fresh entry starts a fresh window
        assert!(throttle.check_and_record_at(id, 1_001).is_allowed());
    }
}
