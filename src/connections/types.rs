//! Connection handle and related types

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::net::IpAddr;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::websocket::OutboundFrame;

/// Handle for a single live connection.
///
/// Owned by the [`ConnectionRegistry`](super::ConnectionRegistry) for the
/// connection's lifetime; rooms and the throttle reference it by id only.
pub struct ConnectionHandle {
    pub id: Uuid,
    pub addr: IpAddr,
    pub connected_at: DateTime<Utc>,
    /// Room keys this connection has joined; never held across an await
    pub rooms: RwLock<HashSet<String>>,
    sender: mpsc::Sender<OutboundFrame>,
}

impl ConnectionHandle {
    pub fn new(addr: IpAddr, sender: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            addr,
            connected_at: Utc::now(),
            rooms: RwLock::new(HashSet::new()),
            sender,
        }
    }

    /// Queue a frame without waiting. A full or already-closed outbound
    /// channel means this recipient misses the event; that is the
    /// fire-and-forget contract, not a failure to report back.
    pub fn send_frame(&self, frame: OutboundFrame) -> bool {
        self.sender.try_send(frame).is_ok()
    }
}
