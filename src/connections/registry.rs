use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::OutboundFrame;

use super::ConnectionHandle;

/// Owns every active connection and the room membership index.
///
/// Rooms exist implicitly: an entry is created by the first join and removed
/// together with the membership mutation that empties it.
pub struct ConnectionRegistry {
    /// connection_id -> handle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// room key -> member connection ids
    rooms: DashMap<String, HashSet<Uuid>>,
    /// Optional cap on rooms per connection
    max_rooms_per_connection: Option<usize>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::with_room_limit(None)
    }

    pub fn with_room_limit(max_rooms_per_connection: Option<usize>) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            max_rooms_per_connection,
        }
    }

    /// Register a new connection
    pub fn register(
        &self,
        addr: IpAddr,
        sender: mpsc::Sender<OutboundFrame>,
    ) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(addr, sender));
        self.connections.insert(handle.id, handle.clone());

        tracing::info!(connection_id = %handle.id, addr = %handle.addr, "Connection registered");

        handle
    }

    /// Unregister a connection and remove it from every room it belonged
    /// to, dropping rooms that became empty.
    pub fn unregister(&self, connection_id: Uuid) {
        if let Some((_, handle)) = self.connections.remove(&connection_id) {
            for mut entry in self.rooms.iter_mut() {
                entry.value_mut().remove(&connection_id);
            }
            self.rooms.retain(|_, members| !members.is_empty());

            tracing::info!(
                connection_id = %connection_id,
                addr = %handle.addr,
                connected_secs = Utc::now().signed_duration_since(handle.connected_at).num_seconds(),
                "Connection unregistered"
            );
        }
    }

    /// Join a room; idempotent. Returns false when the connection is gone
    /// or the per-connection room cap refuses the join.
    pub async fn join(&self, connection_id: Uuid, key: &str) -> bool {
        let Some(handle) = self.get(connection_id) else {
            return false;
        };

        {
            let mut joined = handle.rooms.write().await;
            if !joined.contains(key) {
                if let Some(max) = self.max_rooms_per_connection {
                    if joined.len() >= max {
                        tracing::warn!(
                            connection_id = %connection_id,
                            room = %key,
                            max_rooms = max,
                            "Join refused, room limit reached"
                        );
                        return false;
                    }
                }
                joined.insert(key.to_string());
            }
        }

        self.rooms
            .entry(key.to_string())
            .or_default()
            .insert(connection_id);

        if !self.connections.contains_key(&connection_id) {
            // Disconnect teardown raced the join; undo the membership
            self.remove_member(connection_id, key);
            return false;
        }

        tracing::debug!(connection_id = %connection_id, room = %key, "Joined room");
        true
    }

    /// Leave a room; a no-op when not currently a member
    pub async fn leave(&self, connection_id: Uuid, key: &str) {
        if let Some(handle) = self.get(connection_id) {
            handle.rooms.write().await.remove(key);
        }
        self.remove_member(connection_id, key);

        tracing::debug!(connection_id = %connection_id, room = %key, "Left room");
    }

    fn remove_member(&self, connection_id: Uuid, key: &str) {
        if let Some(mut members) = self.rooms.get_mut(key) {
            members.remove(&connection_id);
            let empty = members.is_empty();
            drop(members);
            if empty {
                // Re-checked under the entry lock so a concurrent join
                // cannot lose its freshly-created room
                self.rooms.remove_if(key, |_, members| members.is_empty());
            }
        }
    }

    /// Snapshot of the current member handles of a room. Membership changes
    /// after the call do not affect an in-flight fan-out.
    pub fn members_of(&self, key: &str) -> Vec<Arc<ConnectionHandle>> {
        self.rooms
            .get(key)
            .map(|member_ids| {
                member_ids
                    .iter()
                    .filter_map(|id| self.connections.get(id).map(|handle| handle.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get connection by ID
    pub fn get(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections
            .get(&connection_id)
            .map(|handle| handle.clone())
    }

    /// Get statistics
    pub fn stats(&self) -> RegistryStats {
        let mut rooms = HashMap::new();
        for entry in self.rooms.iter() {
            rooms.insert(entry.key().clone(), entry.value().len());
        }

        RegistryStats {
            total_connections: self.connections.len(),
            rooms,
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub rooms: HashMap<String, usize>,
}
