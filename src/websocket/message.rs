use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Store identifier as supplied on the wire: a JSON string or number.
/// Both spellings of the same id normalize to the same room key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreId {
    Number(i64),
    Text(String),
}

impl StoreId {
    /// Canonical room key for this store
    pub fn room_key(&self) -> String {
        format!("store-{}", self)
    }

    fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        match value {
            Value::String(s) => Ok(StoreId::Text(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(StoreId::Number)
                .ok_or(ProtocolError::InvalidStoreId),
            _ => Err(ProtocolError::InvalidStoreId),
        }
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreId::Number(n) => write!(f, "{}", n),
            StoreId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Payload of a sync event. `storeId` is required for routing; every other
/// field passes through to recipients untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<StoreId>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

/// Events received from a client
#[derive(Debug, Clone)]
pub enum ClientMessage {
    JoinStore(StoreId),
    LeaveStore(StoreId),
    SyncTransaction(SyncPayload),
    SyncItem(SyncPayload),
}

/// Raw `{"type": ..., "payload": ...}` frame, parsed before the payload is
/// interpreted so failures map to the offending part.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl ClientMessage {
    /// Parse a text frame. A bad or missing store id on join/leave is
    /// distinct from a malformed sync payload.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        match envelope.kind.as_str() {
            "join-store" => StoreId::from_value(&envelope.payload).map(ClientMessage::JoinStore),
            "leave-store" => StoreId::from_value(&envelope.payload).map(ClientMessage::LeaveStore),
            "sync-transaction" => {
                sync_payload(envelope.payload).map(ClientMessage::SyncTransaction)
            }
            "sync-item" => sync_payload(envelope.payload).map(ClientMessage::SyncItem),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    /// Wire name of the event
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientMessage::JoinStore(_) => "join-store",
            ClientMessage::LeaveStore(_) => "leave-store",
            ClientMessage::SyncTransaction(_) => "sync-transaction",
            ClientMessage::SyncItem(_) => "sync-item",
        }
    }
}

fn sync_payload(value: Value) -> Result<SyncPayload, ProtocolError> {
    serde_json::from_value(value).map_err(|_| ProtocolError::InvalidPayload)
}

/// Events sent to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "sync-transaction")]
    SyncTransaction(SyncPayload),
    #[serde(rename = "sync-item")]
    SyncItem(SyncPayload),
}

/// Frame queued on a connection's outbound channel. Fan-outs to larger
/// member sets serialize once and share the bytes.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Raw(ServerMessage),
    Shared(Arc<str>),
}

impl OutboundFrame {
    pub fn preserialized(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        Ok(OutboundFrame::Shared(serde_json::to_string(message)?.into()))
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        match self {
            OutboundFrame::Raw(message) => serde_json::to_string(message),
            OutboundFrame::Shared(text) => Ok(text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join_store_number_and_string() {
        let msg = ClientMessage::parse(r#"{"type":"join-store","payload":7}"#).unwrap();
        let ClientMessage::JoinStore(id) = msg else {
            panic!("expected join-store");
        };
        assert_eq!(id, StoreId::Number(7));

        let msg = ClientMessage::parse(r#"{"type":"join-store","payload":"7"}"#).unwrap();
        let ClientMessage::JoinStore(id) = msg else {
            panic!("expected join-store");
        };
        assert_eq!(id, StoreId::Text("7".to_string()));
    }

    #[test]
    fn test_numeric_and_string_ids_share_a_room() {
        assert_eq!(StoreId::Number(7).room_key(), "store-7");
        assert_eq!(StoreId::Text("7".to_string()).room_key(), "store-7");
    }

    #[test]
    fn test_join_store_rejects_non_primitive_ids() {
        let result = ClientMessage::parse(r#"{"type":"join-store","payload":{"id":7}}"#);
        assert!(matches!(result, Err(ProtocolError::InvalidStoreId)));

        let result = ClientMessage::parse(r#"{"type":"leave-store"}"#);
        assert!(matches!(result, Err(ProtocolError::InvalidStoreId)));

        let result = ClientMessage::parse(r#"{"type":"join-store","payload":[7]}"#);
        assert!(matches!(result, Err(ProtocolError::InvalidStoreId)));
    }

    #[test]
    fn test_parse_sync_transaction_keeps_extra_fields() {
        let msg = ClientMessage::parse(
            r#"{"type":"sync-transaction","payload":{"storeId":7,"userId":"u1"}}"#,
        )
        .unwrap();
        let ClientMessage::SyncTransaction(payload) = msg else {
            panic!("expected sync-transaction");
        };
        assert_eq!(payload.store_id, Some(StoreId::Number(7)));
        assert_eq!(payload.rest.get("userId"), Some(&json!("u1")));
    }

    #[test]
    fn test_sync_payload_without_store_id_parses() {
        // Missing storeId is a relay-level validation failure, not a parse
        // failure
        let msg = ClientMessage::parse(r#"{"type":"sync-item","payload":{"userId":"u1"}}"#)
            .unwrap();
        let ClientMessage::SyncItem(payload) = msg else {
            panic!("expected sync-item");
        };
        assert!(payload.store_id.is_none());
    }

    #[test]
    fn test_non_object_sync_payload_rejected() {
        let result = ClientMessage::parse(r#"{"type":"sync-item","payload":"seven"}"#);
        assert!(matches!(result, Err(ProtocolError::InvalidPayload)));
    }

    #[test]
    fn test_unknown_event_rejected() {
        let result = ClientMessage::parse(r#"{"type":"drop-tables","payload":{}}"#);
        assert!(matches!(result, Err(ProtocolError::UnknownEvent(_))));
    }

    #[test]
    fn test_malformed_frame_rejected() {
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_server_message_wire_shape() {
        let payload: SyncPayload =
            serde_json::from_value(json!({"storeId": 7, "userId": "u1"})).unwrap();
        let text = serde_json::to_value(ServerMessage::SyncTransaction(payload)).unwrap();
        assert_eq!(
            text,
            json!({"type": "sync-transaction", "payload": {"storeId": 7, "userId": "u1"}})
        );
    }

    #[test]
    fn test_preserialized_frame_matches_raw() {
        let payload: SyncPayload = serde_json::from_value(json!({"storeId": "7"})).unwrap();
        let message = ServerMessage::SyncItem(payload);
        let shared = OutboundFrame::preserialized(&message).unwrap();
        let raw = OutboundFrame::Raw(message);
        assert_eq!(shared.to_text().unwrap(), raw.to_text().unwrap());
    }
}
