use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::connections::{ConnectionHandle, ConnectionRegistry};
use crate::gateway::{self, AdmissionTicket};
use crate::metrics::{GatewayMetrics, WsMetrics, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED};
use crate::server::AppState;
use crate::throttle::EventThrottle;

use super::message::{ClientMessage, OutboundFrame};

const CHANNEL_BUFFER_SIZE: usize = 32;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// The whole admission pipeline runs before the upgrade completes:
/// authentication first, then the per-address cap, so a rejected attempt
/// fails the handshake and never reaches room or event logic.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers, peer),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let token = extract_token(&query, &headers);
    let source = gateway::resolve_source_addr(
        &headers,
        &state.settings.admission.forwarded_ip_header,
        peer.ip(),
    );

    let ticket = match gateway::authorize(&state.secret, &state.admission, token.as_deref(), source)
    {
        Ok(ticket) => ticket,
        Err(e) => {
            GatewayMetrics::record_rejected(e.reason());
            return e.into_response();
        }
    };

    GatewayMetrics::record_admitted();
    tracing::info!(addr = %source, "WebSocket upgrade authorized");

    ws.on_upgrade(move |socket| handle_socket(socket, state, ticket))
}

/// Extract token from query parameter or Authorization header
fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(ref token) = query.token {
        return Some(token.clone());
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Releases everything a connection holds in shared state, exactly once,
/// whichever exit path ends the connection task: room membership and
/// throttle state here, the admission slot when the ticket field drops.
struct ConnectionScope {
    registry: Arc<ConnectionRegistry>,
    throttle: Arc<EventThrottle>,
    connection_id: Uuid,
    _ticket: AdmissionTicket,
}

impl Drop for ConnectionScope {
    fn drop(&mut self) {
        self.registry.unregister(self.connection_id);
        self.throttle.forget(self.connection_id);
    }
}

/// Drive an admitted connection until it closes
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, ticket),
    fields(addr = %ticket.addr())
)]
async fn handle_socket(socket: WebSocket, state: AppState, ticket: AdmissionTicket) {
    let connection_start = std::time::Instant::now();

    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(CHANNEL_BUFFER_SIZE);
    let handle = state.registry.register(ticket.addr(), tx);
    let connection_id = handle.id;

    let _scope = ConnectionScope {
        registry: state.registry.clone(),
        throttle: state.throttle.clone(),
        connection_id,
        _ticket: ticket,
    };

    WS_CONNECTIONS_OPENED.inc();
    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    // Split socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for draining the outbound queue onto the socket; a slow socket
    // only ever backs up this connection's own queue
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match frame.to_text() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize frame");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Task for processing inbound events, one at a time in arrival order
    let state_clone = state.clone();
    let handle_clone = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &state_clone, &handle_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
    }

    // Stop the surviving task so no event processing outlives the teardown
    send_task.abort();
    recv_task.abort();

    WS_CONNECTIONS_CLOSED.inc();
    tracing::info!(
        connection_id = %connection_id,
        duration_secs = connection_start.elapsed().as_secs_f64(),
        "WebSocket connection closed"
    );
    // _scope drops here and tears down admission, membership, and throttle
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            let event = match ClientMessage::parse(&text) {
                Ok(event) => event,
                Err(e) => {
                    // The offending event is dropped without feedback; the
                    // connection stays open
                    WsMetrics::record_dropped();
                    tracing::warn!(connection_id = %handle.id, error = %e, "Dropped client event");
                    return true;
                }
            };

            handle_client_message(event, state, handle).await;
            true
        }
        Message::Binary(_) => {
            WsMetrics::record_dropped();
            tracing::warn!(connection_id = %handle.id, "Dropped unsupported binary frame");
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

/// Handle a parsed client event
#[tracing::instrument(
    name = "ws.event",
    skip(msg, state, handle),
    fields(
        connection_id = %handle.id,
        event = %msg.event_type()
    )
)]
async fn handle_client_message(
    msg: ClientMessage,
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
) {
    match msg {
        ClientMessage::JoinStore(store_id) => {
            let room = store_id.room_key();
            if state.registry.join(handle.id, &room).await {
                WsMetrics::record_join();
                tracing::info!(connection_id = %handle.id, room = %room, "Joined store room");
            }
        }
        ClientMessage::LeaveStore(store_id) => {
            let room = store_id.room_key();
            state.registry.leave(handle.id, &room).await;
            WsMetrics::record_leave();
            tracing::info!(connection_id = %handle.id, room = %room, "Left store room");
        }
        ClientMessage::SyncTransaction(payload) => {
            state.relay.relay_transaction(handle.id, payload);
        }
        ClientMessage::SyncItem(payload) => {
            state.relay.relay_item_sync(handle.id, payload);
        }
    }
}
