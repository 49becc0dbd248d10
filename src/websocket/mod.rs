pub mod handler;
pub mod message;

pub use handler::ws_handler;
pub use message::{ClientMessage, OutboundFrame, ServerMessage, StoreId, SyncPayload};
