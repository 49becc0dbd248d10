//! Validate, route, and fan out sync events.

mod dispatcher;

pub use dispatcher::{DeliveryMode, RelayOutcome, RelayStatsSnapshot, SyncRelay};
