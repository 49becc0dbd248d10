use std::sync::Arc;
use std::time::Instant;

use crate::auth::SharedSecret;
use crate::config::Settings;
use crate::connections::ConnectionRegistry;
use crate::gateway::AddressAdmission;
use crate::relay::SyncRelay;
use crate::throttle::EventThrottle;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub secret: Arc<SharedSecret>,
    pub admission: Arc<AddressAdmission>,
    pub registry: Arc<ConnectionRegistry>,
    pub throttle: Arc<EventThrottle>,
    pub relay: Arc<SyncRelay>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let secret = Arc::new(SharedSecret::new(&settings.auth));
        let admission = Arc::new(AddressAdmission::new(
            settings.admission.max_connections_per_address,
        ));
        let registry = Arc::new(ConnectionRegistry::with_room_limit(
            settings.rooms.max_per_connection,
        ));
        let throttle = Arc::new(EventThrottle::new(settings.throttle.window()));
        let relay = Arc::new(SyncRelay::new(registry.clone(), throttle.clone()));

        Self {
            settings: Arc::new(settings),
            secret,
            admission,
            registry,
            throttle,
            relay,
            start_time: Instant::now(),
        }
    }
}
