mod settings;

pub use settings::{
    AdmissionConfig, AuthConfig, RoomConfig, ServerConfig, Settings, ThrottleConfig,
};
