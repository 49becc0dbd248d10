use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub rooms: RoomConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared secret every terminal presents in the `token` handshake
    /// parameter. Required; there is no default.
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum concurrent connections admitted per source address
    #[serde(default = "default_max_connections_per_address")]
    pub max_connections_per_address: usize,
    /// Header carrying the client address when deployed behind a proxy;
    /// the raw peer address is used when the header is absent
    #[serde(default = "default_forwarded_ip_header")]
    pub forwarded_ip_header: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    /// Minimum milliseconds between accepted relay events per connection
    #[serde(default = "default_throttle_window_ms")]
    pub window_ms: u64,
}

impl ThrottleConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    /// Optional cap on rooms a single connection may join
    #[serde(default)]
    pub max_per_connection: Option<usize>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1991
}

fn default_max_connections_per_address() -> usize {
    10
}

fn default_forwarded_ip_header() -> String {
    "cf-connecting-ip".to_string()
}

fn default_throttle_window_ms() -> u64 {
    200
}

impl Settings {
    /// Layered load: built-in defaults, then `config/{default,RUN_MODE}`
    /// files, then environment variables (`SERVER__PORT`, `AUTH__TOKEN`,
    /// `ADMISSION__MAX_CONNECTIONS_PER_ADDRESS`, ...).
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 1991)?
            .set_default("admission.max_connections_per_address", 10)?
            .set_default("admission.forwarded_ip_header", "cf-connecting-ip")?
            .set_default("throttle.window_ms", 200)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_connections_per_address: default_max_connections_per_address(),
            forwarded_ip_header: default_forwarded_ip_header(),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window_ms: default_throttle_window_ms(),
        }
    }
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_per_connection: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 1991);

        let admission = AdmissionConfig::default();
        assert_eq!(admission.max_connections_per_address, 10);
        assert_eq!(admission.forwarded_ip_header, "cf-connecting-ip");

        let throttle = ThrottleConfig::default();
        assert_eq!(throttle.window(), Duration::from_millis(200));

        assert!(RoomConfig::default().max_per_connection.is_none());
    }
}
