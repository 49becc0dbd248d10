// Shared infrastructure
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;

// Core pipeline (admission -> membership -> throttle -> relay)
pub mod connections;
pub mod gateway;
pub mod relay;
pub mod throttle;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;
