// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod storage;
pub mod telemetry;

// Domain
pub mod directory;
pub mod dispatch;
pub mod template;
pub mod transport;

// Application layer
pub mod api;
pub mod auth;
pub mod server;
