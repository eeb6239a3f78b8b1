//! WebSocket relay server
//!
//! Accepts TCP connections, upgrades them on the configured path and runs
//! one task per connection. The liveness sweep and the idle-room reaper run
//! alongside the accept loop for as long as the server is serving.

pub mod config;
pub mod connection;
pub mod listener;

pub use config::RelayConfig;
pub use listener::RelayServer;
