//! Live screen-stream relay
//!
//! Relays a live screen-capture stream from one mobile publisher to one
//! viewer per device over WebSocket. Binary messages carry media frames,
//! text messages carry JSON control envelopes.
//!
//! # Example
//!
//! ```no_run
//! use screen_relay::{RelayConfig, RelayServer};
//!
//! # async fn example() -> screen_relay::error::Result<()> {
//! let config = RelayConfig::default().port(8080);
//! let server = RelayServer::new(config);
//! server.run().await
//! # }
//! ```
//!
//! # Protocol
//!
//! A connection starts anonymous and registers with one of:
//! - `{"type":"pub.register","deviceId":..,"codec":"avc","width":..,"height":..,"fps":..}`
//! - `{"type":"viewer.register","deviceId":..}`
//! - `{"type":"hello","role":"viewer"}` for device-list pushes
//!
//! The publisher then sends binary frames `[kind][payload]` with kinds
//! `1 = INIT`, `2 = MEDIA`, `3 = META`. A viewer joining mid-stream gets the
//! cached INIT and META replayed before live frames.

pub mod error;
pub mod liveness;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use liveness::LivenessMonitor;
pub use registry::{ConnectionRegistry, RegistryConfig};
pub use server::{RelayConfig, RelayServer};
