//! Relay error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the relay server and connection tasks.
///
/// Protocol-level problems (bad envelopes, unknown frames) never reach this
/// type; they are dropped where they are decoded.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("websocket handshake timed out")]
    HandshakeTimeout,
}
