//! Connection sessions
//!
//! A session is one accepted WebSocket connection: its handle (outbound
//! queue, close/terminate signals), its role binding and its liveness state.

pub mod handle;
pub mod state;

pub use handle::{ConnectionHandle, ConnectionId, Outbound, SendStatus};
pub use state::{Binding, Liveness, ProbeDecision, Role};
