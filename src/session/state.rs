//! Per-connection state
//!
//! Tracks what a connection has registered as, and whether it has answered
//! the last liveness probe.

use std::time::{Duration, Instant};

/// Role a connection has registered as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Connected, no registration yet (or only a directory `hello`)
    #[default]
    Unset,
    /// Supplies the binary stream for a device
    Publisher,
    /// Consumes the stream of a device
    Viewer,
}

/// Role plus the device the connection is bound to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Binding {
    pub role: Role,
    pub device_id: Option<String>,
}

impl Binding {
    pub fn new(role: Role, device_id: impl Into<String>) -> Self {
        Self {
            role,
            device_id: Some(device_id.into()),
        }
    }

    /// Device id if the connection is bound as a publisher
    pub fn publisher_device(&self) -> Option<&str> {
        match self.role {
            Role::Publisher => self.device_id.as_deref(),
            _ => None,
        }
    }
}

/// Liveness state machine
///
/// ```text
///            sweep (probe sent)
///   Alive ───────────────────────► AwaitingAck { deadline }
///     ▲                                  │
///     └──────────── pong ────────────────┤
///                                        │ sweep after deadline
///                                        ▼
///                                    terminated
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Liveness {
    /// Last probe answered (or none sent yet)
    #[default]
    Alive,
    /// Probe sent, waiting for the acknowledgment
    AwaitingAck { deadline: Instant },
}

/// What a liveness sweep should do with a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeDecision {
    /// Send a new probe
    Probe,
    /// A probe is outstanding and its deadline has not passed yet
    Wait,
    /// The outstanding probe went unanswered; reclaim the connection
    Terminate,
}

impl Liveness {
    /// Advance the state machine for a sweep at `now`
    pub fn on_sweep(&mut self, now: Instant, interval: Duration) -> ProbeDecision {
        match *self {
            Liveness::Alive => {
                *self = Liveness::AwaitingAck {
                    deadline: now + interval,
                };
                ProbeDecision::Probe
            }
            Liveness::AwaitingAck { deadline } if now >= deadline => ProbeDecision::Terminate,
            Liveness::AwaitingAck { .. } => ProbeDecision::Wait,
        }
    }

    /// Probe acknowledged
    pub fn on_ack(&mut self) {
        *self = Liveness::Alive;
    }

    pub fn is_alive(&self) -> bool {
        matches!(self, Liveness::Alive)
    }
}
