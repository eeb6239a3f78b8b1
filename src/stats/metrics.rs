//! Relay-wide counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::registry::Delivery;

/// Counters updated from the routing path
#[derive(Debug, Default)]
pub struct RelayStats {
    frames_received: AtomicU64,
    frames_forwarded: AtomicU64,
    frames_dropped: AtomicU64,
    bytes_received: AtomicU64,
    frames_rejected: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a routed publisher frame
    pub fn record(&self, len: usize, delivery: Delivery) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
        match delivery {
            Delivery::Forwarded => {
                self.frames_forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::Dropped => {
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::NoViewer | Delivery::Ignored => {}
        }
    }

    /// A binary frame from a connection that is not the room's publisher
    pub fn record_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn frames_forwarded(&self) -> u64 {
        self.frames_forwarded.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}

/// Read-only status projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub ok: bool,
    pub rooms: usize,
    pub connections: usize,
    pub subscribers: usize,
    pub frames_received: u64,
    pub frames_forwarded: u64,
    pub frames_dropped: u64,
    pub frames_rejected: u64,
    pub bytes_received: u64,
    /// Current time, unix milliseconds
    pub now: u64,
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_stats_new() {
        let stats = RelayStats::new();
        assert_eq!(stats.frames_received(), 0);
        assert_eq!(stats.frames_forwarded(), 0);
        assert_eq!(stats.frames_dropped(), 0);
        assert_eq!(stats.bytes_received(), 0);
    }

    #[test]
    fn test_record_deliveries() {
        let stats = RelayStats::new();
        stats.record(10, Delivery::Forwarded);
        stats.record(20, Delivery::Dropped);
        stats.record(5, Delivery::NoViewer);
        stats.record(1, Delivery::Ignored);
        stats.record_rejected();

        assert_eq!(stats.frames_received(), 4);
        assert_eq!(stats.frames_forwarded(), 1);
        assert_eq!(stats.frames_dropped(), 1);
        assert_eq!(stats.frames_rejected(), 1);
        assert_eq!(stats.bytes_received(), 36);
    }

    #[test]
    fn test_now_millis() {
        assert!(now_millis() > 1_600_000_000_000);
    }
}
