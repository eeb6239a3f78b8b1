//! Room state
//!
//! A room holds the relay state of one device: who publishes, who watches,
//! and the cached frames a late-joining viewer needs to start decoding.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::Serialize;

use crate::protocol::DeviceEntry;
use crate::session::ConnectionHandle;

/// Device name used until a publisher supplies one
pub const UNKNOWN_DEVICE_NAME: &str = "unknown";

/// Per-device relay state
#[derive(Debug)]
pub struct Room {
    /// Device identifier (registry key)
    pub device_id: String,

    /// Name from the most recent publisher registration
    pub device_name: String,

    /// Current publisher, if any
    pub publisher: Option<ConnectionHandle>,

    /// Current viewer, if any
    pub viewer: Option<ConnectionHandle>,

    /// Most recent INIT frame, tag byte included
    pub last_init: Option<Bytes>,

    /// Most recent META frame, tag byte included
    pub last_meta: Option<Bytes>,

    /// When the room was created
    pub created_at: Instant,

    /// Last publisher activity (registration or frame)
    pub last_seen_at: Instant,
}

impl Room {
    pub fn new(device_id: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            device_id: device_id.into(),
            device_name: UNKNOWN_DEVICE_NAME.to_string(),
            publisher: None,
            viewer: None,
            last_init: None,
            last_meta: None,
            created_at: now,
            last_seen_at: now,
        }
    }

    /// Record publisher activity
    pub fn touch(&mut self) {
        self.last_seen_at = Instant::now();
    }

    /// Publisher slot is held by an open connection
    pub fn has_publisher(&self) -> bool {
        self.publisher.as_ref().is_some_and(|p| p.is_open())
    }

    /// Viewer slot is held by an open connection
    pub fn has_viewer(&self) -> bool {
        self.viewer.as_ref().is_some_and(|v| v.is_open())
    }

    pub fn is_publisher(&self, conn: &ConnectionHandle) -> bool {
        self.publisher.as_ref() == Some(conn)
    }

    pub fn is_viewer(&self, conn: &ConnectionHandle) -> bool {
        self.viewer.as_ref() == Some(conn)
    }

    /// Frames replayed to a newly bound viewer: INIT first, then META
    pub fn resync_frames(&self) -> impl Iterator<Item = &Bytes> {
        self.last_init.iter().chain(self.last_meta.iter())
    }

    /// Directory entry, if the device is currently online
    pub fn directory_entry(&self) -> Option<DeviceEntry> {
        self.has_publisher().then(|| DeviceEntry {
            id: self.device_id.clone(),
            device_name: self.device_name.clone(),
        })
    }

    /// No slot bound and no publisher activity for longer than `timeout`
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        self.publisher.is_none()
            && self.viewer.is_none()
            && now.saturating_duration_since(self.last_seen_at) > timeout
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            device_id: self.device_id.clone(),
            has_publisher: self.has_publisher(),
            has_viewer: self.has_viewer(),
            last_init: self.last_init.is_some(),
            last_seen_at: unix_millis(self.last_seen_at),
        }
    }
}

/// Read-only projection of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub device_id: String,
    pub has_publisher: bool,
    pub has_viewer: bool,
    /// Whether an INIT frame is cached
    pub last_init: bool,
    /// Last publisher activity, unix milliseconds
    pub last_seen_at: u64,
}

/// Convert a monotonic instant to wall-clock unix milliseconds
pub(crate) fn unix_millis(at: Instant) -> u64 {
    let wall = SystemTime::now()
        .checked_sub(at.elapsed())
        .unwrap_or(UNIX_EPOCH);
    wall.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
