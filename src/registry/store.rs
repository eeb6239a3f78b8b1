//! Connection registry implementation
//!
//! The registry owns every room, the directory-subscriber set and the set of
//! open connections. All of it sits behind one lock, so each registration,
//! eviction, routed frame and directory push is a single critical section.
//! No critical section waits on socket I/O: sends only enqueue onto the
//! destination's outbound queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::Mutex;

use super::config::RegistryConfig;
use super::directory;
use super::fanout::{self, Delivery};
use super::room::{Room, RoomSummary, UNKNOWN_DEVICE_NAME};
use crate::protocol::{
    ControlMessage, DeviceEntry, MediaFrame, PublisherRegistration, ServerMessage,
    ViewerRegistration,
};
use crate::session::{Binding, ConnectionHandle, ConnectionId, Role};
use crate::stats::metrics::now_millis;
use crate::stats::{RelayStats, RelayStatus};

#[derive(Default)]
struct RegistryState {
    /// Rooms by device id
    rooms: HashMap<String, Room>,

    /// Connections that sent a directory `hello`
    subscribers: HashMap<ConnectionId, ConnectionHandle>,

    /// Every open connection, for the liveness sweep
    connections: HashMap<ConnectionId, ConnectionHandle>,
}

impl RegistryState {
    fn get_or_create_room(&mut self, device_id: &str) -> &mut Room {
        self.rooms
            .entry(device_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(device_id = %device_id, "Room created");
                Room::new(device_id)
            })
    }

    fn broadcast_directory(&self) -> usize {
        directory::broadcast(&self.subscribers, self.rooms.values())
    }

    /// Release whatever slot `conn` holds under `binding`
    ///
    /// Only acts when `conn` is still the current holder, so stale bindings
    /// left behind by an eviction are harmless.
    fn release(&mut self, conn: &ConnectionHandle, binding: &Binding) {
        let Some(device_id) = binding.device_id.as_deref() else {
            return;
        };
        let Some(room) = self.rooms.get_mut(device_id) else {
            return;
        };

        match binding.role {
            Role::Publisher if room.is_publisher(conn) => {
                room.publisher = None;
                if let Some(viewer) = room.viewer.as_ref() {
                    viewer.send_control(&ServerMessage::StreamEnded {
                        device_id: device_id.to_string(),
                    });
                }
                tracing::info!(
                    device_id = %device_id,
                    conn = conn.id(),
                    has_viewer = room.viewer.is_some(),
                    "Publisher left, stream ended"
                );
                self.broadcast_directory();
            }
            Role::Viewer if room.is_viewer(conn) => {
                room.viewer = None;
                tracing::info!(device_id = %device_id, conn = conn.id(), "Viewer left");
            }
            _ => {}
        }
    }

    /// Bind `conn` to a new role, releasing any slot held under the old one
    fn rebind(&mut self, conn: &ConnectionHandle, binding: Binding) {
        let previous = conn.rebind(binding.clone());
        if previous != binding {
            self.release(conn, &previous);
        }
    }
}

/// Central registry for rooms and connections
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
    config: RegistryConfig,
    stats: RelayStats,
}

impl ConnectionRegistry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            config,
            stats: RelayStats::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Track a newly accepted connection
    pub async fn attach(&self, conn: &ConnectionHandle) {
        let mut state = self.state.lock().await;
        state.connections.insert(conn.id(), conn.clone());
    }

    /// Look up a room, creating it with empty caches if absent
    pub async fn get_or_create_room(&self, device_id: &str) -> RoomSummary {
        let mut state = self.state.lock().await;
        state.get_or_create_room(device_id).summary()
    }

    /// Bind `conn` as the publisher of a device
    ///
    /// The most recent registration wins: a different connection holding the
    /// slot is closed first.
    pub async fn register_publisher(&self, conn: &ConnectionHandle, reg: &PublisherRegistration) {
        let mut state = self.state.lock().await;
        state.rebind(conn, Binding::new(Role::Publisher, &reg.device_id));

        let room = state.get_or_create_room(&reg.device_id);
        if let Some(previous) = room.publisher.as_ref().filter(|p| *p != conn) {
            tracing::info!(
                device_id = %reg.device_id,
                previous = previous.id(),
                conn = conn.id(),
                "Evicting previous publisher"
            );
            previous.close();
        }

        room.publisher = Some(conn.clone());
        room.device_name = reg
            .device_name
            .clone()
            .unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string());
        room.touch();

        tracing::info!(
            device_id = %reg.device_id,
            device_name = %room.device_name,
            conn = conn.id(),
            width = reg.width,
            height = reg.height,
            fps = reg.fps,
            has_token = reg.token.is_some(),
            "Publisher registered"
        );

        state.broadcast_directory();
    }

    /// Bind `conn` as the single viewer of a device and resync it
    ///
    /// A different viewer holding the slot is closed. The cached INIT and
    /// then META frames are replayed so the viewer can start decoding without
    /// waiting for the next INIT.
    pub async fn register_viewer(&self, conn: &ConnectionHandle, reg: &ViewerRegistration) {
        let mut state = self.state.lock().await;
        state.rebind(conn, Binding::new(Role::Viewer, &reg.device_id));

        let room = state.get_or_create_room(&reg.device_id);
        if let Some(previous) = room.viewer.as_ref().filter(|v| *v != conn) {
            tracing::info!(
                device_id = %reg.device_id,
                previous = previous.id(),
                conn = conn.id(),
                "Evicting previous viewer"
            );
            previous.close();
        }
        room.viewer = Some(conn.clone());

        let mut replayed = 0;
        for frame in room.resync_frames() {
            conn.send_binary(frame.clone());
            replayed += 1;
        }

        tracing::info!(
            device_id = %reg.device_id,
            conn = conn.id(),
            replayed = replayed,
            has_token = reg.token.is_some(),
            "Viewer joined"
        );
    }

    /// Add `conn` to the directory-subscriber set and send it one snapshot
    pub async fn register_directory_subscriber(&self, conn: &ConnectionHandle) {
        let mut state = self.state.lock().await;
        state.subscribers.insert(conn.id(), conn.clone());
        directory::send_snapshot(conn, state.rooms.values());

        tracing::debug!(conn = conn.id(), "Directory subscriber added");
    }

    /// Release every reference to a closing connection
    ///
    /// Safe to call more than once; only the first call has an effect on
    /// room slots.
    pub async fn on_disconnect(&self, conn: &ConnectionHandle) {
        conn.terminate();

        let mut state = self.state.lock().await;
        state.subscribers.remove(&conn.id());
        if state.connections.remove(&conn.id()).is_some() {
            tracing::debug!(
                conn = conn.id(),
                peer = %conn.peer_addr(),
                uptime_secs = conn.uptime().as_secs(),
                "Connection released"
            );
        }

        let binding = conn.binding();
        state.release(conn, &binding);
    }

    /// Decode a text message and dispatch it
    ///
    /// Malformed or unrecognized envelopes are dropped without reply, as is
    /// anything from a connection that is already closing.
    pub async fn handle_control(&self, conn: &ConnectionHandle, text: &str) {
        if !conn.is_open() {
            tracing::debug!(conn = conn.id(), "Dropping control message from closing connection");
            return;
        }

        match ControlMessage::decode(text) {
            Ok(ControlMessage::Hello(_)) => self.register_directory_subscriber(conn).await,
            Ok(ControlMessage::RegisterPublisher(reg)) => self.register_publisher(conn, &reg).await,
            Ok(ControlMessage::RegisterViewer(reg)) => self.register_viewer(conn, &reg).await,
            Ok(ControlMessage::Unrecognized) => {
                tracing::debug!(conn = conn.id(), "Dropping unrecognized control message");
            }
            Err(e) => {
                tracing::debug!(conn = conn.id(), error = %e, "Dropping invalid control message");
            }
        }
    }

    /// Route a binary message from `conn`
    ///
    /// Only the current publisher of the bound room may send frames; anything
    /// else is dropped before the frame is even parsed. Returns `None` when
    /// the frame was rejected.
    pub async fn handle_binary(&self, conn: &ConnectionHandle, data: Bytes) -> Option<Delivery> {
        let binding = conn.binding();
        let Some(device_id) = binding.publisher_device() else {
            self.stats.record_rejected();
            tracing::trace!(conn = conn.id(), "Dropping binary frame from non-publisher");
            return None;
        };

        let frame = match MediaFrame::parse(data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(conn = conn.id(), error = %e, "Dropping malformed frame");
                return None;
            }
        };

        let mut state = self.state.lock().await;
        let room = match state.rooms.get_mut(device_id) {
            Some(room) if room.is_publisher(conn) => room,
            _ => {
                self.stats.record_rejected();
                tracing::debug!(
                    device_id = %device_id,
                    conn = conn.id(),
                    "Dropping frame from connection that no longer holds the publisher slot"
                );
                return None;
            }
        };

        let delivery = fanout::route(room, &frame);
        self.stats.record(frame.bytes().len(), delivery);
        if delivery == Delivery::Dropped {
            tracing::debug!(device_id = %device_id, kind = ?frame.kind(), "Viewer backpressured, frame dropped");
        }
        Some(delivery)
    }

    /// Snapshot of every open connection
    pub async fn connections(&self) -> Vec<ConnectionHandle> {
        self.state.lock().await.connections.values().cloned().collect()
    }

    /// Per-room inventory
    pub async fn rooms(&self) -> Vec<RoomSummary> {
        self.state
            .lock()
            .await
            .rooms
            .values()
            .map(Room::summary)
            .collect()
    }

    /// Inventory of a single room
    pub async fn room(&self, device_id: &str) -> Option<RoomSummary> {
        self.state.lock().await.rooms.get(device_id).map(Room::summary)
    }

    /// Current device directory snapshot
    pub async fn devices(&self) -> Vec<DeviceEntry> {
        directory::snapshot(self.state.lock().await.rooms.values())
    }

    pub async fn status(&self) -> RelayStatus {
        let state = self.state.lock().await;
        RelayStatus {
            ok: true,
            rooms: state.rooms.len(),
            connections: state.connections.len(),
            subscribers: state.subscribers.len(),
            frames_received: self.stats.frames_received(),
            frames_forwarded: self.stats.frames_forwarded(),
            frames_dropped: self.stats.frames_dropped(),
            frames_rejected: self.stats.frames_rejected(),
            bytes_received: self.stats.bytes_received(),
            now: now_millis(),
        }
    }

    /// Remove empty rooms idle longer than `idle_room_timeout`
    ///
    /// Returns the number of rooms removed.
    pub async fn cleanup(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let timeout = self.config.idle_room_timeout;

        let before = state.rooms.len();
        state.rooms.retain(|device_id, room| {
            let idle = room.is_idle(now, timeout);
            if idle {
                tracing::info!(device_id = %device_id, "Room removed by cleanup");
            }
            !idle
        });
        before - state.rooms.len()
    }

    /// Spawn background cleanup task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.cleanup().await;
            }
        })
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
