//! Device directory
//!
//! The directory is a projection of the rooms: every device whose publisher
//! slot holds an open connection. It is pushed as a `device-list` envelope to
//! directory subscribers whenever the set of online publishers changes.

use std::collections::HashMap;

use crate::protocol::{DeviceEntry, ServerMessage};
use crate::session::{ConnectionHandle, ConnectionId, SendStatus};

use super::room::Room;

/// Current online devices, in no particular order
pub fn snapshot<'a>(rooms: impl IntoIterator<Item = &'a Room>) -> Vec<DeviceEntry> {
    rooms.into_iter().filter_map(Room::directory_entry).collect()
}

/// Send one snapshot to a single connection
pub fn send_snapshot<'a>(
    conn: &ConnectionHandle,
    rooms: impl IntoIterator<Item = &'a Room>,
) -> SendStatus {
    conn.send_control(&ServerMessage::DeviceList {
        items: snapshot(rooms),
    })
}

/// Recompute the snapshot and push it to every subscriber
///
/// Returns the number of subscribers the push was queued for.
pub fn broadcast<'a>(
    subscribers: &HashMap<ConnectionId, ConnectionHandle>,
    rooms: impl IntoIterator<Item = &'a Room>,
) -> usize {
    if subscribers.is_empty() {
        return 0;
    }

    let msg = ServerMessage::DeviceList {
        items: snapshot(rooms),
    };
    let text = match msg.encode() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode device list");
            return 0;
        }
    };

    let delivered = subscribers
        .values()
        .filter(|conn| conn.send_text(text.clone()) == SendStatus::Queued)
        .count();

    tracing::debug!(
        subscribers = subscribers.len(),
        delivered = delivered,
        "Device list pushed"
    );
    delivered
}
