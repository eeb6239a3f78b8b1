//! Frame routing within a room
//!
//! Fan-out is strictly 1:1: a frame from the room's publisher goes to the
//! room's single viewer, never anywhere else. INIT and META frames also
//! replace the room's resync cache; MEDIA frames are never cached.

use crate::protocol::{FrameKind, MediaFrame};
use crate::session::SendStatus;

use super::room::Room;

/// What happened to a routed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued to the viewer
    Forwarded,
    /// Viewer's queue was over the high-water mark
    Dropped,
    /// No viewer bound (frame may still have been cached)
    NoViewer,
    /// Unknown frame kind, routed nowhere
    Ignored,
}

/// Route one publisher frame through its room
pub fn route(room: &mut Room, frame: &MediaFrame) -> Delivery {
    room.touch();

    match frame.kind() {
        FrameKind::Init => {
            room.last_init = Some(frame.bytes().clone());
        }
        FrameKind::Meta => {
            room.last_meta = Some(frame.bytes().clone());
        }
        FrameKind::Media => {}
        FrameKind::Unknown(tag) => {
            tracing::trace!(device_id = %room.device_id, tag, "Ignoring unknown frame kind");
            return Delivery::Ignored;
        }
    }

    let Some(viewer) = room.viewer.as_ref() else {
        return Delivery::NoViewer;
    };

    match viewer.send_binary(frame.bytes().clone()) {
        SendStatus::Queued => Delivery::Forwarded,
        SendStatus::Backpressured => Delivery::Dropped,
        SendStatus::Closed => Delivery::NoViewer,
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::session::{ConnectionHandle, Outbound};

    fn viewer(hwm: usize) -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        ConnectionHandle::new(7, "127.0.0.1:9000".parse().unwrap(), hwm)
    }

    fn frame(bytes: &'static [u8]) -> MediaFrame {
        MediaFrame::parse(Bytes::from_static(bytes)).unwrap()
    }

    #[test]
    fn test_init_cached_without_viewer() {
        let mut room = Room::new("dev1");
        assert_eq!(route(&mut room, &frame(&[1, 0xAA, 0xBB])), Delivery::NoViewer);
        assert_eq!(room.last_init.as_deref(), Some(&[1u8, 0xAA, 0xBB][..]));
    }

    #[test]
    fn test_init_replaces_previous() {
        let mut room = Room::new("dev1");
        route(&mut room, &frame(&[1, 1]));
        route(&mut room, &frame(&[1, 2]));
        assert_eq!(room.last_init.as_deref(), Some(&[1u8, 2][..]));
    }

    #[test]
    fn test_media_forwarded_not_cached() {
        let mut room = Room::new("dev1");
        let (conn, mut rx) = viewer(1024);
        room.viewer = Some(conn);

        assert_eq!(route(&mut room, &frame(&[2, 0x01])), Delivery::Forwarded);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Binary(Bytes::from_static(&[2, 0x01])));
        assert!(room.last_init.is_none());
        assert!(room.last_meta.is_none());
    }

    #[test]
    fn test_meta_cached_and_forwarded() {
        let mut room = Room::new("dev1");
        let (conn, mut rx) = viewer(1024);
        room.viewer = Some(conn);

        assert_eq!(route(&mut room, &frame(&[3, b'{', b'}'])), Delivery::Forwarded);
        assert_eq!(room.last_meta.as_deref(), Some(&[3u8, b'{', b'}'][..]));
        assert!(matches!(rx.try_recv().unwrap(), Outbound::Binary(_)));
    }

    #[test]
    fn test_unknown_kind_ignored() {
        let mut room = Room::new("dev1");
        let (conn, mut rx) = viewer(1024);
        room.viewer = Some(conn);

        assert_eq!(route(&mut room, &frame(&[42, 1, 2])), Delivery::Ignored);
        assert!(rx.try_recv().is_err());
        assert!(room.last_init.is_none());
    }

    #[test]
    fn test_slow_viewer_drops_frame() {
        let mut room = Room::new("dev1");
        let (conn, _rx) = viewer(2);
        room.viewer = Some(conn.clone());

        assert_eq!(route(&mut room, &frame(&[2, 1, 2, 3])), Delivery::Forwarded);
        assert_eq!(route(&mut room, &frame(&[2, 4])), Delivery::Dropped);
        // INIT is still cached for the next resync even when dropped
        assert_eq!(route(&mut room, &frame(&[1, 5])), Delivery::Dropped);
        assert_eq!(room.last_init.as_deref(), Some(&[1u8, 5][..]));
        assert_eq!(conn.queued_bytes(), 4);
    }
}
