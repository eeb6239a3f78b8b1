//! Connection handle
//!
//! The socket itself is owned by the connection task. Everything else (the
//! registry, rooms, the liveness monitor) holds a cloned [`ConnectionHandle`]
//! and talks to the socket through its outbound queue.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use super::state::{Binding, Liveness, ProbeDecision};
use crate::protocol::ServerMessage;

/// Unique connection identifier, allocated by the server
pub type ConnectionId = u64;

/// A message waiting to be written to the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Media frame
    Binary(Bytes),
    /// Control envelope
    Text(String),
    /// Liveness probe
    Ping,
    /// Graceful close; the connection task exits after writing it
    Close,
}

impl Outbound {
    /// Bytes this message contributes to the queue depth
    pub fn queued_len(&self) -> usize {
        match self {
            Outbound::Binary(data) => data.len(),
            Outbound::Text(text) => text.len(),
            Outbound::Ping | Outbound::Close => 0,
        }
    }
}

/// Result of offering a message to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Queued for writing
    Queued,
    /// Dropped because the queue is above the high-water mark
    Backpressured,
    /// Connection is closed or closing
    Closed,
}

struct Shared {
    id: ConnectionId,
    peer_addr: SocketAddr,
    tx: mpsc::UnboundedSender<Outbound>,
    queued_bytes: AtomicUsize,
    high_water_mark: usize,
    open: AtomicBool,
    terminate: Notify,
    binding: Mutex<Binding>,
    liveness: Mutex<Liveness>,
    connected_at: Instant,
}

/// Cheap, cloneable reference to a live connection
///
/// Two handles are equal when they refer to the same connection id.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Shared>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end of its outbound queue
    pub fn new(
        id: ConnectionId,
        peer_addr: SocketAddr,
        high_water_mark: usize,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            inner: Arc::new(Shared {
                id,
                peer_addr,
                tx,
                queued_bytes: AtomicUsize::new(0),
                high_water_mark,
                open: AtomicBool::new(true),
                terminate: Notify::new(),
                binding: Mutex::new(Binding::default()),
                liveness: Mutex::new(Liveness::default()),
                connected_at: Instant::now(),
            }),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// How long the connection has been up
    pub fn uptime(&self) -> Duration {
        self.inner.connected_at.elapsed()
    }

    /// Bytes queued and not yet written to the socket
    pub fn queued_bytes(&self) -> usize {
        self.inner.queued_bytes.load(Ordering::Acquire)
    }

    /// Current role and device binding
    pub fn binding(&self) -> Binding {
        self.inner.binding.lock().clone()
    }

    /// Replace the binding, returning the previous one
    pub fn rebind(&self, binding: Binding) -> Binding {
        std::mem::replace(&mut *self.inner.binding.lock(), binding)
    }

    /// Queue a binary frame, subject to backpressure
    pub fn send_binary(&self, data: Bytes) -> SendStatus {
        self.enqueue(Outbound::Binary(data))
    }

    /// Queue a control envelope, subject to backpressure
    pub fn send_control(&self, msg: &ServerMessage) -> SendStatus {
        match msg.encode() {
            Ok(text) => self.enqueue(Outbound::Text(text)),
            Err(e) => {
                tracing::error!(conn = self.id(), error = %e, "Failed to encode control message");
                SendStatus::Closed
            }
        }
    }

    /// Queue a pre-encoded control envelope, subject to backpressure
    pub fn send_text(&self, text: String) -> SendStatus {
        self.enqueue(Outbound::Text(text))
    }

    fn enqueue(&self, msg: Outbound) -> SendStatus {
        if !self.is_open() {
            return SendStatus::Closed;
        }

        let depth = self.queued_bytes();
        if depth > self.inner.high_water_mark {
            tracing::debug!(
                conn = self.id(),
                queued_bytes = depth,
                "Outbound queue over high-water mark, dropping message"
            );
            return SendStatus::Backpressured;
        }

        let len = msg.queued_len();
        self.inner.queued_bytes.fetch_add(len, Ordering::AcqRel);
        if self.inner.tx.send(msg).is_err() {
            self.inner.queued_bytes.fetch_sub(len, Ordering::AcqRel);
            return SendStatus::Closed;
        }
        SendStatus::Queued
    }

    /// Called by the connection task after a queued message hit the socket
    pub fn mark_flushed(&self, len: usize) {
        self.inner.queued_bytes.fetch_sub(len, Ordering::AcqRel);
    }

    /// Advance the liveness state machine and send a probe when due
    pub fn probe(&self, now: Instant, interval: Duration) -> ProbeDecision {
        let decision = self.inner.liveness.lock().on_sweep(now, interval);
        if decision == ProbeDecision::Probe && self.is_open() {
            // Probes are not subject to backpressure
            let _ = self.inner.tx.send(Outbound::Ping);
        }
        decision
    }

    /// A probe acknowledgment (pong) arrived
    pub fn acknowledge_probe(&self) {
        self.inner.liveness.lock().on_ack();
    }

    pub fn liveness(&self) -> Liveness {
        *self.inner.liveness.lock()
    }

    /// Close gracefully: stop accepting messages and ask the task to send a
    /// close frame
    pub fn close(&self) {
        if self.inner.open.swap(false, Ordering::AcqRel) {
            let _ = self.inner.tx.send(Outbound::Close);
        }
    }

    /// Close immediately without a close handshake
    pub fn terminate(&self) {
        self.inner.open.store(false, Ordering::Release);
        self.inner.terminate.notify_one();
    }

    /// Resolves once [`terminate`](Self::terminate) has been called
    pub async fn terminated(&self) {
        self.inner.terminate.notified().await
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id())
            .field("peer_addr", &self.peer_addr())
            .field("open", &self.is_open())
            .field("queued_bytes", &self.queued_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    fn handle(hwm: usize) -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        ConnectionHandle::new(1, "127.0.0.1:9000".parse().unwrap(), hwm)
    }

    #[test]
    fn test_send_tracks_queue_depth() {
        let (conn, mut rx) = handle(1024);

        assert_eq!(
            conn.send_binary(Bytes::from_static(&[2, 1, 2, 3])),
            SendStatus::Queued
        );
        assert_eq!(conn.queued_bytes(), 4);

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg, Outbound::Binary(Bytes::from_static(&[2, 1, 2, 3])));
        conn.mark_flushed(msg.queued_len());
        assert_eq!(conn.queued_bytes(), 0);
    }

    #[test]
    fn test_backpressure_drops_over_high_water() {
        let (conn, mut rx) = handle(8);

        // Depth is checked before queueing, so one message may overshoot
        assert_eq!(conn.send_binary(Bytes::from(vec![2; 16])), SendStatus::Queued);
        assert_eq!(conn.send_binary(Bytes::from(vec![2; 4])), SendStatus::Backpressured);
        assert_eq!(conn.send_text("{}".into()), SendStatus::Backpressured);
        assert_eq!(conn.queued_bytes(), 16);

        // Draining reopens the queue
        let msg = rx.try_recv().unwrap();
        conn.mark_flushed(msg.queued_len());
        assert_eq!(conn.send_binary(Bytes::from(vec![2; 4])), SendStatus::Queued);
    }

    #[test]
    fn test_probe_bypasses_backpressure() {
        let (conn, mut rx) = handle(0);
        conn.send_binary(Bytes::from_static(&[2, 9]));

        let now = Instant::now();
        assert_eq!(conn.probe(now, Duration::from_secs(15)), ProbeDecision::Probe);
        assert!(!conn.liveness().is_alive());

        assert!(matches!(rx.try_recv().unwrap(), Outbound::Binary(_)));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Ping);

        conn.acknowledge_probe();
        assert!(conn.liveness().is_alive());
    }

    #[test]
    fn test_close_queues_close_frame_once() {
        let (conn, mut rx) = handle(1024);
        conn.close();
        conn.close();

        assert!(!conn.is_open());
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
        assert!(rx.try_recv().is_err());
        assert_eq!(conn.send_binary(Bytes::from_static(&[1])), SendStatus::Closed);
    }

    #[test]
    fn test_terminate_wakes_task() {
        let (conn, _rx) = handle(1024);
        let waiter = conn.clone();
        let mut terminated = tokio_test::task::spawn(waiter.terminated());

        tokio_test::assert_pending!(terminated.poll());
        conn.terminate();

        assert!(terminated.is_woken());
        tokio_test::assert_ready!(terminated.poll());
        assert!(!conn.is_open());
    }

    #[test]
    fn test_rebind_returns_previous() {
        let (conn, _rx) = handle(1024);
        let previous = conn.rebind(Binding::new(Role::Publisher, "dev1"));
        assert_eq!(previous, Binding::default());
        assert_eq!(conn.binding().publisher_device(), Some("dev1"));
    }
}
