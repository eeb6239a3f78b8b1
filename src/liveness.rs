//! Connection liveness monitor
//!
//! Every `interval` the monitor walks all open connections. A connection
//! that has not acknowledged the previous probe by its deadline is
//! terminated and released through [`ConnectionRegistry::on_disconnect`],
//! the same path as a clean close. Everyone else gets a fresh probe.
//!
//! A peer that vanished without closing (crash, dead network path) therefore
//! holds its room slot for at most two sweep periods.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;

use crate::registry::ConnectionRegistry;
use crate::session::ProbeDecision;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub waiting: usize,
    pub terminated: usize,
}

/// Periodic probe/terminate sweep over the registry's connections
pub struct LivenessMonitor {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
}

impl LivenessMonitor {
    pub fn new(registry: Arc<ConnectionRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Run one sweep as of `now`
    pub async fn sweep(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();

        for conn in self.registry.connections().await {
            match conn.probe(now, self.interval) {
                ProbeDecision::Probe => report.probed += 1,
                ProbeDecision::Wait => report.waiting += 1,
                ProbeDecision::Terminate => {
                    tracing::info!(
                        conn = conn.id(),
                        peer = %conn.peer_addr(),
                        "Liveness probe unanswered, terminating connection"
                    );
                    conn.terminate();
                    self.registry.on_disconnect(&conn).await;
                    report.terminated += 1;
                }
            }
        }

        if report.terminated > 0 {
            tracing::debug!(
                probed = report.probed,
                terminated = report.terminated,
                "Liveness sweep finished"
            );
        }
        report
    }

    /// Spawn the sweep loop; the first sweep runs one interval from now
    ///
    /// Missed ticks are delayed rather than replayed back to back, and each
    /// sweep is timed by the clock, so a stalled runtime never sweeps twice
    /// before peers had a chance to answer.
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut ticker = tokio::time::interval_at(start, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep(tokio::time::Instant::now().into_std()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::protocol::{PublisherRegistration, VideoCodec, ViewerRegistration};
    use crate::session::{ConnectionHandle, Outbound};

    const INTERVAL: Duration = Duration::from_secs(15);

    fn conn(id: u64) -> (ConnectionHandle, UnboundedReceiver<Outbound>) {
        ConnectionHandle::new(id, "127.0.0.1:9000".parse().unwrap(), 1024 * 1024)
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_sweep_probes_alive_connections() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (c, mut rx) = conn(1);
        registry.attach(&c).await;

        let monitor = LivenessMonitor::new(Arc::clone(&registry), INTERVAL);
        let report = monitor.sweep(Instant::now()).await;

        assert_eq!(report.probed, 1);
        assert_eq!(drain(&mut rx), vec![Outbound::Ping]);
        assert!(!c.liveness().is_alive());
    }

    #[tokio::test]
    async fn test_acknowledged_connection_survives() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (c, _rx) = conn(1);
        registry.attach(&c).await;

        let monitor = LivenessMonitor::new(Arc::clone(&registry), INTERVAL);
        let t0 = Instant::now();
        for i in 0..4 {
            monitor.sweep(t0 + INTERVAL * i).await;
            c.acknowledge_probe();
        }

        assert!(c.is_open());
        assert_eq!(registry.connections().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unresponsive_publisher_reclaimed_within_two_sweeps() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (p, _p_rx) = conn(1);
        let (v, mut v_rx) = conn(2);
        registry.attach(&p).await;
        registry.attach(&v).await;

        registry
            .register_publisher(
                &p,
                &PublisherRegistration {
                    device_id: "dev1".into(),
                    device_name: Some("Pixel".into()),
                    codec: VideoCodec::Avc,
                    width: 720,
                    height: 1280,
                    fps: 30,
                    token: None,
                },
            )
            .await;
        registry
            .register_viewer(
                &v,
                &ViewerRegistration {
                    device_id: "dev1".into(),
                    token: None,
                },
            )
            .await;

        let monitor = LivenessMonitor::new(Arc::clone(&registry), INTERVAL);
        let t0 = Instant::now();

        monitor.sweep(t0).await;
        v.acknowledge_probe();
        drain(&mut v_rx);

        let report = monitor.sweep(t0 + INTERVAL).await;
        assert_eq!(report.terminated, 1);
        assert_eq!(report.probed, 1);

        assert!(!p.is_open());
        assert!(v.is_open());
        assert!(registry.devices().await.is_empty());
        assert!(!registry.room("dev1").await.unwrap().has_publisher);

        let messages = drain(&mut v_rx);
        assert!(messages.contains(&Outbound::Ping));
        assert!(messages.iter().any(|m| matches!(m, Outbound::Text(t) if t.contains("stream.ended"))));

        // The stale publisher can no longer push frames
        assert_eq!(registry.handle_binary(&p, Bytes::from_static(&[2, 1])).await, None);
    }

    #[tokio::test]
    async fn test_early_sweep_waits_for_deadline() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (c, _rx) = conn(1);
        registry.attach(&c).await;

        let monitor = LivenessMonitor::new(Arc::clone(&registry), INTERVAL);
        let t0 = Instant::now();
        monitor.sweep(t0).await;

        let report = monitor.sweep(t0 + INTERVAL / 2).await;
        assert_eq!(report.waiting, 1);
        assert!(c.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_monitor_terminates_silent_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (c, _rx) = conn(1);
        registry.attach(&c).await;

        let handle = LivenessMonitor::new(Arc::clone(&registry), INTERVAL).spawn();

        tokio::time::sleep(INTERVAL * 2 + Duration::from_secs(1)).await;
        assert!(!c.is_open());
        assert!(registry.connections().await.is_empty());

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_monitor_does_not_double_sweep() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (c, mut rx) = conn(1);
        registry.attach(&c).await;

        let handle = LivenessMonitor::new(Arc::clone(&registry), INTERVAL).spawn();
        tokio::task::yield_now().await;

        // Jump past several ticks at once, as after a runtime stall
        tokio::time::advance(INTERVAL * 3 + Duration::from_secs(1)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // One catch-up sweep probes; nothing is terminated before the peer
        // has had a full interval to answer
        assert!(c.is_open());
        assert_eq!(registry.connections().await.len(), 1);
        assert_eq!(drain(&mut rx), vec![Outbound::Ping]);

        c.acknowledge_probe();
        tokio::time::sleep(INTERVAL).await;
        assert!(c.is_open());

        handle.abort();
    }
}
