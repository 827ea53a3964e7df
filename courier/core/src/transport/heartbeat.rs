//! Heartbeat Liveness Monitoring
//!
//! Client-side liveness checks for the WebSocket connection. The client
//! periodically sends a `ping` envelope and expects a `pong` reply within a
//! configurable timeout; after enough consecutive misses the connection is
//! declared dead and the driver forces the reconnect path.
//!
//! # Protocol
//!
//! 1. Client sends `{"type":"ping","data":{"seq":N}}` when `heartbeat_interval`
//!    has elapsed since the last activity on the socket
//! 2. Server replies with a `pong` envelope echoing `seq` within
//!    `response_timeout`
//! 3. After `max_missed_pongs` consecutive misses the connection is dead
//!
//! Any inbound frame counts as activity and defers the next ping, so a busy
//! stream never competes with heartbeats.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Configuration for heartbeat behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Interval between ping messages (default: 30 seconds)
    pub heartbeat_interval: Duration,
    /// Maximum time to wait for a pong response (default: 10 seconds)
    pub response_timeout: Duration,
    /// Number of consecutive missed pongs before declaring the connection dead (default: 3)
    pub max_missed_pongs: u32,
    /// Whether heartbeat is enabled
    pub enabled: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            response_timeout: Duration::from_secs(10),
            max_missed_pongs: 3,
            enabled: true,
        }
    }
}

impl HeartbeatConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config with heartbeat disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the response timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the maximum missed pongs.
    #[must_use]
    pub fn with_max_missed(mut self, max_missed: u32) -> Self {
        self.max_missed_pongs = max_missed;
        self
    }

    /// Create a config suitable for testing (shorter intervals).
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(100),
            response_timeout: Duration::from_millis(50),
            max_missed_pongs: 2,
            enabled: true,
        }
    }

    /// How often the driver should poll the monitor.
    ///
    /// A quarter of the response timeout, floored at 10ms, so misses are
    /// detected promptly without busy-waiting.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        (self.response_timeout / 4).max(Duration::from_millis(10))
    }
}

/// Health metrics for the connection
#[derive(Clone, Debug)]
pub struct ConnectionHealth {
    /// Number of consecutive missed pongs
    pub missed_pongs: u32,
    /// Last recorded round-trip time
    pub last_rtt: Option<Duration>,
    /// Average round-trip time (exponential moving average)
    pub avg_rtt: Option<Duration>,
    /// Total pings sent
    pub pings_sent: u64,
    /// Total pongs received
    pub pongs_received: u64,
    /// Time of last activity (any inbound frame)
    pub last_activity: Instant,
    /// Whether the connection is considered healthy
    pub healthy: bool,
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self {
            missed_pongs: 0,
            last_rtt: None,
            avg_rtt: None,
            pings_sent: 0,
            pongs_received: 0,
            last_activity: Instant::now(),
            healthy: true,
        }
    }
}

impl ConnectionHealth {
    /// Update RTT statistics with a new measurement.
    fn update_rtt(&mut self, rtt: Duration) {
        self.last_rtt = Some(rtt);

        // Exponential moving average (alpha = 0.2)
        const ALPHA: f64 = 0.2;
        #[allow(clippy::cast_precision_loss)]
        let rtt_nanos = rtt.as_nanos() as f64;
        let new_avg = match self.avg_rtt {
            Some(avg) => {
                #[allow(clippy::cast_precision_loss)]
                let avg_nanos = avg.as_nanos() as f64;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                Duration::from_nanos((ALPHA * rtt_nanos + (1.0 - ALPHA) * avg_nanos) as u64)
            }
            None => rtt,
        };
        self.avg_rtt = Some(new_avg);
    }
}

/// Outcome of a liveness check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    /// No pending ping has timed out
    Alive,
    /// A pong was missed; carries the consecutive miss count
    MissedPong(u32),
    /// Too many consecutive misses; the connection is dead
    Dead(u32),
}

/// Liveness monitor for one connection
///
/// Shared between the connection driver (which polls it on a tick) and the
/// read path (which records pongs and activity).
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    health: RwLock<ConnectionHealth>,
    pending: RwLock<Option<(u64, Instant)>>,
    seq_counter: AtomicU64,
}

impl HeartbeatMonitor {
    /// Create a new monitor with the given config.
    #[must_use]
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            health: RwLock::new(ConnectionHealth::default()),
            pending: RwLock::new(None),
            seq_counter: AtomicU64::new(1),
        }
    }

    /// The heartbeat configuration.
    #[must_use]
    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    /// Whether heartbeat is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Reset tracking state for a fresh connection.
    pub fn reset(&self) {
        *self.health.write() = ConnectionHealth::default();
        *self.pending.write() = None;
    }

    /// Record that any frame arrived; defers the next ping.
    pub fn record_activity(&self) {
        if !self.config.enabled {
            return;
        }
        self.health.write().last_activity = Instant::now();
    }

    /// Record a pong reply.
    ///
    /// Returns true if the pong matched the pending ping.
    pub fn record_pong(&self, seq: u64) -> bool {
        if !self.config.enabled {
            return false;
        }

        let mut pending = self.pending.write();
        match *pending {
            Some((expected, sent_at)) if expected == seq => {
                *pending = None;
                let rtt = sent_at.elapsed();
                let mut health = self.health.write();
                health.pongs_received += 1;
                health.missed_pongs = 0;
                health.healthy = true;
                health.last_activity = Instant::now();
                health.update_rtt(rtt);
                tracing::trace!(seq, rtt_ms = rtt.as_millis(), "pong received");
                true
            }
            Some((expected, _)) => {
                tracing::warn!(
                    expected_seq = expected,
                    received_seq = seq,
                    "pong with unexpected sequence number"
                );
                false
            }
            None => {
                tracing::warn!(seq, "pong with no ping outstanding");
                false
            }
        }
    }

    /// Decide whether a ping is due; consumes a sequence number when it is.
    ///
    /// A ping is due when none is pending and `heartbeat_interval` has
    /// elapsed since the last activity.
    pub fn prepare_ping(&self) -> Option<u64> {
        if !self.config.enabled {
            return None;
        }
        self.prepare_ping_internal(false)
    }

    /// Force a ping regardless of the interval, for tests.
    #[cfg(test)]
    pub(crate) fn force_prepare_ping(&self) -> Option<u64> {
        self.prepare_ping_internal(true)
    }

    fn prepare_ping_internal(&self, force: bool) -> Option<u64> {
        let mut pending = self.pending.write();
        if pending.is_some() {
            return None;
        }

        if !force {
            let since_activity = self.health.read().last_activity.elapsed();
            if since_activity < self.config.heartbeat_interval {
                return None;
            }
        }

        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);
        *pending = Some((seq, Instant::now()));
        self.health.write().pings_sent += 1;
        Some(seq)
    }

    /// Check whether the pending ping has timed out.
    pub fn check_liveness(&self) -> Liveness {
        if !self.config.enabled {
            return Liveness::Alive;
        }

        let mut pending = self.pending.write();
        let Some((seq, sent_at)) = *pending else {
            return Liveness::Alive;
        };
        if sent_at.elapsed() < self.config.response_timeout {
            return Liveness::Alive;
        }

        *pending = None;
        let mut health = self.health.write();
        health.missed_pongs += 1;
        let missed = health.missed_pongs;

        if missed >= self.config.max_missed_pongs {
            health.healthy = false;
            tracing::warn!(seq, missed_count = missed, "connection declared dead");
            Liveness::Dead(missed)
        } else {
            tracing::debug!(
                seq,
                missed_count = missed,
                max_missed = self.config.max_missed_pongs,
                "pong missed"
            );
            Liveness::MissedPong(missed)
        }
    }

    /// Snapshot of the health metrics.
    #[must_use]
    pub fn health(&self) -> ConnectionHealth {
        self.health.read().clone()
    }
}

impl std::fmt::Debug for HeartbeatMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatMonitor")
            .field("config", &self.config)
            .field("health", &self.health())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_config_default() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.response_timeout, Duration::from_secs(10));
        assert_eq!(config.max_missed_pongs, 3);
        assert!(config.enabled);
    }

    #[test]
    fn test_heartbeat_config_builder() {
        let config = HeartbeatConfig::new()
            .with_interval(Duration::from_secs(60))
            .with_timeout(Duration::from_secs(20))
            .with_max_missed(5);

        assert_eq!(config.heartbeat_interval, Duration::from_secs(60));
        assert_eq!(config.response_timeout, Duration::from_secs(20));
        assert_eq!(config.max_missed_pongs, 5);
    }

    #[test]
    fn test_tick_interval_floor() {
        let config = HeartbeatConfig::new().with_timeout(Duration::from_millis(8));
        assert_eq!(config.tick_interval(), Duration::from_millis(10));

        let config = HeartbeatConfig::new().with_timeout(Duration::from_secs(10));
        assert_eq!(config.tick_interval(), Duration::from_millis(2_500));
    }

    #[test]
    fn test_ping_pong_cycle_updates_health() {
        let monitor = HeartbeatMonitor::new(HeartbeatConfig::for_testing());

        let seq = monitor.force_prepare_ping().unwrap();
        assert!(monitor.record_pong(seq));

        let health = monitor.health();
        assert_eq!(health.pings_sent, 1);
        assert_eq!(health.pongs_received, 1);
        assert_eq!(health.missed_pongs, 0);
        assert!(health.last_rtt.is_some());
        assert!(health.healthy);
    }

    #[test]
    fn test_pong_with_wrong_seq_rejected() {
        let monitor = HeartbeatMonitor::new(HeartbeatConfig::for_testing());
        let seq = monitor.force_prepare_ping().unwrap();
        assert!(!monitor.record_pong(seq + 100));
        // The real pong still matches afterwards.
        assert!(monitor.record_pong(seq));
    }

    #[test]
    fn test_pong_without_ping_rejected() {
        let monitor = HeartbeatMonitor::new(HeartbeatConfig::for_testing());
        assert!(!monitor.record_pong(1));
    }

    #[test]
    fn test_no_second_ping_while_pending() {
        let monitor = HeartbeatMonitor::new(HeartbeatConfig::for_testing());
        assert!(monitor.force_prepare_ping().is_some());
        assert!(monitor.force_prepare_ping().is_none());
    }

    #[test]
    fn test_activity_defers_ping() {
        let monitor = HeartbeatMonitor::new(HeartbeatConfig::for_testing());
        monitor.record_activity();
        assert!(monitor.prepare_ping().is_none());
    }

    #[test]
    fn test_disabled_monitor_is_inert() {
        let monitor = HeartbeatMonitor::new(HeartbeatConfig::disabled());
        assert!(monitor.prepare_ping().is_none());
        assert!(!monitor.record_pong(1));
        assert_eq!(monitor.check_liveness(), Liveness::Alive);
    }

    #[test]
    fn test_timeout_increments_missed_then_dies() {
        let config = HeartbeatConfig::for_testing();
        let timeout = config.response_timeout;
        let monitor = HeartbeatMonitor::new(config);

        monitor.force_prepare_ping().unwrap();
        std::thread::sleep(timeout + Duration::from_millis(10));
        assert_eq!(monitor.check_liveness(), Liveness::MissedPong(1));

        monitor.force_prepare_ping().unwrap();
        std::thread::sleep(timeout + Duration::from_millis(10));
        assert_eq!(monitor.check_liveness(), Liveness::Dead(2));
        assert!(!monitor.health().healthy);
    }

    #[test]
    fn test_reset_restores_health() {
        let config = HeartbeatConfig::for_testing();
        let timeout = config.response_timeout;
        let monitor = HeartbeatMonitor::new(config);

        monitor.force_prepare_ping().unwrap();
        std::thread::sleep(timeout + Duration::from_millis(10));
        monitor.check_liveness();

        monitor.reset();
        let health = monitor.health();
        assert_eq!(health.missed_pongs, 0);
        assert_eq!(health.pings_sent, 0);
        assert!(health.healthy);
    }
}
