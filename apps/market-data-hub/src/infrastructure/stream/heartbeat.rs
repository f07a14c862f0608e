//! Heartbeat Monitor
//!
//! Liveness checking for an upstream session. The monitor task asks the
//! session to send a ping every interval; any inbound frame counts as proof
//! of life. If a ping is outstanding and nothing has arrived for longer than
//! the timeout, the monitor reports a timeout and exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::StreamSettings;

/// Floor for the ping period; `tokio::time::interval` rejects a zero period.
const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Silence tolerated after a ping before the session is considered dead.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, timeout: Duration) -> Self {
        Self {
            ping_interval,
            timeout,
        }
    }

    /// Create configuration from `StreamSettings`.
    #[must_use]
    pub const fn from_stream_settings(settings: &StreamSettings) -> Self {
        Self {
            ping_interval: settings.heartbeat_interval,
            timeout: settings.heartbeat_timeout,
        }
    }
}

/// Events emitted by the heartbeat monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a ping frame.
    SendPing,
    /// No inbound traffic within the timeout; the session should be dropped.
    Timeout,
}

/// Liveness state shared between the monitor and the session reader.
#[derive(Debug)]
pub struct HeartbeatState {
    last_activity: RwLock<Instant>,
    awaiting_reply: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create state with activity recorded now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_activity: RwLock::new(Instant::now()),
            awaiting_reply: AtomicBool::new(false),
        }
    }

    /// Record that an inbound frame arrived.
    pub fn record_activity(&self) {
        *self.last_activity.write() = Instant::now();
        self.awaiting_reply.store(false, Ordering::SeqCst);
    }

    /// Record that a ping was written.
    pub fn mark_ping_sent(&self) {
        self.awaiting_reply.store(true, Ordering::SeqCst);
    }

    /// Whether a ping is outstanding.
    #[must_use]
    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply.load(Ordering::SeqCst)
    }

    /// Time since the last inbound frame.
    #[must_use]
    pub fn time_since_activity(&self) -> Duration {
        self.last_activity.read().elapsed()
    }
}

/// Heartbeat monitor task.
///
/// One monitor runs per session and stops when its token is cancelled, when
/// the event receiver is dropped, or after reporting a timeout.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a new heartbeat monitor.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run the monitoring loop.
    ///
    /// A zero ping interval is raised to one millisecond.
    pub async fn run(self) {
        let period = self.config.ping_interval.max(MIN_PING_INTERVAL);
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::trace!("Heartbeat monitor cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if !self.check_and_ping().await {
                        break;
                    }
                }
            }
        }
    }

    /// Returns `false` when the loop should exit.
    async fn check_and_ping(&self) -> bool {
        if self.state.is_awaiting_reply() {
            let silent_for = self.state.time_since_activity();
            if silent_for > self.config.timeout {
                tracing::warn!(
                    silent_secs = silent_for.as_secs(),
                    timeout_secs = self.config.timeout.as_secs(),
                    "Heartbeat timeout detected"
                );
                let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
                return false;
            }
        }

        if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
            tracing::trace!("Heartbeat receiver dropped");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn default_config_values() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn state_tracks_outstanding_ping() {
        let state = HeartbeatState::new();
        assert!(!state.is_awaiting_reply());

        state.mark_ping_sent();
        assert!(state.is_awaiting_reply());

        tokio::time::advance(ms(500)).await;
        assert_eq!(state.time_since_activity(), ms(500));

        state.record_activity();
        assert!(!state.is_awaiting_reply());
        assert_eq!(state.time_since_activity(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn first_ping_after_one_interval() {
        let state = Arc::new(HeartbeatState::new());
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let handle = tokio::spawn(
            HeartbeatMonitor::new(HeartbeatConfig::new(ms(50), ms(1000)), state, tx, cancel.clone())
                .run(),
        );

        assert_eq!(rx.recv().await, Some(HeartbeatEvent::SendPing));
        assert_eq!(start.elapsed(), ms(50));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn silence_after_ping_times_out() {
        let state = Arc::new(HeartbeatState::new());
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatMonitor::new(
                HeartbeatConfig::new(ms(50), ms(100)),
                state.clone(),
                tx,
                cancel,
            )
            .run(),
        );

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            if event == HeartbeatEvent::SendPing {
                state.mark_ping_sent();
            }
            events.push(event);
        }

        // Pings at 50 and 100, timeout detected at 150.
        assert_eq!(
            events,
            vec![
                HeartbeatEvent::SendPing,
                HeartbeatEvent::SendPing,
                HeartbeatEvent::Timeout
            ]
        );
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn activity_keeps_session_alive() {
        let state = Arc::new(HeartbeatState::new());
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatMonitor::new(
                HeartbeatConfig::new(ms(50), ms(100)),
                state.clone(),
                tx,
                cancel.clone(),
            )
            .run(),
        );

        for _ in 0..10 {
            assert_eq!(rx.recv().await, Some(HeartbeatEvent::SendPing));
            state.mark_ping_sent();
            state.record_activity();
        }

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_raised_to_floor() {
        let state = Arc::new(HeartbeatState::new());
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let handle = tokio::spawn(
            HeartbeatMonitor::new(
                HeartbeatConfig::new(Duration::ZERO, ms(1000)),
                state,
                tx,
                cancel.clone(),
            )
            .run(),
        );

        assert_eq!(rx.recv().await, Some(HeartbeatEvent::SendPing));
        assert_eq!(start.elapsed(), MIN_PING_INTERVAL);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_monitor() {
        let (tx, _rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            HeartbeatMonitor::new(
                HeartbeatConfig::default(),
                Arc::new(HeartbeatState::new()),
                tx,
                cancel.clone(),
            )
            .run(),
        );

        cancel.cancel();
        let result = tokio::time::timeout(ms(100), handle).await;
        assert!(result.is_ok(), "monitor should stop on cancellation");
    }
}
