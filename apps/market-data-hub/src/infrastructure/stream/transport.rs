//! Stream Transport
//!
//! Owns the single upstream connection. A supervisor task per session
//! multiplexes outbound writes, heartbeat pings and inbound reads, and on
//! session loss walks the reconnect policy until a new connection is up or
//! the attempt budget is spent.
//!
//! # State machine
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──ok──► Connected
//!      ▲                          │                  │ read error / close /
//!      │                          └──err─────────────┤ heartbeat timeout
//!      │                                             ▼
//!      └────────── budget spent ◄──── Reconnecting{1..=max}
//! ```
//!
//! Data frames are forwarded on a bounded channel that survives reconnects;
//! it closes when the session ends for good (disconnect or exhaustion).

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::StreamSettings;
use crate::application::ports::{
    Connection, Connector, Frame, FrameSink, FrameStream, TransportError,
};
use crate::domain::streaming::ConnectionState;
use crate::infrastructure::metrics;

/// Outbound command queue depth.
const OUTBOUND_CAPACITY: usize = 64;

/// How long a closing session waits for the close frame to be written.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Configuration
// =============================================================================

/// Transport configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,
    /// Heartbeat timing.
    pub heartbeat: HeartbeatConfig,
    /// Inbound frame buffer size.
    pub inbound_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            inbound_capacity: 1024,
        }
    }
}

impl TransportConfig {
    /// Create configuration from `StreamSettings`.
    #[must_use]
    pub fn from_stream_settings(settings: &StreamSettings) -> Self {
        Self {
            reconnect: ReconnectConfig::from_stream_settings(settings),
            heartbeat: HeartbeatConfig::from_stream_settings(settings),
            inbound_capacity: settings.inbound_capacity.max(1),
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

struct OutboundFrame {
    frame: Frame,
    ack: oneshot::Sender<Result<(), TransportError>>,
}

struct Session {
    cancel: CancellationToken,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    handle: JoinHandle<()>,
}

/// Resilient upstream connection.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use market_data_hub::application::ports::{Connector, Frame};
/// use market_data_hub::infrastructure::stream::{Transport, TransportConfig};
///
/// async fn run(connector: Arc<dyn Connector>) -> Result<(), Box<dyn std::error::Error>> {
///     let transport = Transport::new(connector, TransportConfig::default());
///     transport.connect().await?;
///
///     let mut inbound = transport.take_inbound().ok_or("inbound already taken")?;
///     transport.send(Frame::Text("{}".into())).await?;
///
///     while let Some(frame) = inbound.recv().await {
///         println!("{frame:?}");
///     }
///     transport.disconnect().await;
///     Ok(())
/// }
/// ```
pub struct Transport {
    connector: Arc<dyn Connector>,
    config: TransportConfig,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    session: tokio::sync::Mutex<Option<Session>>,
    inbound: parking_lot::Mutex<Option<mpsc::Receiver<Frame>>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a disconnected transport.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, config: TransportConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            config,
            state_tx: Arc::new(state_tx),
            session: tokio::sync::Mutex::new(None),
            inbound: parking_lot::Mutex::new(None),
        }
    }

    /// Transport configuration.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Open the connection and start the session supervisor.
    ///
    /// Does nothing if a session is already connected, connecting or
    /// reconnecting.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectFailed` if the initial connection
    /// cannot be opened. State is left `Disconnected`; no retry is scheduled.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut session = self.session.lock().await;
        if self.state().is_active() {
            return Ok(());
        }

        // A session whose supervisor gave up is still parked here.
        if let Some(stale) = session.take() {
            stale.cancel.cancel();
            let _ = stale.handle.await;
        }

        set_state(&self.state_tx, ConnectionState::Connecting);
        tracing::info!("Connecting to upstream feed");

        let connection = match self.connector.connect().await {
            Ok(connection) => connection,
            Err(err) => {
                set_state(&self.state_tx, ConnectionState::Disconnected);
                tracing::error!(error = %err, "Initial connection failed");
                return Err(match err {
                    TransportError::ConnectFailed(reason) => TransportError::ConnectFailed(reason),
                    other => TransportError::ConnectFailed(other.to_string()),
                });
            }
        };

        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.inbound_capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let cancel = CancellationToken::new();

        *self.inbound.lock() = Some(inbound_rx);
        set_state(&self.state_tx, ConnectionState::Connected);
        tracing::info!("Connected to upstream feed");

        let supervisor = Supervisor {
            connector: Arc::clone(&self.connector),
            config: self.config.clone(),
            state_tx: Arc::clone(&self.state_tx),
            cancel: cancel.clone(),
            outbound_rx,
            inbound_tx,
        };
        let handle = tokio::spawn(supervisor.run(connection));

        *session = Some(Session {
            cancel,
            outbound_tx,
            handle,
        });
        Ok(())
    }

    /// Take the inbound data frame receiver for the current session.
    ///
    /// Returns `None` if there is no session or the receiver was already
    /// taken. The receiver yields `None` once the session ends for good.
    #[must_use]
    pub fn take_inbound(&self) -> Option<mpsc::Receiver<Frame>> {
        self.inbound.lock().take()
    }

    /// Write a frame and wait for the write to complete.
    ///
    /// # Errors
    ///
    /// - `TransportError::NotConnected` if the state is not `Connected`; the
    ///   frame is discarded
    /// - `TransportError::SendFailed` if the write itself fails
    pub async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.state().is_connected() {
            return Err(TransportError::NotConnected);
        }

        let outbound_tx = self
            .session
            .lock()
            .await
            .as_ref()
            .map(|session| session.outbound_tx.clone())
            .ok_or(TransportError::NotConnected)?;

        let (ack_tx, ack_rx) = oneshot::channel();
        outbound_tx
            .send(OutboundFrame { frame, ack: ack_tx })
            .await
            .map_err(|_| TransportError::NotConnected)?;

        ack_rx.await.map_err(|_| TransportError::ConnectionClosed)?
    }

    /// Stop the session, close the connection and end the inbound stream.
    ///
    /// Safe to call at any time, any number of times.
    pub async fn disconnect(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.cancel.cancel();
            if let Err(err) = session.handle.await {
                tracing::warn!(error = %err, "Session supervisor ended abnormally");
            }
            tracing::info!("Disconnected from upstream feed");
        }

        self.inbound.lock().take();
        set_state(&self.state_tx, ConnectionState::Disconnected);
    }
}

fn set_state(state_tx: &watch::Sender<ConnectionState>, next: ConnectionState) {
    let previous = state_tx.send_replace(next);
    if previous != next {
        tracing::debug!(from = %previous, to = %next, "Connection state changed");
        metrics::set_connection_state(next);
    }
}

// =============================================================================
// Session Supervisor
// =============================================================================

struct Supervisor {
    connector: Arc<dyn Connector>,
    config: TransportConfig,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
    outbound_rx: mpsc::Receiver<OutboundFrame>,
    inbound_tx: mpsc::Sender<Frame>,
}

impl Supervisor {
    async fn run(mut self, first: Connection) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        let mut connection = first;

        loop {
            match self.drive(connection).await {
                Ok(()) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "Upstream session lost");
                }
            }

            match self.reconnect(&mut policy).await {
                Some(next) => {
                    policy.reset();
                    connection = next;
                }
                None => break,
            }
        }
        // Dropping `inbound_tx` here ends the inbound stream.
    }

    /// Wait out the backoff schedule until a connection opens.
    ///
    /// Returns `None` when cancelled or when the attempt budget is spent.
    async fn reconnect(&mut self, policy: &mut ReconnectPolicy) -> Option<Connection> {
        loop {
            let Some(delay) = policy.next_delay() else {
                tracing::error!(
                    attempts = policy.attempt_count(),
                    "Reconnect attempts exhausted, giving up"
                );
                set_state(&self.state_tx, ConnectionState::Disconnected);
                return None;
            };

            let attempt = policy.attempt_count();
            set_state(&self.state_tx, ConnectionState::Reconnecting { attempt });
            metrics::record_reconnect();
            tracing::info!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting to upstream feed"
            );

            if !self.backoff(delay).await {
                return None;
            }

            let result = tokio::select! {
                () = self.cancel.cancelled() => return None,
                result = self.connector.connect() => result,
            };

            match result {
                Ok(connection) => {
                    set_state(&self.state_tx, ConnectionState::Connected);
                    tracing::info!(attempt, "Reconnected to upstream feed");
                    return Some(connection);
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "Reconnect attempt failed");
                }
            }
        }
    }

    /// Sleep for `delay`, rejecting queued writes meanwhile.
    ///
    /// Returns `false` if cancelled.
    async fn backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return false,
                () = &mut sleep => return true,
                Some(command) = self.outbound_rx.recv() => {
                    let _ = command.ack.send(Err(TransportError::NotConnected));
                }
            }
        }
    }

    /// Run one session until it fails (`Err`) or is cancelled (`Ok`).
    async fn drive(&mut self, connection: Connection) -> Result<(), TransportError> {
        let Connection {
            mut sink,
            mut stream,
        } = connection;

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let heartbeat_cancel = self.cancel.child_token();
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel(4);
        let heartbeat = tokio::spawn(
            HeartbeatMonitor::new(
                self.config.heartbeat.clone(),
                Arc::clone(&heartbeat_state),
                heartbeat_tx,
                heartbeat_cancel.clone(),
            )
            .run(),
        );

        let result = self
            .pump(&mut sink, &mut stream, &heartbeat_state, &mut heartbeat_rx)
            .await;

        heartbeat_cancel.cancel();
        let _ = heartbeat.await;

        if result.is_ok() {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.send(Frame::Close)).await;
        }
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;

        result
    }

    async fn pump(
        &mut self,
        sink: &mut FrameSink,
        stream: &mut FrameStream,
        heartbeat: &HeartbeatState,
        heartbeat_rx: &mut mpsc::Receiver<HeartbeatEvent>,
    ) -> Result<(), TransportError> {
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return Ok(()),

                Some(event) = heartbeat_rx.recv() => match event {
                    HeartbeatEvent::SendPing => {
                        sink.send(Frame::Ping(Vec::new())).await?;
                        heartbeat.mark_ping_sent();
                        tracing::trace!("Heartbeat ping sent");
                    }
                    HeartbeatEvent::Timeout => {
                        return Err(TransportError::HeartbeatTimeout(self.config.heartbeat.timeout));
                    }
                },

                Some(command) = self.outbound_rx.recv() => {
                    let result = sink.send(command.frame).await;
                    let failure = result.as_ref().err().cloned();
                    let _ = command.ack.send(result);
                    if let Some(err) = failure {
                        return Err(err);
                    }
                }

                item = stream.next() => match item {
                    Some(Ok(Frame::Ping(payload))) => {
                        heartbeat.record_activity();
                        sink.send(Frame::Pong(payload)).await?;
                    }
                    Some(Ok(Frame::Pong(_))) => heartbeat.record_activity(),
                    Some(Ok(Frame::Close)) => return Err(TransportError::ConnectionClosed),
                    Some(Ok(frame)) => {
                        heartbeat.record_activity();
                        tokio::select! {
                            () = self.cancel.cancelled() => return Ok(()),
                            sent = self.inbound_tx.send(frame) => {
                                if sent.is_err() {
                                    tracing::trace!("Inbound receiver dropped, frame discarded");
                                }
                            }
                        }
                    }
                    Some(Err(err)) => return Err(err),
                    None => return Err(TransportError::ConnectionClosed),
                },
            }
        }
    }
}
