//! Shared fixtures for integration tests.
//!
//! `MockConnector` is a mockall double for the `Connector` port. Each
//! successful connect hands the test a `FeedHandle` for the far end of an
//! in-memory connection: frames the hub writes arrive on `sent`, and frames
//! pushed on `push` are read by the hub. Dropping the handle ends the
//! connection.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use mockall::mock;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use market_data_hub::{Connection, Connector, Frame, ReconnectConfig, TransportConfig, TransportError};

mock! {
    pub Connector {}

    #[async_trait]
    impl Connector for Connector {
        async fn connect(&self) -> Result<Connection, TransportError>;
    }
}

/// Far end of an in-memory connection.
pub struct FeedHandle {
    /// Frames written by the hub.
    pub sent: UnboundedReceiver<Frame>,
    /// Frames for the hub to read.
    pub push: UnboundedSender<Result<Frame, TransportError>>,
}

impl FeedHandle {
    /// Deliver a text frame.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push.unbounded_send(Ok(Frame::Text(text.into()))).unwrap();
    }

    /// Next frame written by the hub, skipping heartbeat pings.
    pub async fn next_sent(&mut self) -> Option<Frame> {
        use futures::StreamExt;
        loop {
            match self.sent.next().await? {
                Frame::Ping(_) => {}
                frame => return Some(frame),
            }
        }
    }
}

/// Open one in-memory connection.
pub fn mock_connection() -> (Connection, FeedHandle) {
    let (out_tx, out_rx) = unbounded::<Frame>();
    let (in_tx, in_rx) = unbounded::<Result<Frame, TransportError>>();
    let sink = out_tx.sink_map_err(|_| TransportError::ConnectionClosed);
    (
        Connection::new(sink, in_rx),
        FeedHandle {
            sent: out_rx,
            push: in_tx,
        },
    )
}

/// Open one in-memory connection whose sink refuses ping frames.
pub fn ping_rejecting_connection() -> (Connection, FeedHandle) {
    let (out_tx, out_rx) = unbounded::<Frame>();
    let (in_tx, in_rx) = unbounded::<Result<Frame, TransportError>>();
    let sink = out_tx
        .sink_map_err(|_| TransportError::ConnectionClosed)
        .with(|frame: Frame| {
            futures::future::ready(match frame {
                Frame::Ping(_) => Err(TransportError::SendFailed("ping rejected".into())),
                other => Ok(other),
            })
        });
    (
        Connection::new(sink, in_rx),
        FeedHandle {
            sent: out_rx,
            push: in_tx,
        },
    )
}

/// Outcome of one scripted connect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Succeed,
    /// Connects, but every ping write fails.
    SucceedRejectingPings,
    Fail,
}

/// Connector double that plays `script` in order, then fails every call.
pub struct ScriptedConnector {
    pub connector: Arc<MockConnector>,
    pub feeds: mpsc::UnboundedReceiver<FeedHandle>,
    pub calls: Arc<AtomicUsize>,
    pub script: Arc<Mutex<VecDeque<Attempt>>>,
}

impl ScriptedConnector {
    /// Wait for the next successful connection.
    pub async fn next_feed(&mut self) -> FeedHandle {
        self.feeds.recv().await.expect("connector dropped")
    }

    /// Number of connect calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Append outcomes to the script.
    pub fn extend(&self, attempts: impl IntoIterator<Item = Attempt>) {
        self.script.lock().extend(attempts);
    }
}

pub fn scripted_connector(script: impl IntoIterator<Item = Attempt>) -> ScriptedConnector {
    let script = Arc::new(Mutex::new(script.into_iter().collect::<VecDeque<_>>()));
    let calls = Arc::new(AtomicUsize::new(0));
    let (feed_tx, feed_rx) = mpsc::unbounded_channel();

    let mut connector = MockConnector::new();
    {
        let script = Arc::clone(&script);
        let calls = Arc::clone(&calls);
        connector.expect_connect().returning(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            match script.lock().pop_front() {
                Some(Attempt::Succeed) => {
                    let (connection, feed) = mock_connection();
                    let _ = feed_tx.send(feed);
                    Ok(connection)
                }
                Some(Attempt::SucceedRejectingPings) => {
                    let (connection, feed) = ping_rejecting_connection();
                    let _ = feed_tx.send(feed);
                    Ok(connection)
                }
                Some(Attempt::Fail) | None => {
                    Err(TransportError::ConnectFailed("connection refused".into()))
                }
            }
        });
    }

    ScriptedConnector {
        connector: Arc::new(connector),
        feeds: feed_rx,
        calls,
        script,
    }
}

/// Transport settings with the default backoff and a slow heartbeat.
pub fn transport_config() -> TransportConfig {
    TransportConfig {
        reconnect: ReconnectConfig::default(),
        heartbeat: market_data_hub::infrastructure::stream::HeartbeatConfig::new(
            Duration::from_secs(3600),
            Duration::from_secs(7200),
        ),
        inbound_capacity: 64,
    }
}

/// One Alpaca-style quote message.
pub fn quote_json(symbol: &str, bid: &str, ask: &str) -> String {
    format!(
        r#"[{{"T":"q","S":"{symbol}","bx":"V","bp":{bid},"bs":1,"ax":"V","ap":{ask},"as":1,"t":"2024-01-02T14:30:00Z"}}]"#
    )
}
