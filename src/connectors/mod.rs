//! Platform chat connectors
//!
//! Each connector owns one platform's live connection lifecycle and emits
//! normalized `ChatEvent`s into its aggregator sink. New platforms are
//! added by implementing the `Connector` trait, not by subclassing.

mod backoff;
mod dedup;
mod supervisor;

pub mod kick;
pub mod tiktok;
pub mod youtube;

pub use backoff::{delay_for_attempt, RetryPolicy};
pub use dedup::DedupWindow;
pub use kick::KickConnector;
pub use supervisor::{FailureKind, RetryDecision, Supervisor};
pub use tiktok::TikTokConnector;
pub use youtube::YouTubeConnector;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::aggregator::SourceSink;
use crate::event::Platform;
use crate::{Error, Result};

/// How long `stop` waits for a connector task before hard-aborting it
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Bound on a websocket connect (TCP + TLS + upgrade); expiry is a
/// transient connect failure, never an indefinite `Connecting` state
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a websocket within the given time limit.
///
/// A peer that accepts TCP but never completes the upgrade would otherwise
/// park the connector before its first supervisor transition.
pub(crate) async fn connect_ws(url: &str, limit: Duration) -> Result<WsStream> {
    match tokio::time::timeout(limit, connect_async(url)).await {
        Ok(Ok((ws, _))) => Ok(ws),
        Ok(Err(e)) => Err(Error::WebSocket(e.to_string())),
        Err(_) => Err(Error::WebSocket(format!(
            "connect timed out after {limit:?}"
        ))),
    }
}

/// Connection lifecycle state, owned by the connector and only observed
/// elsewhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection attempt yet
    Disconnected,
    /// Connect/handshake in progress
    Connecting,
    /// Connected and receiving
    Live,
    /// Waiting out a backoff delay before reconnecting
    Reconnecting {
        /// Consecutive failure count
        attempt: u32,
        /// Delay before the next attempt
        backoff: Duration,
    },
    /// Terminal: stopped by request or retry budget exhausted
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Live => f.write_str("live"),
            Self::Reconnecting { attempt, backoff } => {
                write!(f, "reconnecting (attempt {attempt}, backoff {backoff:?})")
            }
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Runtime context handed to a connector's `run`
pub struct ConnectorCtx {
    /// Event sink into the aggregator
    pub sink: SourceSink,

    /// State publication channel; the handle's `state()` reads it
    pub state: watch::Sender<ConnectionState>,

    /// Shutdown signal; flips to `true` exactly once
    pub shutdown: watch::Receiver<bool>,
}

impl ConnectorCtx {
    /// Whether shutdown has been requested
    #[must_use]
    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep that returns early (with `true`) when shutdown is requested
    pub async fn sleep_cancellable(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.changed() => true,
            () = tokio::time::sleep(duration) => false,
        }
    }
}

/// A platform chat connector.
///
/// `run` owns the full connection lifecycle: connect, read, reconnect with
/// backoff, and terminate on shutdown or an exhausted retry budget. All
/// events and state transitions are delivered asynchronously through the
/// context.
#[async_trait]
pub trait Connector: Send + 'static {
    /// Platform this connector serves
    fn platform(&self) -> Platform;

    /// Drive the connection until shutdown or terminal failure
    async fn run(self: Box<Self>, ctx: ConnectorCtx);
}

/// Handle to a spawned connector task
pub struct ConnectorHandle {
    platform: Platform,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ConnectorHandle {
    /// Spawn a connector onto the runtime.
    ///
    /// Returns immediately; the connection proceeds in the background.
    #[must_use]
    pub fn spawn(connector: Box<dyn Connector>, sink: SourceSink) -> Self {
        let platform = connector.platform();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = ConnectorCtx {
            sink,
            state: state_tx,
            shutdown: shutdown_rx,
        };

        let task = tokio::spawn(async move {
            connector.run(ctx).await;
        });

        Self {
            platform,
            state_rx,
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Platform this handle controls
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Current connection state, observable without blocking
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Wait until the connector reaches a terminal state.
    ///
    /// Resolves when `Stopped` is published or the task exits without
    /// publishing it (the state channel closes).
    pub async fn wait_stopped(&self) {
        let mut rx = self.state_rx.clone();
        loop {
            if *rx.borrow() == ConnectionState::Stopped {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Request shutdown and wait for the task within the grace period.
    ///
    /// Idempotent: repeated calls observe the same terminal state and
    /// perform no further work. If the task does not exit within `grace`
    /// (for example an unresponsive socket), it is hard-aborted and the
    /// stop reports unclean (`false`).
    pub async fn stop(&mut self, grace: Duration) -> bool {
        // send_replace is fine even when the task already exited
        self.shutdown_tx.send_replace(true);

        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(grace, task).await.is_err() {
                tracing::warn!(platform = %self.platform, "connector unresponsive, aborting");
                abort.abort();
                return false;
            }
        }
        true
    }
}
