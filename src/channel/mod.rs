//! Typed info channel.
//!
//! One WebSocket connection to the engine's info endpoint. Every inbound
//! text frame is decoded into an [`InfoKind`] and published to the
//! channel's [`EventCell`]; undecodable frames are logged and dropped.
//!
//! The channel never reconnects by itself. [`ChannelSupervisor`] layers a
//! reconnect policy on top of `open`/`close`.
//!
//! # Example
//!
//! ```rust,ignore
//! let page = PageLocation::parse("http://localhost:8000/")?;
//! let channel = EventChannel::open(&page, "/data/info", &ChannelConfig::default()).await?;
//!
//! let _sub = channel.subscribe(|kind| tracing::info!(event = %kind, "info"));
//! // ...
//! channel.close();
//! ```

mod backoff;
mod supervisor;
mod transport;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use supervisor::ChannelSupervisor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::endpoint::{resolve, Endpoint, LocationSource};
use crate::event::{DecodeError, EventCell, InfoKind};
use crate::metrics::{
    CHANNELS_OPEN, CHANNEL_OPENS_TOTAL, CHANNEL_OPEN_FAILURES_TOTAL, FRAMES_RECEIVED_TOTAL,
};
use crate::observer::Subscription;

use transport::{Frame, FrameReader, FrameWriter};

/// Logical path of the engine's info endpoint
pub const DEFAULT_INFO_PATH: &str = "/data/info";

/// Configuration for the info channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    /// Logical path under the page's base path
    #[serde(default = "default_path")]
    pub path: String,
    /// Handshake timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_path() -> String {
    DEFAULT_INFO_PATH.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000 // 10 seconds
}

impl ChannelConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Transport-level failures of the info channel
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    #[error("timed out connecting to {endpoint} after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("gave up reconnecting after {0} attempts")]
    RetriesExhausted(u32),
}

/// Open/closed flag shared by `close` and the read loop.
///
/// Both sides check or flip the flag inside a turn of the channel's cell,
/// the same lock `publish` and `subscribe` take. Once `shut` returns no
/// frame can reach the cell, and an observer may close the channel from
/// inside its callback.
struct Gate {
    open: AtomicBool,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
        }
    }

    /// Decode and publish `frame` unless the gate is shut.
    ///
    /// Returns `false` if the frame was discarded because of that.
    fn publish_if_open(&self, cell: &EventCell, frame: &str) -> bool {
        cell.with_turn(|| {
            if !self.is_open() {
                return false;
            }
            // Decode errors are logged by the cell
            let _ = cell.apply_frame(frame);
            true
        })
    }

    /// Close the gate, returning whether it was open
    fn shut(&self, cell: &EventCell) -> bool {
        cell.with_turn(|| self.open.swap(false, Ordering::AcqRel))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Live connection to an info endpoint.
///
/// Dropping the channel closes it.
pub struct EventChannel {
    endpoint: Endpoint,
    cell: Arc<EventCell>,
    gate: Arc<Gate>,
    shutdown: broadcast::Sender<()>,
    finished: watch::Receiver<bool>,
}

impl EventChannel {
    /// Resolve `logical_path` against the page location and connect.
    ///
    /// The returned channel owns a fresh cell starting at [`InfoKind::None`].
    pub async fn open<L>(
        source: &L,
        logical_path: &str,
        config: &ChannelConfig,
    ) -> Result<Self, ChannelError>
    where
        L: LocationSource + ?Sized,
    {
        let endpoint = resolve(source, logical_path);
        Self::connect(endpoint, config, Arc::new(EventCell::new())).await
    }

    /// Connect to an already resolved endpoint, publishing into `cell`.
    #[tracing::instrument(name = "channel.open", skip_all, fields(endpoint = %endpoint))]
    pub(crate) async fn connect(
        endpoint: Endpoint,
        config: &ChannelConfig,
        cell: Arc<EventCell>,
    ) -> Result<Self, ChannelError> {
        let (writer, reader) = match transport::connect(&endpoint, config.connect_timeout()).await {
            Ok(halves) => halves,
            Err(e) => {
                CHANNEL_OPEN_FAILURES_TOTAL.inc();
                tracing::warn!(endpoint = %endpoint, error = %e, "Failed to open info channel");
                return Err(e);
            }
        };

        CHANNEL_OPENS_TOTAL.inc();
        tracing::info!(endpoint = %endpoint, "Info channel connected");

        let gate = Arc::new(Gate::new());
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let (finished_tx, finished) = watch::channel(false);

        tokio::spawn(read_loop(ReadLoop {
            endpoint: endpoint.clone(),
            reader,
            writer,
            cell: cell.clone(),
            gate: gate.clone(),
            shutdown: shutdown_rx,
            finished: finished_tx,
        }));

        Ok(Self {
            endpoint,
            cell,
            gate,
            shutdown,
            finished,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Read-only view of the channel's cell
    pub fn events(&self) -> &EventCell {
        &self.cell
    }

    /// Latest decoded variant
    pub fn current(&self) -> InfoKind {
        self.cell.current()
    }

    /// See [`EventCell::subscribe`]
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&InfoKind) + Send + Sync + 'static,
    {
        self.cell.subscribe(observer)
    }

    /// Close the connection.
    ///
    /// Idempotent. Once this returns, no further frame changes the cell;
    /// the cell keeps its last value.
    pub fn close(&self) {
        if !self.gate.shut(&self.cell) {
            return;
        }
        tracing::info!(endpoint = %self.endpoint, "Closing info channel");
        // Reader may already be gone after a transport fault
        let _ = self.shutdown.send(());
    }

    /// Whether `close` has not been called and the reader is still running
    pub fn is_open(&self) -> bool {
        self.gate.is_open() && !*self.finished.borrow()
    }

    /// Wait until the reader has stopped, either after `close` or because
    /// the connection was lost.
    pub async fn closed(&self) {
        let mut finished = self.finished.clone();
        // An error means the reader task is gone, which is what we wait for
        let _ = finished.wait_for(|done| *done).await;
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("endpoint", &self.endpoint)
            .field("open", &self.is_open())
            .field("current", &self.cell.current())
            .finish()
    }
}

struct ReadLoop {
    endpoint: Endpoint,
    reader: FrameReader,
    writer: FrameWriter,
    cell: Arc<EventCell>,
    gate: Arc<Gate>,
    shutdown: broadcast::Receiver<()>,
    finished: watch::Sender<bool>,
}

async fn read_loop(mut ctx: ReadLoop) {
    CHANNELS_OPEN.inc();

    loop {
        tokio::select! {
            biased;

            _ = ctx.shutdown.recv() => {
                if let Err(e) = ctx.writer.close().await {
                    tracing::debug!(endpoint = %ctx.endpoint, error = %e, "Close handshake failed");
                }
                break;
            }
            frame = ctx.reader.recv() => {
                match frame {
                    Some(Ok(Frame::Text(text))) => {
                        if !ctx.gate.publish_if_open(&ctx.cell, &text) {
                            tracing::debug!(
                                endpoint = %ctx.endpoint,
                                "Discarding frame received after close"
                            );
                            break;
                        }
                    }
                    Some(Ok(Frame::Binary(data))) => {
                        FRAMES_RECEIVED_TOTAL.inc();
                        EventCell::record_drop(&DecodeError::Binary(data.len()), "<binary>");
                    }
                    Some(Ok(Frame::Control)) => {}
                    Some(Ok(Frame::Close { code, reason })) => {
                        tracing::info!(
                            endpoint = %ctx.endpoint,
                            code = code,
                            reason = %reason,
                            "Info channel closed by server"
                        );
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            endpoint = %ctx.endpoint,
                            error = %e,
                            "Info channel read error"
                        );
                        break;
                    }
                    None => {
                        tracing::warn!(endpoint = %ctx.endpoint, "Info channel stream ended");
                        break;
                    }
                }
            }
        }
    }

    ctx.gate.shut(&ctx.cell);
    CHANNELS_OPEN.dec();
    ctx.finished.send_replace(true);
    tracing::debug!(
        endpoint = %ctx.endpoint,
        last = %ctx.cell.current(),
        "Info channel reader stopped"
    );
}
