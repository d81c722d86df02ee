//! Reconnect policy layered on top of [`EventChannel`].
//!
//! The supervisor owns one [`EventCell`] that outlives individual
//! connections, so subscribers attach once and keep receiving events across
//! reconnects.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::endpoint::{resolve, LocationSource};
use crate::event::{EventCell, InfoKind};
use crate::metrics::RECONNECT_ATTEMPTS_TOTAL;
use crate::observer::Subscription;

use super::backoff::{BackoffConfig, ExponentialBackoff};
use super::{ChannelConfig, ChannelError, EventChannel};

/// Keeps an info channel connected until told to stop.
///
/// # Example
///
/// ```rust,ignore
/// let supervisor =
///     ChannelSupervisor::new(page, ChannelConfig::default(), BackoffConfig::default());
/// let _sub = supervisor.subscribe(|kind| println!("{kind}"));
/// let shutdown = supervisor.shutdown_signal();
///
/// let handle = tokio::spawn(supervisor.run());
/// // ...
/// let _ = shutdown.send(());
/// handle.await??;
/// ```
pub struct ChannelSupervisor {
    location: Box<dyn LocationSource + Send + Sync>,
    channel_config: ChannelConfig,
    backoff_config: BackoffConfig,
    cell: Arc<EventCell>,
    shutdown: broadcast::Sender<()>,
    // Subscribed at construction so a signal sent before `run` is not lost
    shutdown_rx: broadcast::Receiver<()>,
}

impl ChannelSupervisor {
    pub fn new<L>(location: L, channel_config: ChannelConfig, backoff_config: BackoffConfig) -> Self
    where
        L: LocationSource + Send + Sync + 'static,
    {
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        Self {
            location: Box::new(location),
            channel_config,
            backoff_config,
            cell: Arc::new(EventCell::new()),
            shutdown,
            shutdown_rx,
        }
    }

    /// Cell shared by every connection this supervisor opens
    pub fn events(&self) -> Arc<EventCell> {
        self.cell.clone()
    }

    pub fn current(&self) -> InfoKind {
        self.cell.current()
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&InfoKind) + Send + Sync + 'static,
    {
        self.cell.subscribe(observer)
    }

    /// Sender that stops [`run`](Self::run) and closes the active channel
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Connect, wait for the connection to drop, back off, repeat.
    ///
    /// Returns `Ok(())` after a shutdown signal, or
    /// [`ChannelError::RetriesExhausted`] once `max_attempts` consecutive
    /// connect attempts have failed. A connection that opened and later
    /// dropped does not count as a failed attempt.
    #[tracing::instrument(
        name = "channel.supervisor",
        skip_all,
        fields(path = %self.channel_config.path)
    )]
    pub async fn run(mut self) -> Result<(), ChannelError> {
        let mut backoff = ExponentialBackoff::with_config(self.backoff_config.clone());
        let mut failures: u32 = 0;

        loop {
            // Location is read again on every attempt
            let endpoint = resolve(&*self.location, &self.channel_config.path);

            let opened = tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    tracing::info!("Supervisor stopped while connecting");
                    return Ok(());
                }
                result = EventChannel::connect(
                    endpoint,
                    &self.channel_config,
                    self.cell.clone(),
                ) => result,
            };

            match opened {
                Ok(channel) => {
                    failures = 0;
                    backoff.reset();

                    tokio::select! {
                        _ = self.shutdown_rx.recv() => {
                            channel.close();
                            channel.closed().await;
                            tracing::info!("Supervisor stopped");
                            return Ok(());
                        }
                        _ = channel.closed() => {
                            tracing::warn!(
                                endpoint = %channel.endpoint(),
                                last = %self.cell.current(),
                                "Info channel lost"
                            );
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, failures = failures, "Info channel unavailable");

                    if self.backoff_config.max_attempts.is_some_and(|max| failures >= max) {
                        tracing::error!(attempts = failures, "Giving up on info channel");
                        return Err(ChannelError::RetriesExhausted(failures));
                    }
                }
            }

            let delay = backoff.next_delay();
            RECONNECT_ATTEMPTS_TOTAL.inc();
            tracing::info!(
                delay_ms = delay.as_millis() as u64,
                attempt = backoff.attempt(),
                "Reconnecting info channel"
            );

            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    tracing::info!("Supervisor stopped while backing off");
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl std::fmt::Debug for ChannelSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSupervisor")
            .field("channel_config", &self.channel_config)
            .field("backoff_config", &self.backoff_config)
            .field("current", &self.cell.current())
            .finish()
    }
}
