use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::broadcast;

use mlc_realtime::channel::ChannelSupervisor;
use mlc_realtime::config::Settings;
use mlc_realtime::mailbox::{forward_events, MailboxStats, NotificationMailbox};
use mlc_realtime::telemetry::init_tracing;

/// How often expired notifications are dismissed
const DISMISS_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    init_tracing(settings.log.format);
    tracing::info!(page = %settings.page.url, "Configuration loaded");

    let page = settings.page_location()?;

    // Create mailbox and supervisor
    let mailbox = Arc::new(NotificationMailbox::with_config(settings.mailbox.clone()));
    let supervisor = ChannelSupervisor::new(
        page,
        settings.channel.clone(),
        settings.reconnect.clone(),
    );
    let shutdown_signal = supervisor.shutdown_signal();

    let _event_log = supervisor.subscribe(|kind| {
        tracing::info!(event = %kind, "Info event");
    });
    let _forward = forward_events(&supervisor.events(), mailbox.clone());
    let _pending_log = mailbox.subscribe(|pending| {
        let titles: Vec<&str> = pending.iter().map(|n| n.title()).collect();
        tracing::info!(pending = pending.len(), ?titles, "Pending notifications");
    });
    tracing::info!("Mailbox and supervisor initialized");

    // Start toast expiry in background
    let dismiss_handle = tokio::spawn(dismiss_expired_task(
        mailbox.clone(),
        shutdown_signal.subscribe(),
    ));

    // Start supervisor in background
    let mut supervisor_handle = tokio::spawn(supervisor.run());
    tracing::info!("Info channel supervisor started");

    let joined = tokio::select! {
        _ = shutdown_signal_handler(shutdown_signal.clone()) => None,
        joined = &mut supervisor_handle => Some(joined),
    };
    let joined = match joined {
        Some(joined) => joined,
        None => {
            tracing::info!("Waiting for supervisor to stop...");
            supervisor_handle.await
        }
    };

    // Stops the expiry task when the supervisor ended on its own
    let _ = shutdown_signal.send(());
    let _ = dismiss_handle.await;

    drain(&mailbox);

    if let Err(e) = joined? {
        tracing::error!(error = %e, "Info channel supervisor failed");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Dismiss notifications whose display time has run out
async fn dismiss_expired_task(
    mailbox: Arc<NotificationMailbox>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut timer = tokio::time::interval(DISMISS_INTERVAL);

    // Skip immediate first tick
    timer.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = timer.tick() => {
                for notification in mailbox.dismiss_expired(chrono::Utc::now()) {
                    tracing::info!(%notification, "Notification dismissed");
                }
            }
        }
    }

    tracing::debug!("Expiry task stopped");
}

fn drain(mailbox: &NotificationMailbox) -> MailboxStats {
    while let Some(notification) = mailbox.pull() {
        tracing::info!(%notification, "Unread notification");
    }

    let stats = mailbox.stats();
    tracing::info!(
        pushed = stats.total_pushed,
        pulled = stats.total_pulled,
        dismissed = stats.dismissed,
        history = stats.history,
        "Mailbox drained"
    );
    stats
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop the supervisor, which closes the active channel
    let _ = shutdown_tx.send(());
}
