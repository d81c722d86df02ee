//! Notification mailbox for user-facing messages.
//!
//! An ordered pending queue consumed by `pull`, plus a history log that
//! records every push and is never consumed. The mailbox knows nothing
//! about the event channel; [`forward_events`] is the optional glue.

mod bridge;
mod types;

pub use bridge::{forward_events, notification_for};
pub use types::{Notification, NotificationLevel};

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};

use crate::metrics::{
    MAILBOX_PENDING, MAILBOX_RESETS_TOTAL, NOTIFICATIONS_PULLED_TOTAL, NOTIFICATIONS_PUSHED_TOTAL,
};
use crate::observer::{Observer, ObserverList, Subscription};

/// Configuration for the mailbox
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Maximum history entries to keep. `None` keeps everything.
    #[serde(default)]
    pub history_limit: Option<usize>,
}

/// Counters describing the mailbox
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MailboxStats {
    pub pending: usize,
    pub history: usize,
    pub total_pushed: u64,
    pub total_pulled: u64,
    pub resets: u64,
    pub dismissed: u64,
    pub history_evicted: u64,
    pub history_limit: Option<usize>,
}

#[derive(Debug, Default)]
struct MailboxState {
    pending: VecDeque<Notification>,
    history: VecDeque<Notification>,
    total_pushed: u64,
    total_pulled: u64,
    resets: u64,
    dismissed: u64,
    history_evicted: u64,
}

impl MailboxState {
    fn pending_snapshot(&self) -> Vec<Notification> {
        self.pending.iter().cloned().collect()
    }
}

/// FIFO mailbox with an append-only history.
///
/// Every operation is one turn: the mutation and the fan-out to observers
/// finish before the next operation on this mailbox starts. Observers are
/// called after the state lock is released, so they may read the mailbox.
///
/// # Example
///
/// ```rust
/// use mlc_realtime::mailbox::{Notification, NotificationMailbox};
///
/// let mailbox = NotificationMailbox::new();
/// mailbox.push(Notification::info("Saved", "Project saved"));
///
/// let n = mailbox.pull().unwrap();
/// assert_eq!(n.title(), "Saved");
/// assert!(mailbox.pull().is_none());
/// assert_eq!(mailbox.history_len(), 1);
/// ```
pub struct NotificationMailbox {
    state: Mutex<MailboxState>,
    observers: ObserverList<[Notification]>,
    turn: ReentrantMutex<()>,
    config: MailboxConfig,
}

impl NotificationMailbox {
    pub fn new() -> Self {
        Self::with_config(MailboxConfig::default())
    }

    pub fn with_config(config: MailboxConfig) -> Self {
        Self {
            state: Mutex::new(MailboxState::default()),
            observers: ObserverList::new(),
            turn: ReentrantMutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &MailboxConfig {
        &self.config
    }

    /// Append to the pending queue and to history in one step.
    pub fn push(&self, notification: Notification) {
        let _turn = self.turn.lock();

        let snapshot = {
            let mut state = self.state.lock();
            state.pending.push_back(notification.clone());
            state.history.push_back(notification);
            state.total_pushed += 1;

            if let Some(limit) = self.config.history_limit {
                while state.history.len() > limit {
                    if let Some(evicted) = state.history.pop_front() {
                        state.history_evicted += 1;
                        tracing::debug!(
                            notification_id = %evicted.id(),
                            history_limit = limit,
                            "Evicted oldest notification from history"
                        );
                    }
                }
            }

            state.pending_snapshot()
        };

        NOTIFICATIONS_PUSHED_TOTAL.inc();
        MAILBOX_PENDING.set(snapshot.len() as i64);
        tracing::debug!(pending = snapshot.len(), "Notification pushed");

        self.observers.notify(&snapshot);
    }

    /// Remove and return the oldest pending notification.
    ///
    /// `None` means the queue is empty; that is a normal outcome.
    pub fn pull(&self) -> Option<Notification> {
        let _turn = self.turn.lock();

        let (pulled, snapshot) = {
            let mut state = self.state.lock();
            let pulled = state.pending.pop_front()?;
            state.total_pulled += 1;
            (pulled, state.pending_snapshot())
        };

        NOTIFICATIONS_PULLED_TOTAL.inc();
        MAILBOX_PENDING.set(snapshot.len() as i64);
        tracing::debug!(
            notification_id = %pulled.id(),
            pending = snapshot.len(),
            "Notification pulled"
        );

        self.observers.notify(&snapshot);
        Some(pulled)
    }

    /// Drop every pending notification. History is kept.
    pub fn reset(&self) {
        let _turn = self.turn.lock();

        let cleared = {
            let mut state = self.state.lock();
            let cleared = state.pending.len();
            state.pending.clear();
            if cleared > 0 {
                state.resets += 1;
            }
            cleared
        };

        if cleared == 0 {
            return;
        }

        MAILBOX_RESETS_TOTAL.inc();
        MAILBOX_PENDING.set(0);
        tracing::debug!(cleared = cleared, "Pending notifications reset");

        self.observers.notify(&[]);
    }

    /// Drop notifications from the front of the queue whose display time
    /// has run out by `now`.
    ///
    /// Stops at the first one still showing, so the queue stays in push
    /// order. Observers are notified once if anything was removed.
    pub fn dismiss_expired(&self, now: DateTime<Utc>) -> Vec<Notification> {
        let _turn = self.turn.lock();

        let (dismissed, snapshot) = {
            let mut state = self.state.lock();
            let mut dismissed = Vec::new();
            while state.pending.front().is_some_and(|n| n.is_expired_at(now)) {
                if let Some(n) = state.pending.pop_front() {
                    dismissed.push(n);
                }
            }
            state.dismissed += dismissed.len() as u64;
            (dismissed, state.pending_snapshot())
        };

        if dismissed.is_empty() {
            return dismissed;
        }

        MAILBOX_PENDING.set(snapshot.len() as i64);
        tracing::debug!(
            dismissed = dismissed.len(),
            pending = snapshot.len(),
            "Expired notifications dismissed"
        );

        self.observers.notify(&snapshot);
        dismissed
    }

    /// Observe the pending queue.
    ///
    /// Called once right away with the current queue, then after every
    /// push, successful pull and non-empty reset.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&[Notification]) + Send + Sync + 'static,
    {
        let _turn = self.turn.lock();
        let observer: Observer<[Notification]> = Arc::new(observer);
        let subscription = self.observers.subscribe(observer.clone());
        let snapshot = self.state.lock().pending_snapshot();
        observer(&snapshot);
        subscription
    }

    pub fn pending(&self) -> Vec<Notification> {
        self.state.lock().pending_snapshot()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_len() == 0
    }

    /// Every retained notification ever pushed, oldest first.
    pub fn history(&self) -> Vec<Notification> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn stats(&self) -> MailboxStats {
        let state = self.state.lock();
        MailboxStats {
            pending: state.pending.len(),
            history: state.history.len(),
            total_pushed: state.total_pushed,
            total_pulled: state.total_pulled,
            resets: state.resets,
            dismissed: state.dismissed,
            history_evicted: state.history_evicted,
            history_limit: self.config.history_limit,
        }
    }
}

impl Default for NotificationMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NotificationMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationMailbox")
            .field("stats", &self.stats())
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Shorthand for pushing notifications of a given level.
pub trait NotificationSink {
    fn notify(&self, notification: Notification);

    fn info(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(Notification::info(title, message));
    }

    fn warning(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(Notification::warning(title, message));
    }

    fn error(&self, title: impl Into<String>, message: impl Into<String>) {
        self.notify(Notification::error(title, message));
    }
}

impl NotificationSink for NotificationMailbox {
    fn notify(&self, notification: Notification) {
        self.push(notification);
    }
}

impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification);
    }
}
