use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::metrics::{EVENTS_PUBLISHED_TOTAL, FRAMES_DROPPED_TOTAL, FRAMES_RECEIVED_TOTAL};
use crate::observer::{ObserverList, Subscription};

use super::kind::{DecodeError, InfoKind};

/// Single-slot holder of the current [`InfoKind`].
///
/// Starts at [`InfoKind::None`]. Only the channel's receive path can change
/// the value; everyone else reads it or subscribes.
pub struct EventCell {
    current: Mutex<InfoKind>,
    observers: ObserverList<InfoKind>,
    /// Serializes publish turns so fan-out order matches frame order
    turn: ReentrantMutex<()>,
}

impl EventCell {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(InfoKind::None),
            observers: ObserverList::new(),
            turn: ReentrantMutex::new(()),
        }
    }

    /// Latest variant.
    pub fn current(&self) -> InfoKind {
        *self.current.lock()
    }

    /// Register an observer.
    ///
    /// It is called once right away with the current value, then once per
    /// published variant until the handle is dropped.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&InfoKind) + Send + Sync + 'static,
    {
        let _turn = self.turn.lock();
        let observer: Arc<dyn Fn(&InfoKind) + Send + Sync> = Arc::new(observer);
        let subscription = self.observers.subscribe(observer.clone());
        observer(&self.current());
        subscription
    }

    /// Register an observer for variants published from now on.
    ///
    /// Unlike [`subscribe`](Self::subscribe) the current value is not
    /// replayed, for consumers that treat variants as occurrences.
    pub fn subscribe_updates<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&InfoKind) + Send + Sync + 'static,
    {
        let _turn = self.turn.lock();
        self.observers.subscribe(Arc::new(observer))
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }

    /// Decode a text frame and publish it.
    ///
    /// On failure the frame is logged and dropped; the value stays as it
    /// was and no observer runs.
    pub(crate) fn apply_frame(&self, frame: &str) -> Result<InfoKind, DecodeError> {
        FRAMES_RECEIVED_TOTAL.inc();

        match InfoKind::decode(frame) {
            Ok(kind) => {
                self.publish(kind);
                Ok(kind)
            }
            Err(e) => {
                Self::record_drop(&e, frame);
                Err(e)
            }
        }
    }

    pub(crate) fn record_drop(error: &DecodeError, frame: &str) {
        FRAMES_DROPPED_TOTAL.with_label_values(&[error.reason()]).inc();
        tracing::warn!(
            error = %error,
            frame = %frame,
            "Dropping undecodable info frame"
        );
    }

    /// Run `f` as one turn of this cell.
    ///
    /// Publishing and subscribing take the same lock, so nothing else
    /// touches the cell until `f` returns. Re-entrant on the same thread.
    pub(crate) fn with_turn<R>(&self, f: impl FnOnce() -> R) -> R {
        let _turn = self.turn.lock();
        f()
    }

    /// Replace the value and notify every observer before returning.
    pub(crate) fn publish(&self, kind: InfoKind) {
        let _turn = self.turn.lock();
        *self.current.lock() = kind;
        EVENTS_PUBLISHED_TOTAL.with_label_values(&[kind.tag()]).inc();

        tracing::debug!(
            event = %kind,
            subscribers = self.observers.len(),
            "Publishing info event"
        );

        self.observers.notify(&kind);
    }
}

impl Default for EventCell {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCell")
            .field("current", &self.current())
            .field("observers", &self.observers.len())
            .finish()
    }
}
