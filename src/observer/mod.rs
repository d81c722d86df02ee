//! Ordered observer lists with RAII subscription handles.
//!
//! Both the event cell and the notification mailbox own one of these. There
//! is no global registry: every stateful component keeps its own list and
//! fans out to it synchronously after each mutation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Callback invoked with the component's new state.
pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifier of one registration inside an [`ObserverList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

trait Detach: Send + Sync {
    fn detach(&self, id: SubscriptionId);
}

struct Registry<T: ?Sized> {
    entries: Mutex<Vec<(SubscriptionId, Observer<T>)>>,
    next_id: AtomicU64,
}

impl<T: ?Sized> Detach for Registry<T> {
    fn detach(&self, id: SubscriptionId) {
        self.entries.lock().retain(|(entry_id, _)| *entry_id != id);
    }
}

/// Observers in registration order.
pub struct ObserverList<T: ?Sized> {
    registry: Arc<Registry<T>>,
}

impl<T: ?Sized + 'static> ObserverList<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                entries: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register an observer at the end of the list.
    ///
    /// The observer stays registered until the returned handle is dropped
    /// or [`Subscription::unsubscribe`] is called.
    pub fn subscribe(&self, observer: Observer<T>) -> Subscription {
        let id = SubscriptionId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry.entries.lock().push((id, observer));

        let registry: Arc<dyn Detach> = self.registry.clone();
        Subscription {
            id,
            registry: Arc::downgrade(&registry),
            active: true,
        }
    }

    /// Call every observer with `value`, in registration order.
    ///
    /// The list is snapshotted first, so observers may subscribe or
    /// unsubscribe while being notified. Changes apply from the next call.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Observer<T>> = self
            .registry
            .entries
            .lock()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();

        for observer in snapshot {
            observer(value);
        }
    }

    pub fn len(&self) -> usize {
        self.registry.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized + 'static> Default for ObserverList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for ObserverList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("observers", &self.registry.entries.lock().len())
            .finish()
    }
}

/// Handle returned by `subscribe`. Dropping it unsubscribes.
#[must_use = "dropping a Subscription immediately unsubscribes the observer"]
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<dyn Detach>,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the observer now.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        // The owning component may already be gone
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
