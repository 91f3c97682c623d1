//! Observer registry for sensor notifications.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Subscriber callback. Receives its own clone of each notification.
pub type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Handle returned by `subscribe`. Unique across all registries in the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Subscribers to one notification channel.
///
/// `emit` dispatches to a snapshot of the registry taken when it starts: a
/// callback may subscribe or unsubscribe (itself or others) without deadlocking,
/// and the change applies from the next notification on.
pub struct Subscribers<T> {
    entries: Mutex<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T: Clone> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe_shared(Arc::new(callback))
    }

    pub fn subscribe_shared(&self, callback: Callback<T>) -> SubscriptionId {
        let id = SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, callback));
        id
    }

    /// Returns false when `id` was not registered here.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver `value` to every subscriber, in subscription order. Returns the
    /// number of subscribers notified.
    ///
    /// A panicking subscriber is logged and skipped; later subscribers still run.
    pub fn emit(&self, value: T) -> usize {
        let snapshot: Vec<Callback<T>> = self
            .lock()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in &snapshot {
            let item = value.clone();
            if panic::catch_unwind(AssertUnwindSafe(|| callback(item))).is_err() {
                log::error!("subscriber panicked during dispatch");
            }
        }
        snapshot.len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Callback<T>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}
