//! Observer registry for cache snapshots.

use std::sync::{Arc, Mutex, Weak};

use crate::models::notification::NotificationRecord;

pub type Listener = Arc<dyn Fn(&[NotificationRecord]) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Ordered list of snapshot listeners. Notification order is registration
/// order.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[NotificationRecord]) + Send + Sync + 'static,
    {
        let mut id = 0;
        if let Ok(mut registry) = self.inner.lock() {
            registry.next_id += 1;
            id = registry.next_id;
            registry.listeners.push((id, Arc::new(listener)));
        }
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every listener with `snapshot`. The registry lock is released
    /// before calling out, so a listener may unsubscribe itself.
    pub fn notify(&self, snapshot: &[NotificationRecord]) {
        let listeners: Vec<Listener> = match self.inner.lock() {
            Ok(registry) => registry.listeners.iter().map(|(_, l)| l.clone()).collect(),
            Err(_) => return,
        };
        for listener in listeners {
            listener(snapshot);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|r| r.listeners.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by `subscribe`. Dropping it does not unsubscribe.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Safe to call any number of times, including after the registry is gone.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.registry.upgrade() {
            if let Ok(mut registry) = inner.lock() {
                registry.listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
