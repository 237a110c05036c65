//! Platform listener pipeline.
//!
//! Consumes "received while foregrounded" and "tapped" events from the OS,
//! reconciles the cache, keeps the badge in step with the unread count and
//! routes taps to their deep link. The OS may hand the same response over
//! twice (cold start plus live listener); repeats are dropped by delivery id.

use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cache::NotificationCache;
use super::push::PushChannelCoordinator;
use crate::models::notification::{DeepLink, PushPayload};

/// How many delivery ids are remembered for duplicate suppression.
const SEEN_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Received,
    Tapped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlatformEvent {
    /// Platform identifier of this delivery.
    pub delivery_id: String,
    pub kind: EventKind,
    pub data: Map<String, Value>,
}

/// Navigation side effect for tapped notifications.
pub trait DeepLinkRouter: Send + Sync {
    fn navigate(&self, link: &DeepLink);
}

/// Router that only logs the destination.
#[derive(Debug, Default, Clone)]
pub struct LogRouter;

impl DeepLinkRouter for LogRouter {
    fn navigate(&self, link: &DeepLink) {
        info!(path = %link.path(), "navigating to notification target");
    }
}

pub struct NotificationListener {
    cache: Arc<NotificationCache>,
    push: Arc<PushChannelCoordinator>,
    router: Arc<dyn DeepLinkRouter>,
    seen: Mutex<VecDeque<String>>,
}

impl NotificationListener {
    pub fn new(
        cache: Arc<NotificationCache>,
        push: Arc<PushChannelCoordinator>,
        router: Arc<dyn DeepLinkRouter>,
    ) -> Self {
        Self {
            cache,
            push,
            router,
            seen: Mutex::new(VecDeque::with_capacity(SEEN_CAPACITY)),
        }
    }

    /// Records `delivery_id`; false if it was handled already.
    fn first_delivery(&self, delivery_id: &str) -> bool {
        let Ok(mut seen) = self.seen.lock() else {
            return true;
        };
        if seen.iter().any(|id| id == delivery_id) {
            return false;
        }
        if seen.len() == SEEN_CAPACITY {
            seen.pop_front();
        }
        seen.push_back(delivery_id.to_string());
        true
    }

    /// Handle a single event. Returns the deep link navigated to, if any.
    pub async fn handle(&self, event: PlatformEvent) -> Option<DeepLink> {
        if !self.first_delivery(&event.delivery_id) {
            debug!(delivery_id = %event.delivery_id, "duplicate delivery ignored");
            return None;
        }

        let payload = PushPayload::from_map(&event.data);
        let records = self.cache.load().await;

        let link = match event.kind {
            EventKind::Received => {
                debug!(delivery_id = %event.delivery_id, "notification received in foreground");
                None
            }
            EventKind::Tapped => {
                if let Some(id) = payload.notification_id {
                    let unread = records.iter().any(|r| r.id == id && !r.is_read());
                    if unread {
                        if let Err(e) = self.cache.mark_as_read(id).await {
                            warn!(id, error = %e, "failed to mark tapped notification read");
                        }
                    }
                }
                let link = payload.deep_link();
                self.router.navigate(&link);
                Some(link)
            }
        };

        self.sync_badge().await;
        link
    }

    async fn sync_badge(&self) {
        let unread = self.cache.unread_count().await;
        let count = u32::try_from(unread).unwrap_or(u32::MAX);
        if let Err(e) = self.push.set_badge_count(count).await {
            warn!(error = %e, "failed to update badge count");
        }
    }

    /// Consume events until the sender side is dropped.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<PlatformEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        debug!("notification listener stopped");
    }

    /// Spawn the listener loop. Call this once per session.
    pub fn spawn(self: Arc<Self>, events: mpsc::Receiver<PlatformEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }
}
