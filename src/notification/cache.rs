//! In-memory notification cache mirrored from the backend.
//!
//! Reads never fail: a failed `load` keeps serving the last good list.
//! Mutations go to the backend first and are applied locally only after the
//! backend acknowledged them, so a failed call never leaves local state ahead
//! of the server.

use chrono::{Local, NaiveDate, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::observers::{ObserverRegistry, Subscription};
use super::push::PushChannelCoordinator;
use crate::api::client::BackendClient;
use crate::errors::Result;
use crate::models::notification::{
    marker_day, LocalEvent, NotificationRecord, LOCAL_MARKER_PREFIX,
};
use crate::store::KeyValueStore;

pub struct NotificationCache {
    client: BackendClient,
    storage: Arc<dyn KeyValueStore>,
    push: Arc<PushChannelCoordinator>,
    records: RwLock<Vec<NotificationRecord>>,
    observers: ObserverRegistry,
    /// Serializes local synthesis so the dedup check and marker write cannot
    /// interleave.
    local_guard: Mutex<()>,
}

impl NotificationCache {
    pub fn new(
        client: BackendClient,
        storage: Arc<dyn KeyValueStore>,
        push: Arc<PushChannelCoordinator>,
    ) -> Self {
        Self {
            client,
            storage,
            push,
            records: RwLock::new(Vec::new()),
            observers: ObserverRegistry::new(),
            local_guard: Mutex::new(()),
        }
    }

    /// Replace the collection with the server's list and return it.
    ///
    /// Without a stored auth token no request is made. On failure the cache
    /// is left untouched and the previous snapshot is returned.
    pub async fn load(&self) -> Vec<NotificationRecord> {
        if !self.client.has_auth_token().await {
            debug!("no auth token, serving cached notifications");
            return self.get_all().await;
        }

        match self.client.list_notifications().await {
            Ok(fetched) => {
                let mut seen = HashSet::with_capacity(fetched.len());
                let fetched: Vec<_> = fetched.into_iter().filter(|r| seen.insert(r.id)).collect();

                let snapshot = self.apply(|records| *records = fetched).await;
                info!(
                    count = snapshot.len(),
                    unread = snapshot.iter().filter(|r| !r.is_read()).count(),
                    "notifications loaded"
                );
                snapshot
            }
            Err(e) => {
                warn!(
                    error = %e,
                    transient = e.is_transient(),
                    "notification load failed, serving cached data"
                );
                self.get_all().await
            }
        }
    }

    /// Mutate the collection and publish the result. Subscribers run under
    /// the write guard so they observe snapshots in mutation order.
    async fn apply<F>(&self, mutate: F) -> Vec<NotificationRecord>
    where
        F: FnOnce(&mut Vec<NotificationRecord>),
    {
        let mut records = self.records.write().await;
        mutate(&mut records);
        self.observers.notify(&records);
        records.clone()
    }

    pub async fn get_all(&self) -> Vec<NotificationRecord> {
        self.records.read().await.clone()
    }

    pub async fn unread_count(&self) -> usize {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| !r.is_read())
            .count()
    }

    /// Server-side unread count, independent of the local snapshot.
    pub async fn refresh_unread_count_remote(&self) -> Result<u64> {
        self.client.unread_count().await
    }

    pub async fn mark_as_read(&self, id: i64) -> Result<()> {
        self.client.mark_read(id).await?;

        let now = Utc::now();
        self.apply(|records| {
            if let Some(record) = records.iter_mut().find(|r| r.id == id) {
                record.read_at.get_or_insert(now);
            }
        })
        .await;
        debug!(id, "notification marked read");
        Ok(())
    }

    /// All-or-nothing: either every record ends up read or none changes.
    pub async fn mark_all_as_read(&self) -> Result<()> {
        self.client.mark_all_read().await?;

        let now = Utc::now();
        let snapshot = self
            .apply(|records| {
                for record in records.iter_mut() {
                    record.read_at.get_or_insert(now);
                }
            })
            .await;
        debug!(count = snapshot.len(), "all notifications marked read");
        Ok(())
    }

    pub async fn delete_notification(&self, id: i64) -> Result<()> {
        self.client.delete_notification(id).await?;

        self.apply(|records| records.retain(|r| r.id != id)).await;
        debug!(id, "notification deleted");
        Ok(())
    }

    /// Listeners are called synchronously while the cache is locked and must
    /// not call back into it.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[NotificationRecord]) + Send + Sync + 'static,
    {
        self.observers.subscribe(listener)
    }

    /// Synthesize a client-only notification for today's date.
    pub async fn create_local_notification(
        &self,
        event: LocalEvent,
    ) -> Result<Option<NotificationRecord>> {
        self.create_local_notification_on(event, Local::now().date_naive())
            .await
    }

    /// Synthesize a client-only notification, at most once per ticket and
    /// calendar `day`. Returns `None` when the marker for that day is set.
    ///
    /// The marker is written first: if that fails nothing else happens.
    pub async fn create_local_notification_on(
        &self,
        event: LocalEvent,
        day: NaiveDate,
    ) -> Result<Option<NotificationRecord>> {
        let _guard = self.local_guard.lock().await;

        let marker = event.dedup_key(day);
        if self.storage.get_flag(&marker).await? {
            debug!(marker = %marker, "local notification already delivered today");
            return Ok(None);
        }
        self.storage.set(&marker, Value::Bool(true)).await?;

        let mut record = event.to_record(Utc::now());
        self.apply(|records| {
            while records.iter().any(|r| r.id == record.id) {
                record.id += 1;
            }
            records.insert(0, record.clone());
        })
        .await;

        let mut payload = record.data.to_map();
        payload.insert("type".into(), Value::from(record.kind.as_str()));
        if let Err(e) = self
            .push
            .schedule_local_notification(&record.title, &record.message, payload, 0)
            .await
        {
            warn!(error = %e, id = record.id, "failed to deliver local notification");
        }

        info!(id = record.id, ticket_id = event.ticket_id(), "local notification created");
        self.prune_markers_before(day).await;
        Ok(Some(record))
    }

    /// Drop dedup markers for days before `day`; they can never match again.
    async fn prune_markers_before(&self, day: NaiveDate) {
        let keys = match self.storage.keys_with_prefix(LOCAL_MARKER_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to list dedup markers");
                return;
            }
        };
        for key in keys {
            if !marker_day(&key).is_some_and(|d| d < day) {
                continue;
            }
            match self.storage.remove(&key).await {
                Ok(()) => debug!(key = %key, "pruned dedup marker"),
                Err(e) => warn!(key = %key, error = %e, "failed to prune dedup marker"),
            }
        }
    }

    /// Empty the collection on logout. The backend is not touched.
    pub async fn clear_local_cache(&self) {
        self.apply(|records| records.clear()).await;
        debug!("notification cache cleared");
    }
}

// ── Tests ─────────────────────────────────────────────────────
