//! Session context: owns the notification services for one logged-in user.
//!
//! Construct once at startup, `login`/`bootstrap` at session start, `logout`
//! at session end.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::client::BackendClient;
use crate::config::Config;
use crate::errors::Result;
use crate::models::notification::NotificationRecord;
use crate::notification::cache::NotificationCache;
use crate::notification::listener::{DeepLinkRouter, NotificationListener};
use crate::notification::push::PushChannelCoordinator;
use crate::platform::PushPlatform;
use crate::store::{KeyValueStore, AUTH_TOKEN_KEY, USER_KEY};

pub struct Session {
    pub client: BackendClient,
    pub storage: Arc<dyn KeyValueStore>,
    pub push: Arc<PushChannelCoordinator>,
    pub cache: Arc<NotificationCache>,
}

impl Session {
    pub fn new(
        config: &Config,
        storage: Arc<dyn KeyValueStore>,
        platform: Arc<dyn PushPlatform>,
    ) -> Result<Self> {
        let client = BackendClient::new(
            &config.api_url,
            storage.clone(),
            Duration::from_secs(config.http_timeout_secs),
            config.http_max_retries,
        )?;
        let push = Arc::new(PushChannelCoordinator::new(
            platform,
            client.clone(),
            storage.clone(),
            config.push_project_id.clone(),
        ));
        let cache = Arc::new(NotificationCache::new(
            client.clone(),
            storage.clone(),
            push.clone(),
        ));

        Ok(Self {
            client,
            storage,
            push,
            cache,
        })
    }

    /// Persist credentials, then bring the notification services up.
    pub async fn login(
        &self,
        auth_token: &str,
        user: Option<Value>,
    ) -> Result<Vec<NotificationRecord>> {
        self.storage
            .set(AUTH_TOKEN_KEY, Value::from(auth_token))
            .await?;
        if let Some(user) = user {
            self.storage.set(USER_KEY, user).await?;
        }
        Ok(self.bootstrap().await)
    }

    /// Register for push, load notifications and sync the badge.
    pub async fn bootstrap(&self) -> Vec<NotificationRecord> {
        match self.push.register_for_push().await {
            Ok(Some(_)) => info!(state = ?self.push.state(), "push ready"),
            Ok(None) => info!("push unavailable for this session"),
            Err(e) => warn!(error = %e, "push registration failed"),
        }

        let records = self.cache.load().await;
        let unread = u32::try_from(self.cache.unread_count().await).unwrap_or(u32::MAX);
        if let Err(e) = self.push.set_badge_count(unread).await {
            warn!(error = %e, "failed to set badge count");
        }
        records
    }

    /// Tear down everything tied to the user. Backend calls are best-effort;
    /// local state is always cleared.
    pub async fn logout(&self) -> Result<()> {
        if let Err(e) = self.push.unregister_push().await {
            warn!(error = %e, "push unregistration failed during logout");
        }
        self.cache.clear_local_cache().await;
        if let Err(e) = self.push.clear_badge_count().await {
            warn!(error = %e, "failed to clear badge count");
        }
        self.storage.remove(AUTH_TOKEN_KEY).await?;
        self.storage.remove(USER_KEY).await?;
        info!("session closed");
        Ok(())
    }

    pub fn listener(&self, router: Arc<dyn DeepLinkRouter>) -> NotificationListener {
        NotificationListener::new(self.cache.clone(), self.push.clone(), router)
    }
}
