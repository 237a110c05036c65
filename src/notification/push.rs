//! Push channel coordination: token lifecycle, channels, local scheduling
//! and the app badge.
//!
//! Registration state machine per session:
//! `Unregistered → TokenAcquired → Registered → (logout) → Unregistered`.
//! A non-physical device or a denied permission ends in `Unavailable`; the
//! caller may try `register_for_push` again later.

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::api::client::BackendClient;
use crate::errors::Result;
use crate::models::push::{PushRegistration, PushState, PushTokenRequest};
use crate::platform::{
    Importance, LocalNotificationRequest, NotificationChannel, PermissionStatus, PushPlatform,
    Trigger,
};
use crate::store::{KeyValueStore, PUSH_TOKEN_KEY};

pub const DEFAULT_CHANNEL_ID: &str = "default";
/// Heads-up channel for trip status changes.
pub const TRIP_UPDATES_CHANNEL_ID: &str = "trip-updates";

pub struct PushChannelCoordinator {
    platform: Arc<dyn PushPlatform>,
    client: BackendClient,
    storage: Arc<dyn KeyValueStore>,
    project_id: String,
    registration: Mutex<Option<PushRegistration>>,
    state: Mutex<PushState>,
}

impl PushChannelCoordinator {
    pub fn new(
        platform: Arc<dyn PushPlatform>,
        client: BackendClient,
        storage: Arc<dyn KeyValueStore>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            client,
            storage,
            project_id: project_id.into(),
            registration: Mutex::new(None),
            state: Mutex::new(PushState::Unregistered),
        }
    }

    pub fn state(&self) -> PushState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(PushState::Unregistered)
    }

    fn set_state(&self, next: PushState) {
        if let Ok(mut state) = self.state.lock() {
            if *state != next {
                debug!(from = ?*state, to = ?next, "push state transition");
                *state = next;
            }
        }
    }

    /// The in-memory token, without any I/O. `None` until registration
    /// acquired one.
    pub fn get_push_token(&self) -> Option<String> {
        self.registration
            .lock()
            .ok()
            .and_then(|r| r.as_ref().map(|r| r.token.clone()))
    }

    pub fn registration(&self) -> Option<PushRegistration> {
        self.registration.lock().ok().and_then(|r| r.clone())
    }

    /// Acquire a push token and announce it to the backend.
    ///
    /// Returns `Ok(None)` on emulators and when permission is denied. Backend
    /// registration is best-effort: the token is returned (and stays usable
    /// for local notifications) even if the backend call fails.
    pub async fn register_for_push(&self) -> Result<Option<String>> {
        let device = self.platform.device_info();
        if !device.is_physical_device {
            info!("push notifications require a physical device, skipping registration");
            self.set_state(PushState::Unavailable);
            return Ok(None);
        }

        let mut permission = self.platform.permission_status().await?;
        if permission != PermissionStatus::Granted {
            permission = self.platform.request_permission().await?;
        }
        if permission != PermissionStatus::Granted {
            warn!(?permission, "push notification permission not granted");
            self.set_state(PushState::Unavailable);
            return Ok(None);
        }

        let token = self.platform.push_token(&self.project_id).await?;
        let previous = self.storage.get_string(PUSH_TOKEN_KEY).await?;
        self.storage
            .set(PUSH_TOKEN_KEY, Value::from(token.clone()))
            .await?;

        if let Ok(mut registration) = self.registration.lock() {
            *registration = Some(PushRegistration {
                token: token.clone(),
                platform: device.platform,
                registered_at: Utc::now(),
            });
        }
        self.set_state(PushState::TokenAcquired);

        if let Some(stale) = previous.filter(|p| p != &token) {
            if let Err(e) = self.client.unregister_push_token(&stale).await {
                warn!(error = %e, "failed to unregister superseded push token");
            }
        }

        let request = PushTokenRequest {
            token: &token,
            platform: device.platform.as_str(),
            device_type: &device.device_type,
        };
        match self.client.register_push_token(&request).await {
            Ok(()) => {
                self.set_state(PushState::Registered);
                info!(platform = device.platform.as_str(), "push token registered with backend");
            }
            Err(e) => {
                warn!(error = %e, "backend push token registration failed, keeping local token");
            }
        }

        if let Err(e) = self.configure_channels().await {
            warn!(error = %e, "failed to configure notification channels");
        }

        Ok(Some(token))
    }

    async fn configure_channels(&self) -> Result<()> {
        let channels = [
            NotificationChannel {
                id: DEFAULT_CHANNEL_ID.to_string(),
                name: "General".to_string(),
                importance: Importance::Default,
                sound: Some("default".to_string()),
                vibration_pattern: vec![0, 250],
                show_badge: true,
            },
            NotificationChannel {
                id: TRIP_UPDATES_CHANNEL_ID.to_string(),
                name: "Trip updates".to_string(),
                importance: Importance::Max,
                sound: Some("default".to_string()),
                vibration_pattern: vec![0, 250, 250, 250],
                show_badge: true,
            },
        ];
        for channel in &channels {
            self.platform.set_channel(channel).await?;
        }
        Ok(())
    }

    /// Schedule a notification every day at `hour:minute`.
    ///
    /// Any pending notification carrying the same payload `type` is cancelled
    /// first, so at most one instance per type is active. Returns `None` on
    /// invalid input or platform failure.
    pub async fn schedule_daily_notification(
        &self,
        hour: u8,
        minute: u8,
        title: &str,
        body: &str,
        payload: Map<String, Value>,
    ) -> Option<String> {
        if hour > 23 || minute > 59 {
            warn!(hour, minute, "invalid daily notification time");
            return None;
        }

        match self
            .replace_daily(hour, minute, title, body, payload)
            .await
        {
            Ok(id) => {
                info!(hour, minute, id = %id, "daily notification scheduled");
                Some(id)
            }
            Err(e) => {
                warn!(error = %e, "failed to schedule daily notification");
                None
            }
        }
    }

    async fn replace_daily(
        &self,
        hour: u8,
        minute: u8,
        title: &str,
        body: &str,
        payload: Map<String, Value>,
    ) -> Result<String> {
        let request = LocalNotificationRequest {
            title: title.to_string(),
            body: body.to_string(),
            payload,
            channel_id: Some(DEFAULT_CHANNEL_ID.to_string()),
            trigger: Trigger::Daily { hour, minute },
        };

        if let Some(marker) = request.marker() {
            for pending in self.platform.scheduled().await? {
                if pending.request.marker() == Some(marker) {
                    debug!(id = %pending.id, marker, "cancelling previous recurring notification");
                    self.platform.cancel(&pending.id).await?;
                }
            }
        }

        self.platform.schedule(request).await
    }

    /// Fire a one-shot notification now (`delay_secs == 0`) or after a delay.
    pub async fn schedule_local_notification(
        &self,
        title: &str,
        body: &str,
        payload: Map<String, Value>,
        delay_secs: u64,
    ) -> Result<String> {
        let trigger = if delay_secs == 0 {
            Trigger::Immediate
        } else {
            Trigger::AfterSeconds {
                seconds: delay_secs,
            }
        };
        let id = self
            .platform
            .schedule(LocalNotificationRequest {
                title: title.to_string(),
                body: body.to_string(),
                payload,
                channel_id: Some(TRIP_UPDATES_CHANNEL_ID.to_string()),
                trigger,
            })
            .await?;
        debug!(id = %id, delay_secs, "local notification scheduled");
        Ok(id)
    }

    pub async fn get_badge_count(&self) -> Result<u32> {
        self.platform.badge_count().await
    }

    pub async fn set_badge_count(&self, count: u32) -> Result<()> {
        self.platform.set_badge_count(count).await
    }

    /// Called whenever the user opens the notification list.
    pub async fn clear_badge_count(&self) -> Result<()> {
        self.set_badge_count(0).await
    }

    /// Invalidate the token on the backend (best-effort) and forget it locally.
    pub async fn unregister_push(&self) -> Result<()> {
        let token = match self.get_push_token() {
            Some(t) => Some(t),
            None => self.storage.get_string(PUSH_TOKEN_KEY).await?,
        };

        if let Some(token) = &token {
            if let Err(e) = self.client.unregister_push_token(token).await {
                warn!(error = %e, "backend push token unregistration failed");
            }
        }

        self.storage.remove(PUSH_TOKEN_KEY).await?;
        if let Ok(mut registration) = self.registration.lock() {
            *registration = None;
        }
        self.set_state(PushState::Unregistered);
        info!(had_token = token.is_some(), "push unregistered");
        Ok(())
    }
}

impl std::fmt::Debug for PushChannelCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushChannelCoordinator")
            .field("project_id", &self.project_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Build a payload map tagged with `type`, for recurring notifications.
pub fn marker_payload(kind: &str) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("type".into(), Value::from(kind));
    payload
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::models::push::DevicePlatform;
    use crate::platform::simulated::SimulatedPlatform;
    use crate::store::memory::MemoryStore;
    use crate::store::AUTH_TOKEN_KEY;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn coordinator(
        server: &MockServer,
        platform: Arc<SimulatedPlatform>,
    ) -> (PushChannelCoordinator, MemoryStore) {
        let store = MemoryStore::new();
        store.set(AUTH_TOKEN_KEY, json!("t")).await.unwrap();
        let storage: Arc<dyn KeyValueStore> = Arc::new(store.clone());
        let client =
            BackendClient::new(&server.uri(), storage.clone(), Duration::from_secs(2), 0).unwrap();
        (
            PushChannelCoordinator::new(platform, client, storage, "fleet-test"),
            store,
        )
    }

    #[tokio::test]
    async fn test_emulator_returns_none_and_persists_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push-tokens"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let platform = Arc::new(SimulatedPlatform::emulator(DevicePlatform::Android));
        let (push, store) = coordinator(&server, platform.clone()).await;

        assert_eq!(push.register_for_push().await.unwrap(), None);
        assert_eq!(push.state(), PushState::Unavailable);
        assert!(!store.contains(PUSH_TOKEN_KEY));
        assert_eq!(platform.token_requests(), 0);
    }

    #[tokio::test]
    async fn test_registration_configures_channels() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push-tokens"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let platform = Arc::new(SimulatedPlatform::physical(DevicePlatform::Android));
        let (push, store) = coordinator(&server, platform.clone()).await;

        let token = push.register_for_push().await.unwrap().unwrap();
        assert_eq!(push.get_push_token(), Some(token.clone()));
        assert_eq!(push.state(), PushState::Registered);
        assert_eq!(store.get_string(PUSH_TOKEN_KEY).await.unwrap(), Some(token));

        let channels = platform.channels();
        let trip = channels
            .iter()
            .find(|c| c.id == TRIP_UPDATES_CHANNEL_ID)
            .unwrap();
        assert_eq!(trip.importance, Importance::Max);
        assert_eq!(trip.vibration_pattern, vec![0, 250, 250, 250]);
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_local_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push-tokens"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let platform = Arc::new(SimulatedPlatform::physical(DevicePlatform::Ios));
        let (push, _store) = coordinator(&server, platform).await;

        let token = push.register_for_push().await.unwrap();
        assert!(token.is_some());
        assert_eq!(push.state(), PushState::TokenAcquired);
    }

    #[tokio::test]
    async fn test_denied_permission_is_unavailable() {
        let server = MockServer::start().await;
        let platform = Arc::new(
            SimulatedPlatform::physical(DevicePlatform::Android)
                .with_prompt_response(PermissionStatus::Denied),
        );
        let (push, _store) = coordinator(&server, platform).await;

        assert_eq!(push.register_for_push().await.unwrap(), None);
        assert_eq!(push.state(), PushState::Unavailable);
        assert_eq!(push.get_push_token(), None);
    }

    #[tokio::test]
    async fn test_token_service_failure_persists_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push-tokens"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let platform =
            Arc::new(SimulatedPlatform::physical(DevicePlatform::Android).failing_token());
        let (push, store) = coordinator(&server, platform.clone()).await;

        let err = push.register_for_push().await.unwrap_err();
        assert!(matches!(err, AppError::Platform(_)));
        assert_eq!(platform.token_requests(), 1);
        assert_eq!(push.state(), PushState::Unregistered);
        assert!(push.registration().is_none());
        assert!(!store.contains(PUSH_TOKEN_KEY));
        assert!(platform.channels().is_empty());
    }

    #[tokio::test]
    async fn test_granted_permission_skips_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push-tokens"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        // would refuse if prompted
        let platform = Arc::new(
            SimulatedPlatform::physical(DevicePlatform::Ios)
                .with_permission(PermissionStatus::Granted)
                .with_prompt_response(PermissionStatus::Denied),
        );
        let (push, _store) = coordinator(&server, platform).await;

        let token = push.register_for_push().await.unwrap();
        assert!(token.is_some());
        let registration = push.registration().unwrap();
        assert_eq!(Some(registration.token), token);
        assert_eq!(registration.platform, DevicePlatform::Ios);
    }

    #[tokio::test]
    async fn test_daily_reschedule_keeps_single_instance() {
        let server = MockServer::start().await;
        let platform = Arc::new(SimulatedPlatform::physical(DevicePlatform::Android));
        let (push, _store) = coordinator(&server, platform.clone()).await;

        let first = push
            .schedule_daily_notification(6, 0, "t", "b", marker_payload("daily_trip_check"))
            .await;
        let second = push
            .schedule_daily_notification(6, 0, "t", "b", marker_payload("daily_trip_check"))
            .await;
        assert!(first.is_some());
        assert!(second.is_some());
        assert_ne!(first, second);

        let pending = platform.scheduled().await.unwrap();
        let daily: Vec<_> = pending
            .iter()
            .filter(|n| n.request.marker() == Some("daily_trip_check"))
            .collect();
        assert_eq!(daily.len(), 1);
        assert_eq!(Some(daily[0].id.clone()), second);
    }

    #[tokio::test]
    async fn test_daily_rejects_invalid_time() {
        let server = MockServer::start().await;
        let platform = Arc::new(SimulatedPlatform::physical(DevicePlatform::Android));
        let (push, _store) = coordinator(&server, platform).await;

        assert!(push
            .schedule_daily_notification(24, 0, "t", "b", Map::new())
            .await
            .is_none());
        assert!(push
            .schedule_daily_notification(7, 60, "t", "b", Map::new())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_badge_operations() {
        let server = MockServer::start().await;
        let platform = Arc::new(SimulatedPlatform::physical(DevicePlatform::Android));
        let (push, _store) = coordinator(&server, platform).await;

        push.set_badge_count(4).await.unwrap();
        assert_eq!(push.get_badge_count().await.unwrap(), 4);
        push.clear_badge_count().await.unwrap();
        assert_eq!(push.get_badge_count().await.unwrap(), 0);
    }
}
