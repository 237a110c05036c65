use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

use super::{
    DeviceInfo, LocalNotificationRequest, NotificationChannel, PermissionStatus, PushPlatform,
    ScheduledNotification, Trigger,
};
use crate::errors::{AppError, Result};
use crate::models::push::DevicePlatform;
use crate::store::KeyValueStore;

/// Storage key holding the simulated device between process runs.
pub const DEVICE_STATE_KEY: &str = "simulated_device";

/// The parts of the device that outlive a process: what the OS would keep
/// across app launches. Delivered notifications are gone once shown.
#[derive(Debug, Serialize, Deserialize)]
struct SavedDevice {
    permission: PermissionStatus,
    token: String,
    #[serde(default)]
    channels: Vec<NotificationChannel>,
    #[serde(default)]
    scheduled: Vec<ScheduledNotification>,
    #[serde(default)]
    badge: u32,
}

struct SimState {
    permission: PermissionStatus,
    /// What the user answers when prompted.
    prompt_response: PermissionStatus,
    token: String,
    fail_token: bool,
    token_requests: u32,
    channels: Vec<NotificationChannel>,
    scheduled: Vec<ScheduledNotification>,
    delivered: Vec<LocalNotificationRequest>,
    badge: u32,
}

/// In-memory platform. Immediate notifications are recorded as delivered,
/// everything else stays pending until cancelled.
pub struct SimulatedPlatform {
    info: DeviceInfo,
    state: Mutex<SimState>,
}

impl SimulatedPlatform {
    /// A physical device whose user grants permission when prompted.
    pub fn physical(platform: DevicePlatform) -> Self {
        Self::build(true, platform)
    }

    /// An emulator: push delivery is unavailable.
    pub fn emulator(platform: DevicePlatform) -> Self {
        Self::build(false, platform)
    }

    fn build(is_physical_device: bool, platform: DevicePlatform) -> Self {
        Self {
            info: DeviceInfo {
                is_physical_device,
                platform,
                device_type: "phone".to_string(),
            },
            state: Mutex::new(SimState {
                permission: PermissionStatus::Undetermined,
                prompt_response: PermissionStatus::Granted,
                token: new_token(),
                fail_token: false,
                token_requests: 0,
                channels: Vec::new(),
                scheduled: Vec::new(),
                delivered: Vec::new(),
                badge: 0,
            }),
        }
    }

    pub fn with_prompt_response(self, response: PermissionStatus) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.prompt_response = response;
        }
        self
    }

    pub fn with_permission(self, status: PermissionStatus) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.permission = status;
        }
        self
    }

    pub fn failing_token(self) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.fail_token = true;
        }
        self
    }

    /// Simulates the OS issuing a fresh token (e.g. after reinstall).
    pub fn rotate_token(&self) -> Option<String> {
        let mut s = self.state.lock().ok()?;
        s.token = new_token();
        Some(s.token.clone())
    }

    pub fn token_requests(&self) -> u32 {
        self.state.lock().map(|s| s.token_requests).unwrap_or(0)
    }

    pub fn channels(&self) -> Vec<NotificationChannel> {
        self.state.lock().map(|s| s.channels.clone()).unwrap_or_default()
    }

    pub fn delivered(&self) -> Vec<LocalNotificationRequest> {
        self.state.lock().map(|s| s.delivered.clone()).unwrap_or_default()
    }

    /// Restore the device saved by `save_to`. Without a saved entry the
    /// device stays fresh.
    pub async fn load_from(&self, storage: &dyn KeyValueStore) -> Result<()> {
        let Some(value) = storage.get(DEVICE_STATE_KEY).await? else {
            return Ok(());
        };
        let saved: SavedDevice = serde_json::from_value(value)?;

        let mut s = self.state()?;
        s.permission = saved.permission;
        s.token = saved.token;
        s.channels = saved.channels;
        s.scheduled = saved.scheduled;
        s.badge = saved.badge;
        Ok(())
    }

    pub async fn save_to(&self, storage: &dyn KeyValueStore) -> Result<()> {
        let saved = {
            let s = self.state()?;
            SavedDevice {
                permission: s.permission,
                token: s.token.clone(),
                channels: s.channels.clone(),
                scheduled: s.scheduled.clone(),
                badge: s.badge,
            }
        };
        storage
            .set(DEVICE_STATE_KEY, serde_json::to_value(saved)?)
            .await
    }

    fn state(&self) -> Result<MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Platform("simulated platform state poisoned".into()))
    }
}

fn new_token() -> String {
    format!("SimPushToken[{}]", uuid::Uuid::new_v4().simple())
}

#[async_trait]
impl PushPlatform for SimulatedPlatform {
    fn device_info(&self) -> DeviceInfo {
        self.info.clone()
    }

    async fn permission_status(&self) -> Result<PermissionStatus> {
        Ok(self.state()?.permission)
    }

    async fn request_permission(&self) -> Result<PermissionStatus> {
        let mut s = self.state()?;
        // the OS only prompts once
        if s.permission == PermissionStatus::Undetermined {
            s.permission = s.prompt_response;
        }
        Ok(s.permission)
    }

    async fn push_token(&self, project_id: &str) -> Result<String> {
        let mut s = self.state()?;
        s.token_requests += 1;
        if s.fail_token {
            return Err(AppError::Platform(format!(
                "token service unavailable for project '{}'",
                project_id
            )));
        }
        Ok(s.token.clone())
    }

    async fn set_channel(&self, channel: &NotificationChannel) -> Result<()> {
        let mut s = self.state()?;
        s.channels.retain(|c| c.id != channel.id);
        s.channels.push(channel.clone());
        Ok(())
    }

    async fn schedule(&self, request: LocalNotificationRequest) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut s = self.state()?;
        if matches!(request.trigger, Trigger::Immediate) {
            s.delivered.push(request);
        } else {
            s.scheduled.push(ScheduledNotification {
                id: id.clone(),
                request,
            });
        }
        Ok(id)
    }

    async fn cancel(&self, id: &str) -> Result<()> {
        self.state()?.scheduled.retain(|n| n.id != id);
        Ok(())
    }

    async fn scheduled(&self) -> Result<Vec<ScheduledNotification>> {
        Ok(self.state()?.scheduled.clone())
    }

    async fn badge_count(&self) -> Result<u32> {
        Ok(self.state()?.badge)
    }

    async fn set_badge_count(&self, count: u32) -> Result<()> {
        self.state()?.badge = count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::Map;

    fn request(trigger: Trigger) -> LocalNotificationRequest {
        LocalNotificationRequest {
            title: "t".into(),
            body: "b".into(),
            payload: Map::new(),
            channel_id: None,
            trigger,
        }
    }

    #[tokio::test]
    async fn test_permission_prompt_only_answers_once() {
        let platform = SimulatedPlatform::physical(DevicePlatform::Android)
            .with_prompt_response(PermissionStatus::Denied);
        assert_eq!(
            platform.permission_status().await.unwrap(),
            PermissionStatus::Undetermined
        );
        assert_eq!(
            platform.request_permission().await.unwrap(),
            PermissionStatus::Denied
        );
        assert_eq!(
            platform.permission_status().await.unwrap(),
            PermissionStatus::Denied
        );
    }

    #[tokio::test]
    async fn test_immediate_is_delivered_and_delayed_is_pending() {
        let platform = SimulatedPlatform::physical(DevicePlatform::Ios);
        platform.schedule(request(Trigger::Immediate)).await.unwrap();
        let id = platform
            .schedule(request(Trigger::AfterSeconds { seconds: 30 }))
            .await
            .unwrap();

        assert_eq!(platform.delivered().len(), 1);
        assert_eq!(platform.scheduled().await.unwrap().len(), 1);

        platform.cancel(&id).await.unwrap();
        assert!(platform.scheduled().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_device_state_survives_restart() {
        let store = MemoryStore::new();

        let before = SimulatedPlatform::physical(DevicePlatform::Android);
        before.request_permission().await.unwrap();
        before.set_badge_count(5).await.unwrap();
        before
            .schedule(request(Trigger::Daily { hour: 6, minute: 0 }))
            .await
            .unwrap();
        before.schedule(request(Trigger::Immediate)).await.unwrap();
        let token = before.push_token("proj").await.unwrap();
        before.save_to(&store).await.unwrap();

        let after = SimulatedPlatform::physical(DevicePlatform::Android);
        after.load_from(&store).await.unwrap();
        assert_eq!(after.badge_count().await.unwrap(), 5);
        assert_eq!(after.scheduled().await.unwrap(), before.scheduled().await.unwrap());
        assert_eq!(after.push_token("proj").await.unwrap(), token);
        assert_eq!(
            after.permission_status().await.unwrap(),
            PermissionStatus::Granted
        );
        assert!(after.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_load_without_saved_device_keeps_fresh_state() {
        let platform = SimulatedPlatform::physical(DevicePlatform::Ios);
        platform.load_from(&MemoryStore::new()).await.unwrap();
        assert_eq!(platform.badge_count().await.unwrap(), 0);
        assert_eq!(
            platform.permission_status().await.unwrap(),
            PermissionStatus::Undetermined
        );
    }

    #[tokio::test]
    async fn test_token_rotation() {
        let platform = SimulatedPlatform::physical(DevicePlatform::Android);
        let first = platform.push_token("proj").await.unwrap();
        let rotated = platform.rotate_token().unwrap();
        assert_ne!(first, rotated);
        assert_eq!(platform.push_token("proj").await.unwrap(), rotated);
        assert_eq!(platform.token_requests(), 2);
    }
}
