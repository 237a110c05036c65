//! Device notification platform abstraction.
//!
//! Covers the pieces of the OS push/local-notification API the core needs:
//! permissions, the delivery token, channels, scheduling and the app badge.

pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::Result;
use crate::models::push::DevicePlatform;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// False on emulators and simulators, where push delivery is unavailable.
    pub is_physical_device: bool,
    pub platform: DevicePlatform,
    pub device_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Min,
    Low,
    Default,
    High,
    /// Heads-up delivery.
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    pub importance: Importance,
    pub sound: Option<String>,
    /// Alternating wait/vibrate durations in milliseconds.
    pub vibration_pattern: Vec<u64>,
    pub show_badge: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Immediate,
    AfterSeconds { seconds: u64 },
    /// Fires every day at the given local wall-clock time, whether or not the
    /// app process is running.
    Daily { hour: u8, minute: u8 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalNotificationRequest {
    pub title: String,
    pub body: String,
    pub payload: Map<String, Value>,
    pub channel_id: Option<String>,
    pub trigger: Trigger,
}

impl LocalNotificationRequest {
    /// The `type` tag in the payload, used to identify recurring notifications.
    pub fn marker(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub id: String,
    pub request: LocalNotificationRequest,
}

/// Abstraction over the OS notification APIs.
/// Implementations: SimulatedPlatform (in-memory).
#[async_trait]
pub trait PushPlatform: Send + Sync {
    fn device_info(&self) -> DeviceInfo;

    async fn permission_status(&self) -> Result<PermissionStatus>;

    /// Prompt the user. Returns the resulting status.
    async fn request_permission(&self) -> Result<PermissionStatus>;

    /// Fetch the delivery token scoped to `project_id`.
    async fn push_token(&self, project_id: &str) -> Result<String>;

    /// Create or update a channel. Idempotent per channel id.
    async fn set_channel(&self, channel: &NotificationChannel) -> Result<()>;

    /// Returns the platform's identifier for the scheduled notification.
    async fn schedule(&self, request: LocalNotificationRequest) -> Result<String>;

    async fn cancel(&self, id: &str) -> Result<()>;

    /// Pending (not yet fired or recurring) notifications.
    async fn scheduled(&self) -> Result<Vec<ScheduledNotification>>;

    async fn badge_count(&self) -> Result<u32>;

    async fn set_badge_count(&self, count: u32) -> Result<()>;
}
