use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePlatform {
    Android,
    Ios,
    Web,
    Unknown,
}

impl DevicePlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            DevicePlatform::Android => "android",
            DevicePlatform::Ios => "ios",
            DevicePlatform::Web => "web",
            DevicePlatform::Unknown => "unknown",
        }
    }
}

impl From<&str> for DevicePlatform {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => DevicePlatform::Android,
            "ios" => DevicePlatform::Ios,
            "web" => DevicePlatform::Web,
            _ => DevicePlatform::Unknown,
        }
    }
}

/// The push token currently active for this process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRegistration {
    pub token: String,
    pub platform: DevicePlatform,
    pub registered_at: DateTime<Utc>,
}

/// Body of `POST /push-tokens`.
#[derive(Debug, Clone, Serialize)]
pub struct PushTokenRequest<'a> {
    pub token: &'a str,
    pub platform: &'a str,
    pub device_type: &'a str,
}

/// Per-session push lifecycle.
///
/// `Unavailable` is terminal for the session until the caller invokes
/// registration again (e.g. after the user changed OS settings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushState {
    Unregistered,
    TokenAcquired,
    Registered,
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parsing() {
        assert_eq!(DevicePlatform::from("iOS"), DevicePlatform::Ios);
        assert_eq!(DevicePlatform::from(" android "), DevicePlatform::Android);
        assert_eq!(DevicePlatform::from("tizen"), DevicePlatform::Unknown);
    }

    #[test]
    fn test_token_request_body() {
        let body = PushTokenRequest {
            token: "ExponentPushToken[abc]",
            platform: DevicePlatform::Ios.as_str(),
            device_type: "phone",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["token"], "ExponentPushToken[abc]");
        assert_eq!(json["platform"], "ios");
        assert_eq!(json["device_type"], "phone");
    }
}
