use crate::models::push::DevicePlatform;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the REST backend, e.g. `https://fleet.example.com/api`.
    pub api_url: String,
    /// Path of the JSON document used as durable key-value storage.
    pub storage_path: String,
    /// Project identifier the push token is scoped to.
    pub push_project_id: String,
    pub http_timeout_secs: u64,
    /// Retries for transient backend failures. 0 = no retry middleware effect.
    pub http_max_retries: u32,
    /// The CLI runs on a simulated platform; when false it behaves like an
    /// emulator and push registration is unavailable.
    pub simulate_physical_device: bool,
    pub device_platform: DevicePlatform,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api".into(),
            storage_path: ".fleet-notify.json".into(),
            push_project_id: "fleet-trips".into(),
            http_timeout_secs: 15,
            http_max_retries: 2,
            simulate_physical_device: false,
            device_platform: DevicePlatform::Android,
        }
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = Config::default();

    let api_url = std::env::var("FLEET_API_URL").unwrap_or(defaults.api_url);
    if let Err(e) = url::Url::parse(&api_url) {
        anyhow::bail!("FLEET_API_URL '{}' is not a valid URL: {}", api_url, e);
    }

    Ok(Config {
        api_url,
        storage_path: std::env::var("FLEET_STORAGE_PATH").unwrap_or(defaults.storage_path),
        push_project_id: std::env::var("FLEET_PUSH_PROJECT_ID")
            .unwrap_or(defaults.push_project_id),
        http_timeout_secs: std::env::var("FLEET_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.http_timeout_secs),
        http_max_retries: std::env::var("FLEET_HTTP_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.http_max_retries),
        simulate_physical_device: std::env::var("FLEET_SIMULATE_PHYSICAL_DEVICE")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.simulate_physical_device),
        device_platform: std::env::var("FLEET_DEVICE_PLATFORM")
            .map(|v| DevicePlatform::from(v.as_str()))
            .unwrap_or(defaults.device_platform),
    })
}
