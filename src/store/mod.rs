//! Durable key-value storage used by the notification core.
//!
//! Holds the auth token and cached user profile (written by the login flow),
//! the last registered push token, and per-day dedup markers for locally
//! synthesized notifications.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;

pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const USER_KEY: &str = "user";
pub const PUSH_TOKEN_KEY: &str = "push_token";

/// Abstraction over the device's lightweight persistent storage.
/// Implementations: FileStore (JSON document on disk), MemoryStore.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .get(key)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    async fn get_flag(&self, key: &str) -> Result<bool> {
        Ok(matches!(self.get(key).await?, Some(Value::Bool(true))))
    }
}
