use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::errors::Result;

/// Process-local storage. Used in tests and when no storage path is wanted.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[async_trait]
impl super::KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeyValueStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        store.set("auth_token", json!("abc")).await.unwrap();
        assert_eq!(store.get_string("auth_token").await.unwrap(), Some("abc".into()));

        store.remove("auth_token").await.unwrap();
        assert!(store.get("auth_token").await.unwrap().is_none());

        // idempotent
        store.remove("auth_token").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_flag_defaults_to_false() {
        let store = MemoryStore::new();
        assert!(!store.get_flag("local_notified:1:2025-01-01").await.unwrap());
        store.set("local_notified:1:2025-01-01", json!(true)).await.unwrap();
        assert!(store.get_flag("local_notified:1:2025-01-01").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_with_prefix() {
        let store = MemoryStore::new();
        store.set("local_notified:1:2025-01-01", json!(true)).await.unwrap();
        store.set("local_notified:2:2025-01-02", json!(true)).await.unwrap();
        store.set("push_token", json!("tok")).await.unwrap();

        let mut keys = store.keys_with_prefix("local_notified:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["local_notified:1:2025-01-01", "local_notified:2:2025-01-02"]);
    }
}
