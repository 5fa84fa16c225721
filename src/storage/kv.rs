//! Key-value store backends.
//!
//! Two interchangeable implementations behind one trait:
//!
//! - [`RemoteKvStore`]: an Upstash-style Redis REST endpoint, one POST
//!   per command with a bearer token. Used when `KV_REST_API_URL` and
//!   `KV_REST_API_TOKEN` are configured.
//! - [`MemoryKvStore`]: a bounded in-process map. Data does not survive
//!   a restart; this is the accepted fallback for deployments without a
//!   configured remote store, so the entry cap is a hard requirement
//!   rather than an optimization.
//!
//! The backend is chosen once at startup and injected as an
//! `Arc<dyn KeyValueStore>`; callers higher up decide how to degrade on
//! [`StoreError`].

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Per-request timeout for the remote store.
const REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a store backend.
///
/// Distinct from "key absent": `get` returns `Ok(None)` for a missing
/// key and `Err` only when the backend itself failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(String),
    #[error("store returned status {0}")]
    BadStatus(u16),
    #[error("store returned an unexpected body: {0}")]
    BadResponse(String),
}

/// Minimal raw string key-value contract shared by both backends.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, or `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value`, overwriting any previous value for `key`.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Returns all keys starting with `prefix`.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

// ============================================================================
// Remote store (Upstash Redis REST protocol)
// ============================================================================

#[derive(Debug, Deserialize)]
struct CommandResponse {
    result: Option<Value>,
}

/// Redis-over-REST store. Each operation is a single POST whose body is
/// a JSON command array, e.g. `["SET", "user:1", "{...}"]`.
#[derive(Debug, Clone)]
pub struct RemoteKvStore {
    url: String,
    token: String,
    client: reqwest::Client,
}

impl RemoteKvStore {
    pub fn new(url: String, token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REMOTE_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");
        Self { url, token, client }
    }

    /// Issues one command and returns the `result` field of the reply.
    async fn command(&self, cmd: &[&str]) -> Result<Option<Value>, StoreError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&cmd)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::BadStatus(status.as_u16()));
        }

        let body: CommandResponse = response
            .json()
            .await
            .map_err(|e| StoreError::BadResponse(e.to_string()))?;
        Ok(body.result)
    }

    /// Sends a Redis `PING`, used by the diagnostics endpoint.
    pub async fn ping(&self) -> Result<(), StoreError> {
        match self.command(&["PING"]).await? {
            Some(Value::String(s)) if s.eq_ignore_ascii_case("pong") => Ok(()),
            other => Err(StoreError::BadResponse(format!("PING reply: {other:?}"))),
        }
    }
}

#[async_trait]
impl KeyValueStore for RemoteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.command(&["GET", key]).await? {
            Some(Value::String(s)) => Ok(Some(s)),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.command(&["SET", key, value]).await?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let pattern = format!("{prefix}*");
        match self.command(&["KEYS", &pattern]).await? {
            Some(Value::Array(items)) => Ok(items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }
}

// ============================================================================
// In-memory fallback store
// ============================================================================

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, String>,
    /// Keys in insertion order; an overwrite keeps the original slot.
    order: VecDeque<String>,
}

/// Bounded in-process store. Once an insert pushes the entry count over
/// the cap, the oldest-inserted keys are evicted until the cap holds
/// again (insertion order, not access order).
#[derive(Debug)]
pub struct MemoryKvStore {
    inner: Mutex<MemoryInner>,
    max_entries: usize,
}

impl MemoryKvStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
            max_entries,
        }
    }

    /// Current number of stored entries.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.entries.insert(key.to_string(), value.to_string()).is_none() {
            inner.order.push_back(key.to_string());
        }
        while inner.entries.len() > self.max_entries {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .order
            .iter()
            .filter(|key| key.starts_with(prefix) && inner.entries.contains_key(*key))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = MemoryKvStore::new(10);
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = MemoryKvStore::new(10);
        store.set("user:1", "{}").await.unwrap();
        assert_eq!(store.get("user:1").await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let store = MemoryKvStore::new(10);
        store.set("k", "one").await.unwrap();
        store.set("k", "two").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("two"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_list_keys_by_prefix() {
        let store = MemoryKvStore::new(10);
        store.set("user:1", "a").await.unwrap();
        store.set("other:2", "b").await.unwrap();
        store.set("user:3", "c").await.unwrap();

        let keys = store.list_keys("user:").await.unwrap();
        assert_eq!(keys, vec!["user:1".to_string(), "user:3".to_string()]);
    }

    #[tokio::test]
    async fn test_eviction_drops_oldest_inserted() {
        let store = MemoryKvStore::new(3);
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        store.set("c", "3").await.unwrap();
        store.set("d", "4").await.unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("d").await.unwrap().as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_size_never_exceeds_cap() {
        let store = MemoryKvStore::new(5);
        for i in 0..50 {
            store.set(&format!("key:{i}"), "v").await.unwrap();
            assert!(store.len() <= 5);
        }
        assert_eq!(store.len(), 5);
        // The five newest survive.
        for i in 45..50 {
            assert!(store.get(&format!("key:{i}")).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_overwrite_keeps_insertion_slot() {
        let store = MemoryKvStore::new(2);
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        // Overwriting "a" does not make it newest.
        store.set("a", "1b").await.unwrap();
        store.set("c", "3").await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("3"));
    }
}
