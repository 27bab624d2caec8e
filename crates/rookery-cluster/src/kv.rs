//! Generic key-value contract over the coordination store.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::ClusterError;

/// A key-value store with leased writes.
///
/// Values expire once their lease runs out; membership relies on that to shed
/// crashed nodes. Implementations must be safe to share across tasks.
#[async_trait]
pub trait KV: Send + Sync {
    /// Store `value` under `key` with a lease of `ttl`.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ClusterError>;

    /// Remove the value stored under `key`.
    async fn del(&self, key: &str) -> Result<(), ClusterError>;

    /// Retrieve all live values whose key starts with `prefix`.
    async fn get_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, ClusterError>;
}

/// In-process [`KV`] honoring the same contract, lease expiry included.
///
/// Backs tests and single-node deployments that have no coordination store.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(expires_at: Instant) -> bool {
        Instant::now() < expires_at
    }
}

#[async_trait]
impl KV for MemoryKv {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ClusterError> {
        let expires_at = Instant::now() + ttl;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ClusterError::Kv("kv lock poisoned".into()))?;
        entries.insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), ClusterError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| ClusterError::Kv("kv lock poisoned".into()))?;
        entries.remove(key);
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, ClusterError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| ClusterError::Kv("kv lock poisoned".into()))?;
        Ok(entries
            .iter()
            .filter(|(k, (_, expires_at))| k.starts_with(prefix) && Self::is_live(*expires_at))
            .map(|(k, (v, _))| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_del() {
        let kv = MemoryKv::new();
        kv.put("memberlist/a1", "10.0.0.1:14369", Duration::from_secs(60))
            .await
            .unwrap();
        kv.put("memberlist/a2", "10.0.0.2:14369", Duration::from_secs(60))
            .await
            .unwrap();
        kv.put("other/x", "y", Duration::from_secs(60)).await.unwrap();

        let members = kv.get_prefix("memberlist/").await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members["memberlist/a1"], "10.0.0.1:14369");

        kv.del("memberlist/a1").await.unwrap();
        let members = kv.get_prefix("memberlist/").await.unwrap();
        assert_eq!(members.len(), 1);
    }

    #[tokio::test]
    async fn test_put_replaces_value_and_lease() {
        let kv = MemoryKv::new();
        kv.put("k", "v1", Duration::from_secs(60)).await.unwrap();
        kv.put("k", "v2", Duration::from_secs(60)).await.unwrap();

        let values = kv.get_prefix("k").await.unwrap();
        assert_eq!(values["k"], "v2");
    }

    #[tokio::test]
    async fn test_lease_expiry() {
        let kv = MemoryKv::new();
        kv.put("k", "v", Duration::from_millis(30)).await.unwrap();

        assert_eq!(kv.get_prefix("k").await.unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(kv.get_prefix("k").await.unwrap().is_empty());
    }
}
