//! A default in-memory TTL cache (grounded on `toka-store-memory`'s
//! `Arc<RwLock<HashMap<...>>>` shape).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use contracts_types::Contract;

use crate::{CacheKey, ContractCache};

struct Entry {
    contract: Contract,
    expires_at: Instant,
}

/// A single-process, in-memory cache with per-entry TTL. Expired entries are
/// reaped lazily on `get`, matching the "no background sweeper" shape of a
/// read-through cache with I/O-bound call sites.
#[derive(Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<CacheKey, Entry>>>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// The number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl ContractCache for InMemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<Contract> {
        let hit = {
            let entries = self.entries.read().await;
            let entry = entries.get(key)?;
            if entry.expires_at <= Instant::now() {
                None
            } else {
                Some(entry.contract.clone())
            }
        };
        if hit.is_none() {
            self.entries.write().await.remove(key);
        }
        hit
    }

    async fn put(&self, key: CacheKey, contract: Contract, ttl: Duration) {
        self.entries.write().await.insert(key, Entry { contract, expires_at: Instant::now() + ttl });
    }

    async fn invalidate(&self, key: &CacheKey) {
        self.entries.write().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn contract() -> Contract {
        Contract {
            id: Uuid::new_v4(),
            slug: "card-example".into(),
            version: "1.0.0".parse().unwrap(),
            contract_type: "card@1.0.0".into(),
            active: true,
            name: None,
            tags: vec![],
            markers: vec![],
            loop_ref: None,
            links: Default::default(),
            linked_at: Default::default(),
            requires: vec![],
            capabilities: vec![],
            data: json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = InMemoryCache::new();
        let key = CacheKey::ById(Uuid::new_v4());
        cache.put(key.clone(), contract(), Duration::from_secs(60)).await;
        assert!(cache.get(&key).await.is_some());
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        tokio::time::pause();
        let cache = InMemoryCache::new();
        let key = CacheKey::ById(Uuid::new_v4());
        cache.put(key.clone(), contract(), Duration::from_millis(10)).await;
        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = InMemoryCache::new();
        let key = CacheKey::ById(Uuid::new_v4());
        cache.put(key.clone(), contract(), Duration::from_secs(60)).await;
        cache.invalidate(&key).await;
        assert!(cache.get(&key).await.is_none());
    }
}
