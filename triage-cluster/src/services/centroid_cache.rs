//! Run-scoped centroid cache
//!
//! Bridges the cluster engine's output to the persistence writer without
//! hauling large vectors through the orchestration data plane. Entries are
//! keyed by run id and always deleted explicitly at run completion; the TTL
//! is purely a safety net for runs that die without cleanup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

struct CacheEntry {
    centroids: HashMap<Uuid, Vec<f32>>,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

/// In-process keyed store: run id → {cluster id → centroid}
#[derive(Clone, Default)]
pub struct CentroidCache {
    entries: Arc<RwLock<HashMap<Uuid, CacheEntry>>>,
}

impl CentroidCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one run's centroids, replacing any previous entry for the run.
    ///
    /// Also sweeps out entries whose TTL has lapsed, so abandoned runs do
    /// not accumulate.
    pub async fn put(&self, run_id: Uuid, centroids: HashMap<Uuid, Vec<f32>>, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !entry.is_expired());
        entries.insert(
            run_id,
            CacheEntry {
                centroids,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Fetch one run's centroids; absent or expired entries return None
    pub async fn get(&self, run_id: Uuid) -> Option<HashMap<Uuid, Vec<f32>>> {
        let entries = self.entries.read().await;
        entries
            .get(&run_id)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.centroids.clone())
    }

    /// Drop one run's entry. Safe to call for runs that never stored one.
    pub async fn delete(&self, run_id: Uuid) {
        self.entries.write().await.remove(&run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centroids() -> HashMap<Uuid, Vec<f32>> {
        let mut map = HashMap::new();
        map.insert(Uuid::new_v4(), vec![1.0, 0.0]);
        map
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let cache = CentroidCache::new();
        let run_id = Uuid::new_v4();

        cache
            .put(run_id, centroids(), Duration::from_secs(60))
            .await;
        assert!(cache.get(run_id).await.is_some());

        cache.delete(run_id).await;
        assert!(cache.get(run_id).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent() {
        let cache = CentroidCache::new();
        let run_id = Uuid::new_v4();

        cache.put(run_id, centroids(), Duration::ZERO).await;
        assert!(cache.get(run_id).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_unknown_run_is_noop() {
        let cache = CentroidCache::new();
        cache.delete(Uuid::new_v4()).await;
    }
}
