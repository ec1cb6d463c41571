//! Async access to the cache manager
//!
//! SQLite calls block. [`AsyncCacheManager`] moves each call onto tokio's
//! blocking pool so request handlers never stall a runtime worker.

use super::content::StoredContent;
use super::manager::{CacheManager, CacheStats};
use crate::config::CacheConfig;
use crate::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Cloneable async handle over a shared [`CacheManager`]
#[derive(Debug, Clone)]
pub struct AsyncCacheManager {
    inner: Arc<CacheManager>,
}

impl AsyncCacheManager {
    pub fn new(manager: CacheManager) -> Self {
        Self {
            inner: Arc::new(manager),
        }
    }

    pub fn from_arc(inner: Arc<CacheManager>) -> Self {
        Self { inner }
    }

    /// Open the database on the blocking pool
    pub async fn open(config: CacheConfig) -> Result<Self> {
        let manager = tokio::task::spawn_blocking(move || CacheManager::open(config)).await??;
        Ok(Self::new(manager))
    }

    /// The underlying synchronous manager
    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.inner
    }

    async fn run<T, F>(&self, op: &'static str, fallback: T, f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&CacheManager) -> T + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || f(&inner)).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(op, error = %e, "Blocking cache task failed");
                fallback
            }
        }
    }

    pub async fn get(&self, key: impl Into<String>) -> Option<Value> {
        let key = key.into();
        self.run("get", None, move |m| m.get(&key)).await
    }

    pub async fn set(
        &self,
        key: impl Into<String>,
        value: Value,
        metadata: Option<Value>,
        ttl: Option<Duration>,
    ) -> bool {
        let key = key.into();
        self.run("set", false, move |m| {
            m.set(&key, &value, metadata.as_ref(), ttl)
        })
        .await
    }

    pub async fn delete(&self, key: impl Into<String>) -> bool {
        let key = key.into();
        self.run("delete", false, move |m| m.delete(&key)).await
    }

    pub async fn keys(&self) -> Vec<String> {
        self.run("keys", Vec::new(), |m| m.keys()).await
    }

    pub async fn clear_expired(&self) -> usize {
        self.run("clear_expired", 0, |m| m.clear_expired()).await
    }

    pub async fn evict_to(&self, max_entries: usize) -> usize {
        self.run("evict_to", 0, move |m| m.evict_to(max_entries)).await
    }

    /// Derive a key; pure computation, no I/O
    pub fn generate_key<I, S>(&self, parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner.generate_key(parts)
    }

    pub async fn save_context_layer(
        &self,
        document_id: impl Into<String>,
        layer_type: impl Into<String>,
        content: impl Into<String>,
        metadata: Option<Value>,
    ) -> bool {
        let (document_id, layer_type, content) =
            (document_id.into(), layer_type.into(), content.into());
        self.run("save_context_layer", false, move |m| {
            m.save_context_layer(&document_id, &layer_type, &content, metadata.as_ref())
        })
        .await
    }

    pub async fn get_context_layer(
        &self,
        document_id: impl Into<String>,
        layer_type: impl Into<String>,
    ) -> Option<StoredContent> {
        let (document_id, layer_type) = (document_id.into(), layer_type.into());
        self.run("get_context_layer", None, move |m| {
            m.get_context_layer(&document_id, &layer_type)
        })
        .await
    }

    pub async fn get_all_layers(
        &self,
        document_id: impl Into<String>,
    ) -> BTreeMap<String, StoredContent> {
        let document_id = document_id.into();
        self.run("get_all_layers", BTreeMap::new(), move |m| {
            m.get_all_layers(&document_id)
        })
        .await
    }

    pub async fn save_summary(
        &self,
        document_id: impl Into<String>,
        summary_type: impl Into<String>,
        content: impl Into<String>,
        metadata: Option<Value>,
    ) -> bool {
        let (document_id, summary_type, content) =
            (document_id.into(), summary_type.into(), content.into());
        self.run("save_summary", false, move |m| {
            m.save_summary(&document_id, &summary_type, &content, metadata.as_ref())
        })
        .await
    }

    pub async fn get_summary(
        &self,
        document_id: impl Into<String>,
        summary_type: impl Into<String>,
    ) -> Option<StoredContent> {
        let (document_id, summary_type) = (document_id.into(), summary_type.into());
        self.run("get_summary", None, move |m| {
            m.get_summary(&document_id, &summary_type)
        })
        .await
    }

    pub async fn purge_document(&self, document_id: impl Into<String>) -> bool {
        let document_id = document_id.into();
        self.run("purge_document", false, move |m| m.purge_document(&document_id))
            .await
    }

    pub async fn get_stats(&self) -> Option<CacheStats> {
        self.run("get_stats", None, |m| m.get_stats()).await
    }

    /// Sweep expired entries every `every` until the returned task is aborted.
    ///
    /// The first sweep runs one full period after the call; opening the
    /// manager already sweeps once. Periods shorter than
    /// [`MIN_SWEEP_PERIOD`] are raised to it.
    pub fn spawn_expiry_sweep(&self, every: Duration) -> JoinHandle<()> {
        let handle = self.clone();
        let every = sweep_period(every);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let removed = handle.clear_expired().await;
                tracing::debug!(removed, "Periodic expiry sweep");
            }
        })
    }
}

/// Shortest interval between periodic expiry sweeps
pub const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

fn sweep_period(every: Duration) -> Duration {
    if every < MIN_SWEEP_PERIOD {
        tracing::warn!(?every, "Expiry sweep period too short, using minimum");
        MIN_SWEEP_PERIOD
    } else {
        every
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use serde_json::json;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> (AsyncCacheManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = CacheConfig::at(dir.path().join("cache.db"));
        let manager = CacheManager::open_with_clock(config, clock.clone()).unwrap();
        (AsyncCacheManager::new(manager), clock)
    }

    #[tokio::test]
    async fn test_open_on_blocking_pool() {
        let dir = TempDir::new().unwrap();
        let cache = AsyncCacheManager::open(CacheConfig::at(dir.path().join("c.db")))
            .await
            .unwrap();
        assert!(cache.manager().path().exists());
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = open(&dir);

        assert!(cache.set("k", json!({"answer": [1, 2]}), None, None).await);
        assert_eq!(cache.get("k").await, Some(json!({"answer": [1, 2]})));
        assert!(cache.delete("k").await);
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_layers_and_summaries() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = open(&dir);

        assert!(cache.save_context_layer("doc", "local", "l", None).await);
        assert!(cache.save_context_layer("doc", "section", "s", None).await);
        assert_eq!(cache.get_all_layers("doc").await.len(), 2);
        assert_eq!(
            cache.get_context_layer("doc", "section").await.unwrap().content,
            "s"
        );

        assert!(cache.save_summary("doc", "full", "sum", Some(json!({"n": 1}))).await);
        let summary = cache.get_summary("doc", "full").await.unwrap();
        assert_eq!(summary.metadata, json!({"n": 1}));

        assert!(cache.purge_document("doc").await);
        let stats = cache.get_stats().await.unwrap();
        assert_eq!(stats.context_layers, 0);
        assert_eq!(stats.summaries, 0);
    }

    #[tokio::test]
    async fn test_concurrent_writers_and_readers() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = open(&dir);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                let key = format!("key{}", i % 4);
                cache.set(key.clone(), json!(i), None, None).await;
                cache.get(key).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_some());
        }

        assert_eq!(cache.keys().await.len(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_reads_count_every_access() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = open(&dir);
        cache.set("hot", json!("v"), None, None).await;

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move { cache.get("hot").await }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), Some(json!("v")));
        }

        let entry = cache.manager().get_entry("hot").unwrap();
        assert_eq!(entry.access_count, 20);
    }

    #[tokio::test]
    async fn test_expiry_sweep_task() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open(&dir);

        cache
            .set("short", json!(1), None, Some(Duration::from_secs(1)))
            .await;
        cache.set("long", json!(2), None, None).await;
        clock.advance(Duration::from_secs(2));

        let sweeper = cache.spawn_expiry_sweep(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        sweeper.abort();

        let stats = cache.get_stats().await.unwrap();
        assert_eq!(stats.cache_entries, 1);
        assert_eq!(stats.expired_entries, 0);
    }

    #[tokio::test]
    async fn test_zero_period_sweep_keeps_running() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open(&dir);

        cache
            .set("short", json!(1), None, Some(Duration::from_secs(1)))
            .await;
        clock.advance(Duration::from_secs(2));

        let sweeper = cache.spawn_expiry_sweep(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!sweeper.is_finished());
        sweeper.abort();

        assert_eq!(cache.get_stats().await.unwrap().cache_entries, 0);
    }

    #[test]
    fn test_sweep_period_floor() {
        assert_eq!(sweep_period(Duration::ZERO), MIN_SWEEP_PERIOD);
        assert_eq!(sweep_period(Duration::from_secs(60)), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_evict_and_clear_expired() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = open(&dir);

        for key in ["a", "b", "c"] {
            cache.set(key, json!(key), None, None).await;
            clock.advance(Duration::from_secs(1));
        }
        assert_eq!(cache.evict_to(1).await, 2);
        assert_eq!(cache.keys().await, vec!["c".to_string()]);

        clock.advance(Duration::from_secs(7200));
        assert_eq!(cache.clear_expired().await, 1);
    }

    #[test]
    fn test_generate_key_is_sync() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = open(&dir);
        assert_eq!(cache.generate_key(["a"]).len(), 64);
    }
}
