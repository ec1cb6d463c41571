//! Cache manager façade
//!
//! [`CacheManager`] is the single owner of the cache database. It is built
//! once at startup and shared by `Arc`; there is no global instance.
//!
//! Each operation opens its own connection, runs, and releases it, so
//! independent requests interleave without a process-wide lock. Apart from
//! [`CacheManager::open`] and [`CacheManager::reset`], operations never
//! return errors: storage faults are logged and reported as a miss, `false`,
//! or an empty collection.

use super::clock::{add_ttl, to_millis, Clock, SystemClock};
use super::content::{StoredContent, CONTEXT_LAYERS, SUMMARIES};
use super::entries::{self, CacheEntry, Lookup};
use super::keys;
use super::schema::{self, CACHE_TABLE};
use super::DEFAULT_SUMMARY_TYPE;
use crate::config::CacheConfig;
use crate::Result;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Row counts of the store plus in-process hit/miss counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub cache_entries: usize,
    pub context_layers: usize,
    pub summaries: usize,
    /// Entries past their TTL that no read or sweep has removed yet
    pub expired_entries: usize,
    /// Cache hits since this manager was opened
    pub hits: u64,
    /// Cache misses (including expired reads) since this manager was opened
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Persistent cache, context-layer and summary store
#[derive(Debug)]
pub struct CacheManager {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheManager {
    /// Open or create the cache database.
    ///
    /// Creates the parent directory, applies pragmas, and initializes the
    /// schema. Fails if the database cannot be opened; callers should abort
    /// startup in that case.
    pub fn open(config: CacheConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open with a custom time source
    pub fn open_with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %config.path.display(), "Opening cache database");

        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(config.busy_timeout())?;

        // journal_mode is persistent, so later connections inherit it
        if config.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }

        schema::init(&conn)?;
        tracing::info!(path = %config.path.display(), "Cache database initialized");

        let manager = Self {
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        };

        if manager.config.sweep_on_open {
            manager.clear_expired();
        }

        Ok(manager)
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Derive a deterministic key from its parts, see [`keys::generate_key`]
    pub fn generate_key<I, S>(&self, parts: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys::generate_key(parts)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.config.path)?;
        conn.busy_timeout(self.config.busy_timeout())?;
        Ok(conn)
    }

    fn now_ms(&self) -> i64 {
        to_millis(self.clock.now())
    }

    /// Run `op`, logging and returning `fallback` on failure
    fn best_effort<T>(&self, op: &'static str, fallback: T, f: impl FnOnce() -> Result<T>) -> T {
        match f() {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(op, error = %e, "Cache operation failed");
                fallback
            }
        }
    }

    // Key/value cache

    /// Look up `key`.
    ///
    /// Returns `None` if the key is absent or expired; an expired row is
    /// deleted as a side effect. A hit bumps `access_count` and
    /// `last_accessed`. Values that do not parse as JSON are returned as
    /// `Value::String`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.best_effort("get", None, || {
            let conn = self.connect()?;
            match entries::touch(&conn, key, self.now_ms())? {
                Lookup::Hit(raw) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key, "Cache hit");
                    Ok(Some(entries::decode_value(raw)))
                }
                Lookup::Expired => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key, "Cache entry expired");
                    Ok(None)
                }
                Lookup::Missing => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(key, "Cache miss");
                    Ok(None)
                }
            }
        })
    }

    /// [`get`](Self::get) and deserialize into `T`; a value of the wrong shape is a miss
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::warn!(key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    /// Store `value` under `key`, replacing any existing entry.
    ///
    /// Expires `ttl` from now, or after the configured default TTL when
    /// `ttl` is `None` or zero. Returns `false` if the write failed.
    pub fn set(
        &self,
        key: &str,
        value: &Value,
        metadata: Option<&Value>,
        ttl: Option<Duration>,
    ) -> bool {
        self.best_effort("set", false, || {
            let encoded = entries::encode_value(value)?;
            let metadata = entries::encode_metadata(metadata)?;
            let now = self.now_ms();
            let ttl = ttl
                .filter(|ttl| !ttl.is_zero())
                .unwrap_or_else(|| self.config.default_ttl());
            let expires_at = add_ttl(now, ttl);

            let conn = self.connect()?;
            entries::upsert(&conn, key, &encoded, metadata.as_deref(), now, expires_at)?;

            tracing::debug!(key, "Cached key");
            Ok(true)
        })
    }

    /// Serialize `value` and [`set`](Self::set) it
    pub fn set_as<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        metadata: Option<&Value>,
        ttl: Option<Duration>,
    ) -> bool {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, &value, metadata, ttl),
            Err(e) => {
                tracing::error!(key, error = %e, "Failed to serialize cache value");
                false
            }
        }
    }

    /// Full entry including statistics, without counting as an access.
    /// Expired entries are not returned.
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        self.best_effort("get_entry", None, || {
            let conn = self.connect()?;
            let now = self.clock.now();
            Ok(entries::peek(&conn, key)?.filter(|entry| !entry.is_expired_at(now)))
        })
    }

    /// Remove `key`. Succeeds whether or not the key existed.
    pub fn delete(&self, key: &str) -> bool {
        self.best_effort("delete", false, || {
            let conn = self.connect()?;
            let removed = entries::delete(&conn, key)?;
            tracing::debug!(key, removed, "Deleted cache key");
            Ok(true)
        })
    }

    /// Keys of all unexpired entries, sorted
    pub fn keys(&self) -> Vec<String> {
        self.best_effort("keys", Vec::new(), || {
            let conn = self.connect()?;
            entries::live_keys(&conn, self.now_ms())
        })
    }

    /// Delete every expired entry and return how many were removed
    pub fn clear_expired(&self) -> usize {
        self.best_effort("clear_expired", 0, || {
            let conn = self.connect()?;
            let removed = entries::delete_expired(&conn, self.now_ms())?;
            tracing::info!(removed, "Cleared expired cache entries");
            Ok(removed)
        })
    }

    /// Bring the cache down to at most `max_entries` rows.
    ///
    /// Expired entries go first, then the least recently accessed ones.
    /// Returns the total number of rows removed.
    pub fn evict_to(&self, max_entries: usize) -> usize {
        self.best_effort("evict_to", 0, || {
            let mut conn = self.connect()?;
            let tx = conn.transaction()?;
            let expired = entries::delete_expired(&tx, self.now_ms())?;
            let evicted = entries::evict_lru(&tx, max_entries)?;
            tx.commit()?;

            tracing::info!(expired, evicted, max_entries, "Evicted cache entries");
            Ok(expired + evicted)
        })
    }

    /// [`evict_to`](Self::evict_to) the configured soft maximum
    pub fn enforce_max_entries(&self) -> usize {
        self.evict_to(self.config.max_entries)
    }

    // Context layers

    /// Save a context layer, replacing any existing `(document_id, layer_type)` row
    pub fn save_context_layer(
        &self,
        document_id: &str,
        layer_type: &str,
        content: &str,
        metadata: Option<&Value>,
    ) -> bool {
        self.best_effort("save_context_layer", false, || {
            let conn = self.connect()?;
            CONTEXT_LAYERS.upsert(&conn, document_id, layer_type, content, metadata, self.now_ms())?;
            tracing::info!(document_id, layer_type, "Saved context layer");
            Ok(true)
        })
    }

    pub fn get_context_layer(&self, document_id: &str, layer_type: &str) -> Option<StoredContent> {
        self.best_effort("get_context_layer", None, || {
            let conn = self.connect()?;
            CONTEXT_LAYERS.get(&conn, document_id, layer_type)
        })
    }

    /// Every layer stored for a document, keyed by layer type
    pub fn get_all_layers(&self, document_id: &str) -> BTreeMap<String, StoredContent> {
        self.best_effort("get_all_layers", BTreeMap::new(), || {
            let conn = self.connect()?;
            CONTEXT_LAYERS.get_all(&conn, document_id)
        })
    }

    /// Remove every context layer of a document
    pub fn delete_context_layers(&self, document_id: &str) -> bool {
        self.best_effort("delete_context_layers", false, || {
            let conn = self.connect()?;
            let removed = CONTEXT_LAYERS.delete_document(&conn, document_id)?;
            tracing::info!(document_id, removed, "Deleted context layers");
            Ok(true)
        })
    }

    // Summaries

    /// Save a summary, replacing any existing `(document_id, summary_type)` row
    pub fn save_summary(
        &self,
        document_id: &str,
        summary_type: &str,
        content: &str,
        metadata: Option<&Value>,
    ) -> bool {
        self.best_effort("save_summary", false, || {
            let conn = self.connect()?;
            SUMMARIES.upsert(&conn, document_id, summary_type, content, metadata, self.now_ms())?;
            tracing::info!(document_id, summary_type, "Saved summary");
            Ok(true)
        })
    }

    pub fn get_summary(&self, document_id: &str, summary_type: &str) -> Option<StoredContent> {
        self.best_effort("get_summary", None, || {
            let conn = self.connect()?;
            SUMMARIES.get(&conn, document_id, summary_type)
        })
    }

    /// The summary of type [`DEFAULT_SUMMARY_TYPE`]
    pub fn get_full_summary(&self, document_id: &str) -> Option<StoredContent> {
        self.get_summary(document_id, DEFAULT_SUMMARY_TYPE)
    }

    /// Remove every summary of a document
    pub fn delete_summaries(&self, document_id: &str) -> bool {
        self.best_effort("delete_summaries", false, || {
            let conn = self.connect()?;
            let removed = SUMMARIES.delete_document(&conn, document_id)?;
            tracing::info!(document_id, removed, "Deleted summaries");
            Ok(true)
        })
    }

    /// Remove a document's context layers and summaries in one transaction.
    /// Cache entries are keyed opaquely and are left to expire.
    pub fn purge_document(&self, document_id: &str) -> bool {
        self.best_effort("purge_document", false, || {
            let mut conn = self.connect()?;
            let tx = conn.transaction()?;
            let layers = CONTEXT_LAYERS.delete_document(&tx, document_id)?;
            let summaries = SUMMARIES.delete_document(&tx, document_id)?;
            tx.commit()?;

            tracing::info!(document_id, layers, summaries, "Purged document artifacts");
            Ok(true)
        })
    }

    // Diagnostics

    /// Row counts for health checks; `None` if the store could not be read
    pub fn get_stats(&self) -> Option<CacheStats> {
        self.best_effort("get_stats", None, || {
            let conn = self.connect()?;
            Ok(Some(CacheStats {
                cache_entries: schema::count_rows(&conn, CACHE_TABLE)?,
                context_layers: schema::count_rows(&conn, CONTEXT_LAYERS.name())?,
                summaries: schema::count_rows(&conn, SUMMARIES.name())?,
                expired_entries: entries::count_expired(&conn, self.now_ms())?,
                hits: self.hits.load(Ordering::Relaxed),
                misses: self.misses.load(Ordering::Relaxed),
            }))
        })
    }

    /// Drop and recreate every table. Intended for test teardown.
    pub fn reset(&self) -> Result<()> {
        tracing::warn!(path = %self.config.path.display(), "Resetting cache database");
        let conn = self.connect()?;
        schema::recreate(&conn)?;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        Ok(())
    }
}
