//! officelm - cache store for an Office document LLM backend
//!
//! Request handlers for rewrite, summarize, analyze and query endpoints check
//! this cache before calling an LLM or embedding service, and populate it
//! afterwards. Document-processing workflows persist per-document context
//! layers and summaries here.
//!
//! # Architecture
//!
//! - **cache**: SQLite-backed key/value cache, context layers, summaries, and the façade
//! - **config**: YAML configuration with environment overrides
//! - **logging**: tracing subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use officelm::cache::CacheManager;
//! use officelm::config::CacheConfig;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let cache = CacheManager::open(CacheConfig::at("data/cache/summaries.db"))?;
//! let key = cache.generate_key(["summarize", "doc-1", "concise"]);
//!
//! if cache.get(&key).is_none() {
//!     let result = json!({"summary": "..."});
//!     cache.set(&key, &result, None, Some(Duration::from_secs(3600)));
//! }
//! # Ok::<(), officelm::CacheError>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;

// Re-exports
pub use error::{CacheError, Result};
