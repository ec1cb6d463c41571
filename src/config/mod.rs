//! Configuration system
//!
//! Loads ~/.config/officelm/config.yaml with support for:
//! - Database location
//! - Default TTL and the advisory entry limit
//! - SQLite tuning (WAL, busy timeout)
//! - Environment overrides (`CACHE_DB_PATH`, `CACHE_TTL`, `MAX_CACHE_SIZE`)

mod cache_config;
pub mod validation;

pub use cache_config::{CacheConfig, ENV_DB_PATH, ENV_MAX_ENTRIES, ENV_TTL};
pub use validation::{validate_config, validate_config_result, ValidationError};
