//! Cache configuration file handling
//!
//! Loads and manages the ~/.config/officelm/config.yaml file. Every field has a
//! default, so an empty file (or no file at all) yields a usable configuration.

use crate::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`CacheConfig::path`]
pub const ENV_DB_PATH: &str = "CACHE_DB_PATH";
/// Environment variable overriding [`CacheConfig::default_ttl_secs`]
pub const ENV_TTL: &str = "CACHE_TTL";
/// Environment variable overriding [`CacheConfig::max_entries`]
pub const ENV_MAX_ENTRIES: &str = "MAX_CACHE_SIZE";

/// Cache store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// TTL applied by `set` when the caller passes none
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Soft maximum number of cache entries (advisory, see `CacheManager::evict_to`)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Enable WAL mode for concurrent readers
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// How long a connection waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Sweep expired entries when the store is opened
    #[serde(default = "default_true")]
    pub sweep_on_open: bool,
}

fn default_db_path() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("officelm");
    path.push("cache.db");
    path
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_max_entries() -> usize {
    1000
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            default_ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            wal_mode: true,
            busy_timeout_ms: default_busy_timeout_ms(),
            sweep_on_open: true,
        }
    }
}

impl CacheConfig {
    /// Default configuration with the database at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Override the default TTL. The TTL is kept in whole seconds, so a
    /// fractional part rounds up.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        let secs = ttl.as_secs();
        self.default_ttl_secs = if ttl.subsec_nanos() > 0 {
            secs.saturating_add(1)
        } else {
            secs
        };
        self
    }

    /// Override the soft maximum entry count
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Default TTL as a [`Duration`]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Busy timeout as a [`Duration`]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Load configuration from the default path, falling back to defaults when
    /// the file does not exist. Environment overrides are applied last.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        let config = if path.exists() {
            Self::load(&path)?
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides()
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(CacheError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading cache configuration");

        let content = fs::read_to_string(path)?;
        // An empty YAML document deserializes as unit, not as an empty map
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&content)?
        };

        tracing::debug!(
            db = %config.path.display(),
            ttl_secs = config.default_ttl_secs,
            max_entries = config.max_entries,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving cache configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/officelm/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("officelm");
        path.push("config.yaml");
        path
    }

    /// Apply `CACHE_DB_PATH`, `CACHE_TTL` and `MAX_CACHE_SIZE` from the process environment
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|p| !p.is_empty()) {
            self.path = PathBuf::from(path);
        }

        if let Some(ttl) = lookup(ENV_TTL) {
            self.default_ttl_secs = ttl.trim().parse().map_err(|_| {
                CacheError::Config(format!("{} must be a number of seconds, got '{}'", ENV_TTL, ttl))
            })?;
        }

        if let Some(max) = lookup(ENV_MAX_ENTRIES) {
            self.max_entries = max.trim().parse().map_err(|_| {
                CacheError::Config(format!(
                    "{} must be a non-negative integer, got '{}'",
                    ENV_MAX_ENTRIES, max
                ))
            })?;
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl_secs, 3600);
        assert_eq!(config.max_entries, 1000);
        assert!(config.wal_mode);
        assert!(config.sweep_on_open);
        assert!(config.path.ends_with("officelm/cache.db"));
    }

    #[test]
    fn test_builders() {
        let config = CacheConfig::at("/tmp/x.db")
            .with_default_ttl(Duration::from_secs(60))
            .with_max_entries(5);
        assert_eq!(config.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.default_ttl(), Duration::from_secs(60));
        assert_eq!(config.max_entries, 5);
        assert_eq!(config.busy_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_sub_second_ttl_rounds_up() {
        let config = CacheConfig::at("/tmp/x.db").with_default_ttl(Duration::from_millis(500));
        assert_eq!(config.default_ttl_secs, 1);
        assert!(crate::config::validate_config(&config).is_ok());

        let config = config.with_default_ttl(Duration::from_millis(2_001));
        assert_eq!(config.default_ttl_secs, 3);
    }

    #[test]
    fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = CacheConfig::at("/data/cache/summaries.db").with_max_entries(42);

        config.save(temp_file.path()).unwrap();
        let loaded = CacheConfig::load(temp_file.path()).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "default_ttl_secs: 120\n").unwrap();

        let loaded = CacheConfig::load(temp_file.path()).unwrap();
        assert_eq!(loaded.default_ttl_secs, 120);
        assert_eq!(loaded.max_entries, 1000);
        assert!(loaded.wal_mode);
    }

    #[test]
    fn test_empty_file_is_default() {
        let temp_file = NamedTempFile::new().unwrap();
        let loaded = CacheConfig::load(temp_file.path()).unwrap();
        assert_eq!(loaded, CacheConfig::default());
    }

    #[test]
    fn test_load_missing_file() {
        let result = CacheConfig::load("/nonexistent/officelm/config.yaml");
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_default_path() {
        let path = CacheConfig::default_path();
        assert!(path.ends_with("officelm/config.yaml"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_DB_PATH, "/srv/cache.db"),
            (ENV_TTL, "900"),
            (ENV_MAX_ENTRIES, "250"),
        ]
        .into_iter()
        .collect();

        let config = CacheConfig::default()
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.path, PathBuf::from("/srv/cache.db"));
        assert_eq!(config.default_ttl_secs, 900);
        assert_eq!(config.max_entries, 250);
    }

    #[test]
    fn test_invalid_ttl_override() {
        let result = CacheConfig::default().apply_overrides(|name| {
            (name == ENV_TTL).then(|| "an hour".to_string())
        });
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_no_overrides_is_identity() {
        let config = CacheConfig::at("/tmp/a.db");
        let same = config.clone().apply_overrides(|_| None).unwrap();
        assert_eq!(same, config);
    }
}
