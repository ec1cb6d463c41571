//! Persistent cache and context-layer store
//!
//! One SQLite file holds three tables:
//! - `cache`: TTL-bounded key/value entries for expensive LLM and embedding results
//! - `context_layers`: per-document layers (local/section/global) used to assemble prompts
//! - `summaries`: per-document summaries produced after ingestion
//!
//! [`CacheManager`] is the only way in. Wrap it in [`AsyncCacheManager`] when
//! calling from async request handlers.

mod clock;
mod content;
mod entries;
mod handle;
mod keys;
mod manager;
mod schema;

pub use clock::{Clock, ManualClock, SystemClock};
pub use content::StoredContent;
pub use entries::CacheEntry;
pub use handle::{AsyncCacheManager, MIN_SWEEP_PERIOD};
pub use keys::generate_key;
pub use manager::{CacheManager, CacheStats};

/// Summary type used when callers do not ask for a specific one
pub const DEFAULT_SUMMARY_TYPE: &str = "full";

/// Conventional context layer types. The store accepts any string.
pub mod layer_types {
    pub const LOCAL: &str = "local";
    pub const SECTION: &str = "section";
    pub const GLOBAL: &str = "global";
}
