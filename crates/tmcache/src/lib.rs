//! # tmcache
//!
//! Translation memory: caches source -> translation pairs so repeated
//! sentences skip the network translator.
//!
//! ## Architecture
//! - **CacheStore**: AHash map + slab-backed linked list, O(1) touch and eviction
//! - **Similarity**: char-level Levenshtein score with a length pre-filter
//! - **CacheStats**: atomic counters, safe to bump from any worker
//! - **Persister**: background thread with debounced, atomic snapshot saves
//! - **TranslationMemory**: facade owning the single-writer lock
//!
//! ```no_run
//! use tmcache::{LookupResult, MemoryConfig, TranslationMemory};
//!
//! let tm = TranslationMemory::open(MemoryConfig::default())?;
//! if let LookupResult::Miss = tm.lookup("Hello world", "ja") {
//!     tm.store("Hello world", "ja", "こんにちは世界")?;
//! }
//! tm.persist_now()?;
//! # Ok::<(), tmcache::Error>(())
//! ```

#![warn(missing_docs)]

mod config;
mod lru;
mod memory;
mod persister;
pub mod similarity;
mod stats;

pub use config::{default_persist_path, MemoryConfig, DEFAULT_SAVE_DEBOUNCE_MS, DEFAULT_SNAPSHOT_FILE};
pub use lru::CacheStore;
pub use memory::{LookupResult, TranslationMemory};
pub use stats::{CacheStats, MetricsSnapshot};
pub use tmstore::{CacheEntry, CacheKey, Error, Result};
