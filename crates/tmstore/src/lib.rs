//! # tmstore
//!
//! Entry model and durable snapshots for the TMCache translation memory.
//!
//! ## Contents
//! - **CacheEntry / CacheKey**: cached pairs keyed by language + normalized text
//! - **Snapshot**: versioned JSON schema, validated wholesale on load
//! - **PersistenceManager**: atomic temp-file-and-rename saves

#![warn(missing_docs)]

mod entry;
mod error;
mod snapshot;
mod storage;

pub use entry::{normalize_language, normalize_text, CacheEntry, CacheKey};
pub use error::{Error, Result};
pub use snapshot::{
    Snapshot, SnapshotConfig, SnapshotMetrics, DEFAULT_MAX_ENTRIES,
    DEFAULT_SIMILARITY_THRESHOLD, SCHEMA_VERSION,
};
pub use storage::PersistenceManager;
