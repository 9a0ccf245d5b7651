//! On-disk snapshot schema
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "config": { "maxEntries": 1000, "similarityThreshold": 0.8 },
//!   "entries": [ { "sourceText": "...", "targetLanguage": "ja", ... } ],
//!   "metrics": { "hits": 0, "misses": 0, "fuzzyHits": 0 }
//! }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::entry::CacheEntry;
use crate::error::{Error, Result};

/// Only schema version this build reads and writes
pub const SCHEMA_VERSION: u32 = 1;

/// Default eviction ceiling
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Default minimum fuzzy score
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Point-in-time copy of the cache's entries, configuration and metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Schema version, always [`SCHEMA_VERSION`] when written by this crate
    pub schema_version: u32,

    /// Configuration in effect when the snapshot was taken
    pub config: SnapshotConfig,

    /// Entries ordered least recently used first
    pub entries: Vec<CacheEntry>,

    /// Lookup counters
    pub metrics: SnapshotMetrics,
}

/// Configuration block of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotConfig {
    /// Eviction ceiling
    pub max_entries: usize,
    /// Minimum fuzzy score
    pub similarity_threshold: f64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Persisted lookup counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetrics {
    /// Exact hits
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Fuzzy hits
    pub fuzzy_hits: u64,
}

impl Snapshot {
    /// Snapshot with no entries and zeroed metrics
    pub fn empty(config: SnapshotConfig) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            config,
            entries: Vec::new(),
            metrics: SnapshotMetrics::default(),
        }
    }

    /// Check that the snapshot can rebuild a consistent store.
    ///
    /// Any violation rejects the whole snapshot; nothing is loaded partially.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(Error::CorruptSnapshot(format!(
                "unsupported schema version {} (expected {})",
                self.schema_version, SCHEMA_VERSION
            )));
        }

        let threshold = self.config.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::CorruptSnapshot(format!(
                "similarity threshold {} out of range",
                threshold
            )));
        }

        let mut seen = HashSet::with_capacity(self.entries.len());
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.source_text.trim().is_empty()
                || entry.translation.trim().is_empty()
                || entry.target_language.trim().is_empty()
            {
                return Err(Error::CorruptSnapshot(format!("entry {} has a blank field", i)));
            }
            if entry.created_at > entry.last_access_at {
                return Err(Error::CorruptSnapshot(format!(
                    "entry {} was last accessed before it was created",
                    i
                )));
            }
            if !seen.insert(entry.key()) {
                return Err(Error::CorruptSnapshot(format!(
                    "entry {} duplicates an earlier key",
                    i
                )));
            }
        }

        Ok(())
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty(SnapshotConfig::default())
    }
}
