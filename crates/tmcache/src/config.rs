//! Translation memory configuration

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tmstore::{Error, Result, SnapshotConfig, DEFAULT_MAX_ENTRIES, DEFAULT_SIMILARITY_THRESHOLD};

/// Snapshot file name used by the default persist path
pub const DEFAULT_SNAPSHOT_FILE: &str = "tm_cache.json";

/// Default minimum interval between automatic saves
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 2000;

/// Options recognized by [`crate::TranslationMemory`]
///
/// Deserializes from camelCase JSON; missing fields take their defaults and
/// `"persistPath": null` disables persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryConfig {
    /// Eviction ceiling
    pub max_entries: usize,

    /// Minimum fuzzy score to report a match
    pub similarity_threshold: f64,

    /// Snapshot location, `None` keeps the cache in memory only
    pub persist_path: Option<PathBuf>,

    /// Minimum interval between automatic saves, in milliseconds
    pub save_debounce_ms: u64,

    /// Restore hit/miss counters from the snapshot on load
    pub persist_metrics: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            persist_path: Some(default_persist_path()),
            save_debounce_ms: DEFAULT_SAVE_DEBOUNCE_MS,
            persist_metrics: true,
        }
    }
}

impl MemoryConfig {
    /// Defaults with persistence disabled
    pub fn in_memory() -> Self {
        Self {
            persist_path: None,
            ..Self::default()
        }
    }

    /// Read a JSON config file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{:?}: {}", path.as_ref(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the eviction ceiling
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the minimum fuzzy score
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Persist snapshots to `path`
    pub fn with_persist_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    /// Set the minimum interval between automatic saves
    pub fn with_save_debounce(mut self, interval: Duration) -> Self {
        self.save_debounce_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Choose whether counters survive restarts
    pub fn with_persist_metrics(mut self, persist_metrics: bool) -> Self {
        self.persist_metrics = persist_metrics;
        self
    }

    /// Minimum interval between automatic saves
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::Config("maxEntries must be greater than 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::Config(format!(
                "similarityThreshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }

    pub(crate) fn snapshot_config(&self) -> SnapshotConfig {
        SnapshotConfig {
            max_entries: self.max_entries,
            similarity_threshold: self.similarity_threshold,
        }
    }
}

/// `tm_cache.json` in the platform data directory, or the working directory
/// when no home directory can be resolved
pub fn default_persist_path() -> PathBuf {
    ProjectDirs::from("", "", "tmcache")
        .map(|dirs| dirs.data_dir().join(DEFAULT_SNAPSHOT_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = MemoryConfig::default();

        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(config.save_debounce(), Duration::from_secs(2));
        assert!(config.persist_metrics);
        assert!(config
            .persist_path
            .unwrap()
            .ends_with(DEFAULT_SNAPSHOT_FILE));
        assert!(MemoryConfig::in_memory().persist_path.is_none());
    }

    #[test]
    fn test_validate() {
        assert!(MemoryConfig::in_memory().validate().is_ok());
        assert!(MemoryConfig::in_memory().with_max_entries(0).validate().is_err());
        assert!(MemoryConfig::in_memory()
            .with_similarity_threshold(1.5)
            .validate()
            .is_err());
        assert!(MemoryConfig::in_memory()
            .with_similarity_threshold(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_json_file_partial() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tm.json");
        fs::write(
            &path,
            r#"{ "maxEntries": 50, "saveDebounceMs": 100, "persistPath": null }"#,
        )
        .unwrap();

        let config = MemoryConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_entries, 50);
        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(config.save_debounce(), Duration::from_millis(100));
        assert!(config.persist_path.is_none());
    }

    #[test]
    fn test_from_json_file_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tm.json");
        fs::write(&path, r#"{ "similarityThreshold": -0.1 }"#).unwrap();

        assert!(matches!(
            MemoryConfig::from_json_file(&path),
            Err(Error::Config(_))
        ));
    }
}
