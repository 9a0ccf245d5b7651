//! TranslationMemory: exact + fuzzy translation cache with debounced persistence

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tmstore::{
    CacheEntry, CacheKey, Error, PersistenceManager, Result, Snapshot, SCHEMA_VERSION,
};
use tracing::{debug, error, info, warn};

use crate::config::MemoryConfig;
use crate::lru::CacheStore;
use crate::persister::Persister;
use crate::similarity;
use crate::stats::{CacheStats, MetricsSnapshot};

/// Outcome of [`TranslationMemory::lookup`]
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    /// A cached translation was found
    Hit {
        /// Cached translation
        translation: String,
        /// True for an exact key match, false for a fuzzy match
        exact: bool,
        /// Similarity score, present only for fuzzy matches
        score: Option<f64>,
    },
    /// Nothing cached is close enough
    Miss,
}

impl LookupResult {
    /// True for exact and fuzzy hits
    pub fn is_hit(&self) -> bool {
        matches!(self, LookupResult::Hit { .. })
    }

    /// Cached translation, if any
    pub fn translation(&self) -> Option<&str> {
        match self {
            LookupResult::Hit { translation, .. } => Some(translation),
            LookupResult::Miss => None,
        }
    }
}

/// State shared with the background persister
struct Shared {
    store: RwLock<CacheStore>,
    stats: CacheStats,
    config: MemoryConfig,
    persistence: Option<PersistenceManager>,
    /// Serializes saves so snapshots reach disk in the order they were taken
    io_lock: Mutex<()>,
}

impl Shared {
    fn snapshot(&self) -> Snapshot {
        let entries = self.store.read().entries();
        Snapshot {
            schema_version: SCHEMA_VERSION,
            config: self.config.snapshot_config(),
            entries,
            metrics: self.stats.persisted(),
        }
    }

    /// Copy the store under its lock, then write with the lock released.
    /// A failed write is retried once.
    fn flush(&self) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };

        let _io = self.io_lock.lock();
        let snapshot = self.snapshot();

        save_with_retry(persistence.path(), || persistence.save(&snapshot))
    }

    fn flush_logged(&self) {
        if let Err(e) = self.flush() {
            error!("Dropping snapshot save after retry: {}", e);
        }
    }
}

/// Run `save`, retrying exactly once on failure
fn save_with_retry<F>(path: &Path, mut save: F) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    match save() {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!("Snapshot save to {:?} failed, retrying: {}", path, e);
            save()
        }
    }
}

/// Translation memory shared by translation clients and batch workers
///
/// All mutations go through one lock around the store, so concurrent
/// `store` calls for the same key never create duplicates and eviction
/// always sees a consistent view. Saves copy the store under that lock and
/// write to disk after releasing it.
///
/// Construct one instance and hand out `Arc<TranslationMemory>` to callers.
pub struct TranslationMemory {
    shared: Arc<Shared>,
    persister: Option<Persister>,
}

impl TranslationMemory {
    /// Create a translation memory and load its snapshot
    ///
    /// A missing, corrupt or unreadable snapshot yields an empty, ready
    /// cache. Only an invalid `config` is reported as an error.
    ///
    /// # Arguments
    /// * `config` - Capacity, fuzzy threshold and persistence options
    ///
    /// # Returns
    /// * `Result<TranslationMemory>` - Ready-to-use handle
    pub fn open(config: MemoryConfig) -> Result<Self> {
        config.validate()?;

        let stats = CacheStats::new();
        let persistence = config.persist_path.as_ref().map(PersistenceManager::new);
        let store = match &persistence {
            Some(persistence) => Self::load_store(persistence, &config, &stats),
            None => CacheStore::new(config.max_entries),
        };
        let persistent = persistence.is_some();
        let debounce = config.save_debounce();

        let shared = Arc::new(Shared {
            store: RwLock::new(store),
            stats,
            config,
            persistence,
            io_lock: Mutex::new(()),
        });

        let persister = if persistent {
            let flusher = Arc::clone(&shared);
            match Persister::spawn(debounce, move || flusher.flush_logged()) {
                Ok(persister) => Some(persister),
                Err(e) => {
                    warn!("Background saves disabled, persister failed to start: {}", e);
                    None
                }
            }
        } else {
            None
        };

        info!(
            "Translation memory ready: {} entries (max {})",
            shared.store.read().len(),
            shared.config.max_entries
        );

        Ok(Self { shared, persister })
    }

    fn load_store(
        persistence: &PersistenceManager,
        config: &MemoryConfig,
        stats: &CacheStats,
    ) -> CacheStore {
        match persistence.load() {
            Ok(snapshot) => {
                if config.persist_metrics {
                    stats.restore(snapshot.metrics);
                }
                let (store, dropped) = CacheStore::from_entries(config.max_entries, snapshot.entries);
                if dropped > 0 {
                    info!(
                        "Snapshot exceeded maxEntries {}, evicted {} least recently used entries",
                        config.max_entries, dropped
                    );
                }
                store
            }
            Err(e) => {
                warn!(
                    "Starting with an empty translation memory, snapshot at {:?} unusable: {}",
                    persistence.path(),
                    e
                );
                CacheStore::new(config.max_entries)
            }
        }
    }

    /// Look up a translation, exact match first, then fuzzy
    ///
    /// Hits refresh the matched entry's recency.
    pub fn lookup(&self, source_text: &str, target_language: &str) -> LookupResult {
        let started = Instant::now();
        let key = CacheKey::new(target_language, source_text);
        let stats = &self.shared.stats;

        let result = {
            let mut store = self.shared.store.write();

            if let Some(entry) = store.lookup(&key) {
                stats.record_hit();
                LookupResult::Hit {
                    translation: entry.translation,
                    exact: true,
                    score: None,
                }
            } else if let Some((candidate, score)) = similarity::fuzzy_lookup(
                &store,
                key.text(),
                key.language(),
                self.shared.config.similarity_threshold,
            ) {
                store.lookup(&candidate.key());
                stats.record_fuzzy_hit();
                LookupResult::Hit {
                    translation: candidate.translation,
                    exact: false,
                    score: Some(score),
                }
            } else {
                stats.record_miss();
                LookupResult::Miss
            }
        };

        stats.record_lookup_latency(started.elapsed());
        result
    }

    /// Cache a translation and schedule a debounced save
    ///
    /// # Returns
    /// * `Err(Error::Validation)` - Blank source text, translation or language; nothing is stored
    pub fn store(&self, source_text: &str, target_language: &str, translation: &str) -> Result<()> {
        if source_text.trim().is_empty() {
            return Err(Error::Validation("source text is empty".to_string()));
        }
        if translation.trim().is_empty() {
            return Err(Error::Validation("translation is empty".to_string()));
        }
        if target_language.trim().is_empty() {
            return Err(Error::Validation("target language is empty".to_string()));
        }

        let key = CacheKey::new(target_language, source_text);
        let entry = CacheEntry::new(source_text, target_language, translation, Utc::now());

        let (evicted, inserted) = {
            let mut store = self.shared.store.write();
            let before = store.len();
            let evicted = store.store(key, entry);
            let inserted = evicted.is_some() || store.len() > before;
            (evicted, inserted)
        };

        if inserted {
            self.shared.stats.record_insert();
        }
        if let Some(evicted) = evicted {
            self.shared.stats.record_eviction();
            debug!(
                "Evicted least recently used entry ({} chars, {})",
                evicted.source_text.chars().count(),
                evicted.target_language
            );
        }

        if let Some(persister) = &self.persister {
            persister.schedule();
        }
        Ok(())
    }

    /// Empty the store and reset metrics
    ///
    /// The snapshot on disk keeps its contents until the next save.
    pub fn clear_all(&self) {
        let mut store = self.shared.store.write();
        let removed = store.len();
        store.clear();
        self.shared.stats.reset();
        drop(store);

        info!("Cleared translation memory ({} entries)", removed);
    }

    /// Save synchronously, bypassing the debounce
    ///
    /// A no-op when persistence is disabled.
    pub fn persist_now(&self) -> Result<()> {
        if let Some(persister) = &self.persister {
            persister.mark_flushed();
        }
        self.shared.flush().map_err(|e| {
            error!("Explicit snapshot save failed: {}", e);
            e
        })
    }

    /// Current metrics
    pub fn stats(&self) -> MetricsSnapshot {
        let size = self.shared.store.read().len();
        self.shared.stats.snapshot(size, self.shared.config.max_entries)
    }

    /// Substring search over cached sources and translations, most recent first
    pub fn search(&self, query: &str, limit: usize) -> Vec<CacheEntry> {
        self.shared.store.read().search(query, limit)
    }

    /// Current number of entries
    pub fn len(&self) -> usize {
        self.shared.store.read().len()
    }

    /// Check if the memory is empty
    pub fn is_empty(&self) -> bool {
        self.shared.store.read().is_empty()
    }

    /// Configuration in effect
    pub fn config(&self) -> &MemoryConfig {
        &self.shared.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn persistent(path: &Path) -> MemoryConfig {
        MemoryConfig::default()
            .with_persist_path(path)
            .with_save_debounce(Duration::from_secs(60))
    }

    fn sorted_triples(tm: &TranslationMemory) -> Vec<(String, String, String)> {
        let mut triples: Vec<_> = tm
            .search("", usize::MAX)
            .into_iter()
            .map(|e| (e.source_text, e.target_language, e.translation))
            .collect();
        triples.sort();
        triples
    }

    #[test]
    fn test_exact_hit() {
        let tm = TranslationMemory::open(MemoryConfig::in_memory()).unwrap();

        tm.store("Hello world", "ja", "こんにちは世界").unwrap();

        assert_eq!(
            tm.lookup("Hello world", "ja"),
            LookupResult::Hit {
                translation: "こんにちは世界".to_string(),
                exact: true,
                score: None,
            }
        );
        assert_eq!(tm.stats().hits, 1);
    }

    #[test]
    fn test_exact_hit_ignores_formatting() {
        let tm = TranslationMemory::open(MemoryConfig::in_memory()).unwrap();

        tm.store("Hello world", "ja", "こんにちは世界").unwrap();

        match tm.lookup("  hello   WORLD ", "JA") {
            LookupResult::Hit { exact, .. } => assert!(exact),
            LookupResult::Miss => panic!("expected exact hit"),
        }
    }

    #[test]
    fn test_fuzzy_hit() {
        let tm = TranslationMemory::open(MemoryConfig::in_memory()).unwrap();

        tm.store("Hello world", "ja", "こんにちは世界").unwrap();

        match tm.lookup("Helo world", "ja") {
            LookupResult::Hit {
                translation,
                exact,
                score,
            } => {
                assert_eq!(translation, "こんにちは世界");
                assert!(!exact);
                assert!((score.unwrap() - (1.0 - 1.0 / 11.0)).abs() < 1e-9);
            }
            LookupResult::Miss => panic!("expected fuzzy hit"),
        }

        let stats = tm.stats();
        assert_eq!(stats.fuzzy_hits, 1);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_miss() {
        let tm = TranslationMemory::open(MemoryConfig::in_memory()).unwrap();

        tm.store("Hello world", "ja", "こんにちは世界").unwrap();

        assert_eq!(tm.lookup("Completely different sentence", "ja"), LookupResult::Miss);
        assert_eq!(tm.lookup("Hello world", "fr"), LookupResult::Miss);

        let stats = tm.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_store_validation() {
        let tm = TranslationMemory::open(MemoryConfig::in_memory()).unwrap();

        assert!(matches!(tm.store("  ", "ja", "x"), Err(Error::Validation(_))));
        assert!(matches!(tm.store("Hello", "ja", "\n"), Err(Error::Validation(_))));
        assert!(matches!(tm.store("Hello", " ", "x"), Err(Error::Validation(_))));
        assert!(tm.is_empty());
    }

    #[test]
    fn test_lru_example() {
        let config = MemoryConfig::in_memory().with_max_entries(2);
        let tm = TranslationMemory::open(config).unwrap();

        tm.store("a", "ja", "A").unwrap();
        tm.store("b", "ja", "B").unwrap();
        assert!(tm.lookup("a", "ja").is_hit());
        tm.store("c", "ja", "C").unwrap();

        assert_eq!(tm.len(), 2);
        assert_eq!(tm.lookup("a", "ja").translation(), Some("A"));
        assert_eq!(tm.lookup("c", "ja").translation(), Some("C"));
        // Single-char keys never reach the fuzzy threshold
        assert_eq!(tm.lookup("b", "ja"), LookupResult::Miss);
        assert_eq!(tm.stats().evictions, 1);
    }

    #[test]
    fn test_capacity_invariant() {
        let config = MemoryConfig::in_memory().with_max_entries(10);
        let tm = TranslationMemory::open(config).unwrap();

        for i in 0..200 {
            tm.store(&format!("sentence {}", i), "ja", "訳").unwrap();
            assert!(tm.len() <= 10);
        }
        let stats = tm.stats();
        assert_eq!(stats.size, 10);
        assert_eq!(stats.max_size, 10);
        assert_eq!(stats.inserts, 200);
        assert_eq!(stats.evictions, 190);
    }

    #[test]
    fn test_clear_all() {
        let tm = TranslationMemory::open(MemoryConfig::in_memory()).unwrap();

        tm.store("Hello", "ja", "こんにちは").unwrap();
        tm.lookup("Hello", "ja");
        tm.clear_all();

        assert!(tm.is_empty());
        let stats = tm.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.size, 0);
        assert_eq!(tm.lookup("Hello", "ja"), LookupResult::Miss);
    }

    #[test]
    fn test_search() {
        let tm = TranslationMemory::open(MemoryConfig::in_memory()).unwrap();

        tm.store("Good morning", "fr", "Bonjour").unwrap();
        tm.store("Good night", "fr", "Bonne nuit").unwrap();

        assert_eq!(tm.search("bon", 10).len(), 2);
        assert_eq!(tm.search("night", 10)[0].translation, "Bonne nuit");
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let config = MemoryConfig::in_memory().with_max_entries(0);
        assert!(matches!(TranslationMemory::open(config), Err(Error::Config(_))));
    }

    #[test]
    fn test_persist_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tm.json");

        let expected = {
            let tm = TranslationMemory::open(persistent(&path).with_max_entries(3)).unwrap();
            tm.store("one", "ja", "一").unwrap();
            tm.store("two", "ja", "二").unwrap();
            tm.store("one", "fr", "un").unwrap();
            tm.lookup("one", "ja");
            tm.store("three", "ja", "三").unwrap();
            tm.persist_now().unwrap();
            sorted_triples(&tm)
        };
        assert_eq!(expected.len(), 3);

        let reopened = TranslationMemory::open(persistent(&path).with_max_entries(3)).unwrap();
        assert_eq!(sorted_triples(&reopened), expected);
        assert_eq!(reopened.lookup("one", "ja").translation(), Some("一"));
        assert_eq!(reopened.lookup("two", "ja"), LookupResult::Miss);
    }

    #[test]
    fn test_metrics_persist_when_enabled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tm.json");

        {
            let tm = TranslationMemory::open(persistent(&path)).unwrap();
            tm.store("Hello", "ja", "こんにちは").unwrap();
            tm.lookup("Hello", "ja");
            tm.lookup("Goodbye", "ja");
            tm.persist_now().unwrap();
        }

        let restored = TranslationMemory::open(persistent(&path)).unwrap();
        assert_eq!(restored.stats().hits, 1);
        assert_eq!(restored.stats().misses, 1);

        let fresh = TranslationMemory::open(persistent(&path).with_persist_metrics(false)).unwrap();
        assert_eq!(fresh.stats().hits, 0);
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn test_smaller_capacity_trims_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tm.json");

        {
            let tm = TranslationMemory::open(persistent(&path)).unwrap();
            for word in ["alpha", "beta", "gamma", "delta"] {
                tm.store(word, "ja", "x").unwrap();
            }
            tm.persist_now().unwrap();
        }

        let tm = TranslationMemory::open(persistent(&path).with_max_entries(2)).unwrap();
        assert_eq!(tm.len(), 2);
        assert!(tm.lookup("delta", "ja").is_hit());
        assert!(tm.lookup("gamma", "ja").is_hit());
    }

    #[test]
    fn test_corrupt_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tm.json");
        fs::write(&path, b"{\"schemaVersion\": 1, \"entries\": [").unwrap();

        let tm = TranslationMemory::open(persistent(&path)).unwrap();
        assert!(tm.is_empty());

        tm.store("Hello", "ja", "こんにちは").unwrap();
        tm.persist_now().unwrap();
        drop(tm);

        let reopened = TranslationMemory::open(persistent(&path)).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_debounced_save_reaches_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tm.json");
        let config = persistent(&path).with_save_debounce(Duration::from_millis(50));
        let tm = TranslationMemory::open(config).unwrap();

        tm.store("Hello", "ja", "こんにちは").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !path.exists() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        let on_disk = PersistenceManager::new(&path).load().unwrap();
        assert_eq!(on_disk.entries.len(), 1);
        drop(tm);
    }

    #[test]
    fn test_drop_flushes_pending_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tm.json");

        {
            let tm = TranslationMemory::open(persistent(&path)).unwrap();
            tm.store("Hello", "ja", "こんにちは").unwrap();
            assert!(!path.exists());
        }

        let reopened = TranslationMemory::open(persistent(&path)).unwrap();
        assert_eq!(reopened.lookup("Hello", "ja").translation(), Some("こんにちは"));
    }

    #[test]
    fn test_clear_all_keeps_file_until_next_save() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tm.json");

        {
            let tm = TranslationMemory::open(persistent(&path)).unwrap();
            tm.store("Hello", "ja", "こんにちは").unwrap();
            tm.persist_now().unwrap();
            tm.clear_all();
        }
        assert_eq!(TranslationMemory::open(persistent(&path)).unwrap().len(), 1);

        {
            let tm = TranslationMemory::open(persistent(&path)).unwrap();
            tm.clear_all();
            tm.persist_now().unwrap();
        }
        assert!(TranslationMemory::open(persistent(&path)).unwrap().is_empty());
    }

    #[test]
    fn test_save_failure_is_absorbed() {
        let dir = TempDir::new().unwrap();
        // The parent "directory" is a regular file, so every save fails
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let path = blocker.join("tm.json");

        let tm = TranslationMemory::open(persistent(&path)).unwrap();
        tm.store("Hello", "ja", "こんにちは").unwrap();

        assert!(tm.persist_now().is_err());
        assert_eq!(tm.lookup("Hello", "ja").translation(), Some("こんにちは"));

        // Once the disk recovers, the next save carries the in-memory state
        fs::remove_file(&blocker).unwrap();
        tm.persist_now().unwrap();
        let on_disk = PersistenceManager::new(&path).load().unwrap();
        assert_eq!(on_disk.entries.len(), 1);
    }

    #[test]
    fn test_save_retries_once_after_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let path = blocker.join("tm.json");
        let manager = PersistenceManager::new(&path);

        let mut snapshot = Snapshot::default();
        snapshot
            .entries
            .push(CacheEntry::new("Hello", "ja", "こんにちは", Utc::now()));

        let attempts = AtomicUsize::new(0);
        let result = save_with_retry(&path, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            let saved = manager.save(&snapshot);
            if saved.is_err() {
                // Clear the obstruction so the retry can succeed
                fs::remove_file(&blocker).unwrap();
            }
            saved
        });

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(manager.load().unwrap().entries.len(), 1);
    }

    #[test]
    fn test_save_gives_up_after_one_retry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tm.json");

        let attempts = AtomicUsize::new(0);
        let result = save_with_retry(&path, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        });

        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_save_success_does_not_retry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tm.json");

        let attempts = AtomicUsize::new(0);
        save_with_retry(&path, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_distinct_stores() {
        let tm = TranslationMemory::open(MemoryConfig::in_memory()).unwrap();

        thread::scope(|s| {
            for worker in 0..8 {
                let tm = &tm;
                s.spawn(move || {
                    for i in 0..50 {
                        tm.store(&format!("worker {} line {}", worker, i), "ja", "訳")
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(tm.len(), 400);
        for worker in 0..8 {
            for i in 0..50 {
                match tm.lookup(&format!("worker {} line {}", worker, i), "ja") {
                    LookupResult::Hit { exact, .. } => assert!(exact),
                    LookupResult::Miss => panic!("lost entry {} {}", worker, i),
                }
            }
        }
    }

    #[test]
    fn test_concurrent_same_key_stores() {
        let tm = TranslationMemory::open(MemoryConfig::in_memory()).unwrap();

        thread::scope(|s| {
            for worker in 0..8 {
                let tm = &tm;
                s.spawn(move || {
                    for _ in 0..100 {
                        tm.store("Shared sentence", "ja", &format!("訳 {}", worker)).unwrap();
                        tm.lookup("Shared sentence", "ja");
                    }
                });
            }
        });

        assert_eq!(tm.len(), 1);
        assert_eq!(tm.stats().inserts, 1);
    }

    #[test]
    fn test_concurrent_stores_bounded_by_capacity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tm.json");
        let config = persistent(&path)
            .with_max_entries(64)
            .with_save_debounce(Duration::from_millis(5));
        let tm = Arc::new(TranslationMemory::open(config).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let tm = Arc::clone(&tm);
                thread::spawn(move || {
                    for i in 0..100 {
                        tm.store(&format!("{} / {}", worker, i), "de", "x").unwrap();
                        assert!(tm.len() <= 64);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tm.len(), 64);
        tm.persist_now().unwrap();
        let on_disk = PersistenceManager::new(&path).load().unwrap();
        assert_eq!(on_disk.entries.len(), 64);
    }
}
