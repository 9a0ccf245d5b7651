//! Lookup statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tmstore::SnapshotMetrics;

/// Lock-free counters shared by every caller of a translation memory
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    fuzzy_hits: AtomicU64,
    evictions: AtomicU64,
    inserts: AtomicU64,
    timed_lookups: AtomicU64,
    latency_nanos: AtomicU64,
}

/// Point-in-time view of [`CacheStats`] plus store occupancy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    /// Exact hits
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Fuzzy hits
    pub fuzzy_hits: u64,
    /// `hits / (hits + misses)`, 0.0 before the first lookup
    pub hit_rate: f64,
    /// `(hits + fuzzy_hits) / lookups`, 0.0 before the first lookup
    pub effective_hit_rate: f64,
    /// Mean lookup latency in this process
    pub avg_latency: Duration,
    /// Entries evicted by the LRU policy
    pub evictions: u64,
    /// New entries inserted (overwrites excluded)
    pub inserts: u64,
    /// Current entry count
    pub size: usize,
    /// Eviction ceiling
    pub max_size: usize,
}

impl MetricsSnapshot {
    /// Total lookups (exact hits, fuzzy hits and misses)
    pub fn lookups(&self) -> u64 {
        self.hits + self.fuzzy_hits + self.misses
    }
}

impl CacheStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an exact hit
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a miss
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fuzzy hit
    pub fn record_fuzzy_hit(&self) {
        self.fuzzy_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long one lookup took
    pub fn record_lookup_latency(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.latency_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.timed_lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an eviction
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an insert
    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total exact hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get total misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get total fuzzy hits
    pub fn fuzzy_hits(&self) -> u64 {
        self.fuzzy_hits.load(Ordering::Relaxed)
    }

    /// Get total evictions
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Get total inserts
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Calculate exact hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Mean lookup latency, zero before the first timed lookup
    pub fn avg_latency(&self) -> Duration {
        let count = self.timed_lookups.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.latency_nanos.load(Ordering::Relaxed) / count)
    }

    /// Build a snapshot for reporting
    pub fn snapshot(&self, size: usize, max_size: usize) -> MetricsSnapshot {
        let hits = self.hits();
        let misses = self.misses();
        let fuzzy_hits = self.fuzzy_hits();
        let lookups = hits + fuzzy_hits + misses;

        MetricsSnapshot {
            hits,
            misses,
            fuzzy_hits,
            hit_rate: if hits + misses == 0 {
                0.0
            } else {
                hits as f64 / (hits + misses) as f64
            },
            effective_hit_rate: if lookups == 0 {
                0.0
            } else {
                (hits + fuzzy_hits) as f64 / lookups as f64
            },
            avg_latency: self.avg_latency(),
            evictions: self.evictions(),
            inserts: self.inserts(),
            size,
            max_size,
        }
    }

    /// Counters that go into a snapshot file
    pub fn persisted(&self) -> SnapshotMetrics {
        SnapshotMetrics {
            hits: self.hits(),
            misses: self.misses(),
            fuzzy_hits: self.fuzzy_hits(),
        }
    }

    /// Seed counters from a loaded snapshot
    pub fn restore(&self, metrics: SnapshotMetrics) {
        self.hits.store(metrics.hits, Ordering::Relaxed);
        self.misses.store(metrics.misses, Ordering::Relaxed);
        self.fuzzy_hits.store(metrics.fuzzy_hits, Ordering::Relaxed);
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.fuzzy_hits.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.timed_lookups.store(0, Ordering::Relaxed);
        self.latency_nanos.store(0, Ordering::Relaxed);
    }
}
