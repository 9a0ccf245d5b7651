//! LRU store for cache entries
//!
//! Uses an intrusive linked list over a slab for O(1) touch and eviction,
//! plus a per-language index of slots for fuzzy scans.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use ahash::RandomState;
use chrono::{DateTime, Utc};
use tmstore::{CacheEntry, CacheKey};

/// Node in the LRU doubly-linked list
struct Node {
    key: CacheKey,
    entry: CacheEntry,
    /// Logical recency, strictly increasing across touches
    tick: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Bounded store ordered by recency across all languages
///
/// The head of the list is the most recently used entry. Timestamps handed
/// out by the store never go backwards, so list order always agrees with
/// `last_access_at`. Eviction removes the oldest `last_access_at`; among
/// equal timestamps the oldest `created_at` goes first.
pub struct CacheStore {
    map: HashMap<CacheKey, usize, RandomState>,
    languages: HashMap<String, HashSet<usize, RandomState>, RandomState>,
    nodes: Vec<Option<Node>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    capacity: usize,
    tick: u64,
    clock: DateTime<Utc>,
}

impl CacheStore {
    /// Create an empty store holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");

        Self {
            map: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
            languages: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::with_capacity(capacity),
            head: None,
            tail: None,
            free_list: Vec::new(),
            capacity,
            tick: 0,
            clock: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// Rebuild a store from persisted entries, keeping their timestamps
    ///
    /// Entries are replayed oldest first by `(last_access_at, created_at)`;
    /// equal pairs keep their input order. Anything beyond `capacity` is
    /// evicted in LRU order.
    ///
    /// # Returns
    /// * `(CacheStore, usize)` - The store and the number of entries dropped
    pub fn from_entries(capacity: usize, mut entries: Vec<CacheEntry>) -> (Self, usize) {
        let mut store = Self::new(capacity);
        entries.sort_by_key(|e| (e.last_access_at, e.created_at));

        let mut dropped = 0;
        for entry in entries {
            if entry.last_access_at > store.clock {
                store.clock = entry.last_access_at;
            }
            if store.put(entry.key(), entry).is_some() {
                dropped += 1;
            }
        }

        (store, dropped)
    }

    /// Look up an entry and mark it as most recently used
    ///
    /// # Returns
    /// * `Option<CacheEntry>` - A copy of the touched entry
    pub fn lookup(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let idx = *self.map.get(key)?;
        let now = self.now();
        let tick = self.next_tick();

        let node = self.nodes[idx].as_mut()?;
        node.entry.touch(now);
        node.tick = tick;
        let entry = node.entry.clone();

        self.move_to_front(idx);
        Some(entry)
    }

    /// Insert or overwrite an entry, making it the most recently used
    ///
    /// Overwrites keep the existing `created_at` and bump `access_count`.
    /// Inserting into a full store evicts the least recently used entry first.
    ///
    /// # Returns
    /// * `Option<CacheEntry>` - The evicted entry, if any
    pub fn store(&mut self, key: CacheKey, mut entry: CacheEntry) -> Option<CacheEntry> {
        let now = self.now();

        if let Some(&idx) = self.map.get(&key) {
            if let Some(node) = self.nodes[idx].as_mut() {
                node.entry.source_text = entry.source_text;
                node.entry.translation = entry.translation;
                node.entry.touch(now);
            }
            let tick = self.next_tick();
            if let Some(node) = self.nodes[idx].as_mut() {
                node.tick = tick;
            }
            self.move_to_front(idx);
            return None;
        }

        entry.last_access_at = now;
        if entry.created_at > now {
            entry.created_at = now;
        }
        self.put(key, entry)
    }

    /// Copy every entry for one target language, most recently used first
    pub fn entries_for(&self, target_language: &str) -> Vec<CacheEntry> {
        let Some(slots) = self.languages.get(target_language) else {
            return Vec::new();
        };

        let mut nodes: Vec<&Node> = slots
            .iter()
            .filter_map(|&idx| self.nodes[idx].as_ref())
            .collect();
        nodes.sort_by_key(|node| Reverse(node.tick));
        nodes.into_iter().map(|node| node.entry.clone()).collect()
    }

    /// Copy every entry in eviction order: oldest `last_access_at` first,
    /// then oldest `created_at`, then earliest touch
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut nodes: Vec<&Node> = self.nodes.iter().flatten().collect();
        nodes.sort_by_key(|node| (node.entry.last_access_at, node.entry.created_at, node.tick));
        nodes.into_iter().map(|node| node.entry.clone()).collect()
    }

    /// Case-insensitive substring search over source and translation,
    /// most recently used first. Does not touch recency.
    pub fn search(&self, query: &str, limit: usize) -> Vec<CacheEntry> {
        let needle = query.trim().to_lowercase();
        let mut out = Vec::new();
        let mut cursor = self.head;

        while let Some(idx) = cursor {
            if out.len() >= limit {
                break;
            }
            let Some(node) = &self.nodes[idx] else { break };
            if node.entry.source_text.to_lowercase().contains(&needle)
                || node.entry.translation.to_lowercase().contains(&needle)
            {
                out.push(node.entry.clone());
            }
            cursor = node.next;
        }
        out
    }

    /// Get the current number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.map.clear();
        self.languages.clear();
        self.nodes.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
    }

    fn now(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        if now > self.clock {
            self.clock = now;
        }
        self.clock
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Link a new entry at the head, evicting first if full
    fn put(&mut self, key: CacheKey, entry: CacheEntry) -> Option<CacheEntry> {
        if let Some(&idx) = self.map.get(&key) {
            // Only reachable when replaying entries that share a key
            let tick = self.next_tick();
            if let Some(node) = self.nodes[idx].as_mut() {
                node.entry = entry;
                node.tick = tick;
            }
            self.move_to_front(idx);
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.evict()
        } else {
            None
        };

        let tick = self.next_tick();
        let idx = self.alloc_node();
        self.languages
            .entry(key.language().to_string())
            .or_insert_with(|| HashSet::with_hasher(RandomState::new()))
            .insert(idx);
        self.nodes[idx] = Some(Node {
            key: key.clone(),
            entry,
            tick,
            prev: None,
            next: self.head,
        });

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }

        self.map.insert(key, idx);
        evicted
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }

        self.unlink(idx);

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = if let Some(node) = &self.nodes[idx] {
            (node.prev, node.next)
        } else {
            return;
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => {
                self.head = next;
            }
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => {
                self.tail = prev;
            }
        }
    }

    /// Slot holding the entry with the oldest `last_access_at`, ties going
    /// to the oldest `created_at`, then the earliest touch.
    ///
    /// List order is non-decreasing in `last_access_at` from the tail, so
    /// every tied candidate sits in the run at the tail.
    fn eviction_candidate(&self) -> Option<usize> {
        let tail_idx = self.tail?;
        let oldest = self.nodes[tail_idx].as_ref()?.entry.last_access_at;

        let mut best: Option<(usize, (DateTime<Utc>, u64))> = None;
        let mut cursor = Some(tail_idx);
        while let Some(idx) = cursor {
            let Some(node) = &self.nodes[idx] else { break };
            if node.entry.last_access_at != oldest {
                break;
            }
            let rank = (node.entry.created_at, node.tick);
            if best.map_or(true, |(_, best_rank)| rank < best_rank) {
                best = Some((idx, rank));
            }
            cursor = node.prev;
        }

        best.map(|(idx, _)| idx)
    }

    fn evict(&mut self) -> Option<CacheEntry> {
        let victim = self.eviction_candidate()?;
        self.unlink(victim);
        let node = self.nodes[victim].take()?;

        self.map.remove(&node.key);
        if let Some(slots) = self.languages.get_mut(node.key.language()) {
            slots.remove(&victim);
            if slots.is_empty() {
                self.languages.remove(node.key.language());
            }
        }
        self.free_list.push(victim);

        Some(node.entry)
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }
}
