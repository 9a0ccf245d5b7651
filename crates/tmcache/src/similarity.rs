//! Edit-distance similarity and fuzzy lookup
//!
//! Scores are `1 - levenshtein(a, b) / max(len(a), len(b))`, counted in
//! chars, so CJK text scores per character rather than per byte.

use tmstore::{normalize_text, CacheEntry};

use crate::lru::CacheStore;

/// Levenshtein distance with unit costs for insert, delete and substitute
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    distance(&a, &b)
}

/// Similarity in `[0, 1]`; two empty strings score 1.0
pub fn score(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    score_chars(&a, &b)
}

/// Best entry for `target_language` whose score against `query` reaches `threshold`
///
/// Both sides are normalized before scoring. On equal scores the most
/// recently used entry wins.
///
/// # Returns
/// * `Option<(CacheEntry, f64)>` - The match and its score
pub fn fuzzy_lookup(
    store: &CacheStore,
    query: &str,
    target_language: &str,
    threshold: f64,
) -> Option<(CacheEntry, f64)> {
    let query: Vec<char> = normalize_text(query).chars().collect();
    let mut best: Option<(CacheEntry, f64)> = None;

    // entries_for is ordered most recent first, so a strict `>` keeps the
    // most recent entry among equal scores
    for entry in store.entries_for(target_language) {
        let candidate: Vec<char> = normalize_text(&entry.source_text).chars().collect();

        // distance >= |len(a) - len(b)|, so this bound is never below the real score
        if upper_bound(query.len(), candidate.len()) < threshold {
            continue;
        }

        let s = score_chars(&query, &candidate);
        if s < threshold {
            continue;
        }
        match &best {
            Some((_, best_score)) if s <= *best_score => {}
            _ => best = Some((entry, s)),
        }
    }

    best
}

fn upper_bound(len_a: usize, len_b: usize) -> f64 {
    let longest = len_a.max(len_b);
    if longest == 0 {
        return 1.0;
    }
    1.0 - len_a.abs_diff(len_b) as f64 / longest as f64
}

fn score_chars(a: &[char], b: &[char]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - distance(a, b) as f64 / longest as f64
}

fn distance(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
