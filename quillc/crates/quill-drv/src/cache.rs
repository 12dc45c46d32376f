//! The compiled-statement cache.
//!
//! Process-wide and LRU-bounded. A key is the pair (canonical unparse
//! of the statement, environment fingerprint); a hit means the
//! previously printed output is still valid and the statement's
//! bindings can be republished without recompiling or re-evaluating.
//! Statements that register session-level state (datatypes, aliases,
//! overload families and instances) are never cached - replaying them
//! in a fresh session would skip the registration.

use crate::session::PrintedBinding;
use quill_eval::Value;
use quill_typ::Scheme;
use quill_util::Symbol;

/// Cache key: canonical statement text plus environment fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub canonical: String,
    pub fingerprint: u64,
}

/// A replayable statement outcome
#[derive(Clone)]
pub struct CachedStatement {
    pub printed: Vec<PrintedBinding>,
    pub bindings: Vec<(Symbol, Scheme, Value)>,
}

/// LRU cache with a fixed upper bound
pub struct StatementCache {
    /// Most recently used last
    entries: Vec<(CacheKey, CachedStatement)>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl StatementCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a key, refreshing its recency on a hit
    pub fn lookup(&mut self, key: &CacheKey) -> Option<CachedStatement> {
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(index) => {
                self.hits += 1;
                let entry = self.entries.remove(index);
                let cached = entry.1.clone();
                self.entries.push(entry);
                Some(cached)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Insert, evicting the least recently used entry past capacity
    pub fn insert(&mut self, key: CacheKey, cached: CachedStatement) {
        if self.capacity == 0 {
            return;
        }
        if let Some(index) = self.entries.iter().position(|(k, _)| *k == key) {
            self.entries.remove(index);
        }
        self.entries.push((key, cached));
        while self.entries.len() > self.capacity {
            self.entries.remove(0);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str, fingerprint: u64) -> CacheKey {
        CacheKey {
            canonical: text.to_string(),
            fingerprint,
        }
    }

    fn entry() -> CachedStatement {
        CachedStatement {
            printed: Vec::new(),
            bindings: Vec::new(),
        }
    }

    #[test]
    fn test_miss_then_hit() {
        let mut cache = StatementCache::new(4);
        assert!(cache.lookup(&key("val x = 1", 0)).is_none());
        cache.insert(key("val x = 1", 0), entry());
        assert!(cache.lookup(&key("val x = 1", 0)).is_some());
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_fingerprint_participates_in_key() {
        let mut cache = StatementCache::new(4);
        cache.insert(key("val x = 1", 0), entry());
        assert!(cache.lookup(&key("val x = 1", 1)).is_none());
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = StatementCache::new(2);
        cache.insert(key("a", 0), entry());
        cache.insert(key("b", 0), entry());
        // Touch `a` so `b` becomes the eviction candidate.
        assert!(cache.lookup(&key("a", 0)).is_some());
        cache.insert(key("c", 0), entry());
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&key("b", 0)).is_none());
        assert!(cache.lookup(&key("a", 0)).is_some());
        assert!(cache.lookup(&key("c", 0)).is_some());
    }

    #[test]
    fn test_zero_capacity_disables() {
        let mut cache = StatementCache::new(0);
        cache.insert(key("a", 0), entry());
        assert!(cache.is_empty());
    }
}
