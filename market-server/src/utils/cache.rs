//! Bounded TTL cache
//!
//! Injected lookup cache (shop owner resolution on the hot transition path).
//! Explicit component rather than module-level state so deployments can size
//! it and tests can construct their own.

use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Lock-free bounded cache with per-entry TTL
///
/// Entries past their TTL are treated as absent and dropped on access. When
/// the map reaches capacity, expired entries are purged first; if the map is
/// still full the insert is skipped — a cache miss costs one query, an
/// unbounded map costs memory.
pub struct TtlCache<K, V> {
    entries: DashMap<K, (V, Instant)>,
    capacity: usize,
    ttl: Duration,
}

impl<K: Eq + Hash + fmt::Debug, V: fmt::Debug> fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.entries)
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            ttl,
        }
    }

    /// Get a live entry, dropping it if expired
    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            let (value, inserted_at) = entry.value();
            if inserted_at.elapsed() < self.ttl {
                return Some(value.clone());
            }
        }
        // Expired (or never present); make sure the stale entry is gone
        self.entries
            .remove_if(key, |_, (_, inserted_at)| inserted_at.elapsed() >= self.ttl);
        None
    }

    /// Insert an entry, evicting expired ones when at capacity
    pub fn insert(&self, key: K, value: V) {
        if self.entries.len() >= self.capacity {
            let ttl = self.ttl;
            self.entries
                .retain(|_, (_, inserted_at)| inserted_at.elapsed() < ttl);
            if self.entries.len() >= self.capacity {
                return;
            }
        }
        self.entries.insert(key, (value, Instant::now()));
    }

    /// Drop one entry (e.g. after an ownership change)
    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
