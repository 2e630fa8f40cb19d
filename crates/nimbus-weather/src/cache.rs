//! In-memory response cache with a fixed time-to-live.
//!
//! There is no background timer: an expired entry is dropped the next time
//! it is looked up, or on an explicit [`TimeBoxedCache::purge_expired`].

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Default time-to-live for cached responses (10 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    payload: V,
    inserted_at: Instant,
}

#[derive(Debug)]
pub struct TimeBoxedCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    ttl: Duration,
}

impl<K, V> Default for TimeBoxedCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<K, V> TimeBoxedCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a copy of the payload if it is still fresh.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let fresh = self
            .entries
            .get(key)
            .map(|entry| entry.inserted_at.elapsed() < self.ttl)?;

        if fresh {
            self.entries.get(key).map(|entry| entry.payload.clone())
        } else {
            self.entries.remove(key);
            None
        }
    }

    pub fn set(&mut self, key: K, payload: V) {
        self.entries.insert(
            key,
            CacheEntry {
                payload,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Removes every entry whose key matches `predicate`, returning how many went.
    pub fn clear_matching<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        before - self.entries.len()
    }

    /// Drops expired entries now instead of waiting for the next lookup.
    pub fn purge_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
        before - self.entries.len()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
