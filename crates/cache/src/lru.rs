//! Entry-count bounded LRU cache
//!
//! Keeps at most `capacity` entries and evicts the least recently used one
//! when a new entry would exceed that bound.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently in cache
    pub entry_count: usize,

    /// Maximum number of entries
    pub capacity: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses (including lookups of stale entries)
    pub misses: u64,

    /// Number of entries evicted to respect the capacity
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache keyed by `K`.
///
/// # Example
///
/// ```
/// use pagemark_cache::LruCache;
///
/// let mut cache = LruCache::new(2);
/// cache.put("a", 1);
/// cache.put("b", 2);
/// cache.get(&"a");
/// cache.put("c", 3);
///
/// assert!(cache.contains(&"a"));
/// assert!(!cache.contains(&"b"));
/// ```
#[derive(Debug, Clone)]
pub struct LruCache<K, V> {
    entries: HashMap<K, V>,

    /// Most recently used at back, least recently used at front
    lru_queue: VecDeque<K>,

    capacity: usize,
    stats: CacheStats,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            lru_queue: VecDeque::with_capacity(capacity),
            capacity,
            stats: CacheStats { capacity, ..Default::default() },
        }
    }

    fn touch(&mut self, key: &K) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.clone());
    }

    fn evict_lru(&mut self) -> Option<(K, V)> {
        let key = self.lru_queue.pop_front()?;
        let value = self.entries.remove(&key)?;
        self.stats.evictions += 1;
        self.stats.entry_count = self.entries.len();
        Some((key, value))
    }

    /// Look up an entry, marking it most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.entries.contains_key(key) {
            self.stats.hits += 1;
            self.touch(key);
            self.entries.get(key)
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// Look up an entry without touching recency or statistics
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace an entry. Returns the evicted entries, oldest first.
    pub fn put(&mut self, key: K, value: V) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.capacity {
                match self.evict_lru() {
                    Some(entry) => evicted.push(entry),
                    None => break,
                }
            }
        }

        self.touch(&key);
        self.entries.insert(key, value);
        self.stats.entry_count = self.entries.len();
        evicted
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        self.stats.entry_count = self.entries.len();
        Some(value)
    }

    /// Keep only entries whose key satisfies `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.entries.retain(|key, _| keep(key));
        let entries = &self.entries;
        self.lru_queue.retain(|key| entries.contains_key(key));
        self.stats.entry_count = self.entries.len();
    }

    /// Iterate over keys from least to most recently used
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.lru_queue.iter()
    }

    /// Change the bound, evicting as needed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.stats.capacity = self.capacity;
        while self.entries.len() > self.capacity {
            if self.evict_lru().is_none() {
                break;
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru_queue.clear();
        self.stats.entry_count = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats {
            entry_count: self.entries.len(),
            capacity: self.capacity,
            ..Default::default()
        };
    }
}
