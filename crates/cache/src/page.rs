//! Composited page cache with per-page dirty tracking
//!
//! Entries are keyed by page, zoom and rotation. A page marked dirty misses
//! on lookup for every zoom/rotation until a fresh composite is stored.

use crate::lru::{CacheStats, LruCache};
use std::collections::HashSet;

/// Identifies one composited rendering of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderKey {
    pub page_index: u32,
    /// Bit pattern of the zoom factor, so the key can be hashed exactly
    zoom_bits: u32,
    /// Clockwise rotation in degrees
    pub rotation: u16,
}

impl RenderKey {
    pub fn new(page_index: u32, zoom: f32, rotation: u16) -> Self {
        Self { page_index, zoom_bits: zoom.to_bits(), rotation }
    }

    pub fn zoom(&self) -> f32 {
        f32::from_bits(self.zoom_bits)
    }
}

/// LRU cache of composited pages plus the set of pages needing recomposition
#[derive(Debug, Clone)]
pub struct PageRenderCache<V> {
    entries: LruCache<RenderKey, V>,
    dirty: HashSet<u32>,
}

impl<V: Clone> PageRenderCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self { entries: LruCache::new(capacity), dirty: HashSet::new() }
    }

    /// Cached value for `key`, unless its page is dirty
    pub fn lookup(&mut self, key: &RenderKey) -> Option<V> {
        if self.dirty.contains(&key.page_index) {
            // Drop the stale entry; the lookup below then records the miss.
            self.entries.remove(key);
            return self.entries.get(key).cloned();
        }
        let value = self.entries.get(key).cloned();
        if value.is_some() {
            log::debug!(
                "render cache hit: page {} zoom {} rotation {}",
                key.page_index,
                key.zoom(),
                key.rotation
            );
        }
        value
    }

    /// Store a fresh composite and clear the page's dirty flag
    pub fn store(&mut self, key: RenderKey, value: V) {
        self.dirty.remove(&key.page_index);
        // Composites of the same page at other zoom/rotation are stale now too.
        self.entries.retain(|other| other.page_index != key.page_index || *other == key);
        for (evicted, _) in self.entries.put(key, value) {
            log::debug!("render cache evicted page {} zoom {}", evicted.page_index, evicted.zoom());
        }
    }

    pub fn mark_dirty(&mut self, page_index: u32) {
        self.dirty.insert(page_index);
    }

    /// Mark every cached page dirty
    pub fn mark_all_dirty(&mut self) {
        let pages: Vec<u32> = self.entries.keys().map(|key| key.page_index).collect();
        self.dirty.extend(pages);
    }

    pub fn is_dirty(&self, page_index: u32) -> bool {
        self.dirty.contains(&page_index)
    }

    /// Drop every entry and dirty flag
    pub fn clear(&mut self) {
        self.entries.clear();
        self.dirty.clear();
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.entries.set_capacity(capacity);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.entries.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_page_hits() {
        let mut cache = PageRenderCache::new(5);
        let key = RenderKey::new(0, 1.0, 0);
        cache.store(key, "page0");

        assert_eq!(cache.lookup(&key), Some("page0"));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_dirty_page_misses_until_restored() {
        let mut cache = PageRenderCache::new(5);
        let key = RenderKey::new(2, 1.0, 90);
        cache.store(key, 1);
        cache.mark_dirty(2);

        assert!(cache.is_dirty(2));
        assert_eq!(cache.lookup(&key), None);
        assert_eq!(cache.stats().misses, 1);

        cache.store(key, 2);
        assert!(!cache.is_dirty(2));
        assert_eq!(cache.lookup(&key), Some(2));
    }

    #[test]
    fn test_key_distinguishes_zoom_and_rotation() {
        let mut cache = PageRenderCache::new(5);
        cache.store(RenderKey::new(0, 1.0, 0), "a");

        assert_eq!(cache.lookup(&RenderKey::new(0, 1.5, 0)), None);
        assert_eq!(cache.lookup(&RenderKey::new(0, 1.0, 90)), None);
    }

    #[test]
    fn test_store_replaces_other_variants_of_page() {
        let mut cache = PageRenderCache::new(5);
        cache.store(RenderKey::new(0, 1.0, 0), "flat");
        cache.store(RenderKey::new(1, 1.0, 0), "other");
        cache.store(RenderKey::new(0, 1.0, 90), "turned");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup(&RenderKey::new(1, 1.0, 0)), Some("other"));
    }

    #[test]
    fn test_capacity_bound() {
        let mut cache = PageRenderCache::new(5);
        for page in 0..7 {
            cache.store(RenderKey::new(page, 1.0, 0), page);
        }

        assert_eq!(cache.len(), 5);
        assert_eq!(cache.lookup(&RenderKey::new(0, 1.0, 0)), None);
        assert_eq!(cache.lookup(&RenderKey::new(6, 1.0, 0)), Some(6));
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_mark_all_dirty_and_clear() {
        let mut cache = PageRenderCache::new(5);
        cache.store(RenderKey::new(0, 1.0, 0), ());
        cache.store(RenderKey::new(3, 1.0, 0), ());
        cache.mark_all_dirty();

        assert!(cache.is_dirty(0));
        assert!(cache.is_dirty(3));
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.is_dirty(0));
    }
}
