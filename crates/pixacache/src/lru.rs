//! Byte-bounded LRU memory cache with a weak second tier

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use ahash::RandomState;
use parking_lot::Mutex;

use crate::bitmap::Bitmap;
use crate::cache::MemoryCache;
use crate::stats::CacheStats;

/// Bitmap cache bounded by total byte size with least-recently-used
/// eviction.
///
/// Evicted bitmaps are kept as weak references; while the application still
/// holds one (a view is displaying it, say), a lookup can revive it without
/// re-decoding. Values larger than the whole limit bypass the bounded tier
/// and are only weakly held.
pub struct LruMemoryCache {
    limit: usize,
    inner: Mutex<Inner>,
    stats: CacheStats,
}

struct Inner {
    strong: HashMap<String, Arc<Bitmap>, RandomState>,
    /// Access order, front = LRU, back = MRU
    order: VecDeque<String>,
    weak: HashMap<String, Weak<Bitmap>, RandomState>,
    size: usize,
}

impl LruMemoryCache {
    /// Create a cache bounded to `limit` bytes of strongly-held bitmaps
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "Limit must be greater than 0");

        Self {
            limit,
            inner: Mutex::new(Inner {
                strong: HashMap::with_hasher(RandomState::new()),
                order: VecDeque::new(),
                weak: HashMap::with_hasher(RandomState::new()),
                size: 0,
            }),
            stats: CacheStats::new(),
        }
    }

    /// Cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Bytes currently held in the bounded tier
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }

    /// Configured byte limit of the bounded tier
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Inner {
    fn detach_strong(&mut self, key: &str) -> Option<Arc<Bitmap>> {
        let value = self.strong.remove(key)?;
        self.size -= value.byte_size();
        if let Some(at) = self.order.iter().position(|k| k == key) {
            self.order.remove(at);
        }
        Some(value)
    }

    fn touch(&mut self, key: &str) {
        if let Some(at) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(at) {
                self.order.push_back(k);
            }
        }
    }

    fn evict_lru(&mut self) -> bool {
        let Some(key) = self.order.pop_front() else {
            return false;
        };
        if let Some(value) = self.strong.remove(&key) {
            self.size -= value.byte_size();
            // The weak entry written at put time keeps it reachable.
        }
        true
    }
}

impl MemoryCache for LruMemoryCache {
    fn put(&self, key: &str, value: Arc<Bitmap>) -> bool {
        let mut inner = self.inner.lock();
        self.stats.record_put();

        inner.detach_strong(key);
        inner.weak.insert(key.to_string(), Arc::downgrade(&value));

        let value_size = value.byte_size();
        if value_size > self.limit {
            return false;
        }
        while inner.size + value_size > self.limit {
            if !inner.evict_lru() {
                break;
            }
            self.stats.record_eviction();
        }

        inner.size += value_size;
        inner.strong.insert(key.to_string(), value);
        inner.order.push_back(key.to_string());
        true
    }

    fn get(&self, key: &str) -> Option<Arc<Bitmap>> {
        let mut inner = self.inner.lock();

        if let Some(value) = inner.strong.get(key).cloned() {
            inner.touch(key);
            self.stats.record_strong_hit();
            return Some(value);
        }
        if let Some(value) = inner.weak.get(key).and_then(Weak::upgrade) {
            self.stats.record_weak_hit();
            return Some(value);
        }
        inner.weak.remove(key);
        self.stats.record_miss();
        None
    }

    fn remove(&self, key: &str) -> Option<Arc<Bitmap>> {
        let mut inner = self.inner.lock();
        let strong = inner.detach_strong(key);
        let weak = inner.weak.remove(key).and_then(|w| w.upgrade());
        strong.or(weak)
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.strong.clear();
        inner.order.clear();
        inner.weak.clear();
        inner.size = 0;
    }

    fn keys(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut keys: Vec<String> = inner.strong.keys().cloned().collect();
        for (key, value) in &inner.weak {
            if value.strong_count() > 0 && !inner.strong.contains_key(key) {
                keys.push(key.clone());
            }
        }
        keys
    }
}
