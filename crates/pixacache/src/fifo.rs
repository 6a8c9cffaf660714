//! Byte-bounded FIFO memory cache

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use ahash::RandomState;
use parking_lot::Mutex;

use crate::bitmap::Bitmap;
use crate::cache::MemoryCache;

/// Bitmap cache bounded by total byte size with first-in-first-out
/// eviction. Lookups do not affect the eviction order.
pub struct FifoMemoryCache {
    limit: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    strong: HashMap<String, Arc<Bitmap>, RandomState>,
    /// Insertion order, front = oldest
    queue: VecDeque<String>,
    weak: HashMap<String, Weak<Bitmap>, RandomState>,
    size: usize,
}

impl FifoMemoryCache {
    /// Create a cache bounded to `limit` bytes of strongly-held bitmaps
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "Limit must be greater than 0");

        Self {
            limit,
            inner: Mutex::new(Inner {
                strong: HashMap::with_hasher(RandomState::new()),
                queue: VecDeque::new(),
                weak: HashMap::with_hasher(RandomState::new()),
                size: 0,
            }),
        }
    }

    /// Bytes currently held in the bounded tier
    pub fn size(&self) -> usize {
        self.inner.lock().size
    }
}

impl MemoryCache for FifoMemoryCache {
    fn put(&self, key: &str, value: Arc<Bitmap>) -> bool {
        let mut inner = self.inner.lock();

        if let Some(old) = inner.strong.remove(key) {
            inner.size -= old.byte_size();
            if let Some(at) = inner.queue.iter().position(|k| k == key) {
                inner.queue.remove(at);
            }
        }
        inner.weak.insert(key.to_string(), Arc::downgrade(&value));

        let value_size = value.byte_size();
        if value_size > self.limit {
            return false;
        }
        while inner.size + value_size > self.limit {
            let Some(oldest) = inner.queue.pop_front() else {
                break;
            };
            if let Some(evicted) = inner.strong.remove(&oldest) {
                inner.size -= evicted.byte_size();
            }
        }

        inner.size += value_size;
        inner.strong.insert(key.to_string(), value);
        inner.queue.push_back(key.to_string());
        true
    }

    fn get(&self, key: &str) -> Option<Arc<Bitmap>> {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.strong.get(key) {
            return Some(Arc::clone(value));
        }
        if let Some(value) = inner.weak.get(key).and_then(Weak::upgrade) {
            return Some(value);
        }
        inner.weak.remove(key);
        None
    }

    fn remove(&self, key: &str) -> Option<Arc<Bitmap>> {
        let mut inner = self.inner.lock();
        let strong = inner.strong.remove(key);
        if let Some(value) = &strong {
            inner.size -= value.byte_size();
            if let Some(at) = inner.queue.iter().position(|k| k == key) {
                inner.queue.remove(at);
            }
        }
        let weak = inner.weak.remove(key).and_then(|w| w.upgrade());
        strong.or(weak)
    }

    fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.strong.clear();
        inner.queue.clear();
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
