//! Fuzzy-key wrapper cache

use std::sync::Arc;

use crate::bitmap::Bitmap;
use crate::cache::MemoryCache;

/// Decorator that treats some distinct keys as equivalent.
///
/// On `put`, any already-cached key equivalent to the new one (as decided by
/// the predicate) is removed first. The canonical use is caching one bitmap
/// per source URI regardless of the target size baked into the cache key.
pub struct FuzzyKeyCache<C> {
    cache: C,
    matches: Box<dyn Fn(&str, &str) -> bool + Send + Sync>,
}

impl<C: MemoryCache> FuzzyKeyCache<C> {
    /// Wrap `cache` with the given key-equivalence predicate
    pub fn new(cache: C, matches: impl Fn(&str, &str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            cache,
            matches: Box::new(matches),
        }
    }
}

impl<C: MemoryCache> MemoryCache for FuzzyKeyCache<C> {
    fn put(&self, key: &str, value: Arc<Bitmap>) -> bool {
        let equivalent = self
            .cache
            .keys()
            .into_iter()
            .find(|cached| (self.matches)(key, cached));
        if let Some(stale) = equivalent {
            self.cache.remove(&stale);
        }
        self.cache.put(key, value)
    }

    fn get(&self, key: &str) -> Option<Arc<Bitmap>> {
        self.cache.get(key)
    }

    fn remove(&self, key: &str) -> Option<Arc<Bitmap>> {
        self.cache.remove(key)
    }

    fn clear(&self) {
        self.cache.clear();
    }

    fn keys(&self) -> Vec<String> {
        self.cache.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lru::LruMemoryCache;

    fn bitmap(bytes: usize) -> Arc<Bitmap> {
        Arc::new(Bitmap::new((bytes / 4) as u32, 1, vec![0; bytes]))
    }

    fn source_of(key: &str) -> &str {
        key.rsplit_once('_').map(|(uri, _)| uri).unwrap_or(key)
    }

    #[test]
    fn test_put_replaces_equivalent_key() {
        let cache = FuzzyKeyCache::new(LruMemoryCache::new(1024), |a, b| {
            source_of(a) == source_of(b)
        });

        cache.put("http-img_100x100", bitmap(100));
        cache.put("http-img_50x50", bitmap(40));

        assert!(cache.get("http-img_100x100").is_none());
        assert_eq!(cache.get("http-img_50x50").unwrap().byte_size(), 40);
    }

    #[test]
    fn test_unrelated_keys_coexist() {
        let cache = FuzzyKeyCache::new(LruMemoryCache::new(1024), |a, b| {
            source_of(a) == source_of(b)
        });

        cache.put("one_10x10", bitmap(40));
        cache.put("two_10x10", bitmap(40));

        assert!(cache.get("one_10x10").is_some());
        assert!(cache.get("two_10x10").is_some());
    }
}
