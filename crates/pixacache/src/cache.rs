//! Memory cache interface

use std::sync::Arc;

use crate::bitmap::Bitmap;

/// Interface for in-memory bitmap caches.
///
/// The load engine only depends on this trait; which eviction policy backs it
/// is a configuration decision.
pub trait MemoryCache: Send + Sync {
    /// Store a bitmap under `key`.
    ///
    /// Returns whether the value was accepted into the bounded tier; caches
    /// with a weak tier may still serve the value afterwards either way.
    fn put(&self, key: &str, value: Arc<Bitmap>) -> bool;

    /// Fetch the bitmap stored under `key`, if any
    fn get(&self, key: &str) -> Option<Arc<Bitmap>>;

    /// Drop the bitmap stored under `key`, returning it if it was present
    fn remove(&self, key: &str) -> Option<Arc<Bitmap>>;

    /// Drop every cached bitmap
    fn clear(&self);

    /// Keys currently known to the cache
    fn keys(&self) -> Vec<String>;
}
