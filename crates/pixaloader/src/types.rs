//! Common loader types

use std::fmt;

/// Target dimensions for a decode, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ImageSize {
    /// Create a size
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How the decoder scales an image towards the target size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageScaleType {
    /// Keep the source dimensions
    None,
    /// Subsample by the largest power of two that still covers the target
    #[default]
    PowerOfTwo,
    /// Scale to exactly the target size
    Exact,
}

/// Where a displayed bitmap was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadedFrom {
    /// Fetched through the downloader
    Network,
    /// Decoded from the disk cache
    DiskCache,
    /// Served from the memory cache
    MemoryCache,
}

/// Memory cache key for a URI at a target size.
///
/// The same URI displayed at different sizes occupies distinct memory cache
/// slots; [`source_uri_of_key`] recovers the shared URI for fuzzy-key
/// caches.
pub fn memory_cache_key(uri: &str, target_size: ImageSize) -> String {
    format!("{}_{}", uri, target_size)
}

/// The URI portion of a key produced by [`memory_cache_key`]
pub fn source_uri_of_key(key: &str) -> &str {
    key.rsplit_once('_').map(|(uri, _)| uri).unwrap_or(key)
}
