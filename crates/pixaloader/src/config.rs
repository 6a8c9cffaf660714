//! Loader configuration

use std::sync::Arc;

use pixacache::MemoryCache;

use crate::decoder::ImageDecoder;
use crate::dispatch::{InlineDispatcher, ResultDispatcher};
use crate::disk::UriDiskCache;
use crate::downloader::Downloader;
use crate::options::{BitmapProcessor, DisplayOptions};
use crate::types::ImageSize;

/// Default worker count for the uncached (downloading) pool
pub const DEFAULT_UNCACHED_POOL_SIZE: usize = 3;

/// Default worker count for the cached (disk-hit) pool
pub const DEFAULT_CACHED_POOL_SIZE: usize = 4;

/// Wiring for an [`ImageLoader`](crate::ImageLoader): collaborators, pool
/// sizes and default request options.
pub struct LoaderConfig {
    /// Synchronously consulted bitmap cache
    pub memory_cache: Arc<dyn MemoryCache>,
    /// URI-keyed disk cache
    pub disk_cache: Arc<dyn UriDiskCache>,
    /// Byte source for URIs
    pub downloader: Arc<dyn Downloader>,
    /// Bitmap decoder
    pub decoder: Arc<dyn ImageDecoder>,
    /// Delivery of results to the application thread
    pub dispatcher: Arc<dyn ResultDispatcher>,
    /// Workers for loads that must download first
    pub uncached_pool_size: usize,
    /// Workers for loads served from the disk cache
    pub cached_pool_size: usize,
    /// Decode target when a display target gives no size hint
    pub max_image_size: ImageSize,
    /// When set, downloads larger than this are re-encoded down before they
    /// stay in the disk cache
    pub max_disk_cache_image_size: Option<ImageSize>,
    /// Applied to a resized bitmap before it is re-cached on disk
    pub processor_for_disk_cache: Option<Arc<dyn BitmapProcessor>>,
    /// Options used when a request passes none
    pub default_options: DisplayOptions,
}

impl LoaderConfig {
    /// Configuration with inline result delivery and default pool sizes
    pub fn new(
        memory_cache: Arc<dyn MemoryCache>,
        disk_cache: Arc<dyn UriDiskCache>,
        downloader: Arc<dyn Downloader>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        Self {
            memory_cache,
            disk_cache,
            downloader,
            decoder,
            dispatcher: Arc::new(InlineDispatcher),
            uncached_pool_size: DEFAULT_UNCACHED_POOL_SIZE,
            cached_pool_size: DEFAULT_CACHED_POOL_SIZE,
            max_image_size: ImageSize::new(1024, 1024),
            max_disk_cache_image_size: None,
            processor_for_disk_cache: None,
            default_options: DisplayOptions::default(),
        }
    }

    /// Use a different result dispatcher
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn ResultDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Set the worker pool sizes
    pub fn with_pool_sizes(mut self, uncached: usize, cached: usize) -> Self {
        self.uncached_pool_size = uncached;
        self.cached_pool_size = cached;
        self
    }

    /// Set the fallback decode target size
    pub fn with_max_image_size(mut self, size: ImageSize) -> Self {
        self.max_image_size = size;
        self
    }

    /// Re-encode downloads down to `size` before keeping them on disk
    pub fn with_max_disk_cache_image_size(mut self, size: ImageSize) -> Self {
        self.max_disk_cache_image_size = Some(size);
        self
    }

    /// Set the options used when a request passes none
    pub fn with_default_options(mut self, options: DisplayOptions) -> Self {
        self.default_options = options;
        self
    }
}
