//! Per-request display options

use std::sync::Arc;
use std::time::Duration;

use pixacache::Bitmap;

use crate::types::ImageScaleType;

/// Hook applied to a bitmap before it is cached or displayed
pub trait BitmapProcessor: Send + Sync {
    /// Transform the bitmap; returning `None` keeps the input unchanged
    fn process(&self, bitmap: Arc<Bitmap>) -> Option<Arc<Bitmap>>;
}

/// Options controlling a single display request.
///
/// The loader falls back to
/// [`LoaderConfig::default_options`](crate::LoaderConfig) when a request
/// passes none.
#[derive(Clone)]
pub struct DisplayOptions {
    /// Store the decoded bitmap in the memory cache
    pub cache_in_memory: bool,
    /// Stream downloads into the disk cache before decoding
    pub cache_on_disk: bool,
    /// Sleep before the load starts (e.g. while a list view settles)
    pub delay_before_loading: Option<Duration>,
    /// Run the whole task inline on the calling thread
    pub sync_loading: bool,
    /// Placeholder shown while loading
    pub image_on_loading: Option<Arc<Bitmap>>,
    /// Image shown when the load fails
    pub image_on_fail: Option<Arc<Bitmap>>,
    /// Image shown for an empty URI
    pub image_for_empty_uri: Option<Arc<Bitmap>>,
    /// Clear the target before loading when no placeholder is set
    pub reset_before_loading: bool,
    /// Opaque payload handed to the downloader
    pub extra_for_downloader: Option<Vec<u8>>,
    /// Applied before the bitmap goes into the memory cache
    pub pre_processor: Option<Arc<dyn BitmapProcessor>>,
    /// Applied after the cache, before display
    pub post_processor: Option<Arc<dyn BitmapProcessor>>,
    /// How the decoder scales towards the target size
    pub scale_type: ImageScaleType,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            cache_in_memory: true,
            cache_on_disk: true,
            delay_before_loading: None,
            sync_loading: false,
            image_on_loading: None,
            image_on_fail: None,
            image_for_empty_uri: None,
            reset_before_loading: false,
            extra_for_downloader: None,
            pre_processor: None,
            post_processor: None,
            scale_type: ImageScaleType::default(),
        }
    }
}

impl DisplayOptions {
    /// Options with every cache disabled; useful for one-shot loads
    pub fn uncached() -> Self {
        Self {
            cache_in_memory: false,
            cache_on_disk: false,
            ..Self::default()
        }
    }

    /// Enable or disable the memory cache for this request
    pub fn with_cache_in_memory(mut self, cache: bool) -> Self {
        self.cache_in_memory = cache;
        self
    }

    /// Enable or disable the disk cache for this request
    pub fn with_cache_on_disk(mut self, cache: bool) -> Self {
        self.cache_on_disk = cache;
        self
    }

    /// Sleep this long before starting the load
    pub fn with_delay_before_loading(mut self, delay: Duration) -> Self {
        self.delay_before_loading = Some(delay);
        self
    }

    /// Run the task inline on the calling thread
    pub fn with_sync_loading(mut self, sync: bool) -> Self {
        self.sync_loading = sync;
        self
    }

    /// Placeholder to show while the load runs
    pub fn with_image_on_loading(mut self, bitmap: Arc<Bitmap>) -> Self {
        self.image_on_loading = Some(bitmap);
        self
    }

    /// Image to show if the load fails
    pub fn with_image_on_fail(mut self, bitmap: Arc<Bitmap>) -> Self {
        self.image_on_fail = Some(bitmap);
        self
    }

    /// Image to show for an empty URI
    pub fn with_image_for_empty_uri(mut self, bitmap: Arc<Bitmap>) -> Self {
        self.image_for_empty_uri = Some(bitmap);
        self
    }
}
