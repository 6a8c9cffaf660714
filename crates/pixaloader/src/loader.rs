//! Public image loader facade

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use pixacache::Bitmap;

use crate::config::LoaderConfig;
use crate::engine::LoaderEngine;
use crate::listener::{LoadListener, NoopListener, ProgressListener};
use crate::options::DisplayOptions;
use crate::target::{ImageTarget, NonViewTarget, TargetId, TargetRef};
use crate::task::LoadTask;
use crate::types::{memory_cache_key, ImageSize};

/// URL to displayed bitmap: memory cache, then disk cache, then download.
///
/// `display` consults the memory cache synchronously; everything slower runs
/// on the engine's worker pools, with concurrent loads of the same URI
/// collapsed into one.
pub struct ImageLoader {
    config: Arc<LoaderConfig>,
    engine: Arc<LoaderEngine>,
}

impl ImageLoader {
    /// Build a loader from its configuration
    pub fn new(config: LoaderConfig) -> Self {
        let config = Arc::new(config);
        Self {
            engine: LoaderEngine::new(Arc::clone(&config)),
            config,
        }
    }

    /// Display `uri` into `target` with the default options
    pub fn display(&self, uri: &str, target: &Arc<dyn ImageTarget>) {
        self.display_with(uri, target, None, None, None);
    }

    /// Display `uri` into `target`.
    ///
    /// `options` falls back to the configured defaults and `listener` to a
    /// no-op. The target is held weakly: if the caller drops it, the task
    /// cancels at its next checkpoint.
    pub fn display_with(
        &self,
        uri: &str,
        target: &Arc<dyn ImageTarget>,
        options: Option<DisplayOptions>,
        listener: Option<Arc<dyn LoadListener>>,
        progress_listener: Option<Arc<dyn ProgressListener>>,
    ) {
        self.display_internal(
            uri,
            TargetRef::Weak(Arc::downgrade(target)),
            options,
            listener,
            progress_listener,
        );
    }

    /// Load `uri` without a view; the bitmap arrives through the listener
    pub fn load(
        &self,
        uri: &str,
        target_size: Option<ImageSize>,
        options: Option<DisplayOptions>,
        listener: Arc<dyn LoadListener>,
    ) {
        let size = target_size.unwrap_or(self.config.max_image_size);
        let target: Arc<dyn ImageTarget> = Arc::new(NonViewTarget::new(uri, size));
        self.display_internal(uri, TargetRef::Strong(target), options, Some(listener), None);
    }

    /// Load `uri` on the calling thread and return the bitmap
    pub fn load_sync(
        &self,
        uri: &str,
        target_size: Option<ImageSize>,
        options: Option<DisplayOptions>,
    ) -> Option<Arc<Bitmap>> {
        struct Capture {
            slot: Mutex<Option<Arc<Bitmap>>>,
        }
        impl LoadListener for Capture {
            fn on_loading_complete(&self, _uri: &str, bitmap: Option<&Arc<Bitmap>>) {
                *self.slot.lock() = bitmap.cloned();
            }
        }

        let mut options = options.unwrap_or_else(|| self.config.default_options.clone());
        options.sync_loading = true;

        let capture = Arc::new(Capture {
            slot: Mutex::new(None),
        });
        self.load(uri, target_size, Some(options), Arc::clone(&capture) as _);
        let bitmap = capture.slot.lock().take();
        bitmap
    }

    fn display_internal(
        &self,
        uri: &str,
        target_ref: TargetRef,
        options: Option<DisplayOptions>,
        listener: Option<Arc<dyn LoadListener>>,
        progress_listener: Option<Arc<dyn ProgressListener>>,
    ) {
        let options = options.unwrap_or_else(|| self.config.default_options.clone());
        let listener = listener.unwrap_or_else(|| Arc::new(NoopListener) as _);
        let Some(target) = target_ref.upgrade() else {
            return;
        };
        let target_id = target.id();

        if uri.is_empty() {
            self.engine.cancel_display_task_for(target_id);
            listener.on_loading_started(uri);
            if let Some(image) = &options.image_for_empty_uri {
                target.display(image);
            } else {
                target.clear();
            }
            listener.on_loading_complete(uri, None);
            return;
        }

        let target_size = target.size_hint().unwrap_or(self.config.max_image_size);
        let key = memory_cache_key(uri, target_size);
        self.engine.prepare_display_task_for(target_id, &key);
        listener.on_loading_started(uri);

        if let Some(bitmap) = self.config.memory_cache.get(&key) {
            debug!(key = %key, "load image from memory cache");
            let bitmap = options
                .post_processor
                .as_ref()
                .and_then(|processor| processor.process(Arc::clone(&bitmap)))
                .unwrap_or(bitmap);
            target.display(&bitmap);
            listener.on_loading_complete(uri, Some(&bitmap));
            return;
        }

        if let Some(image) = &options.image_on_loading {
            target.display(image);
        } else if options.reset_before_loading {
            target.clear();
        }
        drop(target);

        let sync_loading = options.sync_loading;
        let task = LoadTask::new(
            Arc::clone(&self.engine),
            uri.to_string(),
            key,
            target_ref,
            target_id,
            target_size,
            options,
            listener,
            progress_listener,
            self.engine.lock_for_uri(uri),
        );
        if sync_loading {
            task.run();
        } else {
            self.engine.submit(task);
        }
    }

    /// Pause task execution until [`resume`](Self::resume)
    pub fn pause(&self) {
        self.engine.pause();
    }

    /// Resume paused tasks
    pub fn resume(&self) {
        self.engine.resume();
    }

    /// Stop the engine and cancel outstanding tasks
    pub fn stop(&self) {
        self.engine.stop();
    }

    /// Deny or allow network downloads
    pub fn deny_network_downloads(&self, deny: bool) {
        self.engine.deny_network_downloads(deny);
    }

    /// Handle flaky connections by re-buffering network streams
    pub fn handle_slow_network(&self, slow: bool) {
        self.engine.handle_slow_network(slow);
    }

    /// Cancel the in-flight load for a target, if any
    pub fn cancel_display_task_for(&self, target_id: TargetId) {
        self.engine.cancel_display_task_for(target_id);
    }

    /// The configured memory cache
    pub fn memory_cache(&self) -> &Arc<dyn pixacache::MemoryCache> {
        &self.config.memory_cache
    }

    /// The configured disk cache
    pub fn disk_cache(&self) -> &Arc<dyn crate::disk::UriDiskCache> {
        &self.config.disk_cache
    }

    /// Drop every bitmap from the memory cache
    pub fn clear_memory_cache(&self) {
        self.config.memory_cache.clear();
    }

    /// Drop every file from the disk cache
    pub fn clear_disk_cache(&self) {
        self.config.disk_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{encode_raw, RawBitmapDecoder};
    use crate::disk::LruUriCache;
    use crate::downloader::{is_network_uri, ByteStream, Downloader, FileDownloader};
    use crate::listener::{FailKind, FailReason};
    use pixacache::LruMemoryCache;
    use std::collections::HashMap;
    use std::io::{self, Cursor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    struct CountingDownloader {
        payloads: HashMap<String, Vec<u8>>,
        delay: Duration,
        downloads: AtomicUsize,
    }

    impl CountingDownloader {
        fn new(payloads: &[(&str, Vec<u8>)], delay: Duration) -> Self {
            Self {
                payloads: payloads
                    .iter()
                    .map(|(uri, bytes)| (uri.to_string(), bytes.clone()))
                    .collect(),
                delay,
                downloads: AtomicUsize::new(0),
            }
        }

        fn downloads(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }
    }

    impl Downloader for CountingDownloader {
        fn stream(&self, uri: &str, _extra: Option<&[u8]>) -> io::Result<ByteStream> {
            if !is_network_uri(uri) {
                // Cached copies come back through file:// URIs.
                return FileDownloader.stream(uri, None);
            }
            thread::sleep(self.delay);
            self.downloads.fetch_add(1, Ordering::SeqCst);
            match self.payloads.get(uri) {
                Some(bytes) => Ok(ByteStream {
                    length: Some(bytes.len() as u64),
                    reader: Box::new(Cursor::new(bytes.clone())),
                }),
                None => Err(io::Error::new(io::ErrorKind::NotFound, uri.to_string())),
            }
        }
    }

    #[derive(Debug)]
    enum Event {
        Started(String),
        Complete(String, bool),
        Failed(String, FailKind),
        Cancelled(String),
    }

    struct EventListener {
        events: mpsc::Sender<Event>,
    }

    impl LoadListener for EventListener {
        fn on_loading_started(&self, uri: &str) {
            let _ = self.events.send(Event::Started(uri.to_string()));
        }

        fn on_loading_complete(&self, uri: &str, bitmap: Option<&Arc<Bitmap>>) {
            let _ = self
                .events
                .send(Event::Complete(uri.to_string(), bitmap.is_some()));
        }

        fn on_loading_failed(&self, uri: &str, reason: &FailReason) {
            let _ = self.events.send(Event::Failed(uri.to_string(), reason.kind));
        }

        fn on_loading_cancelled(&self, uri: &str) {
            let _ = self.events.send(Event::Cancelled(uri.to_string()));
        }
    }

    struct TestTarget {
        id: TargetId,
        size: ImageSize,
        displayed: Mutex<Vec<(u32, u32)>>,
    }

    impl TestTarget {
        fn new(id: TargetId) -> Arc<Self> {
            Arc::new(Self {
                id,
                size: ImageSize::new(64, 64),
                displayed: Mutex::new(Vec::new()),
            })
        }

        fn displayed(&self) -> Vec<(u32, u32)> {
            self.displayed.lock().clone()
        }
    }

    impl ImageTarget for TestTarget {
        fn id(&self) -> TargetId {
            self.id
        }

        fn size_hint(&self) -> Option<ImageSize> {
            Some(self.size)
        }

        fn display(&self, bitmap: &Bitmap) {
            self.displayed
                .lock()
                .push((bitmap.width(), bitmap.height()));
        }
    }

    fn loader_with(downloader: Arc<CountingDownloader>, dir: &TempDir) -> ImageLoader {
        let config = LoaderConfig::new(
            Arc::new(LruMemoryCache::new(16 * 1024 * 1024)),
            Arc::new(LruUriCache::new(dir.path().join("disk"), None, 0, 0).unwrap()),
            downloader,
            Arc::new(RawBitmapDecoder),
        );
        ImageLoader::new(config)
    }

    fn listener() -> (Arc<EventListener>, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(EventListener { events: tx }), rx)
    }

    fn wait_for(
        rx: &mpsc::Receiver<Event>,
        what: &str,
        mut pred: impl FnMut(&Event) -> bool,
    ) -> Event {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let remaining = deadline
                .checked_duration_since(std::time::Instant::now())
                .unwrap_or_else(|| panic!("timed out waiting for {}", what));
            match rx.recv_timeout(remaining) {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(_) => panic!("timed out waiting for {}", what),
            }
        }
    }

    const URI_A: &str = "http://host/a.pixa";
    const URI_B: &str = "http://host/b.pixa";

    fn payload(width: u32, height: u32) -> Vec<u8> {
        encode_raw(&pixacache::Bitmap::solid(width, height, [7; 4]))
    }

    #[test]
    fn test_display_end_to_end() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(CountingDownloader::new(
            &[(URI_A, payload(8, 8))],
            Duration::ZERO,
        ));
        let loader = loader_with(Arc::clone(&downloader), &dir);
        let (listener, events) = listener();

        let target = TestTarget::new(1);
        let shared: Arc<dyn ImageTarget> = target.clone();
        loader.display_with(URI_A, &shared, None, Some(listener.clone() as _), None);

        wait_for(&events, "complete", |e| matches!(e, Event::Complete(_, true)));
        assert_eq!(target.displayed(), vec![(8, 8)]);
        assert_eq!(downloader.downloads(), 1);

        // A second request is served synchronously from the memory cache.
        let second = TestTarget::new(2);
        let shared2: Arc<dyn ImageTarget> = second.clone();
        loader.display_with(URI_A, &shared2, None, Some(listener as _), None);
        wait_for(&events, "second complete", |e| {
            matches!(e, Event::Complete(_, true))
        });
        assert_eq!(second.displayed(), vec![(8, 8)]);
        assert_eq!(downloader.downloads(), 1);
    }

    #[test]
    fn test_concurrent_same_uri_downloads_once() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(CountingDownloader::new(
            &[(URI_A, payload(8, 8))],
            Duration::from_millis(150),
        ));
        let loader = loader_with(Arc::clone(&downloader), &dir);
        let (listener, events) = listener();

        let first = TestTarget::new(1);
        let second = TestTarget::new(2);
        let shared1: Arc<dyn ImageTarget> = first.clone();
        let shared2: Arc<dyn ImageTarget> = second.clone();
        loader.display_with(URI_A, &shared1, None, Some(listener.clone() as _), None);
        loader.display_with(URI_A, &shared2, None, Some(listener as _), None);

        wait_for(&events, "first complete", |e| {
            matches!(e, Event::Complete(_, true))
        });
        wait_for(&events, "second complete", |e| {
            matches!(e, Event::Complete(_, true))
        });

        assert_eq!(downloader.downloads(), 1);
        assert_eq!(first.displayed(), vec![(8, 8)]);
        assert_eq!(second.displayed(), vec![(8, 8)]);
    }

    #[test]
    fn test_reused_target_cancels_stale_task() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(CountingDownloader::new(
            &[(URI_A, payload(8, 8)), (URI_B, payload(4, 4))],
            Duration::ZERO,
        ));
        let loader = loader_with(Arc::clone(&downloader), &dir);
        let (listener, events) = listener();

        let target = TestTarget::new(1);
        let shared: Arc<dyn ImageTarget> = target.clone();

        // Both requests sit behind the pause gate; re-binding the target to
        // URI_B makes the URI_A task stale before it runs.
        loader.pause();
        loader.display_with(URI_A, &shared, None, Some(listener.clone() as _), None);
        loader.display_with(URI_B, &shared, None, Some(listener as _), None);
        loader.resume();

        wait_for(&events, "b complete", |e| {
            matches!(e, Event::Complete(uri, true) if uri == URI_B)
        });
        thread::sleep(Duration::from_millis(100)); // Let the stale task finish.

        assert_eq!(target.displayed(), vec![(4, 4)]);
    }

    #[test]
    fn test_pause_gates_tasks_until_resume() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(CountingDownloader::new(
            &[(URI_A, payload(8, 8))],
            Duration::ZERO,
        ));
        let loader = loader_with(Arc::clone(&downloader), &dir);
        let (listener, events) = listener();

        loader.pause();
        let target = TestTarget::new(1);
        let shared: Arc<dyn ImageTarget> = target.clone();
        loader.display_with(URI_A, &shared, None, Some(listener as _), None);

        wait_for(&events, "started", |e| matches!(e, Event::Started(_)));
        thread::sleep(Duration::from_millis(250));
        assert_eq!(downloader.downloads(), 0);
        assert!(target.displayed().is_empty());

        loader.resume();
        wait_for(&events, "complete", |e| matches!(e, Event::Complete(_, true)));
        assert_eq!(downloader.downloads(), 1);
    }

    #[test]
    fn test_network_denied_fails_with_kind() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(CountingDownloader::new(
            &[(URI_A, payload(8, 8))],
            Duration::ZERO,
        ));
        let loader = loader_with(Arc::clone(&downloader), &dir);
        let (listener, events) = listener();

        loader.deny_network_downloads(true);
        let target = TestTarget::new(1);
        let shared: Arc<dyn ImageTarget> = target.clone();
        loader.display_with(URI_A, &shared, None, Some(listener as _), None);

        let event = wait_for(&events, "failure", |e| matches!(e, Event::Failed(..)));
        assert!(matches!(event, Event::Failed(_, FailKind::NetworkDenied)));
        assert_eq!(downloader.downloads(), 0);
    }

    #[test]
    fn test_collected_target_cancels_task() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(CountingDownloader::new(
            &[(URI_A, payload(8, 8))],
            Duration::from_millis(100),
        ));
        let loader = loader_with(Arc::clone(&downloader), &dir);
        let (listener, events) = listener();

        let target = TestTarget::new(1);
        let shared: Arc<dyn ImageTarget> = target.clone();
        loader.pause();
        loader.display_with(URI_A, &shared, None, Some(listener as _), None);
        drop(shared);
        drop(target); // The "view" is gone before the task runs.
        loader.resume();

        // The task notices at its first checkpoint; nothing is displayed.
        thread::sleep(Duration::from_millis(200));
        assert_eq!(downloader.downloads(), 0);
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, Event::Complete(..)), "{:?}", event);
        }
    }

    #[test]
    fn test_disk_cache_survives_memory_clear() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(CountingDownloader::new(
            &[(URI_A, payload(8, 8))],
            Duration::ZERO,
        ));
        let loader = loader_with(Arc::clone(&downloader), &dir);
        let (listener, events) = listener();

        let target = TestTarget::new(1);
        let shared: Arc<dyn ImageTarget> = target.clone();
        loader.display_with(URI_A, &shared, None, Some(listener.clone() as _), None);
        wait_for(&events, "complete", |e| matches!(e, Event::Complete(_, true)));

        loader.clear_memory_cache();

        let second = TestTarget::new(2);
        let shared2: Arc<dyn ImageTarget> = second.clone();
        loader.display_with(URI_A, &shared2, None, Some(listener as _), None);
        wait_for(&events, "second complete", |e| {
            matches!(e, Event::Complete(_, true))
        });

        // Served from the committed disk copy, not the network.
        assert_eq!(downloader.downloads(), 1);
        assert_eq!(second.displayed(), vec![(8, 8)]);
    }

    #[test]
    fn test_load_sync() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(CountingDownloader::new(
            &[(URI_A, payload(8, 8))],
            Duration::ZERO,
        ));
        let loader = loader_with(Arc::clone(&downloader), &dir);

        let bitmap = loader.load_sync(URI_A, Some(ImageSize::new(64, 64)), None);
        assert_eq!(bitmap.unwrap().width(), 8);
        assert_eq!(downloader.downloads(), 1);

        // Second call is served from cache.
        let again = loader.load_sync(URI_A, Some(ImageSize::new(64, 64)), None);
        assert!(again.is_some());
        assert_eq!(downloader.downloads(), 1);
    }

    #[test]
    fn test_empty_uri_completes_with_none() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(CountingDownloader::new(&[], Duration::ZERO));
        let loader = loader_with(Arc::clone(&downloader), &dir);
        let (listener, events) = listener();

        let target = TestTarget::new(1);
        let shared: Arc<dyn ImageTarget> = target.clone();
        loader.display_with("", &shared, None, Some(listener as _), None);

        wait_for(&events, "started", |e| matches!(e, Event::Started(_)));
        let event = wait_for(&events, "complete", |e| matches!(e, Event::Complete(..)));
        assert!(matches!(event, Event::Complete(_, false)));
        assert_eq!(downloader.downloads(), 0);
    }

    #[test]
    fn test_stop_engine() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(CountingDownloader::new(
            &[(URI_A, payload(8, 8))],
            Duration::ZERO,
        ));
        let loader = loader_with(Arc::clone(&downloader), &dir);

        loader.stop();

        // New requests are accepted but never executed.
        let target = TestTarget::new(1);
        let shared: Arc<dyn ImageTarget> = target.clone();
        loader.display(URI_A, &shared);
        thread::sleep(Duration::from_millis(100));
        assert!(target.displayed().is_empty());
    }
}
