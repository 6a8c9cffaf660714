//! Load/display engine
//!
//! Owns the worker pools, the per-URI single-flight locks, the view-reuse
//! bookkeeping, and the pause gate. Tasks are routed through a dispatcher
//! pool that probes the disk cache and hands the task to the cached or
//! uncached pool, so disk hits are never starved behind downloads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use ahash::RandomState;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::config::LoaderConfig;
use crate::downloader::{Downloader, NetworkDeniedDownloader, SlowNetworkDownloader};
use crate::pool::WorkerPool;
use crate::target::TargetId;
use crate::task::LoadTask;

/// Executes display tasks: single-flight per URI, pausable, and cancellable
/// on view reuse.
pub struct LoaderEngine {
    pub(crate) config: Arc<LoaderConfig>,

    dispatcher_pool: WorkerPool,
    uncached_pool: WorkerPool,
    cached_pool: WorkerPool,

    /// The memory cache key each target is currently waiting for
    keys_for_targets: Mutex<HashMap<TargetId, String, RandomState>>,

    /// Weakly-held per-URI mutexes; idle URIs drop their lock
    uri_locks: Mutex<HashMap<String, Weak<Mutex<()>>, RandomState>>,

    paused: AtomicBool,
    network_denied: AtomicBool,
    slow_network: AtomicBool,
    stopped: AtomicBool,
    pause_gate: Mutex<()>,
    pause_signal: Condvar,

    plain_downloader: Arc<dyn Downloader>,
    denied_downloader: Arc<dyn Downloader>,
    slow_downloader: Arc<dyn Downloader>,
}

impl LoaderEngine {
    pub(crate) fn new(config: Arc<LoaderConfig>) -> Arc<Self> {
        let plain_downloader = Arc::clone(&config.downloader);
        let denied_downloader: Arc<dyn Downloader> =
            Arc::new(NetworkDeniedDownloader::new(Arc::clone(&plain_downloader)));
        let slow_downloader: Arc<dyn Downloader> =
            Arc::new(SlowNetworkDownloader::new(Arc::clone(&plain_downloader)));

        Arc::new(Self {
            dispatcher_pool: WorkerPool::new("pixa-dispatch", 1),
            uncached_pool: WorkerPool::new("pixa-load", config.uncached_pool_size),
            cached_pool: WorkerPool::new("pixa-load-cached", config.cached_pool_size),
            keys_for_targets: Mutex::new(HashMap::with_hasher(RandomState::new())),
            uri_locks: Mutex::new(HashMap::with_hasher(RandomState::new())),
            paused: AtomicBool::new(false),
            network_denied: AtomicBool::new(false),
            slow_network: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            pause_gate: Mutex::new(()),
            pause_signal: Condvar::new(),
            plain_downloader,
            denied_downloader,
            slow_downloader,
            config,
        })
    }

    /// Route a task to the cached or uncached pool after a quick disk probe
    pub(crate) fn submit(self: &Arc<Self>, task: LoadTask) {
        let engine = Arc::clone(self);
        let uri = task.uri().to_string();
        self.dispatcher_pool.execute(move || {
            let on_disk = engine
                .config
                .disk_cache
                .get(&uri)
                .map(|file| file.exists())
                .unwrap_or(false);
            let pool = if on_disk {
                &engine.cached_pool
            } else {
                &engine.uncached_pool
            };
            pool.execute(move || task.run());
        });
    }

    /// Stop issuing new work until [`resume`](Self::resume). Tasks already
    /// past the pause gate keep running.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Let paused tasks continue
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        let _guard = self.pause_gate.lock();
        self.pause_signal.notify_all();
    }

    /// Stop the engine: cancel queued tasks, wake paused ones, and join the
    /// worker pools.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.keys_for_targets.lock().clear();
        self.uri_locks.lock().clear();
        {
            let _guard = self.pause_gate.lock();
            self.pause_signal.notify_all();
        }
        self.dispatcher_pool.shutdown();
        self.cached_pool.shutdown();
        self.uncached_pool.shutdown();
    }

    /// Deny or allow network downloads. While denied, uncached network URIs
    /// fail with [`FailKind::NetworkDenied`](crate::FailKind::NetworkDenied).
    pub fn deny_network_downloads(&self, deny: bool) {
        self.network_denied.store(deny, Ordering::SeqCst);
    }

    /// Re-buffer network streams in small chunks for flaky connections
    pub fn handle_slow_network(&self, slow: bool) {
        self.slow_network.store(slow, Ordering::SeqCst);
    }

    /// Forget the task association for a target, cancelling any in-flight
    /// load for it at its next checkpoint
    pub fn cancel_display_task_for(&self, target: TargetId) {
        self.keys_for_targets.lock().remove(&target);
    }

    pub(crate) fn prepare_display_task_for(&self, target: TargetId, key: &str) {
        self.keys_for_targets
            .lock()
            .insert(target, key.to_string());
    }

    /// Key the target is currently expecting, if any
    pub(crate) fn loading_key_for(&self, target: TargetId) -> Option<String> {
        self.keys_for_targets.lock().get(&target).cloned()
    }

    /// The single-flight mutex for a URI
    pub(crate) fn lock_for_uri(&self, uri: &str) -> Arc<Mutex<()>> {
        let mut locks = self.uri_locks.lock();
        locks.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = locks.get(uri).and_then(Weak::upgrade) {
            return existing;
        }
        let fresh = Arc::new(Mutex::new(()));
        locks.insert(uri.to_string(), Arc::downgrade(&fresh));
        fresh
    }

    /// Block while the engine is paused
    pub(crate) fn await_resume(&self) {
        let mut guard = self.pause_gate.lock();
        while self.paused.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst) {
            debug!("engine is paused, waiting");
            self.pause_signal.wait(&mut guard);
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn is_network_denied(&self) -> bool {
        self.network_denied.load(Ordering::SeqCst)
    }

    pub(crate) fn is_slow_network(&self) -> bool {
        self.slow_network.load(Ordering::SeqCst)
    }

    /// The downloader honoring the current network flags
    pub(crate) fn current_downloader(&self) -> Arc<dyn Downloader> {
        if self.is_network_denied() {
            Arc::clone(&self.denied_downloader)
        } else if self.is_slow_network() {
            Arc::clone(&self.slow_downloader)
        } else {
            Arc::clone(&self.plain_downloader)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::RawBitmapDecoder;
    use crate::disk::PlainUriCache;
    use crate::downloader::FileDownloader;
    use pixacache::LruMemoryCache;
    use tempfile::TempDir;

    fn engine() -> (Arc<LoaderEngine>, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = LoaderConfig::new(
            Arc::new(LruMemoryCache::new(1024 * 1024)),
            Arc::new(PlainUriCache::new(dir.path().join("disk"), None)),
            Arc::new(FileDownloader),
            Arc::new(RawBitmapDecoder),
        );
        (LoaderEngine::new(Arc::new(config)), dir)
    }

    #[test]
    fn test_same_uri_shares_one_lock() {
        let (engine, _dir) = engine();

        let a = engine.lock_for_uri("http://host/a.png");
        let b = engine.lock_for_uri("http://host/a.png");
        let other = engine.lock_for_uri("http://host/b.png");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn test_idle_uri_drops_its_lock() {
        let (engine, _dir) = engine();

        let first = engine.lock_for_uri("http://host/a.png");
        let weak = Arc::downgrade(&first);
        drop(first);

        // The next lookup prunes the dead entry and mints a fresh lock.
        let second = engine.lock_for_uri("http://host/a.png");
        assert!(weak.upgrade().is_none() || !Arc::ptr_eq(&weak.upgrade().unwrap(), &second));
        assert_eq!(engine.uri_locks.lock().len(), 1);
    }

    #[test]
    fn test_reuse_bookkeeping() {
        let (engine, _dir) = engine();

        engine.prepare_display_task_for(7, "uri_1x1");
        assert_eq!(engine.loading_key_for(7).as_deref(), Some("uri_1x1"));

        engine.prepare_display_task_for(7, "other_1x1");
        assert_eq!(engine.loading_key_for(7).as_deref(), Some("other_1x1"));

        engine.cancel_display_task_for(7);
        assert_eq!(engine.loading_key_for(7), None);
    }

    #[test]
    fn test_downloader_selection_follows_flags() {
        let (engine, _dir) = engine();

        let normal = engine.current_downloader();
        assert!(Arc::ptr_eq(&normal, &engine.plain_downloader));

        engine.deny_network_downloads(true);
        assert!(Arc::ptr_eq(
            &engine.current_downloader(),
            &engine.denied_downloader
        ));

        engine.deny_network_downloads(false);
        engine.handle_slow_network(true);
        assert!(Arc::ptr_eq(
            &engine.current_downloader(),
            &engine.slow_downloader
        ));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (engine, _dir) = engine();
        engine.stop();
        engine.stop();
        assert!(engine.is_stopped());
    }
}
