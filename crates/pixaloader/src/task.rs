//! Load-and-display task
//!
//! One task per display request. The body runs on a pool worker: pause gate,
//! optional delay, per-URI lock, memory cache recheck, disk decode or
//! download-commit-decode, processors, memory cache insert, and finally the
//! display dispatch. Cancellation is checked cooperatively at every stage:
//! the target may have been re-bound to another URI, collected, or the
//! engine stopped.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, warn};

use pixacache::Bitmap;

use crate::decoder::DecodeRequest;
use crate::engine::LoaderEngine;
use crate::listener::{CopyListener, FailKind, FailReason, LoadListener, ProgressListener};
use crate::options::DisplayOptions;
use crate::target::{TargetId, TargetRef};
use crate::types::{ImageSize, LoadedFrom};

/// Marker for a cooperatively-cancelled task
struct TaskCancelled;

type TaskResult<T> = Result<T, TaskCancelled>;

/// A single load/display request in flight
pub(crate) struct LoadTask {
    engine: Arc<LoaderEngine>,
    uri: String,
    memory_cache_key: String,
    target: TargetRef,
    target_id: TargetId,
    target_size: ImageSize,
    options: DisplayOptions,
    listener: Arc<dyn LoadListener>,
    progress_listener: Option<Arc<dyn ProgressListener>>,
    uri_lock: Arc<Mutex<()>>,
}

impl LoadTask {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        engine: Arc<LoaderEngine>,
        uri: String,
        memory_cache_key: String,
        target: TargetRef,
        target_id: TargetId,
        target_size: ImageSize,
        options: DisplayOptions,
        listener: Arc<dyn LoadListener>,
        progress_listener: Option<Arc<dyn ProgressListener>>,
        uri_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            engine,
            uri,
            memory_cache_key,
            target,
            target_id,
            target_size,
            options,
            listener,
            progress_listener,
            uri_lock,
        }
    }

    pub(crate) fn uri(&self) -> &str {
        &self.uri
    }

    pub(crate) fn run(self) {
        if self.wait_if_paused() {
            return;
        }
        if self.delay_if_needed() {
            return;
        }

        debug!(key = %self.memory_cache_key, "start display image task");
        let uri_lock = Arc::clone(&self.uri_lock);
        if uri_lock.is_locked() {
            debug!(key = %self.memory_cache_key, "image is already loading, waiting");
        }

        let outcome = {
            let _guard = uri_lock.lock();
            self.load_under_lock()
        };

        match outcome {
            Ok(Some((bitmap, loaded_from))) => self.dispatch_display(bitmap, loaded_from),
            Ok(None) => {} // Failure already reported.
            Err(TaskCancelled) => self.fire_cancel_event(),
        }
    }

    /// Everything that must be serialized with other loads of the same URI
    fn load_under_lock(&self) -> TaskResult<Option<(Arc<Bitmap>, LoadedFrom)>> {
        self.check_task_not_actual()?;

        // Another request may have finished this URI while we waited on the
        // lock; the memory cache is the cheapest place to find out.
        if let Some(bitmap) = self.engine.config.memory_cache.get(&self.memory_cache_key) {
            debug!(key = %self.memory_cache_key, "got cached bitmap from memory after waiting");
            let bitmap = self.post_process(bitmap);
            self.check_task_not_actual()?;
            self.check_not_stopped()?;
            return Ok(Some((bitmap, LoadedFrom::MemoryCache)));
        }

        let Some((bitmap, loaded_from)) = self.try_load_bitmap()? else {
            return Ok(None);
        };
        let mut bitmap = bitmap;

        self.check_task_not_actual()?;
        self.check_not_stopped()?;

        if let Some(pre_processor) = &self.options.pre_processor {
            debug!(key = %self.memory_cache_key, "preprocess image before caching in memory");
            match pre_processor.process(Arc::clone(&bitmap)) {
                Some(processed) => bitmap = processed,
                None => warn!(key = %self.memory_cache_key, "pre-processor returned nothing"),
            }
        }
        if self.options.cache_in_memory {
            debug!(key = %self.memory_cache_key, "cache image in memory");
            self.engine
                .config
                .memory_cache
                .put(&self.memory_cache_key, Arc::clone(&bitmap));
        }

        let bitmap = self.post_process(bitmap);
        self.check_task_not_actual()?;
        self.check_not_stopped()?;
        Ok(Some((bitmap, loaded_from)))
    }

    fn post_process(&self, bitmap: Arc<Bitmap>) -> Arc<Bitmap> {
        if let Some(post_processor) = &self.options.post_processor {
            debug!(key = %self.memory_cache_key, "postprocess image before displaying");
            match post_processor.process(Arc::clone(&bitmap)) {
                Some(processed) => return processed,
                None => warn!(key = %self.memory_cache_key, "post-processor returned nothing"),
            }
        }
        bitmap
    }

    /// Decode from the disk cache, or download, commit, and decode
    fn try_load_bitmap(&self) -> TaskResult<Option<(Arc<Bitmap>, LoadedFrom)>> {
        let disk = &self.engine.config.disk_cache;

        if let Some(file) = disk.get(&self.uri) {
            if file_length(&file) > 0 {
                debug!(key = %self.memory_cache_key, "load image from disk cache");
                self.check_task_not_actual()?;
                match self.decode(&file_uri(&file)) {
                    Ok(bitmap) if !bitmap.is_empty() => {
                        return Ok(Some((Arc::new(bitmap), LoadedFrom::DiskCache)));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        debug!(key = %self.memory_cache_key, error = %err, "cached copy did not decode");
                    }
                }
            }
        }

        debug!(key = %self.memory_cache_key, "load image from network");
        let mut decode_uri = self.uri.clone();
        if self.options.cache_on_disk {
            match self.try_cache_image_on_disk() {
                Ok(true) => {
                    if let Some(file) = disk.get(&self.uri) {
                        decode_uri = file_uri(&file);
                    }
                }
                Ok(false) => {}
                Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                    self.fire_fail_event(FailKind::NetworkDenied, Some(err.to_string()));
                    return Ok(None);
                }
                Err(err) => {
                    self.fire_fail_event(FailKind::Io, Some(err.to_string()));
                    return Ok(None);
                }
            }
        }

        self.check_task_not_actual()?;
        match self.decode(&decode_uri) {
            Ok(bitmap) if !bitmap.is_empty() => Ok(Some((Arc::new(bitmap), LoadedFrom::Network))),
            Ok(_) => {
                self.fire_fail_event(FailKind::Decoding, None);
                Ok(None)
            }
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                self.fire_fail_event(FailKind::NetworkDenied, Some(err.to_string()));
                Ok(None)
            }
            Err(err) => {
                self.fire_fail_event(FailKind::Decoding, Some(err.to_string()));
                Ok(None)
            }
        }
    }

    /// Download the image into the disk cache, optionally resizing the kept
    /// copy. `PermissionDenied` aborts the load; other I/O failures fall
    /// back to decoding straight from the source.
    fn try_cache_image_on_disk(&self) -> io::Result<bool> {
        debug!(key = %self.memory_cache_key, "cache image on disk");
        let loaded = match self.download_image() {
            Ok(loaded) => loaded,
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => return Err(err),
            Err(err) => {
                warn!(key = %self.memory_cache_key, error = %err, "download failed");
                false
            }
        };

        if loaded {
            if let Some(max_size) = self.engine.config.max_disk_cache_image_size {
                debug!(key = %self.memory_cache_key, "resize image in disk cache");
                if let Err(err) = self.resize_and_save_image(max_size) {
                    warn!(key = %self.memory_cache_key, error = %err, "resize for disk cache failed");
                }
            }
        }
        Ok(loaded)
    }

    fn download_image(&self) -> io::Result<bool> {
        let downloader = self.engine.current_downloader();
        let stream = downloader.stream(&self.uri, self.options.extra_for_downloader.as_deref())?;
        let mut reader = stream.reader;

        let copy_listener = TaskCopyListener { task: self };
        self.engine
            .config
            .disk_cache
            .save_stream(&self.uri, &mut *reader, stream.length, Some(&copy_listener))
            .map_err(|err| io::Error::other(err.to_string()))
    }

    /// Decode the cached copy at a bounded size and re-commit it
    fn resize_and_save_image(&self, max_size: ImageSize) -> io::Result<bool> {
        let disk = &self.engine.config.disk_cache;
        let Some(file) = disk.get(&self.uri) else {
            return Ok(false);
        };

        let bitmap = self.decode_with_size(&file_uri(&file), max_size)?;
        let mut bitmap = Arc::new(bitmap);
        if let Some(processor) = &self.engine.config.processor_for_disk_cache {
            debug!(key = %self.memory_cache_key, "process image before cache on disk");
            match processor.process(Arc::clone(&bitmap)) {
                Some(processed) => bitmap = processed,
                None => warn!(key = %self.memory_cache_key, "disk-cache processor returned nothing"),
            }
        }
        disk.save_bitmap(&self.uri, &bitmap)
            .map_err(|err| io::Error::other(err.to_string()))
    }

    fn decode(&self, uri: &str) -> io::Result<Bitmap> {
        self.decode_with_size(uri, self.target_size)
    }

    fn decode_with_size(&self, uri: &str, target_size: ImageSize) -> io::Result<Bitmap> {
        let downloader = self.engine.current_downloader();
        self.engine.config.decoder.decode(&DecodeRequest {
            uri,
            source_uri: &self.uri,
            target_size,
            scale_type: self.options.scale_type,
            downloader: downloader.as_ref(),
            extra: self.options.extra_for_downloader.as_deref(),
        })
    }

    /// Returns true when the task should be abandoned
    fn wait_if_paused(&self) -> bool {
        if self.engine.is_paused() {
            debug!(key = %self.memory_cache_key, "loader is paused, waiting");
            self.engine.await_resume();
            if self.engine.is_stopped() {
                return true;
            }
            debug!(key = %self.memory_cache_key, "resumed after pause");
        }
        self.is_task_not_actual()
    }

    /// Returns true when the task should be abandoned
    fn delay_if_needed(&self) -> bool {
        if let Some(delay) = self.options.delay_before_loading {
            debug!(key = %self.memory_cache_key, delay_ms = delay.as_millis() as u64, "delay before loading");
            thread::sleep(delay);
            return self.is_task_not_actual();
        }
        false
    }

    fn dispatch_display(&self, bitmap: Arc<Bitmap>, loaded_from: LoadedFrom) {
        let engine = Arc::clone(&self.engine);
        let target = self.target.clone();
        let target_id = self.target_id;
        let key = self.memory_cache_key.clone();
        let uri = self.uri.clone();
        let listener = Arc::clone(&self.listener);

        let display = move || {
            let Some(target) = target.upgrade() else {
                debug!(key = %key, "target was collected, task is cancelled");
                listener.on_loading_cancelled(&uri);
                return;
            };
            if engine.loading_key_for(target_id).as_deref() != Some(key.as_str()) {
                debug!(key = %key, "target is reused for another image, task is cancelled");
                listener.on_loading_cancelled(&uri);
                return;
            }
            debug!(key = %key, from = ?loaded_from, "display image");
            target.display(&bitmap);
            engine.cancel_display_task_for(target_id);
            listener.on_loading_complete(&uri, Some(&bitmap));
        };

        if self.options.sync_loading {
            display();
        } else {
            self.engine.config.dispatcher.post(Box::new(display));
        }
    }

    fn fire_fail_event(&self, kind: FailKind, cause: Option<String>) {
        if self.options.sync_loading || self.engine.is_stopped() || self.is_task_not_actual() {
            return;
        }
        let target = self.target.clone();
        let fail_image = self.options.image_on_fail.clone();
        let uri = self.uri.clone();
        let listener = Arc::clone(&self.listener);

        self.engine.config.dispatcher.post(Box::new(move || {
            if let (Some(target), Some(image)) = (target.upgrade(), &fail_image) {
                target.display(image);
            }
            listener.on_loading_failed(&uri, &FailReason { kind, cause });
        }));
    }

    fn fire_cancel_event(&self) {
        if self.options.sync_loading || self.engine.is_stopped() {
            return;
        }
        let uri = self.uri.clone();
        let listener = Arc::clone(&self.listener);
        self.engine.config.dispatcher.post(Box::new(move || {
            listener.on_loading_cancelled(&uri);
        }));
    }

    fn fire_progress_event(&self, current: u64, total: Option<u64>) -> bool {
        if self.engine.is_stopped() || self.is_task_not_actual() {
            return false;
        }
        if let Some(progress) = &self.progress_listener {
            let progress = Arc::clone(progress);
            let uri = self.uri.clone();
            self.engine.config.dispatcher.post(Box::new(move || {
                progress.on_progress(&uri, current, total);
            }));
        }
        true
    }

    fn check_task_not_actual(&self) -> TaskResult<()> {
        if self.is_task_not_actual() {
            return Err(TaskCancelled);
        }
        Ok(())
    }

    fn check_not_stopped(&self) -> TaskResult<()> {
        if self.engine.is_stopped() {
            debug!(key = %self.memory_cache_key, "engine stopped, task is cancelled");
            return Err(TaskCancelled);
        }
        Ok(())
    }

    fn is_task_not_actual(&self) -> bool {
        self.is_target_collected() || self.is_target_reused()
    }

    fn is_target_collected(&self) -> bool {
        if self.target.is_collected() {
            debug!(key = %self.memory_cache_key, "target was collected, task is cancelled");
            return true;
        }
        false
    }

    fn is_target_reused(&self) -> bool {
        let current = self.engine.loading_key_for(self.target_id);
        if current.as_deref() != Some(self.memory_cache_key.as_str()) {
            debug!(key = %self.memory_cache_key, "target is reused for another image, task is cancelled");
            return true;
        }
        false
    }
}

/// Progress bridge handed to the disk cache during downloads
struct TaskCopyListener<'a> {
    task: &'a LoadTask,
}

impl CopyListener for TaskCopyListener<'_> {
    fn on_bytes_copied(&self, current: u64, total: Option<u64>) -> bool {
        self.task.options.sync_loading || self.task.fire_progress_event(current, total)
    }
}

fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn file_length(path: &Path) -> u64 {
    std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}
