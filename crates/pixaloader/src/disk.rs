//! URI-keyed disk cache adapters
//!
//! [`LruUriCache`] adapts the journaled [`pixastore::DiskLruCache`] to the
//! loader's URI-keyed interface; [`PlainUriCache`] is the unbounded,
//! journal-free fallback.

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, warn};

use pixacache::Bitmap;
use pixastore::{DiskLruCache, Result as StoreResult};

use crate::decoder::{BitmapEncoder, CompressFormat, RawBitmapEncoder};
use crate::listener::CopyListener;
use crate::naming::{FileNameGenerator, HashNameGenerator};

/// Default copy buffer size (32 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Default quality for compressed formats
pub const DEFAULT_COMPRESS_QUALITY: u8 = 100;

/// Disk cache keyed by free-form URIs.
///
/// Implementations map URIs through a [`FileNameGenerator`] onto their own
/// key space. `get` hands out the path of the cached copy for out-of-band
/// decoding.
pub trait UriDiskCache: Send + Sync {
    /// Directory the cache stores files in
    fn directory(&self) -> PathBuf;

    /// Path of the cached file for `uri`, if one is committed
    fn get(&self, uri: &str) -> Option<PathBuf>;

    /// Stream `source` into the cache entry for `uri`.
    ///
    /// The listener may cancel the copy; a cancelled or failed save leaves
    /// the previous entry intact and returns `Ok(false)`.
    fn save_stream(
        &self,
        uri: &str,
        source: &mut dyn Read,
        length: Option<u64>,
        listener: Option<&dyn CopyListener>,
    ) -> StoreResult<bool>;

    /// Serialize `bitmap` into the cache entry for `uri`
    fn save_bitmap(&self, uri: &str, bitmap: &Bitmap) -> StoreResult<bool>;

    /// Drop the entry for `uri`, returning whether one was removed
    fn remove(&self, uri: &str) -> bool;

    /// Drop every entry
    fn clear(&self);

    /// Release the cache's resources; subsequent calls may fail
    fn close(&self);
}

/// Bounded, journaled, LRU disk cache keyed by URI.
pub struct LruUriCache {
    cache: RwLock<DiskLruCache>,
    name_generator: Arc<dyn FileNameGenerator>,
    encoder: Arc<dyn BitmapEncoder>,
    compress_format: CompressFormat,
    compress_quality: u8,
    buffer_size: usize,

    // Open parameters, latched so `clear` can tear down and reopen.
    primary_directory: PathBuf,
    reserve_directory: Option<PathBuf>,
    max_size: u64,
    max_file_count: u64,
}

/// Application version baked into the journal header
const CACHE_APP_VERSION: u32 = 1;

/// One value slot per entry: the image bytes
const CACHE_VALUE_COUNT: usize = 1;

impl LruUriCache {
    /// Open the cache under `directory`.
    ///
    /// A `max_size` or `max_file_count` of zero means unbounded. When the
    /// primary directory cannot be opened and `reserve_directory` is given,
    /// the open is retried there once.
    pub fn new(
        directory: impl Into<PathBuf>,
        reserve_directory: Option<PathBuf>,
        max_size: u64,
        max_file_count: u64,
    ) -> StoreResult<Self> {
        let primary_directory = directory.into();
        let max_size = if max_size == 0 { u64::MAX } else { max_size };
        let max_file_count = if max_file_count == 0 {
            u64::MAX
        } else {
            max_file_count
        };

        let cache = Self::open_store(
            &primary_directory,
            reserve_directory.as_deref(),
            max_size,
            max_file_count,
        )?;

        Ok(Self {
            cache: RwLock::new(cache),
            name_generator: Arc::new(HashNameGenerator),
            encoder: Arc::new(RawBitmapEncoder),
            compress_format: CompressFormat::default(),
            compress_quality: DEFAULT_COMPRESS_QUALITY,
            buffer_size: DEFAULT_BUFFER_SIZE,
            primary_directory,
            reserve_directory,
            max_size,
            max_file_count,
        })
    }

    /// Use a custom name generator
    pub fn with_name_generator(mut self, generator: Arc<dyn FileNameGenerator>) -> Self {
        self.name_generator = generator;
        self
    }

    /// Use a custom bitmap encoder
    pub fn with_encoder(mut self, encoder: Arc<dyn BitmapEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Set the serialization format for [`save_bitmap`](UriDiskCache::save_bitmap)
    pub fn with_compress_format(mut self, format: CompressFormat, quality: u8) -> Self {
        self.compress_format = format;
        self.compress_quality = quality;
        self
    }

    /// Set the copy buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    fn open_store(
        directory: &Path,
        reserve: Option<&Path>,
        max_size: u64,
        max_file_count: u64,
    ) -> StoreResult<DiskLruCache> {
        match DiskLruCache::open(
            directory,
            CACHE_APP_VERSION,
            CACHE_VALUE_COUNT,
            max_size,
            max_file_count,
        ) {
            Ok(cache) => Ok(cache),
            Err(err) => {
                warn!(
                    directory = %directory.display(),
                    error = %err,
                    "failed to open primary cache directory",
                );
                match reserve {
                    Some(reserve) => DiskLruCache::open(
                        reserve,
                        CACHE_APP_VERSION,
                        CACHE_VALUE_COUNT,
                        max_size,
                        max_file_count,
                    ),
                    None => Err(err),
                }
            }
        }
    }

    fn key(&self, uri: &str) -> String {
        self.name_generator.generate(uri)
    }
}

impl UriDiskCache for LruUriCache {
    fn directory(&self) -> PathBuf {
        self.cache.read().directory().to_path_buf()
    }

    fn get(&self, uri: &str) -> Option<PathBuf> {
        let cache = self.cache.read();
        match cache.get(&self.key(uri)) {
            Ok(snapshot) => snapshot.map(|s| s.file(0).to_path_buf()),
            Err(err) => {
                warn!(uri, error = %err, "disk cache lookup failed");
                None
            }
        }
    }

    fn save_stream(
        &self,
        uri: &str,
        source: &mut dyn Read,
        length: Option<u64>,
        listener: Option<&dyn CopyListener>,
    ) -> StoreResult<bool> {
        let cache = self.cache.read();
        let Some(mut editor) = cache.edit(&self.key(uri))? else {
            return Ok(false);
        };

        let copied = {
            let writer = editor.writer(0)?;
            let mut out = BufWriter::with_capacity(self.buffer_size, writer);
            copy_stream(source, &mut out, length, listener, self.buffer_size)?
        };

        if copied {
            editor.commit()?;
        } else {
            editor.abort()?;
        }
        Ok(copied)
    }

    fn save_bitmap(&self, uri: &str, bitmap: &Bitmap) -> StoreResult<bool> {
        let cache = self.cache.read();
        let Some(mut editor) = cache.edit(&self.key(uri))? else {
            return Ok(false);
        };

        let saved = {
            let writer = editor.writer(0)?;
            let mut out = BufWriter::with_capacity(self.buffer_size, writer);
            let result = self.encoder.compress(
                bitmap,
                self.compress_format,
                self.compress_quality,
                &mut out,
            );
            result.and_then(|()| out.flush()).is_ok()
        };

        if saved {
            editor.commit()?;
        } else {
            editor.abort()?;
        }
        Ok(saved)
    }

    fn remove(&self, uri: &str) -> bool {
        let cache = self.cache.read();
        match cache.remove(&self.key(uri)) {
            Ok(removed) => removed,
            Err(err) => {
                warn!(uri, error = %err, "disk cache remove failed");
                false
            }
        }
    }

    fn clear(&self) {
        let mut cache = self.cache.write();
        if let Err(err) = cache.delete() {
            warn!(error = %err, "failed to delete disk cache");
        }
        match Self::open_store(
            &self.primary_directory,
            self.reserve_directory.as_deref(),
            self.max_size,
            self.max_file_count,
        ) {
            Ok(fresh) => *cache = fresh,
            Err(err) => {
                error!(error = %err, "failed to reopen disk cache after clear");
            }
        }
    }

    fn close(&self) {
        if let Err(err) = self.cache.read().close() {
            warn!(error = %err, "failed to close disk cache");
        }
    }
}

/// Unbounded disk cache without a journal: one file per URI, published by a
/// `.tmp`-then-rename.
pub struct PlainUriCache {
    directory: PathBuf,
    reserve_directory: Option<PathBuf>,
    name_generator: Arc<dyn FileNameGenerator>,
    encoder: Arc<dyn BitmapEncoder>,
    compress_format: CompressFormat,
    compress_quality: u8,
    buffer_size: usize,
}

const TEMP_FILE_POSTFIX: &str = ".tmp";

impl PlainUriCache {
    /// Create a cache under `directory`
    pub fn new(directory: impl Into<PathBuf>, reserve_directory: Option<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            reserve_directory,
            name_generator: Arc::new(HashNameGenerator),
            encoder: Arc::new(RawBitmapEncoder),
            compress_format: CompressFormat::default(),
            compress_quality: DEFAULT_COMPRESS_QUALITY,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Use a custom name generator
    pub fn with_name_generator(mut self, generator: Arc<dyn FileNameGenerator>) -> Self {
        self.name_generator = generator;
        self
    }

    /// File this URI maps to, falling back to the reserve directory when the
    /// primary cannot be created
    fn file_for(&self, uri: &str) -> PathBuf {
        let name = self.name_generator.generate(uri);
        let mut dir = self.directory.as_path();
        if !dir.exists() && fs::create_dir_all(dir).is_err() {
            if let Some(reserve) = &self.reserve_directory {
                if reserve.exists() || fs::create_dir_all(reserve).is_ok() {
                    dir = reserve.as_path();
                }
            }
        }
        dir.join(name)
    }
}

impl UriDiskCache for PlainUriCache {
    fn directory(&self) -> PathBuf {
        self.directory.clone()
    }

    fn get(&self, uri: &str) -> Option<PathBuf> {
        let file = self.file_for(uri);
        file.exists().then_some(file)
    }

    fn save_stream(
        &self,
        uri: &str,
        source: &mut dyn Read,
        length: Option<u64>,
        listener: Option<&dyn CopyListener>,
    ) -> StoreResult<bool> {
        let file = self.file_for(uri);
        let mut tmp = file.clone().into_os_string();
        tmp.push(TEMP_FILE_POSTFIX);
        let tmp = PathBuf::from(tmp);

        let mut copied = {
            let mut out = BufWriter::with_capacity(self.buffer_size, fs::File::create(&tmp)?);
            let copied = copy_stream(source, &mut out, length, listener, self.buffer_size)?;
            copied && out.flush().is_ok()
        };

        if copied && fs::rename(&tmp, &file).is_err() {
            copied = false;
        }
        if !copied {
            let _ = fs::remove_file(&tmp);
        }
        Ok(copied)
    }

    fn save_bitmap(&self, uri: &str, bitmap: &Bitmap) -> StoreResult<bool> {
        let bytes = {
            let mut bytes = Vec::new();
            match self.encoder.compress(
                bitmap,
                self.compress_format,
                self.compress_quality,
                &mut bytes,
            ) {
                Ok(()) => bytes,
                Err(_) => return Ok(false),
            }
        };
        self.save_stream(uri, &mut bytes.as_slice(), Some(bytes.len() as u64), None)
    }

    fn remove(&self, uri: &str) -> bool {
        fs::remove_file(self.file_for(uri)).is_ok()
    }

    fn clear(&self) {
        if let Ok(entries) = fs::read_dir(&self.directory) {
            for entry in entries.flatten() {
                let _ = fs::remove_file(entry.path());
            }
        }
    }

    fn close(&self) {
        // Nothing to release.
    }
}

/// Copy `source` into `out` in `buffer_size` chunks, reporting progress and
/// honoring cancellation. Returns whether the copy ran to completion.
fn copy_stream(
    source: &mut dyn Read,
    out: &mut dyn Write,
    length: Option<u64>,
    listener: Option<&dyn CopyListener>,
    buffer_size: usize,
) -> io::Result<bool> {
    if let Some(listener) = listener {
        if !listener.on_bytes_copied(0, length) {
            return Ok(false);
        }
    }

    let mut buf = vec![0u8; buffer_size];
    let mut copied: u64 = 0;
    loop {
        let read = source.read(&mut buf)?;
        if read == 0 {
            break;
        }
        out.write_all(&buf[..read])?;
        copied += read as u64;
        if let Some(listener) = listener {
            if !listener.on_bytes_copied(copied, length) {
                return Ok(false);
            }
        }
    }
    out.flush()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    fn save_bytes(cache: &dyn UriDiskCache, uri: &str, bytes: &[u8]) -> bool {
        cache
            .save_stream(uri, &mut &bytes[..], Some(bytes.len() as u64), None)
            .unwrap()
    }

    #[test]
    fn test_save_and_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = LruUriCache::new(dir.path().join("cache"), None, 0, 0).unwrap();

        assert!(save_bytes(&cache, "http://host/a.png", b"the image bytes"));

        let path = cache.get("http://host/a.png").unwrap();
        assert_eq!(fs::read(path).unwrap(), b"the image bytes");
        assert!(cache.get("http://host/other.png").is_none());
    }

    #[test]
    fn test_save_bitmap_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = LruUriCache::new(dir.path().join("cache"), None, 0, 0).unwrap();
        let bitmap = Bitmap::solid(2, 2, [5, 6, 7, 8]);

        assert!(cache.save_bitmap("http://host/a.png", &bitmap).unwrap());

        let path = cache.get("http://host/a.png").unwrap();
        assert_eq!(fs::read(path).unwrap(), crate::decoder::encode_raw(&bitmap));
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let cache = LruUriCache::new(dir.path().join("cache"), None, 0, 0).unwrap();
        save_bytes(&cache, "http://host/a.png", b"bytes");

        assert!(cache.remove("http://host/a.png"));
        assert!(cache.get("http://host/a.png").is_none());
        assert!(!cache.remove("http://host/a.png"));
    }

    #[test]
    fn test_clear_then_get_is_none() {
        let dir = TempDir::new().unwrap();
        let cache = LruUriCache::new(dir.path().join("cache"), None, 0, 0).unwrap();
        save_bytes(&cache, "http://host/a.png", b"bytes");
        save_bytes(&cache, "http://host/b.png", b"more");

        cache.clear();

        assert!(cache.get("http://host/a.png").is_none());
        assert!(cache.get("http://host/b.png").is_none());
        // The cache is usable again after the reopen.
        assert!(save_bytes(&cache, "http://host/a.png", b"fresh"));
        assert!(cache.get("http://host/a.png").is_some());
    }

    #[test]
    fn test_cancelled_copy_does_not_commit() {
        struct CancelAfter {
            limit: u64,
        }
        impl CopyListener for CancelAfter {
            fn on_bytes_copied(&self, current: u64, _total: Option<u64>) -> bool {
                current < self.limit
            }
        }

        let dir = TempDir::new().unwrap();
        let cache = LruUriCache::new(dir.path().join("cache"), None, 0, 0).unwrap();

        let bytes = vec![b'x'; 256 * 1024];
        let saved = cache
            .save_stream(
                "http://host/a.png",
                &mut &bytes[..],
                Some(bytes.len() as u64),
                Some(&CancelAfter { limit: 1 }),
            )
            .unwrap();

        assert!(!saved);
        assert!(cache.get("http://host/a.png").is_none());
    }

    #[test]
    fn test_progress_reported() {
        struct Counting {
            calls: AtomicU64,
        }
        impl CopyListener for Counting {
            fn on_bytes_copied(&self, _current: u64, _total: Option<u64>) -> bool {
                self.calls.fetch_add(1, Ordering::Relaxed);
                true
            }
        }

        let dir = TempDir::new().unwrap();
        let cache = LruUriCache::new(dir.path().join("cache"), None, 0, 0).unwrap();
        let listener = Counting {
            calls: AtomicU64::new(0),
        };

        let bytes = vec![b'x'; 100 * 1024];
        assert!(cache
            .save_stream(
                "http://host/a.png",
                &mut &bytes[..],
                Some(bytes.len() as u64),
                Some(&listener),
            )
            .unwrap());

        assert!(listener.calls.load(Ordering::Relaxed) >= 2);
    }

    #[test]
    fn test_reserve_directory_fallback() {
        let dir = TempDir::new().unwrap();
        // A file where the primary directory should be forces the fallback.
        let primary = dir.path().join("blocked");
        fs::write(&primary, b"not a directory").unwrap();
        let reserve = dir.path().join("reserve");

        let cache = LruUriCache::new(&primary, Some(reserve.clone()), 0, 0).unwrap();
        assert!(save_bytes(&cache, "http://host/a.png", b"bytes"));
        assert!(cache.directory().starts_with(&reserve));
    }

    #[test]
    fn test_plain_cache_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = PlainUriCache::new(dir.path().join("plain"), None);

        assert!(save_bytes(&cache, "http://host/a.png", b"plain bytes"));
        let path = cache.get("http://host/a.png").unwrap();
        assert_eq!(fs::read(path).unwrap(), b"plain bytes");

        assert!(cache.remove("http://host/a.png"));
        assert!(cache.get("http://host/a.png").is_none());
    }

    #[test]
    fn test_plain_cache_clear() {
        let dir = TempDir::new().unwrap();
        let cache = PlainUriCache::new(dir.path().join("plain"), None);
        save_bytes(&cache, "a", b"1");
        save_bytes(&cache, "b", b"2");

        cache.clear();

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
    }
}
