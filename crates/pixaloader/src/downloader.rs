//! Byte-stream acquisition

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::sync::Arc;

/// A readable byte stream with its length, when known up front
pub struct ByteStream {
    /// The bytes
    pub reader: Box<dyn Read + Send>,
    /// Total length in bytes, if the source knows it
    pub length: Option<u64>,
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("length", &self.length)
            .finish()
    }
}

/// Fetches image bytes for a URI.
///
/// The loader never interprets URIs itself beyond scheme routing; plugging a
/// real HTTP client in is an application concern.
pub trait Downloader: Send + Sync {
    /// Open a stream for `uri`. `extra` is the request's opaque downloader
    /// payload.
    fn stream(&self, uri: &str, extra: Option<&[u8]>) -> io::Result<ByteStream>;
}

/// Whether the URI needs the network (`http`/`https`)
pub fn is_network_uri(uri: &str) -> bool {
    let lower = uri.get(..8).map(str::to_ascii_lowercase).unwrap_or_default();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// The local path of a `file://` URI, or the URI itself when it carries no
/// scheme at all
pub fn local_path_of(uri: &str) -> Option<&str> {
    if let Some(path) = uri.strip_prefix("file://") {
        Some(path)
    } else if !uri.contains("://") {
        Some(uri)
    } else {
        None
    }
}

/// Downloader for local content: `file://` URIs and bare paths
pub struct FileDownloader;

impl Downloader for FileDownloader {
    fn stream(&self, uri: &str, _extra: Option<&[u8]>) -> io::Result<ByteStream> {
        let Some(path) = local_path_of(uri) else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unsupported scheme: {}", uri),
            ));
        };
        let file = File::open(path)?;
        let length = file.metadata().ok().map(|meta| meta.len());
        Ok(ByteStream {
            reader: Box::new(file),
            length,
        })
    }
}

/// Decorator refusing network URIs while downloads are denied.
///
/// The engine swaps this in when
/// [`deny_network_downloads`](crate::ImageLoader::deny_network_downloads) is
/// active; the resulting `PermissionDenied` error surfaces to listeners as
/// [`FailKind::NetworkDenied`](crate::FailKind::NetworkDenied).
pub struct NetworkDeniedDownloader {
    inner: Arc<dyn Downloader>,
}

impl NetworkDeniedDownloader {
    /// Wrap a downloader
    pub fn new(inner: Arc<dyn Downloader>) -> Self {
        Self { inner }
    }
}

impl Downloader for NetworkDeniedDownloader {
    fn stream(&self, uri: &str, extra: Option<&[u8]>) -> io::Result<ByteStream> {
        if is_network_uri(uri) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "network downloads are denied",
            ));
        }
        self.inner.stream(uri, extra)
    }
}

/// Decorator re-buffering network streams in small chunks for flaky
/// connections
pub struct SlowNetworkDownloader {
    inner: Arc<dyn Downloader>,
}

/// Chunk size used when re-buffering slow-network streams
const SLOW_NETWORK_BUFFER_SIZE: usize = 4 * 1024;

impl SlowNetworkDownloader {
    /// Wrap a downloader
    pub fn new(inner: Arc<dyn Downloader>) -> Self {
        Self { inner }
    }
}

impl Downloader for SlowNetworkDownloader {
    fn stream(&self, uri: &str, extra: Option<&[u8]>) -> io::Result<ByteStream> {
        let stream = self.inner.stream(uri, extra)?;
        if is_network_uri(uri) {
            Ok(ByteStream {
                reader: Box::new(BufReader::with_capacity(
                    SLOW_NETWORK_BUFFER_SIZE,
                    stream.reader,
                )),
                length: stream.length,
            })
        } else {
            Ok(stream)
        }
    }
}
