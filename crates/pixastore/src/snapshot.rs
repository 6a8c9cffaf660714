//! Read-only snapshot of a committed entry

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// A consistent view of an entry's slot files at a point in time.
///
/// All slot files are opened eagerly when the snapshot is taken, so the
/// snapshot keeps observing the values published by a single commit even if
/// the entry is edited or evicted afterwards. Dropping the snapshot closes
/// every handle.
pub struct Snapshot {
    key: String,
    sequence: u64,
    files: Vec<PathBuf>,
    readers: Vec<File>,
    lengths: Vec<u64>,
}

impl Snapshot {
    pub(crate) fn new(
        key: String,
        sequence: u64,
        files: Vec<PathBuf>,
        readers: Vec<File>,
        lengths: Vec<u64>,
    ) -> Self {
        Self {
            key,
            sequence,
            files,
            readers,
            lengths,
        }
    }

    /// Key of the entry this snapshot was taken from
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Sequence number of the commit this snapshot observes.
    ///
    /// Pass it to [`DiskLruCache::edit_at`](crate::DiskLruCache::edit_at) to
    /// refuse the edit if the entry has changed since.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Path of the clean file backing the given slot
    pub fn file(&self, index: usize) -> &Path {
        &self.files[index]
    }

    /// Open read handle for the given slot
    pub fn reader(&mut self, index: usize) -> &mut File {
        &mut self.readers[index]
    }

    /// Byte length of the given slot
    pub fn length(&self, index: usize) -> u64 {
        self.lengths[index]
    }

    /// Read the whole value of the given slot
    pub fn read_to_vec(&mut self, index: usize) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.lengths[index] as usize);
        self.readers[index].read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}
