//! Transactional editor for a single cache entry

use std::fs::File;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::Shared;
use crate::error::Result;
use crate::table::EditorId;

/// Edits the values of one entry.
///
/// Every editor must be finished with [`commit`](Editor::commit) or
/// [`abort`](Editor::abort); an editor dropped without either is aborted.
/// While the edit is open the entry's slots are written through dirty files;
/// committing renames them into place atomically, so readers observe either
/// the full previous or the full new set of values.
pub struct Editor {
    pub(crate) shared: Arc<Shared>,
    pub(crate) key: String,
    pub(crate) id: EditorId,

    /// Per-slot write tracking, meaningful only for a first-time entry
    pub(crate) written: Vec<bool>,

    /// True when the entry had never been published at edit start
    pub(crate) first_time: bool,

    /// Latched by the fault-hiding slot writers
    pub(crate) has_errors: Arc<AtomicBool>,

    finished: bool,
}

impl Editor {
    pub(crate) fn new(
        shared: Arc<Shared>,
        key: String,
        id: EditorId,
        slot_count: usize,
        first_time: bool,
    ) -> Self {
        Self {
            shared,
            key,
            id,
            written: vec![false; slot_count],
            first_time,
            has_errors: Arc::new(AtomicBool::new(false)),
            finished: false,
        }
    }

    /// Key of the entry being edited
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Open a write stream for the given slot's dirty file.
    ///
    /// The returned writer never reports I/O failures; any error is latched
    /// on this editor and surfaces as a failed [`commit`](Editor::commit).
    pub fn writer(&mut self, index: usize) -> Result<SlotWriter> {
        let shared = Arc::clone(&self.shared);
        shared.slot_writer(self, index)
    }

    /// Commit this edit, making it visible to readers.
    ///
    /// If any slot writer hit an I/O error the previous value is discarded
    /// instead, matching the original fault-hiding contract.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let shared = Arc::clone(&self.shared);
        if self.has_errors.load(Ordering::Relaxed) {
            shared.complete_edit(&self, false)?;
            // The previous entry is stale.
            shared.remove(&self.key)?;
            Ok(())
        } else {
            shared.complete_edit(&self, true)
        }
    }

    /// Abort this edit, releasing the entry for other editors
    pub fn abort(mut self) -> Result<()> {
        self.finished = true;
        let shared = Arc::clone(&self.shared);
        shared.complete_edit(&self, false)
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            let shared = Arc::clone(&self.shared);
            let _ = shared.complete_edit(self, false);
        }
    }
}

/// Write stream for one slot of an open edit.
///
/// Backed by the slot's dirty file, or by nothing at all when even the
/// fallback file creation failed. Errors never propagate to the caller;
/// they latch on the owning editor instead.
pub struct SlotWriter {
    inner: FaultHidingWriter<File>,
}

impl SlotWriter {
    pub(crate) fn new(file: Option<File>, errors: Arc<AtomicBool>) -> Self {
        Self {
            inner: FaultHidingWriter::new(file, errors),
        }
    }
}

impl Write for SlotWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decorator that swallows write errors and latches them on a shared flag
pub(crate) struct FaultHidingWriter<W> {
    inner: Option<W>,
    errors: Arc<AtomicBool>,
}

impl<W: Write> FaultHidingWriter<W> {
    pub(crate) fn new(inner: Option<W>, errors: Arc<AtomicBool>) -> Self {
        Self { inner, errors }
    }
}

impl<W: Write> Write for FaultHidingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(inner) = &mut self.inner {
            if inner.write_all(buf).is_err() {
                self.errors.store(true, Ordering::Relaxed);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(inner) = &mut self.inner {
            if inner.flush().is_err() {
                self.errors.store(true, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}
