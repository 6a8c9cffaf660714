//! Journaled disk cache facade
//!
//! Directory layout:
//! - `journal`: append-only log of cache operations, replayed on open
//! - `journal.tmp` / `journal.bkp`: transient files during compaction
//! - `<key>.<slot>`: published (clean) value file
//! - `<key>.<slot>.tmp`: in-progress (dirty) value file
//!
//! The cache bounds both total byte size and file count. Bounds are advisory:
//! commits may push the cache over them until the single background cleanup
//! thread trims back down. The cache directory must be exclusive to one cache
//! instance in one process.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Weak};
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::editor::{Editor, SlotWriter};
use crate::error::{Error, Result};
use crate::journal::{
    parse_record, write_header, JournalWriter, Record, JOURNAL_FILE, JOURNAL_FILE_BACKUP,
    JOURNAL_FILE_TMP, MAGIC, VERSION,
};
use crate::lines::LineReader;
use crate::snapshot::Snapshot;
use crate::table::{EditorId, EntryTable};

/// Journal compaction runs once it would drop at least this many records
const REDUNDANT_OP_COMPACT_THRESHOLD: usize = 2000;

/// Maximum key length in bytes
const MAX_KEY_LENGTH: usize = 64;

/// A cache that uses a bounded amount of space on the filesystem.
///
/// Each entry has a string key matching `[a-z0-9_-]{1,64}` and a fixed number
/// of value slots. Values are written through an [`Editor`] and read through
/// a [`Snapshot`]; commits are atomic, and every mutation is journaled so a
/// fresh open reconstructs the same state after a crash.
pub struct DiskLruCache {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    directory: PathBuf,
    app_version: u32,
    value_count: usize,
    inner: Mutex<Inner>,
    cleanup_tx: mpsc::Sender<()>,
}

struct Inner {
    table: EntryTable,
    /// `None` once the cache is closed
    journal: Option<JournalWriter>,
    size: u64,
    file_count: u64,
    max_size: u64,
    max_file_count: u64,
    redundant_op_count: usize,
    next_sequence: u64,
    next_editor: EditorId,
}

impl DiskLruCache {
    /// Open the cache in `directory`, creating it if none exists there.
    ///
    /// `app_version` is baked into the journal header; bumping it invalidates
    /// any existing cache. `value_count` is the number of value slots per
    /// entry. A corrupt journal is logged, the directory is deleted, and the
    /// open is retried once with a fresh empty cache.
    pub fn open<P: AsRef<Path>>(
        directory: P,
        app_version: u32,
        value_count: usize,
        max_size: u64,
        max_file_count: u64,
    ) -> Result<Self> {
        if max_size == 0 {
            return Err(Error::InvalidArgument("max_size must be positive"));
        }
        if max_file_count == 0 {
            return Err(Error::InvalidArgument("max_file_count must be positive"));
        }
        if value_count == 0 {
            return Err(Error::InvalidArgument("value_count must be positive"));
        }
        let directory = directory.as_ref().to_path_buf();

        // If a backup journal survived a crashed compaction, use it.
        restore_backup_journal(&directory)?;

        if directory.join(JOURNAL_FILE).exists() {
            match Self::recover(
                directory.clone(),
                app_version,
                value_count,
                max_size,
                max_file_count,
            ) {
                Ok(cache) => return Ok(cache),
                Err(err) => {
                    warn!(
                        directory = %directory.display(),
                        error = %err,
                        "disk cache is corrupt, removing",
                    );
                    delete_contents(&directory)?;
                }
            }
        }

        // Create a new empty cache.
        fs::create_dir_all(&directory)?;
        let cache = Self::assemble(
            directory,
            app_version,
            value_count,
            Inner {
                table: EntryTable::new(value_count),
                journal: None,
                size: 0,
                file_count: 0,
                max_size,
                max_file_count,
                redundant_op_count: 0,
                next_sequence: 0,
                next_editor: 0,
            },
        )?;
        {
            let mut inner = cache.shared.inner.lock();
            cache.shared.rebuild_journal_locked(&mut inner)?;
        }
        Ok(cache)
    }

    /// Rebuild in-memory state from an existing journal
    fn recover(
        directory: PathBuf,
        app_version: u32,
        value_count: usize,
        max_size: u64,
        max_file_count: u64,
    ) -> Result<Self> {
        let (table, redundant_op_count, next_editor) =
            read_journal(&directory, app_version, value_count)?;

        let mut inner = Inner {
            table,
            journal: None,
            size: 0,
            file_count: 0,
            max_size,
            max_file_count,
            redundant_op_count,
            next_sequence: 0,
            next_editor,
        };
        process_journal(&directory, value_count, &mut inner);
        delete_if_exists(&directory.join(JOURNAL_FILE_TMP))?;
        inner.journal = Some(JournalWriter::append_to(&directory.join(JOURNAL_FILE))?);

        Self::assemble(directory, app_version, value_count, inner)
    }

    /// Wire up the shared state and its single-threaded cleanup worker
    fn assemble(
        directory: PathBuf,
        app_version: u32,
        value_count: usize,
        inner: Inner,
    ) -> Result<Self> {
        let (cleanup_tx, cleanup_rx) = mpsc::channel::<()>();
        let (shared_tx, shared_rx) = mpsc::channel::<Weak<Shared>>();

        thread::Builder::new()
            .name("pixastore-cleanup".to_string())
            .spawn(move || {
                let Ok(shared) = shared_rx.recv() else { return };
                while cleanup_rx.recv().is_ok() {
                    let Some(shared) = shared.upgrade() else { break };
                    shared.run_cleanup();
                }
            })
            .map_err(Error::Io)?;

        let shared = Arc::new(Shared {
            directory,
            app_version,
            value_count,
            inner: Mutex::new(inner),
            cleanup_tx,
        });
        let _ = shared_tx.send(Arc::downgrade(&shared));

        Ok(Self { shared })
    }

    /// Return a snapshot of the entry named `key`, or `None` if it does not
    /// exist or is not currently readable. A returned entry becomes the most
    /// recently used.
    pub fn get(&self, key: &str) -> Result<Option<Snapshot>> {
        validate_key(key)?;
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        if inner.journal.is_none() {
            return Err(Error::Closed);
        }

        let (sequence, lengths) = match inner.table.get_mut(key, true) {
            Some(entry) if entry.readable && entry.current_editor.is_none() => {
                (entry.sequence, entry.lengths.clone())
            }
            _ => return Ok(None),
        };

        // Open all slot files eagerly so the snapshot observes a single
        // published commit even if the entry is edited or evicted later.
        let mut files = Vec::with_capacity(self.shared.value_count);
        let mut readers = Vec::with_capacity(self.shared.value_count);
        for index in 0..self.shared.value_count {
            let path = clean_file(&self.shared.directory, key, index);
            match File::open(&path) {
                Ok(file) => {
                    files.push(path);
                    readers.push(file);
                }
                // A file must have been deleted manually.
                Err(_) => return Ok(None),
            }
        }

        inner.redundant_op_count += 1;
        if let Some(journal) = inner.journal.as_mut() {
            journal.append(&Record::Read {
                key: key.to_string(),
            })?;
        }
        if rebuild_required(inner) {
            self.shared.schedule_cleanup();
        }

        Ok(Some(Snapshot::new(
            key.to_string(),
            sequence,
            files,
            readers,
            lengths,
        )))
    }

    /// Return an editor for the entry named `key`, or `None` if another edit
    /// is in progress.
    pub fn edit(&self, key: &str) -> Result<Option<Editor>> {
        self.edit_internal(key, None)
    }

    /// Like [`edit`](Self::edit), but additionally returns `None` when the
    /// entry has been committed since the snapshot carrying
    /// `expected_sequence` was taken.
    pub fn edit_at(&self, key: &str, expected_sequence: u64) -> Result<Option<Editor>> {
        self.edit_internal(key, Some(expected_sequence))
    }

    fn edit_internal(&self, key: &str, expected_sequence: Option<u64>) -> Result<Option<Editor>> {
        validate_key(key)?;
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        if inner.journal.is_none() {
            return Err(Error::Closed);
        }

        if let Some(expected) = expected_sequence {
            match inner.table.peek(key) {
                Some(entry) if entry.sequence == expected => {}
                _ => return Ok(None), // Snapshot is stale.
            }
        }
        if let Some(entry) = inner.table.peek(key) {
            if entry.current_editor.is_some() {
                return Ok(None); // Another edit is in progress.
            }
        }

        let id = inner.next_editor;
        inner.next_editor += 1;
        let entry = inner.table.get_or_insert(key);
        entry.current_editor = Some(id);
        let first_time = !entry.readable;

        // Flush the journal before creating files to prevent file leaks.
        if let Some(journal) = inner.journal.as_mut() {
            journal.append(&Record::Dirty {
                key: key.to_string(),
            })?;
        }

        Ok(Some(Editor::new(
            Arc::clone(&self.shared),
            key.to_string(),
            id,
            self.shared.value_count,
            first_time,
        )))
    }

    /// Drop the entry for `key` if it exists and can be removed. Entries
    /// actively being edited cannot be removed.
    ///
    /// Returns whether an entry was removed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        if inner.journal.is_none() {
            return Err(Error::Closed);
        }
        self.shared.remove_locked(inner, key)
    }

    /// Trim to the configured bounds and force journal writes to the
    /// filesystem.
    pub fn flush(&self) -> Result<()> {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        if inner.journal.is_none() {
            return Err(Error::Closed);
        }
        self.shared.trim_to_size_locked(inner)?;
        self.shared.trim_to_file_count_locked(inner)?;
        if let Some(journal) = inner.journal.as_mut() {
            journal.flush()?;
        }
        Ok(())
    }

    /// Close the cache. Stored values remain on the filesystem; live editors
    /// are aborted. Closing an already-closed cache is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        if inner.journal.is_none() {
            return Ok(()); // Already closed.
        }
        for key in inner.table.keys_lru() {
            let in_edit = inner
                .table
                .peek(&key)
                .is_some_and(|entry| entry.current_editor.is_some());
            if in_edit {
                self.shared.abort_edit_locked(inner, &key)?;
            }
        }
        self.shared.trim_to_size_locked(inner)?;
        self.shared.trim_to_file_count_locked(inner)?;
        if let Some(mut journal) = inner.journal.take() {
            // The cache is being torn down anyway.
            let _ = journal.flush();
        }
        Ok(())
    }

    /// Close the cache and delete its directory, including any files that
    /// were not created by the cache.
    pub fn delete(&self) -> Result<()> {
        self.close()?;
        delete_contents(&self.shared.directory)?;
        Ok(())
    }

    /// Directory where this cache stores its data
    pub fn directory(&self) -> &Path {
        &self.shared.directory
    }

    /// Number of value slots per entry
    pub fn value_count(&self) -> usize {
        self.shared.value_count
    }

    /// Number of bytes currently used to store values. May exceed the
    /// maximum size while a background trim is pending.
    pub fn size(&self) -> u64 {
        self.shared.inner.lock().size
    }

    /// Number of clean files currently stored. May exceed the maximum file
    /// count while a background trim is pending.
    pub fn file_count(&self) -> u64 {
        self.shared.inner.lock().file_count
    }

    /// Maximum number of bytes this cache should use
    pub fn max_size(&self) -> u64 {
        self.shared.inner.lock().max_size
    }

    /// Maximum number of files this cache should store
    pub fn max_file_count(&self) -> u64 {
        self.shared.inner.lock().max_file_count
    }

    /// Change the size bound and queue a background trim
    pub fn set_max_size(&self, max_size: u64) {
        self.shared.inner.lock().max_size = max_size;
        self.shared.schedule_cleanup();
    }

    /// Whether this cache has been closed
    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().journal.is_none()
    }
}

impl Shared {
    fn schedule_cleanup(&self) {
        let _ = self.cleanup_tx.send(());
    }

    fn run_cleanup(&self) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.journal.is_none() {
            return; // Closed.
        }
        if let Err(err) = self.cleanup_locked(inner) {
            warn!(error = %err, "background cache cleanup failed");
        }
    }

    fn cleanup_locked(&self, inner: &mut Inner) -> Result<()> {
        self.trim_to_size_locked(inner)?;
        self.trim_to_file_count_locked(inner)?;
        if rebuild_required(inner) {
            debug!(records = inner.redundant_op_count, "compacting journal");
            self.rebuild_journal_locked(inner)?;
            inner.redundant_op_count = 0;
        }
        Ok(())
    }

    /// Rewrite the journal to hold only the records describing live entries.
    ///
    /// The current journal (if any) is parked as `journal.bkp` while the
    /// freshly staged `journal.tmp` is renamed into place, so a crash at any
    /// point leaves a valid journal behind.
    fn rebuild_journal_locked(&self, inner: &mut Inner) -> Result<()> {
        inner.journal = None;

        let tmp = self.directory.join(JOURNAL_FILE_TMP);
        let journal_path = self.directory.join(JOURNAL_FILE);
        let backup = self.directory.join(JOURNAL_FILE_BACKUP);

        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            write_header(&mut out, self.app_version, self.value_count)?;
            for entry in inner.table.iter_lru() {
                let record = if entry.current_editor.is_some() {
                    Record::Dirty {
                        key: entry.key.clone(),
                    }
                } else {
                    Record::Clean {
                        key: entry.key.clone(),
                        lengths: entry.lengths.clone(),
                    }
                };
                writeln!(out, "{}", record)?;
            }
            out.flush()?;
        }

        if journal_path.exists() {
            delete_if_exists(&backup)?;
            fs::rename(&journal_path, &backup)?;
        }
        fs::rename(&tmp, &journal_path)?;
        delete_if_exists(&backup)?;

        inner.journal = Some(JournalWriter::append_to(&journal_path)?);
        Ok(())
    }

    /// Open a fault-hiding write stream for one slot of an open edit
    pub(crate) fn slot_writer(
        self: &Arc<Self>,
        editor: &mut Editor,
        index: usize,
    ) -> Result<SlotWriter> {
        if index >= self.value_count {
            return Err(Error::InvalidArgument("slot index out of range"));
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.journal.is_none() {
            return Err(Error::Closed);
        }
        match inner.table.peek(&editor.key) {
            Some(entry) if entry.current_editor == Some(editor.id) => {}
            _ => return Err(Error::IllegalState("editor is no longer current")),
        }
        if editor.first_time {
            editor.written[index] = true;
        }

        let dirty = dirty_file(&self.directory, &editor.key, index);
        let file = match File::create(&dirty) {
            Ok(file) => Some(file),
            Err(_) => {
                // Attempt to recreate the cache directory.
                let _ = fs::create_dir_all(&self.directory);
                match File::create(&dirty) {
                    Ok(file) => Some(file),
                    // We are unable to recover. Silently eat the writes.
                    Err(_) => None,
                }
            }
        };
        Ok(SlotWriter::new(file, Arc::clone(&editor.has_errors)))
    }

    /// Finish an edit: publish the dirty files on success, discard them on
    /// failure, and journal the outcome.
    pub(crate) fn complete_edit(&self, editor: &Editor, success: bool) -> Result<()> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.journal.is_none() {
            return Err(Error::Closed);
        }

        let Some(entry) = inner.table.get_mut(&editor.key, false) else {
            return Err(Error::IllegalState("editor does not match a live entry"));
        };
        if entry.current_editor != Some(editor.id) {
            return Err(Error::IllegalState("editor does not match a live entry"));
        }

        // A first-time commit must have written every slot and left every
        // dirty file in place; anything less degrades into an abort.
        let mut success = success;
        let mut unwritten_slot = false;
        if success && editor.first_time {
            for index in 0..self.value_count {
                if !editor.written[index] {
                    success = false;
                    unwritten_slot = true;
                    break;
                }
                if !dirty_file(&self.directory, &editor.key, index).exists() {
                    success = false;
                    break;
                }
            }
        }

        for index in 0..self.value_count {
            let dirty = dirty_file(&self.directory, &editor.key, index);
            if success {
                if dirty.exists() {
                    let clean = clean_file(&self.directory, &editor.key, index);
                    fs::rename(&dirty, &clean)?;
                    let new_length = fs::metadata(&clean)?.len();
                    let old_length = entry.lengths[index];
                    entry.lengths[index] = new_length;
                    inner.size = inner.size - old_length + new_length;
                    if !entry.readable {
                        inner.file_count += 1;
                    }
                }
            } else {
                delete_if_exists(&dirty)?;
            }
        }

        inner.redundant_op_count += 1;
        entry.current_editor = None;

        let key = editor.key.clone();
        if entry.readable || success {
            entry.readable = true;
            let lengths = entry.lengths.clone();
            if success {
                entry.sequence = inner.next_sequence;
                inner.next_sequence += 1;
            }
            inner.table.touch(&key);
            if let Some(journal) = inner.journal.as_mut() {
                journal.append(&Record::Clean { key, lengths })?;
            }
        } else {
            inner.table.remove(&key);
            if let Some(journal) = inner.journal.as_mut() {
                journal.append(&Record::Remove { key })?;
            }
        }

        if inner.size > inner.max_size
            || inner.file_count > inner.max_file_count
            || rebuild_required(inner)
        {
            self.schedule_cleanup();
        }

        if unwritten_slot {
            return Err(Error::IllegalState(
                "newly created entry did not write every slot",
            ));
        }
        Ok(())
    }

    /// Remove an entry on behalf of a failed commit
    pub(crate) fn remove(&self, key: &str) -> Result<bool> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.journal.is_none() {
            return Err(Error::Closed);
        }
        self.remove_locked(inner, key)
    }

    fn remove_locked(&self, inner: &mut Inner, key: &str) -> Result<bool> {
        let Some(entry) = inner.table.peek(key) else {
            return Ok(false);
        };
        if entry.current_editor.is_some() {
            return Ok(false);
        }
        let readable = entry.readable;
        let total_length = entry.total_length();

        for index in 0..self.value_count {
            delete_if_exists(&clean_file(&self.directory, key, index))?;
        }
        inner.size -= total_length;
        if readable {
            inner.file_count -= self.value_count as u64;
        }

        inner.redundant_op_count += 1;
        if let Some(journal) = inner.journal.as_mut() {
            journal.append(&Record::Remove {
                key: key.to_string(),
            })?;
        }
        inner.table.remove(key);

        if rebuild_required(inner) {
            self.schedule_cleanup();
        }
        Ok(true)
    }

    /// Abort the live edit of `key` without an editor handle (used on close)
    fn abort_edit_locked(&self, inner: &mut Inner, key: &str) -> Result<()> {
        for index in 0..self.value_count {
            delete_if_exists(&dirty_file(&self.directory, key, index))?;
        }
        inner.redundant_op_count += 1;

        let Some(entry) = inner.table.get_mut(key, false) else {
            return Ok(());
        };
        entry.current_editor = None;
        let readable = entry.readable;
        let lengths = entry.lengths.clone();

        if readable {
            if let Some(journal) = inner.journal.as_mut() {
                journal.append(&Record::Clean {
                    key: key.to_string(),
                    lengths,
                })?;
            }
        } else {
            inner.table.remove(key);
            if let Some(journal) = inner.journal.as_mut() {
                journal.append(&Record::Remove {
                    key: key.to_string(),
                })?;
            }
        }
        Ok(())
    }

    fn trim_to_size_locked(&self, inner: &mut Inner) -> Result<()> {
        while inner.size > inner.max_size {
            let Some(key) = inner.table.lru_candidate().map(str::to_string) else {
                break; // Everything left is mid-edit.
            };
            if !self.remove_locked(inner, &key)? {
                break;
            }
        }
        Ok(())
    }

    fn trim_to_file_count_locked(&self, inner: &mut Inner) -> Result<()> {
        while inner.file_count > inner.max_file_count {
            let Some(key) = inner.table.lru_candidate().map(str::to_string) else {
                break;
            };
            if !self.remove_locked(inner, &key)? {
                break;
            }
        }
        Ok(())
    }
}

/// We only rebuild the journal when that will at least halve it and drop a
/// worthwhile number of records.
fn rebuild_required(inner: &Inner) -> bool {
    inner.redundant_op_count >= REDUNDANT_OP_COMPACT_THRESHOLD
        && inner.redundant_op_count >= inner.table.len()
}

/// Replay the journal into a fresh entry table.
///
/// Returns the table, the redundant record count, and the next editor id.
fn read_journal(
    directory: &Path,
    app_version: u32,
    value_count: usize,
) -> Result<(EntryTable, usize, EditorId)> {
    let file = File::open(directory.join(JOURNAL_FILE))?;
    let mut reader = LineReader::new(file);

    let magic = reader.read_line()?;
    let version = reader.read_line()?;
    let app_version_line = reader.read_line()?;
    let value_count_line = reader.read_line()?;
    let blank = reader.read_line()?;
    if magic.as_deref() != Some(MAGIC)
        || version.as_deref() != Some(VERSION)
        || app_version_line.as_deref() != Some(app_version.to_string().as_str())
        || value_count_line.as_deref() != Some(value_count.to_string().as_str())
        || blank.as_deref() != Some("")
    {
        return Err(Error::Corrupt(format!(
            "unexpected journal header: [{:?}, {:?}, {:?}, {:?}]",
            magic, version, value_count_line, blank
        )));
    }

    let mut table = EntryTable::new(value_count);
    let mut next_editor: EditorId = 0;
    let mut line_count = 0usize;
    while let Some(line) = reader.read_line()? {
        apply_record(&mut table, value_count, &mut next_editor, parse_record(&line)?)?;
        line_count += 1;
    }
    if reader.has_unterminated_line() {
        return Err(Error::Corrupt("journal is truncated mid-line".to_string()));
    }

    let redundant_op_count = line_count.saturating_sub(table.len());
    Ok((table, redundant_op_count, next_editor))
}

fn apply_record(
    table: &mut EntryTable,
    value_count: usize,
    next_editor: &mut EditorId,
    record: Record,
) -> Result<()> {
    match record {
        Record::Remove { key } => {
            table.remove(&key);
        }
        Record::Clean { key, lengths } => {
            if lengths.len() != value_count {
                return Err(Error::Corrupt(format!(
                    "unexpected slot lengths: {:?}",
                    lengths
                )));
            }
            let entry = table.get_or_insert(&key);
            entry.readable = true;
            entry.current_editor = None;
            entry.lengths = lengths;
        }
        Record::Dirty { key } => {
            let entry = table.get_or_insert(&key);
            entry.current_editor = Some(*next_editor);
            *next_editor += 1;
        }
        Record::Read { key } => {
            // The access-order move already happened in get_or_insert.
            table.get_or_insert(&key);
        }
    }
    Ok(())
}

/// Compute the initial size and collect garbage as part of opening the
/// cache. Entries left mid-edit are assumed inconsistent and are deleted.
fn process_journal(directory: &Path, value_count: usize, inner: &mut Inner) {
    for key in inner.table.keys_lru() {
        let Some(entry) = inner.table.peek(&key) else {
            continue;
        };
        if entry.current_editor.is_some() {
            // A dangling DIRTY: both the dirty files and any clean files
            // published by the unfinished edit are suspect.
            for index in 0..value_count {
                let _ = fs::remove_file(clean_file(directory, &key, index));
                let _ = fs::remove_file(dirty_file(directory, &key, index));
            }
            inner.table.remove(&key);
        } else if entry.readable {
            inner.size += entry.total_length();
            inner.file_count += value_count as u64;
        }
    }
}

fn restore_backup_journal(directory: &Path) -> io::Result<()> {
    let backup = directory.join(JOURNAL_FILE_BACKUP);
    if backup.exists() {
        let journal = directory.join(JOURNAL_FILE);
        if journal.exists() {
            fs::remove_file(&backup)?;
        } else {
            fs::rename(&backup, &journal)?;
        }
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LENGTH
        && key
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidKey(key.to_string()))
    }
}

pub(crate) fn clean_file(directory: &Path, key: &str, index: usize) -> PathBuf {
    directory.join(format!("{}.{}", key, index))
}

pub(crate) fn dirty_file(directory: &Path, key: &str, index: usize) -> PathBuf {
    directory.join(format!("{}.{}.tmp", key, index))
}

fn delete_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn delete_contents(directory: &Path) -> io::Result<()> {
    match fs::remove_dir_all(directory) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
