use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;

use crate::cache::Cache;
use crate::error::CacheError;
use crate::fs_util::{lowest_free_numbered_path, rename_overwrite, DurableReader};

/// A handle to an in-flight write for one key.
///
/// At most one `Editor` exists per key at a time; a second `Edit(key)`
/// fails with [`CacheError::Busy`] while this one is alive. The editor owns
/// a staging file (`<key>.tmpN`) until [`Editor::commit`] renames it into
/// place, or [`Editor::abort`] discards it.
///
/// `write_lock` serializes the editor's own writer streams against each
/// other and against `commit`/`abort`: opening a writer stream holds the
/// lock for that stream's lifetime, and `commit`/`abort` block until any
/// live stream is dropped before proceeding.
pub struct Editor {
    pub(crate) cache: Cache,
    pub(crate) key: String,
    pub(crate) generation: u64,
    write_lock: Mutex<()>,
    staging_path: Mutex<Option<PathBuf>>,
    write_size: AtomicU64,
    errored: AtomicBool,
}

impl Editor {
    pub(crate) fn new(cache: Cache, key: String, generation: u64) -> Self {
        Self {
            cache,
            key,
            generation,
            write_lock: Mutex::new(()),
            staging_path: Mutex::new(None),
            write_size: AtomicU64::new(0),
            errored: AtomicBool::new(false),
        }
    }

    /// The key this editor owns.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cumulative bytes written through this editor's writer streams so
    /// far. Independent of the staging file's actual size until the writer
    /// is flushed.
    pub fn write_size(&self) -> u64 {
        self.write_size.load(Ordering::Relaxed)
    }

    /// The staging file's current size on disk, or 0 if no writer has ever
    /// been opened.
    pub fn file_size(&self) -> u64 {
        self.staging_path
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    fn staging_path_for_writer(&self) -> io::Result<PathBuf> {
        let mut guard = self.staging_path.lock().unwrap();
        if let Some(p) = guard.as_ref() {
            return Ok(p.clone());
        }
        let base = self.cache.inner.value_path(&self.key);
        let path = lowest_free_numbered_path(&base, "tmp")?;
        *guard = Some(path.clone());
        Ok(path)
    }

    /// Opens the staging file for a fresh, truncating write.
    ///
    /// Opening the staging file may fail (permissions, disk full); this
    /// editor is then marked errored, and the caller still receives a
    /// handle whose `write`/`flush` calls return that error. `commit` later
    /// notices the errored flag and cleans up without writing a `clean`
    /// record.
    pub fn open_truncating_writer(&self) -> TruncatingWriter<'_> {
        let guard = self.write_lock.lock().unwrap();
        let file = self
            .staging_path_for_writer()
            .and_then(|path| {
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(path)
            })
            .map_err(|e| {
                self.errored.store(true, Ordering::SeqCst);
                e
            })
            .ok();
        TruncatingWriter {
            _guard: guard,
            file,
            editor: self,
        }
    }

    /// Opens the staging file for an appending write, preserving whatever
    /// has already been written through a prior stream in this editor.
    pub fn open_appending_writer(&self) -> AppendingWriter<'_> {
        let guard = self.write_lock.lock().unwrap();
        let file = self
            .staging_path_for_writer()
            .and_then(|path| OpenOptions::new().create(true).append(true).open(path))
            .map_err(|e| {
                self.errored.store(true, Ordering::SeqCst);
                e
            })
            .ok();
        AppendingWriter {
            _guard: guard,
            file,
            editor: self,
        }
    }

    /// Opens the staging file for random-access writes (write + seek),
    /// without truncating existing content.
    pub fn open_positional_writer(&self) -> PositionalWriter<'_> {
        let guard = self.write_lock.lock().unwrap();
        let file = self
            .staging_path_for_writer()
            .and_then(|path| OpenOptions::new().create(true).read(true).write(true).open(path))
            .map_err(|e| {
                self.errored.store(true, Ordering::SeqCst);
                e
            })
            .ok();
        PositionalWriter {
            _guard: guard,
            file,
            editor: self,
        }
    }

    /// Opens a reader over the key's last committed value, independent of
    /// anything this editor has written so far. Returns `None` if the key
    /// has no readable (committed) value.
    pub fn open_input_stream(&self) -> Result<Option<DurableReader>> {
        let readable = {
            let state = self.cache.inner.state.read().unwrap();
            state
                .index
                .peek(&self.key)
                .map(|e| e.readable)
                .unwrap_or(false)
        };
        if !readable {
            return Ok(None);
        }
        let path = self.cache.inner.value_path(&self.key);
        Ok(Some(DurableReader::open(&path)?))
    }

    /// Commits the staged value: validates it is still owned by this
    /// editor, publishes it into the index and journal, renames the
    /// staging file into place, and runs eviction.
    ///
    /// Steps (matching spec.md §4.5):
    /// 1. Acquire the editor lock, then the engine lock.
    /// 2. If the index no longer attributes this key to this editor's
    ///    generation (removed, or superseded by a later `Edit`), discard
    ///    the staging file and return without touching the index/journal.
    /// 3. If this editor is marked errored, discard the staging file, drop
    ///    any partially-written value file, clear the in-flight marker, and
    ///    return.
    /// 4. Otherwise stat the staging file; a zero-byte commit is rejected.
    /// 5. Append a `clean` record to the journal.
    /// 6. Rename the staging file over the value file.
    /// 7. Run eviction.
    pub fn commit(&self) -> Result<()> {
        let _editor_guard = self.write_lock.lock().unwrap();
        let mut state = self.cache.inner.state.write().unwrap();
        state.ensure_open()?;

        let owns_entry = state
            .index
            .peek(&self.key)
            .and_then(|e| e.editor_generation)
            == Some(self.generation);
        if !owns_entry {
            if let Some(path) = self.staging_path.lock().unwrap().take() {
                let _ = fs::remove_file(path);
            }
            return Ok(());
        }

        if self.errored.load(Ordering::SeqCst) {
            if let Some(path) = self.staging_path.lock().unwrap().take() {
                let _ = fs::remove_file(path);
            }
            let _ = fs::remove_file(self.cache.inner.value_path(&self.key));
            if let Some(entry) = state.index.peek_mut(&self.key) {
                entry.editor_generation = None;
            }
            return Ok(());
        }

        let staging_path = match self.staging_path.lock().unwrap().clone() {
            Some(p) => p,
            None => {
                if let Some(entry) = state.index.peek_mut(&self.key) {
                    entry.editor_generation = None;
                }
                return Err(CacheError::EmptyValue.into());
            }
        };

        let new_size = fs::metadata(&staging_path)?.len();
        if new_size == 0 {
            let _ = fs::remove_file(&staging_path);
            if let Some(entry) = state.index.peek_mut(&self.key) {
                entry.editor_generation = None;
            }
            return Err(CacheError::EmptyValue.into());
        }

        let old_size = state.index.peek(&self.key).map(|e| e.size).unwrap_or(0);
        let mtime_millis = state.index.peek(&self.key).map(|e| e.mtime_millis).unwrap_or(0);

        if let Err(e) = state.journal_mut()?.append_clean(&self.key, new_size, mtime_millis) {
            let _ = fs::remove_file(&staging_path);
            return Err(e.into());
        }

        let value_path = self.cache.inner.value_path(&self.key);
        rename_overwrite(&staging_path, &value_path)?;
        *self.staging_path.lock().unwrap() = None;

        let commit_id = state.next_commit_id();
        {
            let entry = state.index.peek_mut(&self.key).unwrap();
            entry.size = new_size;
            entry.readable = true;
            entry.editor_generation = None;
            entry.commit_id = commit_id;
        }
        state.cur_size = (state.cur_size as i128 + new_size as i128 - old_size as i128) as u64;

        drop(state);
        self.cache.run_check_full().map_err(Into::into)
    }

    /// Discards the staging file and releases this editor's claim on the
    /// key. Does not write a journal record; the index entry itself is
    /// left as-is (still non-readable if this was the first edit of a new
    /// key) except that its in-flight marker is cleared, freeing the key
    /// for a later `Edit`.
    pub fn abort(&self) -> Result<()> {
        let _editor_guard = self.write_lock.lock().unwrap();
        if let Some(path) = self.staging_path.lock().unwrap().take() {
            let _ = fs::remove_file(path);
        }
        let mut state = self.cache.inner.state.write().unwrap();
        if let Some(entry) = state.index.peek_mut(&self.key) {
            if entry.editor_generation == Some(self.generation) {
                entry.editor_generation = None;
            }
        }
        Ok(())
    }
}

/// A write stream over an editor's staging file, opened truncating.
pub struct TruncatingWriter<'a> {
    _guard: MutexGuard<'a, ()>,
    file: Option<File>,
    editor: &'a Editor,
}

impl Write for TruncatingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(f) => {
                let n = f.write(buf)?;
                self.editor.write_size.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            None => Err(errored_io_error()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(f) => f.flush(),
            None => Err(errored_io_error()),
        }
    }
}

/// A write stream over an editor's staging file, opened appending.
pub struct AppendingWriter<'a> {
    _guard: MutexGuard<'a, ()>,
    file: Option<File>,
    editor: &'a Editor,
}

impl Write for AppendingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(f) => {
                let n = f.write(buf)?;
                self.editor.write_size.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            None => Err(errored_io_error()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(f) => f.flush(),
            None => Err(errored_io_error()),
        }
    }
}

/// A random-access write stream over an editor's staging file.
pub struct PositionalWriter<'a> {
    _guard: MutexGuard<'a, ()>,
    file: Option<File>,
    editor: &'a Editor,
}

impl Write for PositionalWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(f) => {
                let n = f.write(buf)?;
                self.editor.write_size.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            None => Err(errored_io_error()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(f) => f.flush(),
            None => Err(errored_io_error()),
        }
    }
}

impl Seek for PositionalWriter<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.file {
            Some(f) => f.seek(pos),
            None => Err(errored_io_error()),
        }
    }
}

impl Read for PositionalWriter<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(f) => f.read(buf),
            None => Err(errored_io_error()),
        }
    }
}

fn errored_io_error() -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        "editor staging file unavailable after an earlier open failure",
    )
}
