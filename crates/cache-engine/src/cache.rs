use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use cache_config::CacheConfig;
use cache_index::{CacheEntry, OrderedIndex};
use cache_journal::{self, JournalHeader, JournalRecord, JournalWriter, RebuildRecord};

use crate::editor::Editor;
use crate::error::CacheError;
use crate::fs_util::DurableReader;
use crate::snapshot::Snapshot;

/// A bounded, persistent, on-disk LRU cache for opaque byte blobs keyed by
/// string.
///
/// Cheaply cloneable: clones share the same underlying directory and lock,
/// the way a connection pool handle is shared across threads.
#[derive(Clone)]
pub struct Cache {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) dir: PathBuf,
    pub(crate) state: RwLock<State>,
}

pub(crate) struct State {
    pub(crate) index: OrderedIndex,
    pub(crate) cur_size: u64,
    pub(crate) max_size: u64,
    pub(crate) app_version: i64,
    pub(crate) cache_version: i64,
    pub(crate) next_commit_id: u64,
    pub(crate) next_editor_generation: u64,
    pub(crate) journal: Option<JournalWriter>,
}

impl State {
    pub(crate) fn ensure_open(&self) -> Result<(), CacheError> {
        if self.journal.is_none() {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    pub(crate) fn journal_mut(&mut self) -> Result<&mut JournalWriter, CacheError> {
        self.journal.as_mut().ok_or(CacheError::Closed)
    }

    pub(crate) fn next_commit_id(&mut self) -> u64 {
        self.next_commit_id += 1;
        self.next_commit_id
    }

    pub(crate) fn next_editor_generation(&mut self) -> u64 {
        self.next_editor_generation += 1;
        self.next_editor_generation
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub(crate) fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() || key.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\') {
        return Err(CacheError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Evicts from the LRU end while `cur_size > max_size`.
///
/// A popped entry that is readable must have a nonzero size, or the
/// accounting is inconsistent and the cache is treated as corrupt: see
/// DESIGN.md for why this check is conditioned on `readable` rather than
/// applied unconditionally.
fn check_full(state: &mut State, dir: &Path) -> Result<(), CacheError> {
    while state.cur_size > state.max_size {
        let entry = match state.index.pop_lru() {
            Some(e) => e,
            None => break,
        };

        if entry.editor_generation.is_some() {
            eprintln!(
                "warning: evicting key {:?} with an in-flight editor; \
                 max_size may be too small for the concurrent working set",
                entry.key
            );
        }

        if entry.readable && entry.size == 0 {
            return Err(CacheError::Corrupt(format!(
                "readable entry {:?} has size 0",
                entry.key
            )));
        }

        let _ = fs::remove_file(dir.join(&entry.key));
        state.cur_size = state.cur_size.saturating_sub(entry.size);
        state.journal_mut()?.append_del(&entry.key)?;
    }
    Ok(())
}

impl Inner {
    pub(crate) fn value_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl Cache {
    /// Opens (or creates) a cache directory.
    ///
    /// Recovers an interrupted journal rebuild, replays the journal to
    /// reconstruct the in-memory index, and — if the configured `max_size`
    /// differs from the journal's recorded one — rebuilds the journal under
    /// the new size and evicts down to the new budget.
    pub fn open(config: CacheConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        cache_journal::recover_file_set(&config.dir)?;

        let journal_path = config.dir.join(cache_journal::JOURNAL_FILENAME);

        let (index, cur_size, next_commit_id, journal_writer, journal_max_size) =
            if journal_path.exists() {
                let parsed = cache_journal::parse(&journal_path)?;
                if parsed.header.app_version != config.app_version
                    || parsed.header.cache_version != config.cache_version
                {
                    return Err(CacheError::VersionMismatch {
                        journal_app: parsed.header.app_version,
                        journal_cache: parsed.header.cache_version,
                        expected_app: config.app_version,
                        expected_cache: config.cache_version,
                    }
                    .into());
                }

                let mut index = OrderedIndex::new();
                let mut next_commit_id = 0u64;
                for record in parsed.records {
                    replay(&mut index, &mut next_commit_id, record);
                }
                let cur_size: u64 = index
                    .iter()
                    .filter(|e| e.readable)
                    .map(|e| e.size)
                    .sum();
                let writer = JournalWriter::open_append(&config.dir)?;
                (index, cur_size, next_commit_id, writer, parsed.header.max_size)
            } else {
                let header = JournalHeader {
                    app_version: config.app_version,
                    cache_version: config.cache_version,
                    max_size: config.max_size,
                };
                let writer = JournalWriter::create_new(&config.dir, &header)?;
                (OrderedIndex::new(), 0, 0, writer, config.max_size)
            };

        let cache = Cache {
            inner: Arc::new(Inner {
                dir: config.dir.clone(),
                state: RwLock::new(State {
                    index,
                    cur_size,
                    max_size: journal_max_size,
                    app_version: config.app_version,
                    cache_version: config.cache_version,
                    next_commit_id,
                    next_editor_generation: 0,
                    journal: Some(journal_writer),
                }),
            }),
        };

        if config.max_size != 0 && journal_max_size != config.max_size {
            {
                let mut state = cache.inner.state.write().unwrap();
                state.max_size = config.max_size;
            }
            cache.rebuild_journal()?;
            {
                let mut state = cache.inner.state.write().unwrap();
                check_full(&mut state, &cache.inner.dir)?;
            }
        }

        Ok(cache)
    }

    /// Opens an editor for `key`. Fails with [`CacheError::Busy`] if an
    /// editor is already in flight for this key.
    ///
    /// Matches the reference implementation's `Get`-on-entry semantics:
    /// touching a key via `Edit` moves it to the MRU end and stamps its
    /// `mtime`, whether the entry already existed or is being created here.
    pub fn edit(&self, key: &str) -> Result<Editor> {
        validate_key(key)?;
        let mut state = self.inner.state.write().unwrap();
        state.ensure_open()?;

        if state
            .index
            .get_mut(key)
            .map(|e| e.editor_generation.is_some())
            .unwrap_or(false)
        {
            return Err(CacheError::Busy.into());
        }

        let generation = state.next_editor_generation();
        let now = now_millis();

        if !state.index.contains_key(key) {
            state.index.put(CacheEntry::new(key.to_string()));
        }
        let entry = state.index.get_mut(key).unwrap();
        entry.editor_generation = Some(generation);
        entry.mtime_millis = now;

        state.journal_mut()?.append_dirty(key)?;

        Ok(Editor::new(self.clone(), key.to_string(), generation))
    }

    /// Returns a snapshot of the current readable value for `key`, moving it
    /// to the MRU end.
    ///
    /// Takes the engine lock exclusively rather than shared, because
    /// touching recency mutates the index (see DESIGN.md, Decision D2).
    pub fn get(&self, key: &str) -> Result<Snapshot> {
        validate_key(key)?;
        let mut state = self.inner.state.write().unwrap();
        state.ensure_open()?;

        let entry = state.index.get_mut(key).ok_or(CacheError::NotFound)?;
        if !entry.readable {
            return Err(CacheError::NotFound.into());
        }
        let size = entry.size;
        let mtime_millis = entry.mtime_millis;

        let value_path = self.inner.value_path(key);
        let reader = match DurableReader::open(&value_path) {
            Ok(r) => r,
            Err(e) => {
                eprintln!(
                    "warning: key {key:?} is marked readable but its value file \
                     is missing or unreadable: {e}"
                );
                return Err(CacheError::Io(e).into());
            }
        };

        state.journal_mut()?.append_read(key)?;

        Ok(Snapshot {
            key: key.to_string(),
            size,
            mtime_millis,
            reader,
        })
    }

    /// Removes `key`, if present, deleting its value file and recording a
    /// `del` journal entry. A no-op if the key isn't present.
    ///
    /// If an editor is currently in flight for `key`, its entry is removed
    /// outright; the editor discovers this at `commit` time (its generation
    /// no longer matches anything in the index) and cleans up its staging
    /// file without touching the journal or size accounting again.
    pub fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let mut state = self.inner.state.write().unwrap();
        state.ensure_open()?;

        if let Some(entry) = state.index.remove(key) {
            if entry.readable {
                state.cur_size = state.cur_size.saturating_sub(entry.size);
                let _ = fs::remove_file(self.inner.value_path(key));
            }
            state.journal_mut()?.append_del(key)?;
        }
        Ok(())
    }

    /// Rewrites the journal from the live index (LRU-to-MRU order), backing
    /// up the prior generation.
    pub fn rebuild_journal(&self) -> Result<()> {
        let mut state = self.inner.state.write().unwrap();
        state.ensure_open()?;

        let header = JournalHeader {
            app_version: state.app_version,
            cache_version: state.cache_version,
            max_size: state.max_size,
        };
        let entries: Vec<RebuildRecord> = state
            .index
            .iter()
            .map(|e| {
                if e.readable && e.editor_generation.is_none() {
                    RebuildRecord::Clean {
                        key: e.key.clone(),
                        size: e.size,
                        mtime_millis: e.mtime_millis,
                    }
                } else {
                    RebuildRecord::Dirty(e.key.clone())
                }
            })
            .collect();

        let current = state.journal.take().ok_or(CacheError::Closed)?;
        let new_writer = cache_journal::rebuild(&self.inner.dir, &header, entries.into_iter(), current)?;
        state.journal = Some(new_writer);
        Ok(())
    }

    /// Closes the cache. Further operations fail with [`CacheError::Closed`].
    pub fn close(&self) -> Result<()> {
        let mut state = self.inner.state.write().unwrap();
        state.journal = None;
        Ok(())
    }

    /// Current aggregate size in bytes of all readable entries.
    pub fn size(&self) -> u64 {
        self.inner.state.read().unwrap().cur_size
    }

    /// Number of entries currently tracked (readable or in-flight).
    pub fn len(&self) -> usize {
        self.inner.state.read().unwrap().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.read().unwrap().index.is_empty()
    }

    pub(crate) fn run_check_full(&self) -> Result<(), CacheError> {
        let mut state = self.inner.state.write().unwrap();
        check_full(&mut state, &self.inner.dir)
    }
}

/// Applies one journal record during replay, reconstructing `commit_id` as
/// a fresh monotonic counter over `clean` records rather than trusting a
/// stored value (the journal format doesn't store one).
fn replay(index: &mut OrderedIndex, next_commit_id: &mut u64, record: JournalRecord) {
    match record {
        JournalRecord::Dirty(key) => {
            if !index.contains_key(&key) {
                index.put(CacheEntry::new(key));
            }
        }
        JournalRecord::Clean {
            key,
            size,
            mtime_millis,
        } => {
            *next_commit_id += 1;
            let commit_id = *next_commit_id;
            if let Some(entry) = index.peek_mut(&key) {
                entry.size = size;
                entry.readable = true;
                entry.mtime_millis = mtime_millis;
                entry.commit_id = commit_id;
                entry.editor_generation = None;
            } else {
                let mut entry = CacheEntry::new(key);
                entry.size = size;
                entry.readable = true;
                entry.mtime_millis = mtime_millis;
                entry.commit_id = commit_id;
                index.put(entry);
            }
        }
        JournalRecord::Read(key) => {
            index.get(&key);
        }
        JournalRecord::Del(key) => {
            index.remove(&key);
        }
    }
}
