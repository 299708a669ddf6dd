//! # Journal
//!
//! An append-only text log recording every state transition of a disk LRU
//! cache: `dirty`/`clean`/`read`/`del` records, preceded by a two-line
//! header (a fixed marker and a version/size tuple). Includes a rebuild
//! (compaction) routine that rewrites the journal from a live index, and
//! crash-recovery for an interrupted rebuild.
//!
//! ## File set
//!
//! Three files live in the cache directory: `journal` (current),
//! `journal.tmp` (being rebuilt), `journal.bak` (prior generation, kept for
//! forensics after a rebuild).
//!
//! ## Format
//!
//! Text, one record per line, UTF-8, LF-terminated.
//!
//! ```text
//! go-disklrucache
//! <app_version> <cache_version> <max_size>
//! dirty <key>
//! clean <key> <size> <mtime_millis>
//! read <key>
//! del <key>
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use thiserror::Error;

/// The literal first line of every journal file.
pub const HEADER_MARKER: &str = "go-disklrucache";

/// Filename of the current journal within the cache directory.
pub const JOURNAL_FILENAME: &str = "journal";
/// Filename of the journal being rebuilt.
pub const JOURNAL_TMP_FILENAME: &str = "journal.tmp";
/// Filename of the prior journal generation, kept after a rebuild.
pub const JOURNAL_BACKUP_FILENAME: &str = "journal.bak";

/// Errors raised while parsing or writing a journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The header marker, version line, or a record line did not parse.
    #[error("journal format error: {0}")]
    Format(String),

    /// The journal's stored `(app_version, cache_version)` does not match
    /// the versions the caller configured. Fatal to `open`.
    #[error("journal version mismatch: journal has ({journal_app}, {journal_cache}), expected ({expected_app}, {expected_cache})")]
    Version {
        journal_app: i64,
        journal_cache: i64,
        expected_app: i64,
        expected_cache: i64,
    },

    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// The two-line header: file-format marker (implicit) plus the version and
/// size tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalHeader {
    pub app_version: i64,
    pub cache_version: i64,
    pub max_size: u64,
}

/// A single parsed journal record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// An editor was opened for `key`.
    Dirty(String),
    /// A commit occurred for `key`.
    Clean {
        key: String,
        size: u64,
        mtime_millis: u64,
    },
    /// A `Get` returned a snapshot for `key`.
    Read(String),
    /// `key` was removed or evicted.
    Del(String),
}

/// The result of parsing a journal file: its header plus every record, in
/// file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedJournal {
    pub header: JournalHeader,
    pub records: Vec<JournalRecord>,
}

/// Recovers the journal file set before it is opened.
///
/// If `journal.tmp` is present alongside `journal`, a rebuild started but
/// never completed its final rename — `journal` is still authoritative, so
/// the orphaned temp file is simply removed. If `journal` is absent but
/// `journal.bak` is present, a rebuild renamed `journal` to `journal.bak`
/// but crashed before renaming `journal.tmp` to `journal` — `journal.bak`
/// is promoted back to `journal`.
///
/// The reference implementation this format is based on does not implement
/// this recovery; this rewrite adds it (see DESIGN.md, Decision D1).
pub fn recover_file_set(dir: &Path) -> io::Result<()> {
    let journal = dir.join(JOURNAL_FILENAME);
    let tmp = dir.join(JOURNAL_TMP_FILENAME);
    let bak = dir.join(JOURNAL_BACKUP_FILENAME);

    if journal.exists() {
        if tmp.exists() {
            fs::remove_file(&tmp)?;
        }
    } else if bak.exists() {
        fs::rename(&bak, &journal)?;
        if tmp.exists() {
            fs::remove_file(&tmp)?;
        }
    }
    Ok(())
}

/// Parses the journal at `path`.
///
/// The header marker and version/size line are required; any other format
/// violation (too few fields, a line longer than the reader's buffer, an
/// unrecognized record keyword) is a [`JournalError::Format`].
pub fn parse(path: &Path) -> Result<ParsedJournal, JournalError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut marker_line = String::new();
    reader.read_line(&mut marker_line)?;
    if marker_line.trim_end_matches('\n') != HEADER_MARKER {
        return Err(JournalError::Format(format!(
            "expected header marker {:?}",
            HEADER_MARKER
        )));
    }

    let mut version_line = String::new();
    reader.read_line(&mut version_line)?;
    let fields: Vec<&str> = version_line.trim().split(' ').collect();
    if fields.len() != 3 {
        return Err(JournalError::Format(
            "version line must have 3 fields".to_string(),
        ));
    }
    let app_version: i64 = fields[0]
        .parse()
        .map_err(|_| JournalError::Format("invalid app_version".to_string()))?;
    let cache_version: i64 = fields[1]
        .parse()
        .map_err(|_| JournalError::Format("invalid cache_version".to_string()))?;
    let max_size: u64 = fields[2]
        .parse()
        .map_err(|_| JournalError::Format("invalid max_size".to_string()))?;

    let header = JournalHeader {
        app_version,
        cache_version,
        max_size,
    };

    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        records.push(parse_record(&line)?);
    }

    Ok(ParsedJournal { header, records })
}

fn parse_record(line: &str) -> Result<JournalRecord, JournalError> {
    let mut parts = line.trim().split_whitespace();
    let op = parts
        .next()
        .ok_or_else(|| JournalError::Format("empty record line".to_string()))?;
    match op {
        "dirty" => {
            let key = parts
                .next()
                .ok_or_else(|| JournalError::Format("dirty record missing key".to_string()))?;
            Ok(JournalRecord::Dirty(key.to_string()))
        }
        "clean" => {
            let key = parts
                .next()
                .ok_or_else(|| JournalError::Format("clean record missing key".to_string()))?;
            let size: u64 = parts
                .next()
                .ok_or_else(|| JournalError::Format("clean record missing size".to_string()))?
                .parse()
                .map_err(|_| JournalError::Format("clean record has invalid size".to_string()))?;
            let mtime_millis: u64 = parts
                .next()
                .ok_or_else(|| JournalError::Format("clean record missing mtime".to_string()))?
                .parse()
                .map_err(|_| JournalError::Format("clean record has invalid mtime".to_string()))?;
            Ok(JournalRecord::Clean {
                key: key.to_string(),
                size,
                mtime_millis,
            })
        }
        "read" => {
            let key = parts
                .next()
                .ok_or_else(|| JournalError::Format("read record missing key".to_string()))?;
            Ok(JournalRecord::Read(key.to_string()))
        }
        "del" => {
            let key = parts
                .next()
                .ok_or_else(|| JournalError::Format("del record missing key".to_string()))?;
            Ok(JournalRecord::Del(key.to_string()))
        }
        other => Err(JournalError::Format(format!(
            "unknown journal operator: {other}"
        ))),
    }
}

fn write_header(f: &mut File, header: &JournalHeader) -> io::Result<()> {
    writeln!(f, "{HEADER_MARKER}")?;
    writeln!(
        f,
        "{} {} {}",
        header.app_version, header.cache_version, header.max_size
    )?;
    Ok(())
}

/// An open handle appending records to a journal file.
pub struct JournalWriter {
    file: File,
}

impl JournalWriter {
    /// Creates a brand new journal at `dir/journal`, writing the header.
    /// Fails if a journal already exists.
    pub fn create_new(dir: &Path, header: &JournalHeader) -> Result<Self, JournalError> {
        let path = dir.join(JOURNAL_FILENAME);
        let mut file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)?;
        write_header(&mut file, header)?;
        Ok(Self { file })
    }

    /// Opens the existing journal at `dir/journal` in append mode, for use
    /// after [`parse`] has already validated its contents.
    pub fn open_append(dir: &Path) -> Result<Self, JournalError> {
        let path = dir.join(JOURNAL_FILENAME);
        let file = OpenOptions::new().append(true).open(&path)?;
        Ok(Self { file })
    }

    pub fn append_dirty(&mut self, key: &str) -> Result<(), JournalError> {
        writeln!(self.file, "dirty {key}")?;
        self.file.flush()?;
        Ok(())
    }

    pub fn append_clean(&mut self, key: &str, size: u64, mtime_millis: u64) -> Result<(), JournalError> {
        writeln!(self.file, "clean {key} {size} {mtime_millis}")?;
        self.file.flush()?;
        Ok(())
    }

    pub fn append_read(&mut self, key: &str) -> Result<(), JournalError> {
        writeln!(self.file, "read {key}")?;
        self.file.flush()?;
        Ok(())
    }

    pub fn append_del(&mut self, key: &str) -> Result<(), JournalError> {
        writeln!(self.file, "del {key}")?;
        self.file.flush()?;
        Ok(())
    }
}

/// A single entry fed to [`rebuild`], one per live index entry in
/// LRU-to-MRU order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildRecord {
    /// Not fully committed, or has an in-flight editor.
    Dirty(String),
    /// Fully committed with no in-flight editor.
    Clean {
        key: String,
        size: u64,
        mtime_millis: u64,
    },
}

/// Rewrites the journal from `entries` (the live index, in LRU-to-MRU
/// order). This is intentionally lossy for `read` records — rebuild erases
/// access history except for the ordering already captured by `entries`.
///
/// Steps (matching spec.md §4.6):
/// 1. Write a new header + entries to `journal.tmp`.
/// 2. Close `journal.tmp`; close the current `journal`.
/// 3. Rename `journal` -> `journal.bak` (overwriting any prior backup).
/// 4. Rename `journal.tmp` -> `journal`.
/// 5. Reopen `journal` in append mode.
pub fn rebuild(
    dir: &Path,
    header: &JournalHeader,
    entries: impl Iterator<Item = RebuildRecord>,
    current: JournalWriter,
) -> Result<JournalWriter, JournalError> {
    let tmp_path = dir.join(JOURNAL_TMP_FILENAME);
    {
        let mut tmp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        write_header(&mut tmp, header)?;
        for record in entries {
            match record {
                RebuildRecord::Dirty(key) => writeln!(tmp, "dirty {key}")?,
                RebuildRecord::Clean {
                    key,
                    size,
                    mtime_millis,
                } => writeln!(tmp, "clean {key} {size} {mtime_millis}")?,
            }
        }
        tmp.flush()?;
    }

    drop(current);

    let journal_path = dir.join(JOURNAL_FILENAME);
    let backup_path = dir.join(JOURNAL_BACKUP_FILENAME);
    if backup_path.exists() {
        fs::remove_file(&backup_path)?;
    }
    fs::rename(&journal_path, &backup_path)?;
    fs::rename(&tmp_path, &journal_path)?;

    JournalWriter::open_append(dir)
}

#[cfg(test)]
mod tests;
