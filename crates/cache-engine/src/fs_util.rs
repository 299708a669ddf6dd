//! Filesystem helpers: atomic-overwrite rename, and the platform-specific
//! snapshot backing (direct handle vs. hard-link copy).
//!
//! These are thin wrappers over `std::fs`/`std::io` used at the call site,
//! the same way the reference codebase's `wal` and `engine::manifest`
//! modules call `std::fs` directly rather than introducing a filesystem
//! abstraction crate.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Renames `from` to `to`, overwriting `to` if it exists.
///
/// `std::fs::rename` already overwrites atomically on POSIX. On platforms
/// without atomic-rename-over-file, falls back to removing the target
/// first (non-atomic, but correct under single-process ownership).
pub fn rename_overwrite(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            let _ = fs::remove_file(to);
            fs::rename(from, to)
        }
    }
}

/// Finds the lowest-numbered `<base>.<suffix>N` (0..10000) that does not
/// currently exist on disk.
pub fn lowest_free_numbered_path(base: &Path, suffix: &str) -> io::Result<PathBuf> {
    for n in 0..10_000u32 {
        let candidate = append_to_file_name(base, &format!(".{suffix}{n}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(io::Error::new(
        io::ErrorKind::Other,
        format!("no available {suffix} filename for {}", base.display()),
    ))
}

fn append_to_file_name(path: &Path, extra: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(extra);
    path.with_file_name(name)
}

enum ReaderKind {
    /// Platforms with unlink-while-open semantics: a plain open handle.
    Direct(File),
    /// Platforms without it: a private hard-link copy, removed on drop.
    Linked { file: File, link_path: PathBuf },
}

/// A reader over a value file's contents, captured at open time.
///
/// On Windows, the value file cannot be deleted or replaced while this
/// reader holds it open, so the reader instead opens a uniquely-named hard
/// link to the same inode and removes that link when dropped. Elsewhere
/// the reader holds a direct handle and closing it is just closing the
/// file descriptor.
pub struct DurableReader {
    kind: ReaderKind,
}

impl DurableReader {
    /// Opens a durable reader over `path`, choosing the platform-specific
    /// backing strategy.
    pub fn open(path: &Path) -> io::Result<Self> {
        if cfg!(windows) {
            let link_path = lowest_free_numbered_path(path, "link")?;
            fs::hard_link(path, &link_path)?;
            let file = File::open(&link_path)?;
            Ok(Self {
                kind: ReaderKind::Linked { file, link_path },
            })
        } else {
            let file = File::open(path)?;
            Ok(Self {
                kind: ReaderKind::Direct(file),
            })
        }
    }

    fn file_mut(&mut self) -> &mut File {
        match &mut self.kind {
            ReaderKind::Direct(f) => f,
            ReaderKind::Linked { file, .. } => file,
        }
    }
}

impl Read for DurableReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file_mut().read(buf)
    }
}

impl Seek for DurableReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file_mut().seek(pos)
    }
}

impl Drop for DurableReader {
    fn drop(&mut self) {
        if let ReaderKind::Linked { link_path, .. } = &self.kind {
            let _ = fs::remove_file(link_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn rename_overwrite_replaces_existing_target() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("a");
        let to = dir.path().join("b");
        fs::write(&from, b"new").unwrap();
        fs::write(&to, b"old").unwrap();

        rename_overwrite(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"new");
    }

    #[test]
    fn lowest_free_numbered_path_skips_existing() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("k");
        fs::write(append_to_file_name(&base, ".tmp0"), b"x").unwrap();
        let candidate = lowest_free_numbered_path(&base, "tmp").unwrap();
        assert_eq!(candidate, append_to_file_name(&base, ".tmp1"));
    }

    #[test]
    fn durable_reader_reads_value_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("k");
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(b"hello").unwrap();
        }
        let mut reader = DurableReader::open(&path).unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }
}
