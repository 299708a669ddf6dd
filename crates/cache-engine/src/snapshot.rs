use std::io::{Read, Seek, SeekFrom};

use crate::fs_util::DurableReader;

/// A point-in-time view of a committed value, captured at [`crate::Cache::get`]
/// time.
///
/// `size` and `mtime_millis` are the values recorded at commit; they do not
/// change even if the key is later re-edited, removed, or evicted — the
/// snapshot's [`DurableReader`] keeps the underlying bytes readable for as
/// long as the snapshot is held (see `fs_util` for the platform-specific
/// mechanism).
pub struct Snapshot {
    pub key: String,
    pub size: u64,
    pub mtime_millis: u64,
    pub reader: DurableReader,
}

impl Snapshot {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mtime_millis(&self) -> u64 {
        self.mtime_millis
    }
}

impl Read for Snapshot {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for Snapshot {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.reader.seek(pos)
    }
}
