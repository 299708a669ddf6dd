use thiserror::Error;

use cache_journal::JournalError;

/// Errors raised by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// `Edit` was called for a key that already has an editor in flight.
    #[error("an editor is already in flight for this key")]
    Busy,

    /// `Get` or `Remove` found no readable entry for the key.
    #[error("key not found")]
    NotFound,

    /// The key is empty or contains whitespace or a path separator.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// A committed value must be non-empty; a zero-byte staging file is
    /// rejected rather than silently accepted.
    #[error("committed value must be non-empty")]
    EmptyValue,

    /// The cache has been closed.
    #[error("cache is closed")]
    Closed,

    /// The on-disk journal's app/cache version does not match the
    /// configuration the cache was opened with.
    #[error(
        "journal version mismatch: journal has ({journal_app}, {journal_cache}), \
         configuration expects ({expected_app}, {expected_cache})"
    )]
    VersionMismatch {
        journal_app: i64,
        journal_cache: i64,
        expected_app: i64,
        expected_cache: i64,
    },

    /// Internal bookkeeping invariant violated (e.g. a readable entry with
    /// size zero was popped for eviction). Unrecoverable; the caller should
    /// treat the cache as unusable and reopen it.
    #[error("cache bookkeeping is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
