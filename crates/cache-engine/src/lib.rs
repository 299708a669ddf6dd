//! # Cache engine
//!
//! The cache engine itself: a bounded, persistent, on-disk LRU cache for
//! opaque byte blobs keyed by string. Combines [`cache_index::OrderedIndex`]
//! (recency order + entry bookkeeping) with [`cache_journal`] (the
//! crash-durable log of state transitions) behind the commit protocol and
//! concurrency discipline described in DESIGN.md.
//!
//! ## Concurrency
//!
//! One [`RwLock`](std::sync::RwLock) per [`Cache`] guards the index, size
//! accounting, and journal handle. `Edit`, `Get`, `Remove`, and
//! `rebuild_journal` all take it exclusively — `Get` included, because
//! touching recency mutates the index (Decision D2 in DESIGN.md). Each
//! [`Editor`] additionally holds its own lock serializing its writer
//! streams against `commit`/`abort`. Lock order is always editor lock
//! first, then the engine lock — see [`Editor::commit`].

mod cache;
mod editor;
mod error;
mod fs_util;
mod snapshot;

pub use cache::Cache;
pub use editor::{AppendingWriter, Editor, PositionalWriter, TruncatingWriter};
pub use error::CacheError;
pub use fs_util::DurableReader;
pub use snapshot::Snapshot;
