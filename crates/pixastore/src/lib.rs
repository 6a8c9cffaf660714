//! # pixastore
//!
//! Journaled disk cache for the Pixa image loader.
//!
//! ## Architecture
//! - **Journal**: append-only text log, replayed on open, compacted in place
//! - **Entry table**: access-ordered map driving LRU eviction
//! - **Editors**: all-or-nothing transactional writes via dirty-file renames
//! - **Cleanup**: one background thread trims size/file-count bounds and
//!   rebuilds the journal
//!
//! The cache survives process death: any sequence of operations replayed by
//! a fresh open reconstructs the same entry table, and edits that never
//! committed are garbage-collected.

#![warn(missing_docs)]

mod cache;
mod editor;
mod error;
mod journal;
mod lines;
mod snapshot;
mod table;

pub use cache::DiskLruCache;
pub use editor::{Editor, SlotWriter};
pub use error::{Error, Result};
pub use snapshot::Snapshot;

#[cfg(test)]
mod tests {
    #[test]
    fn it_works() {
        assert_eq!(2 + 2, 4);
    }
}
