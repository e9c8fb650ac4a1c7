//! An Indexed Sequential Access Method (ISAM) store.
//!
//! Records are fixed-width `(key, payload)` pairs living in three files
//! that share a filename prefix: a *primary* area of sorted fixed-size
//! pages, an *overflow* area of individually addressed records forming one
//! sorted chain per primary page, and a paged *sparse index* mapping the
//! smallest key of each primary page to its page number.
//!
//! Lookups rank the key against the index, land on one primary page, and
//! scan that page and (if needed) its overflow chain. Inserts go into the
//! page while it has room and are spliced into its chain once it is full.
//! Deletes tombstone records in place. The store degrades as chains grow;
//! [`IsamStore::reorganize`] rebuilds it, streaming every live record into
//! a fresh primary area packed at a configurable fill factor with an empty
//! overflow area and a rebuilt index. Reorganization also runs by itself
//! when the overflow-to-capacity ratio crosses a configurable threshold.
//!
//! All disk traffic goes through [`blockfile::BlockFile`] devices sharing
//! one [`blockfile::IoCounters`] ledger, so every operation's cost in page
//! and record transfers is observable.

#![forbid(unused_must_use)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod index;
mod page;
mod record;
mod reorg;
mod store;

#[cfg(test)]
mod check;

pub use index::{IndexEntry, SparseIndex, INDEX_ENTRIES_PER_PAGE};
pub use page::{Page, PAGE_HEADER_SIZE};
pub use record::{Record, NULL_POINTER, RECORD_SIZE};
pub use store::{IsamOptions, IsamStats, IsamStore, RecordLocation};
