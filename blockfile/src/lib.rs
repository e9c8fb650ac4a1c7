//! Fixed-size page and record access to binary files.
//!
//! Every data structure in this workspace lives in an ordinary file that is
//! only ever touched in fixed-size units: a *page* for primary and index
//! areas, a *record* for overflow areas, a page of integer slots for sort
//! tapes. [`BlockFile`] is that access path. It knows nothing about what the
//! bytes mean; the unit size is simply the length of the buffer the caller
//! hands in, and the file offset is `index * unit_size`.
//!
//! The second job of this crate is accounting. The engines built on top are
//! measured by how many unit transfers they perform, so every successful
//! read or write bumps a counter in a shared [`IoCounters`] ledger. A ledger
//! is created per store (or per tape) and handed to each device that should
//! bill against it; callers take [`IoCounters::snapshot`] diffs to attribute
//! I/O to a single operation.

#![forbid(unused_must_use)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod counters;
mod device;

pub use counters::{IoCounters, IoSnapshot};
pub use device::BlockFile;
