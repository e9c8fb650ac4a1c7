//! External merge sort over a tape of fixed-width integer records.
//!
//! A *tape* is a file of fixed-size pages, each holding `page_size / 4`
//! little-endian `u32` slots. The value 0 is the "slot empty" sentinel; it
//! pads the tail of a partially filled page and never carries data.
//!
//! Sorting works with a fixed allowance of B in-memory page buffers and
//! two phases. Run creation reads B consecutive pages at a time, sorts them in
//! memory, and writes them back in place, leaving ⌈pages / B⌉ key-ascending
//! runs. Merge passes then combine runs through a tournament heap, w runs at
//! a time with one output buffer, writing into a scratch tape that replaces
//! the input via delete-and-rename at the end of every pass. The pass count
//! and total page transfers are reported in [`SortStats`].

#![forbid(unused_must_use)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod sort;
mod tape;

#[cfg(test)]
mod tests;

pub use sort::{sort, SortStats};
pub use tape::{Tape, SLOT_EMPTY};
