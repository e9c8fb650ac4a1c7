//! The fixed-width record codec.

use std::fmt;

use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned, LE, I32, U32};

/// End-of-chain sentinel for [`Record::next`] and for a page's overflow
/// head.
pub const NULL_POINTER: i32 = -1;

/// On-disk width of one record, in bytes.
pub const RECORD_SIZE: usize = std::mem::size_of::<Record>();

/// One stored record, exactly as it lies on disk: little-endian fields,
/// explicit tail padding, 16 bytes total.
///
/// `next` is the overflow-file index of the chain successor, or
/// [`NULL_POINTER`]. `tombstone` is nonzero once the record has been
/// logically deleted; tombstoned records keep their slot (or chain link)
/// until the next reorganization physically drops them.
#[derive(AsBytes, FromBytes, FromZeroes, Unaligned, Copy, Clone, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct Record {
    /// The sort and lookup attribute.
    pub key: U32<LE>,
    /// Opaque data carried alongside the key.
    pub payload: U32<LE>,
    /// Overflow-chain successor, or [`NULL_POINTER`].
    pub next: I32<LE>,
    /// Nonzero iff logically deleted.
    pub tombstone: u8,
    /// Explicit padding; always zero on records this crate writes.
    pub pad: [u8; 3],
}

static_assertions::const_assert_eq!(RECORD_SIZE, 16);

impl Record {
    /// A live record with no chain successor.
    pub fn new(key: u32, payload: u32) -> Self {
        Self {
            key: U32::new(key),
            payload: U32::new(payload),
            next: I32::new(NULL_POINTER),
            tombstone: 0,
            pad: [0; 3],
        }
    }

    /// Whether the record has been logically deleted.
    pub fn is_tombstone(&self) -> bool {
        self.tombstone != 0
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tombstone() {
            return write!(f, "[DELETED]");
        }
        write!(f, "K:{} D:{}", self.key.get(), self.payload.get())?;
        if self.next.get() != NULL_POINTER {
            write!(f, " ->{}", self.next.get())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_layout_round_trip() {
        let mut rec = Record::new(0x0102_0304, 77);
        rec.next = I32::new(9);

        let bytes = rec.as_bytes();
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(&bytes[0..4], &[0x04, 0x03, 0x02, 0x01], "little-endian key");

        let back = Record::read_from(bytes).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn display_forms() {
        let mut rec = Record::new(3, 14);
        assert_eq!(rec.to_string(), "K:3 D:14");

        rec.next = I32::new(5);
        assert_eq!(rec.to_string(), "K:3 D:14 ->5");

        rec.tombstone = 1;
        assert_eq!(rec.to_string(), "[DELETED]");
    }
}
