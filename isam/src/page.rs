//! The in-memory primary page and its on-disk codec.

use std::fmt::Write as _;

use anyhow::{bail, Result};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned, LE, I32, U32};

use crate::record::{Record, NULL_POINTER, RECORD_SIZE};

/// On-disk size of the per-page header that precedes the record slots.
pub const PAGE_HEADER_SIZE: usize = std::mem::size_of::<PageHeader>();

#[derive(AsBytes, FromBytes, FromZeroes, Unaligned, Copy, Clone)]
#[repr(C)]
struct PageHeader {
    count: U32<LE>,
    overflow_head: I32<LE>,
}

static_assertions::const_assert_eq!(PAGE_HEADER_SIZE, 8);

/// One primary page: up to B records kept key-ascending by insertion sort,
/// plus the head of the page's overflow chain.
///
/// Tombstoned records keep their slot and stay in key position; only a
/// reorganization drops them. Slots past `count` exist on disk (a page is
/// always written at full width) but carry no information.
#[derive(Clone, Debug)]
pub struct Page {
    records: Vec<Record>,
    /// Overflow-file index of the first chained record, or [`NULL_POINTER`].
    pub overflow_head: i32,
}

impl Page {
    /// An empty page with no overflow chain.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            overflow_head: NULL_POINTER,
        }
    }

    /// On-disk size of a page with `capacity` slots.
    pub fn disk_size(capacity: usize) -> usize {
        PAGE_HEADER_SIZE + capacity * RECORD_SIZE
    }

    /// Occupied slots, tombstoned ones included.
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// The occupied slots in slot order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Inserts `rec` in key position, shifting greater keys one slot right.
    /// Returns false (and changes nothing) when all `capacity` slots are
    /// occupied.
    pub fn insert(&mut self, rec: Record, capacity: usize) -> bool {
        if self.records.len() >= capacity {
            return false;
        }
        let pos = self
            .records
            .iter()
            .position(|r| r.key.get() > rec.key.get())
            .unwrap_or(self.records.len());
        self.records.insert(pos, rec);
        true
    }

    /// Slot index of the live record with `key`, if any.
    pub fn find_slot(&self, key: u32) -> Option<usize> {
        self.records
            .iter()
            .position(|r| !r.is_tombstone() && r.key.get() == key)
    }

    /// The live record with `key`, if any.
    pub fn find(&self, key: u32) -> Option<&Record> {
        self.find_slot(key).map(|slot| &self.records[slot])
    }

    /// Mutable access to the record in `slot`.
    pub fn record_mut(&mut self, slot: usize) -> &mut Record {
        &mut self.records[slot]
    }

    /// Tombstones the live record with `key` in place. Returns true iff a
    /// live record was found.
    pub fn delete(&mut self, key: u32) -> bool {
        match self.find_slot(key) {
            Some(slot) => {
                self.records[slot].tombstone = 1;
                true
            }
            None => false,
        }
    }

    /// Diagnostic rendering: keys in slot order, `XX` for tombstoned slots,
    /// `--` for the unoccupied tail, then the overflow head when present.
    pub fn render(&self, capacity: usize) -> String {
        let mut out = String::from("[ ");
        for slot in 0..capacity {
            match self.records.get(slot) {
                Some(r) if r.is_tombstone() => out.push_str("XX "),
                Some(r) => {
                    let _ = write!(out, "{} ", r.key.get());
                }
                None => out.push_str("-- "),
            }
        }
        out.push(']');
        if self.overflow_head != NULL_POINTER {
            let _ = write!(out, " -> OV: {}", self.overflow_head);
        }
        out
    }

    /// Encodes the page at full width: header, occupied slots, zeroed tail.
    pub fn encode(&self, capacity: usize) -> Vec<u8> {
        assert!(self.records.len() <= capacity);
        let mut buf = vec![0u8; Self::disk_size(capacity)];
        let header = PageHeader {
            count: U32::new(self.records.len() as u32),
            overflow_head: I32::new(self.overflow_head),
        };
        buf[..PAGE_HEADER_SIZE].copy_from_slice(header.as_bytes());
        for (slot, rec) in self.records.iter().enumerate() {
            let at = PAGE_HEADER_SIZE + slot * RECORD_SIZE;
            buf[at..at + RECORD_SIZE].copy_from_slice(rec.as_bytes());
        }
        buf
    }

    /// Decodes a full-width page image. Slots past the stored count are
    /// ignored regardless of their bytes.
    pub fn decode(buf: &[u8], capacity: usize) -> Result<Self> {
        assert_eq!(buf.len(), Self::disk_size(capacity));
        // Sizes were just asserted, so the header parse cannot fail.
        let header = PageHeader::read_from(&buf[..PAGE_HEADER_SIZE]).unwrap();
        let count = header.count.get() as usize;
        if count > capacity {
            bail!(
                "corrupt page header: count {count} exceeds blocking factor {capacity}"
            );
        }
        let mut records = Vec::with_capacity(count);
        for slot in 0..count {
            let at = PAGE_HEADER_SIZE + slot * RECORD_SIZE;
            records.push(Record::read_from(&buf[at..at + RECORD_SIZE]).unwrap());
        }
        Ok(Self {
            records,
            overflow_head: header.overflow_head.get(),
        })
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_slots_sorted() {
        let mut page = Page::new();
        for key in [30, 10, 40, 20] {
            assert!(page.insert(Record::new(key, key), 4));
        }
        let keys: Vec<u32> = page.records().iter().map(|r| r.key.get()).collect();
        assert_eq!(keys, vec![10, 20, 30, 40]);

        assert!(!page.insert(Record::new(25, 25), 4), "page is full");
        assert_eq!(page.count(), 4);
    }

    #[test]
    fn find_ignores_tombstones() {
        let mut page = Page::new();
        page.insert(Record::new(10, 1), 4);
        page.insert(Record::new(20, 2), 4);

        assert!(page.delete(20));
        assert!(page.find(20).is_none());
        assert!(!page.delete(20), "already tombstoned");
        assert_eq!(page.find(10).unwrap().payload.get(), 1);
        assert_eq!(page.count(), 2, "tombstoned slot is still occupied");
    }

    #[test]
    fn codec_round_trip() {
        let mut page = Page::new();
        page.overflow_head = 7;
        page.insert(Record::new(5, 50), 4);
        page.insert(Record::new(3, 30), 4);
        page.delete(5);

        let buf = page.encode(4);
        assert_eq!(buf.len(), Page::disk_size(4));

        let back = Page::decode(&buf, 4).unwrap();
        assert_eq!(back.overflow_head, 7);
        assert_eq!(back.count(), 2);
        assert_eq!(back.find(3).unwrap().payload.get(), 30);
        assert!(back.find(5).is_none());
        assert!(back.records()[1].is_tombstone());
    }

    #[test]
    fn decode_rejects_overlong_count() {
        let mut buf = vec![0u8; Page::disk_size(2)];
        buf[0] = 9;
        assert!(Page::decode(&buf, 2).is_err());
    }

    #[test]
    fn rendering() {
        let mut page = Page::new();
        page.insert(Record::new(10, 0), 4);
        page.insert(Record::new(20, 0), 4);
        page.delete(10);
        assert_eq!(page.render(4), "[ XX 20 -- -- ]");

        page.overflow_head = 3;
        assert_eq!(page.render(4), "[ XX 20 -- -- ] -> OV: 3");
    }
}
