//! The paged sparse index.

use anyhow::{bail, Result};
use blockfile::BlockFile;
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned, LE, I32, U32};

/// Entries per index page. Chosen so an index page is of the same order of
/// magnitude as a primary page.
pub const INDEX_ENTRIES_PER_PAGE: usize = 128;

const INDEX_ENTRY_SIZE: usize = std::mem::size_of::<IndexEntry>();
const INDEX_PAGE_SIZE: usize = 4 + INDEX_ENTRIES_PER_PAGE * INDEX_ENTRY_SIZE;

/// One sparse-index entry: the smallest key on primary page `page` as of
/// the most recent reorganization.
#[derive(AsBytes, FromBytes, FromZeroes, Unaligned, Copy, Clone, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct IndexEntry {
    /// Smallest key on the page when the entry was written.
    pub key: U32<LE>,
    /// Primary page number.
    pub page: I32<LE>,
}

static_assertions::const_assert_eq!(INDEX_ENTRY_SIZE, 8);

#[derive(AsBytes, FromBytes, FromZeroes, Unaligned, Copy, Clone)]
#[repr(C)]
struct IndexPageHeader {
    count: I32<LE>,
}

/// The sparse index, materialized as a flat key-ascending entry list.
///
/// On disk the list is chunked into fixed-size index pages of
/// [`INDEX_ENTRIES_PER_PAGE`] entries behind a count header; every save
/// rewrites the whole file.
#[derive(Clone, Debug, Default)]
pub struct SparseIndex {
    entries: Vec<IndexEntry>,
}

impl SparseIndex {
    /// An index with no entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// The bootstrap index of an empty store: key 0 maps to page 0.
    pub fn bootstrap() -> Self {
        let mut index = Self::new();
        index.push(0, 0);
        index
    }

    /// The entries, key-ascending.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Appends an entry. Keys must arrive in ascending order; entries are
    /// only ever built while streaming pages in key order.
    pub fn push(&mut self, key: u32, page: i32) {
        debug_assert!(self
            .entries
            .last()
            .map_or(true, |last| last.key.get() <= key));
        self.entries.push(IndexEntry {
            key: U32::new(key),
            page: I32::new(page),
        });
    }

    /// The page that would hold `key`: the page of the last entry whose key
    /// is ≤ `key`. An empty index resolves to page 0.
    pub fn locate(&self, key: u32) -> u64 {
        let mut page = 0;
        for entry in &self.entries {
            if entry.key.get() <= key {
                page = entry.page.get() as u64;
            } else {
                break;
            }
        }
        page
    }

    /// Reads index pages 0, 1, 2, … until the file ends and concatenates
    /// their entries.
    pub fn load(device: &BlockFile) -> Result<Self> {
        let mut entries = Vec::new();
        let mut buf = vec![0u8; INDEX_PAGE_SIZE];
        for page in 0.. {
            if !device.read_unit(page, &mut buf)? {
                break;
            }
            // Sizes are fixed, so the header parse cannot fail.
            let header = IndexPageHeader::read_from(&buf[..4]).unwrap();
            let count = header.count.get() as usize;
            if count > INDEX_ENTRIES_PER_PAGE {
                bail!(
                    "corrupt index page {page}: count {count} exceeds capacity {INDEX_ENTRIES_PER_PAGE}"
                );
            }
            for i in 0..count {
                let at = 4 + i * INDEX_ENTRY_SIZE;
                entries.push(IndexEntry::read_from(&buf[at..at + INDEX_ENTRY_SIZE]).unwrap());
            }
        }
        Ok(Self { entries })
    }

    /// Truncates the index file and writes the entries back out in
    /// [`INDEX_ENTRIES_PER_PAGE`]-sized pages.
    pub fn save(&self, device: &mut BlockFile) -> Result<()> {
        device.clear()?;
        for (page, chunk) in self.entries.chunks(INDEX_ENTRIES_PER_PAGE).enumerate() {
            let mut buf = vec![0u8; INDEX_PAGE_SIZE];
            let header = IndexPageHeader {
                count: I32::new(chunk.len() as i32),
            };
            buf[..4].copy_from_slice(header.as_bytes());
            for (i, entry) in chunk.iter().enumerate() {
                let at = 4 + i * INDEX_ENTRY_SIZE;
                buf[at..at + INDEX_ENTRY_SIZE].copy_from_slice(entry.as_bytes());
            }
            device.write_unit(page as u64, &buf)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockfile::IoCounters;

    #[test]
    fn locate_is_a_rank_query() {
        let mut index = SparseIndex::new();
        index.push(0, 0);
        index.push(50, 1);
        index.push(90, 2);

        assert_eq!(index.locate(0), 0);
        assert_eq!(index.locate(49), 0);
        assert_eq!(index.locate(50), 1);
        assert_eq!(index.locate(89), 1);
        assert_eq!(index.locate(1000), 2);
    }

    #[test]
    fn empty_index_resolves_to_page_zero() {
        assert_eq!(SparseIndex::new().locate(42), 0);
    }

    #[test]
    fn save_load_round_trip_spanning_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = BlockFile::open(dir.path().join("idx.bin"), IoCounters::new()).unwrap();

        // Three index pages: 128 + 128 + 44 entries.
        let mut index = SparseIndex::new();
        for i in 0..300u32 {
            index.push(i * 10, i as i32);
        }
        index.save(&mut device).unwrap();

        let back = SparseIndex::load(&device).unwrap();
        assert_eq!(back.entries(), index.entries());
        assert_eq!(back.locate(2995), 299);

        // A smaller save truncates the old tail away.
        let small = SparseIndex::bootstrap();
        small.save(&mut device).unwrap();
        let back = SparseIndex::load(&device).unwrap();
        assert_eq!(back.entries().len(), 1);
    }
}
