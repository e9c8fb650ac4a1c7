//! The tape: a paged file of `u32` slots.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use blockfile::{BlockFile, IoCounters};

/// The reserved "slot empty" value. Empty slots pad the tail of a partially
/// filled page; they are never returned by [`Tape::read_page`].
pub const SLOT_EMPTY: u32 = 0;

const SLOT_BYTES: usize = 4;

/// A [`BlockFile`] viewed as pages of little-endian `u32` slots.
pub struct Tape {
    device: BlockFile,
    page_bytes: usize,
}

impl Tape {
    /// Opens (creating if absent) a tape at `path` with pages of
    /// `page_bytes` bytes, billing I/O against `counters`.
    pub fn open(
        path: impl AsRef<Path>,
        page_bytes: usize,
        counters: Arc<IoCounters>,
    ) -> Result<Self> {
        if page_bytes == 0 || page_bytes % SLOT_BYTES != 0 {
            bail!(
                "page size must be a positive multiple of {SLOT_BYTES} bytes, got {page_bytes}"
            );
        }
        let device = BlockFile::open(path.as_ref(), counters)
            .with_context(|| format!("opening tape {}", path.as_ref().display()))?;
        Ok(Self { device, page_bytes })
    }

    /// Page size in bytes.
    pub fn page_bytes(&self) -> usize {
        self.page_bytes
    }

    /// Slots per page.
    pub fn slots_per_page(&self) -> usize {
        self.page_bytes / SLOT_BYTES
    }

    /// The ledger this tape bills against.
    pub fn counters(&self) -> &Arc<IoCounters> {
        self.device.counters()
    }

    /// The path of the backing file.
    pub fn path(&self) -> &Path {
        self.device.path()
    }

    /// Number of whole pages on the tape.
    pub fn num_pages(&self) -> Result<u64> {
        Ok(self.device.size_in(self.page_bytes as u64)?)
    }

    /// Reads page `page` and returns its occupied slots in slot order,
    /// skipping [`SLOT_EMPTY`]. Returns `None` when the page does not exist.
    pub fn read_page(&self, page: u64) -> Result<Option<Vec<u32>>> {
        let mut buf = vec![0u8; self.page_bytes];
        if !self.device.read_unit(page, &mut buf)? {
            return Ok(None);
        }
        let values = buf
            .chunks_exact(SLOT_BYTES)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .filter(|&v| v != SLOT_EMPTY)
            .collect();
        Ok(Some(values))
    }

    /// Writes `values` as page `page`, padding unused trailing slots with
    /// [`SLOT_EMPTY`]. `values` must fit in one page.
    pub fn write_page(&mut self, page: u64, values: &[u32]) -> Result<()> {
        assert!(values.len() <= self.slots_per_page());
        let mut buf = vec![0u8; self.page_bytes];
        for (slot, value) in buf.chunks_exact_mut(SLOT_BYTES).zip(values) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
        self.device.write_unit(page, &buf)?;
        Ok(())
    }

    /// Replaces the tape contents with `values`, packed densely from page 0
    /// and zero-padded in the final page.
    pub fn load_values(&mut self, values: &[u32]) -> Result<()> {
        self.device.clear()?;
        let per_page = self.slots_per_page();
        for (page, chunk) in values.chunks(per_page).enumerate() {
            self.write_page(page as u64, chunk)?;
        }
        Ok(())
    }

    /// All occupied slots on the tape, in page and slot order.
    pub fn collect_values(&self) -> Result<Vec<u32>> {
        let mut values = Vec::new();
        for page in 0.. {
            match self.read_page(page)? {
                Some(page_values) => values.extend(page_values),
                None => break,
            }
        }
        Ok(values)
    }

    /// Diagnostic rendering: slots in page order, `_` for empty slots,
    /// pages separated by `|`.
    pub fn render(&self) -> Result<String> {
        let mut out = String::from("|");
        let mut buf = vec![0u8; self.page_bytes];
        for page in 0.. {
            if !self.device.read_unit(page, &mut buf)? {
                break;
            }
            for slot in buf.chunks_exact(SLOT_BYTES) {
                let value = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
                if value == SLOT_EMPTY {
                    out.push_str(" _");
                } else {
                    out.push_str(&format!(" {value}"));
                }
            }
            out.push_str(" |");
        }
        Ok(out)
    }

    /// Deletes this tape's file and renames `scratch`'s file onto it, then
    /// reopens the device. Used by the merge to swap a finished pass in.
    pub(crate) fn replace_with(&mut self, scratch: Tape) -> Result<()> {
        let scratch_path = scratch.device.path().to_path_buf();
        drop(scratch);
        std::fs::remove_file(self.path())
            .with_context(|| format!("removing {}", self.path().display()))?;
        std::fs::rename(&scratch_path, self.path())
            .with_context(|| format!("renaming {} over {}", scratch_path.display(), self.path().display()))?;
        self.device.reopen()?;
        Ok(())
    }

    /// Truncates the tape to zero pages.
    pub fn clear(&mut self) -> Result<()> {
        self.device.clear()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tape(dir: &tempfile::TempDir, page_bytes: usize) -> Tape {
        Tape::open(dir.path().join("tape.bin"), page_bytes, IoCounters::new()).unwrap()
    }

    #[test]
    fn rejects_unaligned_page_size() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Tape::open(dir.path().join("t.bin"), 10, IoCounters::new()).is_err());
        assert!(Tape::open(dir.path().join("t.bin"), 0, IoCounters::new()).is_err());
    }

    #[test]
    fn empty_slots_are_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = tape(&dir, 16);

        t.write_page(0, &[3, 1]).unwrap();
        assert_eq!(t.read_page(0).unwrap().unwrap(), vec![3, 1]);
        assert_eq!(t.num_pages().unwrap(), 1);
        assert!(t.read_page(1).unwrap().is_none());
    }

    #[test]
    fn load_and_collect_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = tape(&dir, 16);

        t.load_values(&[5, 9, 2, 6, 5, 3, 5]).unwrap();
        assert_eq!(t.num_pages().unwrap(), 2);
        assert_eq!(t.collect_values().unwrap(), vec![5, 9, 2, 6, 5, 3, 5]);
        assert_eq!(t.render().unwrap(), "| 5 9 2 6 | 5 3 5 _ |");
    }
}
