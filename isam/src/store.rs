//! The ISAM engine: CRUD over the three-file store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use blockfile::{BlockFile, IoCounters};
use tracing::{debug, trace_span};
use zerocopy::{AsBytes, FromBytes, I32, U32};

use crate::index::SparseIndex;
use crate::page::Page;
use crate::record::{Record, NULL_POINTER, RECORD_SIZE};

/// Reorganization is never auto-triggered while the overflow file holds
/// this many records or fewer; tiny stores would otherwise thrash.
const MIN_OVERFLOW_FOR_REORG: u64 = 5;

/// Construction parameters for an [`IsamStore`].
#[derive(Copy, Clone, Debug)]
pub struct IsamOptions {
    /// Records per primary page (the blocking factor B). Must be ≥ 1.
    pub blocking: usize,
    /// Fill factor α ∈ (0, 1]: reorganization packs ⌊B·α⌋ (at least one)
    /// records into each rebuilt page.
    pub alpha: f64,
    /// Auto-reorganization threshold τ ≥ 0 on the overflow-to-capacity
    /// ratio V / (B · primary pages).
    pub threshold: f64,
}

impl Default for IsamOptions {
    fn default() -> Self {
        Self {
            blocking: 4,
            alpha: 0.5,
            threshold: 0.2,
        }
    }
}

/// Where a record was found.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordLocation {
    /// In a primary-page slot.
    Primary {
        /// Primary page number.
        page: u64,
        /// Slot within the page.
        slot: usize,
    },
    /// In the overflow file.
    Overflow {
        /// Overflow record index.
        addr: i32,
    },
}

/// Operation and reorganization tallies for one store.
///
/// Total page/record transfer counts live on the shared
/// [`IoCounters`] ledger; the `reorg_*` fields are the slice of those
/// transfers attributable to reorganizations.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct IsamStats {
    /// Reorganizations performed (manual and auto-triggered).
    pub reorganizations: u64,
    /// Insert attempts, rejected duplicates included.
    pub inserts: u64,
    /// Point lookups served.
    pub searches: u64,
    /// Reads attributed to reorganizations.
    pub reorg_reads: u64,
    /// Writes attributed to reorganizations.
    pub reorg_writes: u64,
}

/// The store: a primary area of sorted pages, an overflow area of chained
/// records, and a paged sparse index, behind one filename prefix.
pub struct IsamStore {
    pub(crate) prefix: PathBuf,
    blocking: usize,
    alpha: f64,
    threshold: f64,
    pub(crate) primary: BlockFile,
    pub(crate) overflow: BlockFile,
    pub(crate) index: BlockFile,
    pub(crate) counters: Arc<IoCounters>,
    pub(crate) stats: IsamStats,
}

impl IsamStore {
    /// Opens the store at `prefix` (three files `<prefix>_primary.bin`,
    /// `<prefix>_overflow.bin`, `<prefix>_index.bin`), creating and
    /// initializing them when the primary area is empty.
    pub fn open(prefix: impl Into<PathBuf>, options: IsamOptions) -> Result<Self> {
        if options.blocking < 1 {
            bail!("blocking factor must be at least 1, got {}", options.blocking);
        }
        if !(options.alpha > 0.0 && options.alpha <= 1.0) {
            bail!("fill factor must be within (0, 1], got {}", options.alpha);
        }
        if !(options.threshold >= 0.0) {
            bail!("reorganization threshold must be ≥ 0, got {}", options.threshold);
        }

        let prefix = prefix.into();
        let counters = IoCounters::new();
        let primary = BlockFile::open(file_path(&prefix, "_primary.bin"), counters.clone())?;
        let overflow = BlockFile::open(file_path(&prefix, "_overflow.bin"), counters.clone())?;
        let index = BlockFile::open(file_path(&prefix, "_index.bin"), counters.clone())?;

        let mut store = Self {
            prefix,
            blocking: options.blocking,
            alpha: options.alpha,
            threshold: options.threshold,
            primary,
            overflow,
            index,
            counters,
            stats: IsamStats::default(),
        };
        if store.primary_pages()? == 0 {
            store.init_structure()?;
        }
        Ok(store)
    }

    /// Records per primary page.
    pub fn blocking(&self) -> usize {
        self.blocking
    }

    /// The fill factor α.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// The auto-reorganization threshold τ.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The transfer ledger shared by the store's three devices.
    pub fn counters(&self) -> &Arc<IoCounters> {
        &self.counters
    }

    /// Operation tallies.
    pub fn stats(&self) -> &IsamStats {
        &self.stats
    }

    /// Inserts `(key, payload)`. Returns false without side effects (beyond
    /// the reads that detect it) when a live record with `key` exists.
    ///
    /// The record goes into its page while the page has room. A full page
    /// sends it to the page's overflow chain — unless the page is the last
    /// one and the key is greater than everything on it, in which case the
    /// primary area grows by a fresh page holding the record (the classic
    /// sequential load path). Afterwards the overflow-to-capacity ratio may
    /// trigger a reorganization.
    pub fn insert(&mut self, key: u32, payload: u32) -> Result<bool> {
        let _span = trace_span!("insert", key).entered();
        self.stats.inserts += 1;

        if self.lookup(key)?.is_some() {
            debug!(key, "insert rejected: key already present");
            return Ok(false);
        }

        let mut index = SparseIndex::load(&self.index)?;
        let page_no = index.locate(key);
        let Some(mut page) = self.read_page(page_no)? else {
            bail!("primary page {page_no} named by the index does not exist");
        };

        let rec = Record::new(key, payload);
        if page.insert(rec, self.blocking) {
            self.write_page(page_no, &page)?;
        } else if self.extends_primary(page_no, &page, key)? {
            let mut fresh = Page::new();
            fresh.insert(rec, self.blocking);
            let new_page_no = self.primary_pages()?;
            self.write_page(new_page_no, &fresh)?;
            index.push(key, new_page_no as i32);
            index.save(&mut self.index)?;
            debug!(key, page = new_page_no, "extended primary area");
        } else {
            self.add_to_overflow(page_no, &mut page, rec)?;
        }

        self.maybe_reorganize()?;
        Ok(true)
    }

    /// Whether inserting `key` on full page `page_no` should grow the
    /// primary area instead of chaining: only past the end of the last
    /// page.
    fn extends_primary(&self, page_no: u64, page: &Page, key: u32) -> Result<bool> {
        if page_no + 1 != self.primary_pages()? {
            return Ok(false);
        }
        // The page is full, so there is a last slot; tombstoned or not, its
        // key bounds the page.
        let last_key = page.records().last().map(|r| r.key.get());
        Ok(last_key.is_some_and(|last| key > last))
    }

    /// The live record with `key`, if any.
    pub fn read(&mut self, key: u32) -> Result<Option<Record>> {
        self.stats.searches += 1;
        Ok(self.lookup(key)?.map(|(rec, _)| rec))
    }

    /// The live record with `key` and where it lives.
    pub fn lookup(&self, key: u32) -> Result<Option<(Record, RecordLocation)>> {
        let index = SparseIndex::load(&self.index)?;
        let page_no = index.locate(key);
        let Some(page) = self.read_page(page_no)? else {
            return Ok(None);
        };

        if let Some(slot) = page.find_slot(key) {
            let rec = page.records()[slot];
            return Ok(Some((rec, RecordLocation::Primary { page: page_no, slot })));
        }

        let mut walk = self.chain_walk(page_no)?;
        let mut cur = page.overflow_head;
        while cur != NULL_POINTER {
            let rec = walk.step(self, cur)?;
            if rec.key.get() > key {
                // The chain is sorted; nothing further can match.
                return Ok(None);
            }
            if rec.key.get() == key && !rec.is_tombstone() {
                return Ok(Some((rec, RecordLocation::Overflow { addr: cur })));
            }
            cur = rec.next.get();
        }
        Ok(None)
    }

    /// Tombstones the record with `key`. Returns false when no live record
    /// matches.
    pub fn delete(&mut self, key: u32) -> Result<bool> {
        let _span = trace_span!("delete", key).entered();
        let index = SparseIndex::load(&self.index)?;
        let page_no = index.locate(key);
        let Some(mut page) = self.read_page(page_no)? else {
            return Ok(false);
        };

        if page.delete(key) {
            self.write_page(page_no, &page)?;
            return Ok(true);
        }

        let mut walk = self.chain_walk(page_no)?;
        let mut cur = page.overflow_head;
        while cur != NULL_POINTER {
            let mut rec = walk.step(self, cur)?;
            if rec.key.get() > key {
                return Ok(false);
            }
            if rec.key.get() == key && !rec.is_tombstone() {
                rec.tombstone = 1;
                self.write_overflow(cur, &rec)?;
                return Ok(true);
            }
            cur = rec.next.get();
        }
        Ok(false)
    }

    /// Replaces the payload of the record with `key`, wherever it lives.
    /// A missing key is a no-op returning false.
    pub fn update(&mut self, key: u32, new_payload: u32) -> Result<bool> {
        let _span = trace_span!("update", key).entered();
        let Some((mut rec, location)) = self.lookup(key)? else {
            return Ok(false);
        };
        match location {
            RecordLocation::Primary { page, slot } => {
                let Some(mut p) = self.read_page(page)? else {
                    bail!("primary page {page} vanished during update");
                };
                p.record_mut(slot).payload = U32::new(new_payload);
                self.write_page(page, &p)?;
            }
            RecordLocation::Overflow { addr } => {
                rec.payload = U32::new(new_payload);
                self.write_overflow(addr, &rec)?;
            }
        }
        Ok(true)
    }

    /// Every live record in ascending key order: primary pages in index
    /// order, each merged with its overflow chain.
    pub fn browse(&self) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        for page_no in 0.. {
            let Some(page) = self.read_page(page_no)? else {
                break;
            };
            let mut group: Vec<Record> = page
                .records()
                .iter()
                .filter(|r| !r.is_tombstone())
                .copied()
                .collect();
            group.extend(self.collect_chain_live(page_no, &page)?);
            group.sort_by_key(|r| r.key.get());
            out.extend(group);
        }
        Ok(out)
    }

    /// Diagnostic rendering of every primary page and its overflow chain.
    pub fn render(&self) -> Result<String> {
        use std::fmt::Write as _;

        let mut out = String::new();
        for page_no in 0.. {
            let Some(page) = self.read_page(page_no)? else {
                break;
            };
            let _ = writeln!(out, "Page {page_no}: {}", page.render(self.blocking));
            let mut walk = self.chain_walk(page_no)?;
            let mut cur = page.overflow_head;
            while cur != NULL_POINTER {
                let rec = walk.step(self, cur)?;
                let _ = writeln!(out, "  OV {cur}: {rec}");
                cur = rec.next.get();
            }
        }
        Ok(out)
    }

    /// Deletes all three files and reinitializes the empty store.
    pub fn clear(&mut self) -> Result<()> {
        debug!("clearing store");
        self.primary.clear()?;
        self.overflow.clear()?;
        self.index.clear()?;
        self.init_structure()
    }

    /// Writes the bootstrap state: one empty primary page and the
    /// singleton index entry (0, 0).
    fn init_structure(&mut self) -> Result<()> {
        debug!("initializing empty store");
        self.primary.clear()?;
        self.overflow.clear()?;
        self.write_page(0, &Page::new())?;
        SparseIndex::bootstrap().save(&mut self.index)?;
        Ok(())
    }

    /// Splices `rec` into the sorted overflow chain of `page_no`.
    fn add_to_overflow(&mut self, page_no: u64, page: &mut Page, mut rec: Record) -> Result<()> {
        rec.next = I32::new(NULL_POINTER);
        let addr = self.append_overflow(&rec)?;
        debug!(key = rec.key.get(), addr, page = page_no, "record chained to overflow");

        let head = page.overflow_head;
        if head == NULL_POINTER {
            page.overflow_head = addr;
            return self.write_page(page_no, page);
        }

        let head_rec = self.must_read_overflow(head)?;
        if rec.key.get() < head_rec.key.get() {
            // The new record becomes the chain head.
            rec.next = I32::new(head);
            self.write_overflow(addr, &rec)?;
            page.overflow_head = addr;
            return self.write_page(page_no, page);
        }

        // Walk to the splice point: prev holds the greatest key below the
        // new one, cur is the first greater key (or the end).
        let mut walk = self.chain_walk(page_no)?;
        let mut prev_addr = head;
        let mut prev = head_rec;
        let mut cur = prev.next.get();
        while cur != NULL_POINTER {
            let cur_rec = walk.step(self, cur)?;
            if cur_rec.key.get() > rec.key.get() {
                break;
            }
            prev_addr = cur;
            prev = cur_rec;
            cur = cur_rec.next.get();
        }

        rec.next = I32::new(cur);
        self.write_overflow(addr, &rec)?;
        prev.next = I32::new(addr);
        self.write_overflow(prev_addr, &prev)
    }

    /// Runs a reorganization when the overflow area has outgrown the
    /// primary capacity ratio (and the minimum-overflow guard).
    fn maybe_reorganize(&mut self) -> Result<()> {
        let v = self.overflow_len()?;
        let n_cap = self.primary_pages()? * self.blocking as u64;
        if n_cap > 0
            && v > MIN_OVERFLOW_FOR_REORG
            && (v as f64 / n_cap as f64) >= self.threshold
        {
            debug!(v, n_cap, threshold = self.threshold, "overflow ratio triggered reorganization");
            self.reorganize()?;
        }
        Ok(())
    }

    // ----- device-level helpers ---------------------------------------

    pub(crate) fn page_disk_size(&self) -> usize {
        Page::disk_size(self.blocking)
    }

    /// Number of pages in the primary area.
    pub fn primary_pages(&self) -> Result<u64> {
        Ok(self.primary.size_in(self.page_disk_size() as u64)?)
    }

    /// Number of records in the overflow file, tombstoned ones included.
    pub fn overflow_len(&self) -> Result<u64> {
        Ok(self.overflow.size_in(RECORD_SIZE as u64)?)
    }

    pub(crate) fn read_page(&self, page_no: u64) -> Result<Option<Page>> {
        let mut buf = vec![0u8; self.page_disk_size()];
        if !self.primary.read_unit(page_no, &mut buf)? {
            return Ok(None);
        }
        Page::decode(&buf, self.blocking).map(Some)
    }

    pub(crate) fn write_page(&mut self, page_no: u64, page: &Page) -> Result<()> {
        self.primary
            .write_unit(page_no, &page.encode(self.blocking))?;
        Ok(())
    }

    pub(crate) fn read_overflow(&self, addr: i32) -> Result<Option<Record>> {
        let mut buf = [0u8; RECORD_SIZE];
        if !self.overflow.read_unit(addr as u64, &mut buf)? {
            return Ok(None);
        }
        // The buffer is exactly one record wide, so the parse cannot fail.
        Ok(Some(Record::read_from(buf.as_slice()).unwrap()))
    }

    pub(crate) fn must_read_overflow(&self, addr: i32) -> Result<Record> {
        match self.read_overflow(addr)? {
            Some(rec) => Ok(rec),
            None => bail!("dangling overflow pointer {addr}"),
        }
    }

    pub(crate) fn write_overflow(&mut self, addr: i32, rec: &Record) -> Result<()> {
        self.overflow.write_unit(addr as u64, rec.as_bytes())?;
        Ok(())
    }

    fn append_overflow(&mut self, rec: &Record) -> Result<i32> {
        let addr = self.overflow.append_unit(rec.as_bytes())?;
        Ok(addr as i32)
    }

    /// A bounded chain walk. The bound is the overflow file's record
    /// count; any longer walk means a corrupt (cyclic) chain.
    pub(crate) fn chain_walk(&self, page_no: u64) -> Result<ChainWalk> {
        Ok(ChainWalk {
            page_no,
            remaining: self.overflow_len()?,
        })
    }

    /// Live records of `page_no`'s overflow chain, in chain order.
    pub(crate) fn collect_chain_live(&self, page_no: u64, page: &Page) -> Result<Vec<Record>> {
        let mut walk = self.chain_walk(page_no)?;
        let mut out = Vec::new();
        let mut cur = page.overflow_head;
        while cur != NULL_POINTER {
            let rec = walk.step(self, cur)?;
            if !rec.is_tombstone() {
                out.push(rec);
            }
            cur = rec.next.get();
        }
        Ok(out)
    }
}

/// Step counter for overflow-chain traversal; trips on chains longer than
/// the overflow file itself, which only a corrupt `next` cycle can produce.
pub(crate) struct ChainWalk {
    page_no: u64,
    remaining: u64,
}

impl ChainWalk {
    pub(crate) fn step(&mut self, store: &IsamStore, addr: i32) -> Result<Record> {
        if self.remaining == 0 {
            bail!(
                "overflow chain of page {} does not terminate; the chain is corrupt",
                self.page_no
            );
        }
        self.remaining -= 1;
        store.must_read_overflow(addr)
    }
}

pub(crate) fn file_path(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
