//! Reorganization: rebuilding the store at the configured fill factor.

use anyhow::{Context, Result};
use blockfile::BlockFile;
use tracing::{debug, trace_span};
use zerocopy::I32;

use crate::index::SparseIndex;
use crate::page::Page;
use crate::record::{Record, NULL_POINTER};
use crate::store::{file_path, IsamStore};

impl IsamStore {
    /// Rebuilds the store: streams every live record (primary and
    /// overflow, tombstones dropped) in key order into a fresh primary
    /// area packed at ⌊B·α⌋ (at least one) records per page, with a
    /// rebuilt sparse index and an empty overflow file.
    ///
    /// The rebuild happens in scratch files that replace the live ones by
    /// rename only after the whole stream succeeds; a failure before the
    /// swap leaves the live store untouched.
    pub fn reorganize(&mut self) -> Result<()> {
        let _span = trace_span!("reorganize").entered();
        let before = self.counters.snapshot();

        let capacity = self.blocking();
        let fill = ((capacity as f64 * self.alpha()).floor() as usize).max(1);

        let new_prim_path = file_path(&self.prefix, "_new_prim.bin");
        let new_over_path = file_path(&self.prefix, "_new_over.bin");
        let mut new_primary = BlockFile::open(&new_prim_path, self.counters.clone())
            .context("creating scratch primary file")?;
        new_primary.clear()?;
        let mut new_overflow = BlockFile::open(&new_over_path, self.counters.clone())
            .context("creating scratch overflow file")?;
        new_overflow.clear()?;

        let mut new_index = SparseIndex::new();
        let mut out_page = Page::new();
        let mut out_page_no: u64 = 0;

        for page_no in 0.. {
            let Some(page) = self.read_page(page_no)? else {
                break;
            };

            // This page's share of the store: its live slots plus its live
            // chain, in key order.
            let mut group: Vec<Record> = page
                .records()
                .iter()
                .filter(|r| !r.is_tombstone())
                .copied()
                .collect();
            group.extend(self.collect_chain_live(page_no, &page)?);
            group.sort_by_key(|r| r.key.get());

            for mut rec in group {
                rec.next = I32::new(NULL_POINTER);
                if out_page.is_empty() {
                    new_index.push(rec.key.get(), out_page_no as i32);
                }
                let inserted = out_page.insert(rec, fill);
                debug_assert!(inserted);
                if out_page.count() == fill {
                    new_primary.write_unit(out_page_no, &out_page.encode(capacity))?;
                    out_page = Page::new();
                    out_page_no += 1;
                }
            }
        }
        if !out_page.is_empty() {
            new_primary.write_unit(out_page_no, &out_page.encode(capacity))?;
        }
        if new_index.entries().is_empty() {
            // No live records survived: rebuild the bootstrap state so
            // page 0 and the sentinel entry exist again.
            new_primary.write_unit(0, &Page::new().encode(capacity))?;
            new_index = SparseIndex::bootstrap();
        }

        // Swap the rebuilt files in. Everything fallible enough to matter
        // has already happened; from here the sequence runs to completion
        // or the store is gone with the process.
        drop(new_primary);
        drop(new_overflow);
        std::fs::remove_file(self.primary.path())
            .with_context(|| format!("removing {}", self.primary.path().display()))?;
        std::fs::remove_file(self.overflow.path())
            .with_context(|| format!("removing {}", self.overflow.path().display()))?;
        std::fs::rename(&new_prim_path, self.primary.path())?;
        std::fs::rename(&new_over_path, self.overflow.path())?;
        self.primary.reopen()?;
        self.overflow.reopen()?;
        new_index.save(&mut self.index)?;

        let delta = self.counters.snapshot().since(before);
        self.stats.reorganizations += 1;
        self.stats.reorg_reads += delta.reads;
        self.stats.reorg_writes += delta.writes;
        debug!(
            pages = self.primary_pages()?,
            fill,
            reads = delta.reads,
            writes = delta.writes,
            "reorganization complete"
        );
        Ok(())
    }
}
