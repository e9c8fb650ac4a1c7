//! Run creation and merge passes.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, trace};

use crate::tape::Tape;

/// What a [`sort`] call did, in runs, passes, and page transfers.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SortStats {
    /// Runs produced by the run-creation phase.
    pub initial_runs: u64,
    /// Merge passes performed. Zero when the tape held at most one run.
    pub merge_passes: u64,
    /// Page reads performed by the whole sort.
    pub reads: u64,
    /// Page writes performed by the whole sort.
    pub writes: u64,
}

/// Sorts `tape` in place using `buffers` in-memory page buffers.
///
/// Any unreadable page or scratch-tape failure aborts the sort; the tape is
/// then left in the state of the last completed pass.
pub fn sort(tape: &mut Tape, buffers: usize) -> Result<SortStats> {
    if buffers < 2 {
        bail!("at least 2 page buffers are required, got {buffers}");
    }
    let before = tape.counters().snapshot();

    let initial_runs = create_runs(tape, buffers)?;
    let merge_passes = merge(tape, buffers, initial_runs)?;

    let delta = tape.counters().snapshot().since(before);
    Ok(SortStats {
        initial_runs,
        merge_passes,
        reads: delta.reads,
        writes: delta.writes,
    })
}

/// Phase 1: sorts groups of `buffers` consecutive pages in memory and
/// writes each group back to its own page range. Returns the run count.
fn create_runs(tape: &mut Tape, buffers: usize) -> Result<u64> {
    let total_pages = tape.num_pages()?;
    let per_page = tape.slots_per_page();
    let group = buffers as u64;

    let mut page = 0;
    while page < total_pages {
        let end = (page + group).min(total_pages);

        let mut values = Vec::with_capacity((end - page) as usize * per_page);
        for p in page..end {
            match tape.read_page(p)? {
                Some(v) => values.extend(v),
                None => bail!("tape page {p} unreadable during run creation"),
            }
        }
        values.sort_unstable();
        trace!(
            first_page = page,
            pages = end - page,
            records = values.len(),
            "created run"
        );

        // Rewrite the whole range: records pack densely from the front and
        // every slot past them becomes the empty sentinel.
        let mut chunks = values.chunks(per_page);
        for p in page..end {
            tape.write_page(p, chunks.next().unwrap_or(&[]))?;
        }
        page = end;
    }

    Ok(total_pages.div_ceil(group))
}

/// Phase 2: repeatedly merges groups of runs into a scratch tape and swaps
/// the scratch in, until a single run remains. Returns the pass count.
fn merge(tape: &mut Tape, buffers: usize, initial_runs: u64) -> Result<u64> {
    let mut runs = initial_runs;
    if runs <= 1 {
        debug!(runs, "tape is already sorted, no merge pass needed");
        return Ok(0);
    }

    // One buffer is reserved for output. A two-buffer configuration still
    // merges pairwise: a one-way pass could never reduce the run count.
    let ways = (buffers - 1).max(2) as u64;
    let mut run_pages = buffers as u64;
    let mut passes = 0;

    let scratch_path = scratch_path(tape.path());

    while runs > 1 {
        let mut scratch = Tape::open(&scratch_path, tape.page_bytes(), tape.counters().clone())
            .context("opening scratch tape")?;
        scratch.clear()?;

        let total_pages = tape.num_pages()?;
        let mut out = OutputBuffer::new();
        let mut output_runs = 0;
        let mut next_run = 0;
        while next_run < runs {
            let group = ways.min(runs - next_run);
            merge_group(tape, &mut scratch, &mut out, next_run, group, run_pages, total_pages)?;
            next_run += group;
            output_runs += 1;
        }

        tape.replace_with(scratch)?;
        passes += 1;
        run_pages *= ways;
        debug!(pass = passes, runs = output_runs, run_pages, "merge pass complete");
        runs = output_runs;
    }

    Ok(passes)
}

/// Merges `group` consecutive runs starting at run `first_run` into the
/// scratch tape. The group's final partial page is flushed so every output
/// run starts page-aligned.
fn merge_group(
    tape: &Tape,
    scratch: &mut Tape,
    out: &mut OutputBuffer,
    first_run: u64,
    group: u64,
    run_pages: u64,
    total_pages: u64,
) -> Result<()> {
    let mut cursors: Vec<RunCursor> = (0..group)
        .map(|i| {
            let start = (first_run + i) * run_pages;
            RunCursor {
                buffer: Vec::new(),
                pos: 0,
                next_page: start,
                end_page: (start + run_pages).min(total_pages),
            }
        })
        .collect();

    // Tournament heap over (record, run). Keys repeat across runs, so the
    // run index only serves to make the ordering total.
    let mut heap: BinaryHeap<Reverse<(u32, usize)>> = BinaryHeap::new();
    for (run, cursor) in cursors.iter_mut().enumerate() {
        if let Some(value) = cursor.next_value(tape)? {
            heap.push(Reverse((value, run)));
        }
    }

    while let Some(Reverse((value, run))) = heap.pop() {
        out.push(value, scratch)?;
        if let Some(next) = cursors[run].next_value(tape)? {
            heap.push(Reverse((next, run)));
        }
    }

    out.flush(scratch)
}

/// One input run during a merge: a one-page buffer and a cursor into it.
struct RunCursor {
    buffer: Vec<u32>,
    pos: usize,
    next_page: u64,
    end_page: u64,
}

impl RunCursor {
    /// The run's next record, refilling the page buffer as needed. `None`
    /// once the run's last page is exhausted.
    fn next_value(&mut self, tape: &Tape) -> Result<Option<u32>> {
        loop {
            if self.pos < self.buffer.len() {
                let value = self.buffer[self.pos];
                self.pos += 1;
                return Ok(Some(value));
            }
            if self.next_page >= self.end_page {
                return Ok(None);
            }
            match tape.read_page(self.next_page)? {
                Some(values) => {
                    self.buffer = values;
                    self.pos = 0;
                    self.next_page += 1;
                }
                None => bail!("tape page {} unreadable during merge", self.next_page),
            }
        }
    }
}

/// The single output page buffer, written to the scratch tape whenever it
/// fills. `next_page` persists across groups within one pass.
struct OutputBuffer {
    values: Vec<u32>,
    next_page: u64,
}

impl OutputBuffer {
    fn new() -> Self {
        Self {
            values: Vec::new(),
            next_page: 0,
        }
    }

    fn push(&mut self, value: u32, scratch: &mut Tape) -> Result<()> {
        self.values.push(value);
        if self.values.len() == scratch.slots_per_page() {
            self.flush(scratch)?;
        }
        Ok(())
    }

    fn flush(&mut self, scratch: &mut Tape) -> Result<()> {
        if self.values.is_empty() {
            return Ok(());
        }
        scratch.write_page(self.next_page, &self.values)?;
        self.next_page += 1;
        self.values.clear();
        Ok(())
    }
}

fn scratch_path(tape: &Path) -> PathBuf {
    let mut name = tape.as_os_str().to_os_string();
    name.push(".merge");
    PathBuf::from(name)
}
