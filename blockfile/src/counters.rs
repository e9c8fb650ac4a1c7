//! Shared read/write accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A ledger of unit transfers, shared by every [`crate::BlockFile`] that
/// belongs to the same store.
///
/// Counters are monotonic for the lifetime of the ledger; they survive
/// `clear()` and rename/reopen cycles on the devices that bill against
/// them. Callers that want per-operation figures take a [`snapshot`] before
/// and after and subtract.
///
/// All accesses are relaxed. The engines are single-threaded, so each
/// increment is only ever observed by the thread that performed it; the
/// atomics exist so the ledger can be shared without interior-mutability
/// gymnastics or process-global state.
///
/// [`snapshot`]: IoCounters::snapshot
#[derive(Debug, Default)]
pub struct IoCounters {
    reads: AtomicU64,
    writes: AtomicU64,
}

impl IoCounters {
    /// Creates a fresh ledger with both counters at zero.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records one successful unit read.
    pub fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one successful unit write.
    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Total unit reads since the ledger was created.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Total unit writes since the ledger was created.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Captures the current totals.
    pub fn snapshot(&self) -> IoSnapshot {
        IoSnapshot {
            reads: self.reads(),
            writes: self.writes(),
        }
    }
}

/// A point-in-time copy of an [`IoCounters`] ledger.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct IoSnapshot {
    /// Unit reads at snapshot time.
    pub reads: u64,
    /// Unit writes at snapshot time.
    pub writes: u64,
}

impl IoSnapshot {
    /// The transfers performed between `earlier` and this snapshot.
    ///
    /// Both counters are monotonic, so the subtraction cannot underflow as
    /// long as `earlier` really was taken earlier on the same ledger.
    pub fn since(&self, earlier: IoSnapshot) -> IoSnapshot {
        IoSnapshot {
            reads: self.reads - earlier.reads,
            writes: self.writes - earlier.writes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_diff() {
        let counters = IoCounters::new();
        counters.record_read();
        counters.record_write();
        let before = counters.snapshot();

        counters.record_read();
        counters.record_read();
        counters.record_write();

        let delta = counters.snapshot().since(before);
        assert_eq!(delta, IoSnapshot { reads: 2, writes: 1 });
        assert_eq!(counters.reads(), 3);
        assert_eq!(counters.writes(), 2);
    }
}
