//! Consistency checks for the store, used by tests.

use std::collections::HashSet;

use crate::record::NULL_POINTER;
use crate::store::IsamStore;

impl IsamStore {
    /// Walks the whole store and asserts its structural invariants: every
    /// page's slots strictly key-ascending, every overflow chain strictly
    /// key-ascending and terminating, and no key live twice.
    pub(crate) fn assert_invariants(&self) {
        let mut live_keys: HashSet<u32> = HashSet::new();

        for page_no in 0.. {
            let Some(page) = self.read_page(page_no).unwrap() else {
                break;
            };

            let keys: Vec<u32> = page.records().iter().map(|r| r.key.get()).collect();
            assert!(
                keys.windows(2).all(|w| w[0] < w[1]),
                "page {page_no} slots are not strictly ascending: {keys:?}"
            );
            for rec in page.records().iter().filter(|r| !r.is_tombstone()) {
                assert!(
                    live_keys.insert(rec.key.get()),
                    "key {} is live in more than one place",
                    rec.key.get()
                );
            }

            let mut walk = self.chain_walk(page_no).unwrap();
            let mut last_key: Option<u32> = None;
            let mut cur = page.overflow_head;
            while cur != NULL_POINTER {
                let rec = walk.step(self, cur).unwrap();
                let key = rec.key.get();
                assert!(
                    last_key.map_or(true, |last| last < key),
                    "chain of page {page_no} is not strictly ascending at key {key}"
                );
                last_key = Some(key);
                if !rec.is_tombstone() {
                    assert!(
                        live_keys.insert(key),
                        "key {key} is live in more than one place"
                    );
                }
                cur = rec.next.get();
            }
        }
    }

    /// Asserts the index↔page correspondence that holds right after a
    /// reorganization: every non-empty page is named by exactly one entry
    /// carrying its smallest live key, and no page has an overflow chain.
    pub(crate) fn assert_reorganized_shape(&self) {
        let index = crate::index::SparseIndex::load(&self.index).unwrap();

        for page_no in 0.. {
            let Some(page) = self.read_page(page_no).unwrap() else {
                break;
            };
            assert_eq!(
                page.overflow_head, NULL_POINTER,
                "page {page_no} still has an overflow chain"
            );
            assert!(
                page.records().iter().all(|r| !r.is_tombstone()),
                "page {page_no} still holds tombstones"
            );

            let Some(smallest) = page.records().first().map(|r| r.key.get()) else {
                continue;
            };
            let matching: Vec<_> = index
                .entries()
                .iter()
                .filter(|e| e.page.get() as u64 == page_no)
                .collect();
            assert_eq!(
                matching.len(),
                1,
                "page {page_no} should be named by exactly one index entry"
            );
            assert_eq!(
                matching[0].key.get(),
                smallest,
                "index entry for page {page_no} does not carry its smallest key"
            );
        }

        assert_eq!(self.overflow_len().unwrap(), 0, "overflow file is not empty");
    }
}
