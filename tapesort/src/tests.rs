use std::sync::Arc;

use blockfile::IoCounters;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{sort, Tape};

fn tape_with(dir: &tempfile::TempDir, page_bytes: usize, values: &[u32]) -> Tape {
    let mut tape = Tape::open(dir.path().join("tape.bin"), page_bytes, IoCounters::new()).unwrap();
    tape.load_values(values).unwrap();
    tape
}

/// Number of merge passes the run count dictates: how many times the run
/// count must be divided (rounding up) by the merge width to reach one.
fn expected_passes(initial_runs: u64, ways: u64) -> u64 {
    let mut runs = initial_runs;
    let mut passes = 0;
    while runs > 1 {
        runs = runs.div_ceil(ways);
        passes += 1;
    }
    passes
}

#[test]
fn two_buffer_three_page_tape() {
    let dir = tempfile::tempdir().unwrap();
    // Pages: [3,1,4,1] [5,9,2,6] [5,3,5,_]
    let mut tape = tape_with(&dir, 16, &[3, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5]);

    let stats = sort(&mut tape, 2).unwrap();

    assert_eq!(stats.initial_runs, 2);
    assert_eq!(tape.read_page(0).unwrap().unwrap(), vec![1, 1, 2, 3]);
    assert_eq!(tape.read_page(1).unwrap().unwrap(), vec![3, 4, 5, 5]);
    assert_eq!(tape.read_page(2).unwrap().unwrap(), vec![5, 6, 9]);
    assert_eq!(tape.render().unwrap(), "| 1 1 2 3 | 3 4 5 5 | 5 6 9 _ |");
}

#[test]
fn three_buffer_five_page_tape() {
    let dir = tempfile::tempdir().unwrap();
    // Pages: [9,1] [8,2] [7,3] [6,4] [5,_]
    let mut tape = tape_with(&dir, 8, &[9, 1, 8, 2, 7, 3, 6, 4, 5]);

    let stats = sort(&mut tape, 3).unwrap();

    assert_eq!(stats.initial_runs, 2);
    assert_eq!(stats.merge_passes, 1);
    assert_eq!(tape.render().unwrap(), "| 1 2 | 3 4 | 5 6 | 7 8 | 9 _ |");
}

#[test]
fn single_run_is_already_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let mut tape = tape_with(&dir, 16, &[4, 2, 3, 1, 8, 6, 7, 5]);

    // Two pages, four buffers: run creation covers the whole tape.
    let stats = sort(&mut tape, 4).unwrap();

    assert_eq!(stats.initial_runs, 1);
    assert_eq!(stats.merge_passes, 0);
    assert_eq!(tape.collect_values().unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn empty_tape_sorts_to_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut tape = tape_with(&dir, 16, &[]);

    let stats = sort(&mut tape, 3).unwrap();

    assert_eq!(stats.initial_runs, 0);
    assert_eq!(stats.merge_passes, 0);
    assert_eq!(tape.num_pages().unwrap(), 0);
}

#[test]
fn rejects_single_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let mut tape = tape_with(&dir, 16, &[2, 1]);
    assert!(sort(&mut tape, 1).is_err());
}

#[test]
fn sorts_random_tapes_for_small_buffer_counts() {
    let mut rng = StdRng::seed_from_u64(0x7a9e);

    for buffers in 2..=5 {
        for &record_count in &[1usize, 7, 64, 257, 1000] {
            let values: Vec<u32> = (0..record_count).map(|_| rng.gen_range(1..=1000)).collect();
            let mut expected = values.clone();
            expected.sort_unstable();

            let dir = tempfile::tempdir().unwrap();
            let mut tape = tape_with(&dir, 16, &values);
            let pages_before = tape.num_pages().unwrap();

            let stats = sort(&mut tape, buffers).unwrap();

            assert_eq!(
                tape.collect_values().unwrap(),
                expected,
                "buffers={buffers} records={record_count}"
            );
            assert_eq!(
                tape.num_pages().unwrap(),
                pages_before,
                "sort must not change the page count"
            );
            assert_eq!(stats.initial_runs, pages_before.div_ceil(buffers as u64));
        }
    }
}

#[test]
fn merge_pass_count_matches_run_count_bound() {
    let mut rng = StdRng::seed_from_u64(0x51c2);

    for buffers in 3..=6 {
        for &record_count in &[16usize, 120, 900] {
            let values: Vec<u32> = (0..record_count).map(|_| rng.gen_range(1..=9)).collect();

            let dir = tempfile::tempdir().unwrap();
            let mut tape = tape_with(&dir, 8, &values);

            let stats = sort(&mut tape, buffers).unwrap();

            assert_eq!(
                stats.merge_passes,
                expected_passes(stats.initial_runs, buffers as u64 - 1),
                "buffers={buffers} records={record_count}"
            );
        }
    }
}

#[test]
fn zero_padding_never_reaches_the_output() {
    let dir = tempfile::tempdir().unwrap();
    // Three partial-page loads leave embedded empty slots once pages are
    // written individually.
    let mut tape = Tape::open(dir.path().join("tape.bin"), 16, IoCounters::new()).unwrap();
    tape.write_page(0, &[7, 3]).unwrap();
    tape.write_page(1, &[9]).unwrap();
    tape.write_page(2, &[2, 8, 4]).unwrap();

    let stats = sort(&mut tape, 2).unwrap();
    assert!(stats.merge_passes >= 1);
    assert_eq!(tape.collect_values().unwrap(), vec![2, 3, 4, 7, 8, 9]);
}

#[test]
fn counters_are_shared_with_the_caller() {
    let dir = tempfile::tempdir().unwrap();
    let counters: Arc<IoCounters> = IoCounters::new();
    let mut tape = Tape::open(dir.path().join("tape.bin"), 16, counters.clone()).unwrap();
    tape.load_values(&[5, 4, 3, 2, 1, 6, 7, 8, 9]).unwrap();
    let loaded = counters.snapshot();

    let stats = sort(&mut tape, 2).unwrap();

    let delta = counters.snapshot().since(loaded);
    assert_eq!((stats.reads, stats.writes), (delta.reads, delta.writes));
    assert!(stats.reads > 0 && stats.writes > 0);
}
