//! The ISAM driver: a line-oriented command loop over stdin.

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use isam::{IsamOptions, IsamStore};
use rand::Rng;

/// Options for `dbtool isam`.
#[derive(clap::Args)]
pub struct IsamReplOptions {
    /// Filename prefix for the store's three files.
    #[arg(long, default_value = "database")]
    pub file: PathBuf,

    /// Fill factor used by reorganization.
    #[arg(long, default_value_t = 0.5)]
    pub alpha: f64,

    /// Overflow-to-capacity ratio that auto-triggers reorganization.
    #[arg(long, default_value_t = 0.2)]
    pub threshold: f64,

    /// Records per primary page.
    #[arg(long, default_value_t = 4)]
    pub blocking: usize,

    /// Print per-command disk transfer counts.
    #[arg(long)]
    pub verbose: bool,

    /// Reduce logging to warnings and errors.
    #[arg(long)]
    pub quiet: bool,
}

pub fn run(args: IsamReplOptions) -> Result<()> {
    crate::configure_tracing(args.quiet, args.verbose);

    let mut store = IsamStore::open(
        &args.file,
        IsamOptions {
            blocking: args.blocking,
            alpha: args.alpha,
            threshold: args.threshold,
        },
    )?;

    let stdin = std::io::stdin();
    let interactive = stdin.is_terminal();
    repl(
        &mut store,
        stdin.lock(),
        std::io::stdout(),
        args.verbose,
        interactive,
    )
}

/// Commands, one per line:
/// `i K D` insert, `r K` read, `u K D` update, `d K` delete, `p` print
/// structure, `b` browse, `x` reorganize, `c` clear, `rnd N` insert N
/// unique random records, `srnd N` search N random keys, `q` quit with a
/// final `STATS` line.
///
/// Usage hints and unknown-command complaints only appear when stdin is a
/// terminal; a piped command file skips over such lines silently.
fn repl(
    store: &mut IsamStore,
    input: impl BufRead,
    mut out: impl Write,
    verbose: bool,
    interactive: bool,
) -> Result<()> {
    for line in input.lines() {
        let line = line?;
        let mut tokens = line.split_whitespace();
        let Some(cmd) = tokens.next() else {
            continue;
        };
        let before = store.counters().snapshot();

        match cmd {
            "q" => {
                let stats = store.stats();
                writeln!(
                    out,
                    "STATS {} {} {} {} {} {} {} {} {}",
                    store.alpha(),
                    store.threshold(),
                    stats.reorganizations,
                    stats.inserts,
                    stats.searches,
                    store.counters().reads(),
                    store.counters().writes(),
                    stats.reorg_reads,
                    stats.reorg_writes,
                )?;
                return Ok(());
            }
            "i" => match (arg(&mut tokens), arg(&mut tokens)) {
                (Some(key), Some(data)) => {
                    if store.insert(key, data)? {
                        writeln!(out, "Inserted.")?;
                    } else {
                        writeln!(out, "Error: Key {key} already exists!")?;
                    }
                }
                _ => {
                    if interactive {
                        writeln!(out, "Usage: i <key> <data>")?;
                    }
                }
            },
            "r" => match arg(&mut tokens) {
                Some(key) => match store.read(key)? {
                    Some(rec) => writeln!(out, "Found: {rec}")?,
                    None => writeln!(out, "Record not found.")?,
                },
                None => {
                    if interactive {
                        writeln!(out, "Usage: r <key>")?;
                    }
                }
            },
            "u" => match (arg(&mut tokens), arg(&mut tokens)) {
                (Some(key), Some(data)) => {
                    if store.update(key, data)? {
                        writeln!(out, "Updated.")?;
                    } else {
                        writeln!(out, "Not found.")?;
                    }
                }
                _ => {
                    if interactive {
                        writeln!(out, "Usage: u <key> <data>")?;
                    }
                }
            },
            "d" => match arg(&mut tokens) {
                Some(key) => {
                    if store.delete(key)? {
                        writeln!(out, "Deleted.")?;
                    } else {
                        writeln!(out, "Not found.")?;
                    }
                }
                None => {
                    if interactive {
                        writeln!(out, "Usage: d <key>")?;
                    }
                }
            },
            "p" => write!(out, "{}", store.render()?)?,
            "b" => {
                for rec in store.browse()? {
                    writeln!(out, "{rec}")?;
                }
            }
            "x" => {
                store.reorganize()?;
                writeln!(out, "Reorganized.")?;
            }
            "c" => {
                store.clear()?;
                writeln!(out, "Database cleared.")?;
            }
            "rnd" => match arg::<usize>(&mut tokens) {
                Some(n) => {
                    insert_random(store, n)?;
                    writeln!(out, "Inserted {n} random records.")?;
                }
                None => {
                    if interactive {
                        writeln!(out, "Usage: rnd <count>")?;
                    }
                }
            },
            "srnd" => match arg::<usize>(&mut tokens) {
                Some(n) => {
                    let found = search_random(store, n)?;
                    writeln!(out, "Found {found} of {n} random keys.")?;
                }
                None => {
                    if interactive {
                        writeln!(out, "Usage: srnd <count>")?;
                    }
                }
            },
            _ => {
                if interactive {
                    writeln!(out, "Unknown command: {cmd}")?;
                }
            }
        }

        if verbose {
            let delta = store.counters().snapshot().since(before);
            writeln!(out, "Disk Ops: R={} W={}", delta.reads, delta.writes)?;
        }
    }
    Ok(())
}

fn arg<'a, T: FromStr>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<T> {
    tokens.next().and_then(|t| t.parse().ok())
}

/// Inserts `n` records with distinct random keys, retrying keys that are
/// already present.
fn insert_random(store: &mut IsamStore, n: usize) -> Result<()> {
    let mut rng = rand::thread_rng();
    let key_range = 1..=(n as u32 * 10).max(10);
    let mut inserted = 0;
    while inserted < n {
        let key = rng.gen_range(key_range.clone());
        let data = rng.gen_range(1..=9999);
        if store.insert(key, data)? {
            inserted += 1;
        }
    }
    Ok(())
}

/// Looks up `n` random keys and returns how many were present.
fn search_random(store: &mut IsamStore, n: usize) -> Result<usize> {
    let mut rng = rand::thread_rng();
    let key_range = 1..=(n as u32 * 10).max(10);
    let mut found = 0;
    for _ in 0..n {
        if store.read(rng.gen_range(key_range.clone()))?.is_some() {
            found += 1;
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run_script_as(script: &str, interactive: bool) -> String {
        let dir = tempfile::tempdir().unwrap();
        let mut store = IsamStore::open(dir.path().join("db"), IsamOptions::default()).unwrap();
        let mut out = Vec::new();
        repl(&mut store, Cursor::new(script), &mut out, false, interactive).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn run_script(script: &str) -> String {
        run_script_as(script, false)
    }

    #[test]
    fn crud_session() {
        let out = run_script("i 10 100\ni 10 200\nr 10\nu 10 111\nr 10\nd 10\nr 10\nq\n");
        assert!(out.contains("Inserted."));
        assert!(out.contains("Error: Key 10 already exists!"));
        assert!(out.contains("Found: K:10 D:100"));
        assert!(out.contains("Updated."));
        assert!(out.contains("Found: K:10 D:111"));
        assert!(out.contains("Deleted."));
        assert!(out.contains("Record not found."));
    }

    #[test]
    fn quit_emits_stats_line() {
        let out = run_script("i 1 1\nr 1\nr 2\nq\n");
        let stats_line = out
            .lines()
            .find(|l| l.starts_with("STATS "))
            .expect("a STATS line");
        let fields: Vec<&str> = stats_line.split_whitespace().collect();
        assert_eq!(fields.len(), 10);
        assert_eq!(fields[1], "0.5", "alpha");
        assert_eq!(fields[2], "0.2", "threshold");
        assert_eq!(fields[4], "1", "inserts");
        assert_eq!(fields[5], "2", "searches");
    }

    #[test]
    fn malformed_and_unknown_lines_do_not_abort() {
        // Interactive sessions complain; a piped command file is skipped
        // over silently but keeps executing what does parse.
        let script = "i\nnope\nr\n\ni 5 50\nb\nq\n";

        let interactive = run_script_as(script, true);
        assert!(interactive.contains("Usage: i <key> <data>"));
        assert!(interactive.contains("Unknown command: nope"));
        assert!(interactive.contains("Usage: r <key>"));
        assert!(interactive.contains("K:5 D:50"));
        assert!(interactive.contains("STATS "));

        let piped = run_script_as(script, false);
        assert!(!piped.contains("Usage:"));
        assert!(!piped.contains("Unknown command"));
        assert!(piped.contains("K:5 D:50"));
        assert!(piped.contains("STATS "));
    }

    #[test]
    fn random_batch_inserts_unique_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = IsamStore::open(dir.path().join("db"), IsamOptions::default()).unwrap();

        insert_random(&mut store, 25).unwrap();

        let records = store.browse().unwrap();
        assert_eq!(records.len(), 25);
        let keys: Vec<u32> = records.iter().map(|r| r.key.get()).collect();
        let mut deduped = keys.clone();
        deduped.dedup();
        assert_eq!(keys, deduped, "browse is sorted and keys are unique");
    }
}
