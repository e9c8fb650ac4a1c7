//! The tape sort driver.

use std::path::PathBuf;

use anyhow::{bail, Result};
use blockfile::IoCounters;
use tapesort::Tape;

use crate::load;

const DEFAULT_TAPE_FILE: &str = "tape_data.bin";

/// Options for `dbtool sort`.
#[derive(clap::Args)]
pub struct SortOptions {
    /// Sort an existing tape file.
    #[arg(long, conflicts_with_all = ["records", "load_file", "load_keyboard"])]
    pub file: Option<PathBuf>,

    /// Generate N random records as input.
    #[arg(long, conflicts_with_all = ["load_file", "load_keyboard"])]
    pub records: Option<u64>,

    /// Records per page on the tape.
    #[arg(long = "pageSize")]
    pub page_size: usize,

    /// Number of in-memory page buffers (at least 2).
    #[arg(long)]
    pub buffers: usize,

    /// Load input from a comma-separated text file.
    #[arg(long = "load-file", conflicts_with = "load_keyboard")]
    pub load_file: Option<PathBuf>,

    /// Load input from the keyboard: space-separated records, final line
    /// ends with ';'.
    #[arg(long = "load-keyboard")]
    pub load_keyboard: bool,

    /// Show sorting phases and per-pass diagnostics.
    #[arg(long)]
    pub verbose: bool,

    /// Reduce logging to warnings and errors.
    #[arg(long)]
    pub quiet: bool,
}

pub fn run(args: SortOptions) -> Result<()> {
    crate::configure_tracing(args.quiet, args.verbose);

    if args.page_size == 0 {
        bail!("pageSize must be positive");
    }
    if args.buffers < 2 {
        bail!("at least 2 buffers are required");
    }

    let path = args
        .file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TAPE_FILE));
    let mut tape = Tape::open(&path, args.page_size * 4, IoCounters::new())?;

    if let Some(text_path) = &args.load_file {
        let text = std::fs::read_to_string(text_path)?;
        let values = load::parse_values(&text, ',');
        println!("Loaded {} records from {}", values.len(), text_path.display());
        tape.load_values(&values)?;
    } else if args.load_keyboard {
        println!("Enter records separated by spaces (end with ';'):");
        let values = load::read_keyboard(std::io::stdin().lock())?;
        println!("Loaded {} records from keyboard", values.len());
        tape.load_values(&values)?;
    } else if let Some(n) = args.records {
        tape.load_values(&load::random_values(n))?;
        println!("Generated {n} random records");
    } else if args.file.is_some() {
        println!("Sorting existing tape {}", path.display());
    } else {
        tape.load_values(&load::random_values(1000))?;
        println!("No input specified, generated 1000 random records");
    }

    println!("Initial tape:");
    println!("{}", tape.render()?);

    let stats = tapesort::sort(&mut tape, args.buffers)?;

    println!("Sorted tape:");
    println!("{}", tape.render()?);
    println!(
        "Runs: {}  Merge passes: {}  Reads: {}  Writes: {}",
        stats.initial_runs, stats.merge_passes, stats.reads, stats.writes
    );
    Ok(())
}
