#![forbid(unused_must_use)]
#![forbid(unsafe_code)]

use clap::Parser;

mod isam_repl;
mod load;
mod sort_cmd;

/// Drivers for the disk engines: the external tape sort and the ISAM
/// key/value store.
#[derive(clap::Parser)]
#[command(name = "dbtool", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Sorts a tape of fixed-width integer records with a bounded number
    /// of in-memory page buffers.
    Sort(sort_cmd::SortOptions),
    /// Opens an ISAM store and reads commands from stdin, one per line.
    Isam(isam_repl::IsamReplOptions),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Sort(args) => sort_cmd::run(args),
        Command::Isam(args) => isam_repl::run(args),
    }
}

/// Logging to stderr; `--quiet` drops to warnings and errors, `--verbose`
/// opens the engines' debug diagnostics.
fn configure_tracing(quiet: bool, verbose: bool) {
    use tracing_subscriber::filter::LevelFilter;

    let max_level = if quiet {
        LevelFilter::WARN
    } else if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
