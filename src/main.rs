// PCHASE-SWEEP -- CACHE INTERFERENCE STUDIES OVER THE PCHASE BENCHMARK
// ONE VICTIM POINTER-CHASE THREAD, ONE OR MORE AGGRESSORS, SWEPT ACROSS
// ACCESS PATTERNS, PLACEMENTS AND STRIDES
//
// THE BENCHMARK DOES THE MEASURING. THIS DRIVES IT: ONE CONFIG PER MATRIX
// POINT, ONE CHILD AT A TIME, RESULTS FOLDED INTO ONE FILE PER COMBINATION

mod cli;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pchase_sweep::matrix::OutputLayout;
use pchase_sweep::presets;

use cli::run::RunArgs;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "pchase-sweep")]
#[command(about = "PCHASE-SWEEP -- CACHE INTERFERENCE STUDIES OVER PCHASE")]
#[command(version)]
struct Cli {
    // -v DEBUG, -vv TRACE (RUST_LOG WINS WHEN SET)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Victim and aggressor pinned to nodes, pivoted latency/bandwidth per cache-line stride
    Pollution {
        pchase: PathBuf,
        node: u32,
        node1: u32,
        stub: String,

        // ONE FILE PER COMBINATION INSTEAD OF reformat-<STUB>
        #[arg(long)]
        split: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Victim plus 1..3 aggressors on shared or distinct cores, raw capture
    Threads {
        pchase: PathBuf,
        node: u32,
        stub: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Victim and aggressor strides swept together, raw capture
    StridePairs {
        pchase: PathBuf,
        node: u32,
        stub: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Run a study defined in a TOML file
    Study {
        file: PathBuf,
        pchase: PathBuf,
        stub: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Keep only the named columns of a CSV file ("-" for stdin)
    Project {
        csv: PathBuf,
        columns: String,

        // ROW HOLDING THE COLUMN NAMES
        #[arg(long, default_value_t = 0)]
        header_row: usize,

        // DROP UNKNOWN COLUMNS INSTEAD OF FAILING
        #[arg(long)]
        skip_missing: bool,

        // TREAT "# " LINES AS DATA INSTEAD OF RAW CAPTURE HEADERS
        #[arg(long)]
        keep_capture_lines: bool,
    },

    /// Check the benchmark binary and host NUMA setup
    Check {
        #[arg(default_value = "pchase")]
        pchase: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
    })?;

    match cli.command {
        Command::Pollution {
            pchase,
            node,
            node1,
            stub,
            split,
            run,
        } => {
            let mut study = presets::pollution(node, node1);
            if split {
                study.layout = OutputLayout::PerCombination;
            }
            cli::run::run_sweep(study, &pchase, &stub, &run, &SHUTDOWN)?;
        }
        Command::Threads { pchase, node, stub, run } => {
            cli::run::run_sweep(presets::threads(node), &pchase, &stub, &run, &SHUTDOWN)?;
        }
        Command::StridePairs { pchase, node, stub, run } => {
            cli::run::run_sweep(presets::stride_pairs(node), &pchase, &stub, &run, &SHUTDOWN)?;
        }
        Command::Study { file, pchase, stub, run } => {
            let study = cli::run::load_study(&file)?;
            cli::run::run_sweep(study, &pchase, &stub, &run, &SHUTDOWN)?;
        }
        Command::Project {
            csv,
            columns,
            header_row,
            skip_missing,
            keep_capture_lines,
        } => cli::project::run_project(&csv, &columns, header_row, skip_missing, keep_capture_lines)?,
        Command::Check { pchase } => cli::check::run_check(&pchase)?,
    }

    Ok(())
}
