use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::Args;

use pchase_sweep::invoke::BenchmarkInvoker;
use pchase_sweep::matrix::{AggregateMode, OutputLayout, Study};
use pchase_sweep::pattern::parse_sweep;
use pchase_sweep::sweep::{run_study, SweepOptions};
use pchase_sweep::topology::HostTopology;
use pchase_sweep::SweepError;

// OVERRIDES SHARED BY EVERY STUDY SUBCOMMAND
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    // DIRECTORY FOR RESULT FILES (CREATED IF MISSING)
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    // SECONDS PER BENCHMARK RUN (OVERRIDES THE STUDY)
    #[arg(long)]
    pub duration: Option<f64>,

    // STRIDE SWEEP, E.G. "1,2,4" OR "64:64,64:1" (OVERRIDES THE STUDY)
    #[arg(long)]
    pub strides: Option<String>,
}

impl RunArgs {
    pub fn apply(&self, study: &mut Study) -> Result<()> {
        if let Some(secs) = self.duration {
            study.duration_secs = secs;
        }
        if let Some(list) = &self.strides {
            study.strides = parse_sweep(list).with_context(|| format!("--strides '{}'", list))?;
        }
        Ok(())
    }
}

pub fn load_study(path: &Path) -> Result<Study> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading study file {}", path.display()))?;
    Study::from_toml(&text).with_context(|| format!("parsing study file {}", path.display()))
}

fn print_banner(study: &Study, invoker: &BenchmarkInvoker, args: &RunArgs) {
    let total = study.invocation_count();
    let strides: Vec<String> = study.strides.iter().map(|s| s.to_string()).collect();
    let mode = match study.mode {
        AggregateMode::Pivot => "PIVOT",
        AggregateMode::Raw if study.header => "RAW (WITH HEADER)",
        AggregateMode::Raw => "RAW",
    };
    let layout = match study.layout {
        OutputLayout::PerCombination => "ONE FILE PER COMBINATION",
        OutputLayout::Combined => "COMBINED",
    };

    println!("PCHASE-SWEEP v{}", env!("CARGO_PKG_VERSION"));
    println!("STUDY:           {}", study.name);
    println!("BENCHMARK:       {}", invoker.binary().display());
    println!(
        "COMBINATIONS:    {} ({} access x {} placements)",
        study.access.len() * study.placements.len(),
        study.access.len(),
        study.placements.len()
    );
    println!("STRIDES:         {}", strides.join(","));
    println!(
        "INVOCATIONS:     {} (~{} s at {:.1} s each)",
        total,
        (total as f64 * study.duration_secs).ceil() as u64,
        study.duration_secs
    );
    println!("AGGREGATION:     {}", mode);
    println!("OUTPUT:          {} ({})", args.out_dir.display(), layout);
    println!();
}

pub fn run_sweep(
    mut study: Study,
    pchase: &Path,
    stub: &str,
    args: &RunArgs,
    shutdown: &AtomicBool,
) -> Result<()> {
    args.apply(&mut study)?;
    study.validate()?;

    // BAD BINARY FAILS HERE, BEFORE ANY OUTPUT EXISTS
    let mut invoker = BenchmarkInvoker::new(pchase)?;
    HostTopology::detect().preflight(&study);

    print_banner(&study, &invoker, args);

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating output directory {}", args.out_dir.display()))?;

    let opts = SweepOptions {
        out_dir: args.out_dir.clone(),
        stub: stub.to_string(),
    };

    println!("PCHASE-SWEEP IS RUNNING (CTRL+C TO ABORT)");
    let summary = match run_study(&study, &mut invoker, &opts, shutdown) {
        Ok(summary) => summary,
        Err(e) => {
            if matches!(e.root(), SweepError::Interrupted) {
                println!("PCHASE-SWEEP INTERRUPTED ({} INVOCATIONS RUN)", invoker.invocations());
            }
            return Err(e.into());
        }
    };

    println!();
    println!("{}", "=".repeat(60));
    println!("SWEEP COMPLETE: {}", study.name);
    println!("{}", "=".repeat(60));
    for path in &summary.artifacts {
        println!("  {}", path.display());
    }
    println!("COMBINATIONS:    {}", summary.combinations);
    println!("INVOCATIONS:     {}", summary.invocations);
    println!("ELAPSED:         {:.1} s", summary.elapsed.as_secs_f64());
    Ok(())
}
