// PCHASE-SWEEP DRIVER
// ENUMERATE -> EMIT -> INVOKE -> AGGREGATE -> WRITE, ONE COMBINATION AT A TIME
//
// A COMBINATION'S ARTIFACT IS WRITTEN ONLY AFTER ITS LAST STRIDE HAS RUN, SO A
// FAILURE OR CTRL+C MID-SWEEP NEVER LEAVES A HALF-FILLED TABLE ON DISK.
// FINISHED COMBINATIONS STAY WRITTEN.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::aggregate::Aggregator;
use crate::config::RunConfig;
use crate::error::{Result, SweepError};
use crate::invoke::Invoke;
use crate::matrix::{OutputLayout, Study};

#[derive(Clone, Debug)]
pub struct SweepOptions {
    pub out_dir: PathBuf,
    pub stub: String,
}

#[derive(Clone, Debug, Default)]
pub struct SweepSummary {
    pub invocations: usize,
    pub combinations: usize,
    pub artifacts: Vec<PathBuf>,
    pub elapsed: Duration,
}

fn write_err(path: &Path) -> impl Fn(std::io::Error) -> SweepError + '_ {
    move |source| SweepError::OutputWrite {
        path: path.to_path_buf(),
        source,
    }
}

// FIRST COMBINATION TRUNCATES, LATER ONES APPEND AFTER A BLANK LINE
fn append_combined(path: &Path, text: &str, first: bool) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(!first)
        .truncate(first)
        .open(path)
        .map_err(write_err(path))?;
    if !first {
        file.write_all(b"\n").map_err(write_err(path))?;
    }
    file.write_all(text.as_bytes()).map_err(write_err(path))
}

fn check_shutdown(shutdown: &AtomicBool, at: impl Into<String>) -> Result<()> {
    if shutdown.load(Ordering::Relaxed) {
        return Err(SweepError::Interrupted.at_point(at));
    }
    Ok(())
}

/// Run every matrix point of `study` through `invoker`, writing one artifact
/// per combination (or one shared file for the combined layout).
pub fn run_study<I: Invoke>(
    study: &Study,
    invoker: &mut I,
    opts: &SweepOptions,
    shutdown: &AtomicBool,
) -> Result<SweepSummary> {
    study.validate()?;
    let started = Instant::now();
    let total = study.invocation_count();
    info!(
        study = %study.name,
        invocations = total,
        est_secs = (total as f64 * study.duration_secs) as u64,
        "sweep starting"
    );

    let mut summary = SweepSummary::default();
    let combined_path = opts.out_dir.join(Study::combined_name(&opts.stub));

    for combo in study.combinations() {
        let mut agg = Aggregator::new(study, &combo);

        if study.header {
            let at = format!("{} header", combo);
            check_shutdown(shutdown, at.clone())?;
            let columns = invoker.header().map_err(|e| e.at_point(at))?;
            summary.invocations += 1;
            agg.set_columns(columns);
        }

        for point in study.points_for(combo.clone()) {
            check_shutdown(shutdown, point.to_string())?;
            let config = RunConfig::for_point(study, &point);
            info!(
                "[{}/{}] {} ({} threads)",
                summary.invocations + 1,
                total,
                point,
                config.thread_count()
            );
            let result = invoker
                .run(&config)
                .map_err(|e| e.at_point(point.to_string()))?;
            summary.invocations += 1;
            agg.push(&point, result)
                .map_err(|e| e.at_point(point.to_string()))?;
        }

        let text = agg.finish();
        let path = match study.layout {
            OutputLayout::PerCombination => {
                let path = opts.out_dir.join(combo.artifact_name(&opts.stub));
                fs::write(&path, text).map_err(write_err(&path)).map(|_| path)
            }
            OutputLayout::Combined => {
                append_combined(&combined_path, &text, summary.combinations == 0)
                    .map(|_| combined_path.clone())
            }
        }
        .map_err(|e| e.at_point(combo.to_string()))?;
        debug!(combination = %combo, path = %path.display(), "artifact flushed");
        if !summary.artifacts.contains(&path) {
            summary.artifacts.push(path);
        }
        summary.combinations += 1;
    }

    summary.elapsed = started.elapsed();
    info!(
        study = %study.name,
        invocations = summary.invocations,
        elapsed_secs = summary.elapsed.as_secs(),
        "sweep finished"
    );
    Ok(summary)
}
