use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};

use pchase_sweep::project::{parse_columns, project, MissingColumn, ProjectOptions};

// "-" READS STDIN
pub fn run_project(
    csv: &Path,
    columns: &str,
    header_row: usize,
    skip_missing: bool,
    keep_capture_lines: bool,
) -> Result<()> {
    let wanted = parse_columns(columns);
    if wanted.is_empty() {
        anyhow::bail!("no columns requested");
    }
    let opts = ProjectOptions {
        header_row,
        missing: if skip_missing {
            MissingColumn::Skip
        } else {
            MissingColumn::Error
        },
        keep_capture_lines,
    };

    let input: Box<dyn Read> = if csv == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        Box::new(File::open(csv).with_context(|| format!("opening {}", csv.display()))?)
    };

    let stdout = io::stdout();
    project(input, stdout.lock(), &wanted, &opts)
        .with_context(|| format!("projecting {}", csv.display()))?;
    Ok(())
}
