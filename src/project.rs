// PCHASE-SWEEP COLUMN PROJECTOR
// KEEP ONLY THE NAMED COLUMNS, IN THE REQUESTED ORDER, FOR EVERY ROW.
// RUNS ON ANY CSV. LINES STARTING "# " (RAW CAPTURE HEADERS AND RUN MARKERS)
// ARE DROPPED UNLESS keep_capture_lines IS SET; ANY OTHER '#' IS PLAIN DATA.

use std::io::{Read, Write};

use tracing::warn;

use crate::aggregate::CAPTURE_PREFIX;
use crate::error::{Result, SweepError};

/// What to do with a requested column the header doesn't have.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum MissingColumn {
    #[default]
    Error,
    Skip,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProjectOptions {
    // ROW (AFTER COMMENTS) CARRYING THE COLUMN NAMES; EARLIER ROWS ARE DROPPED
    pub header_row: usize,
    pub missing: MissingColumn,
    pub keep_capture_lines: bool,
}

// CAPTURE LINES BECOME EMPTY LINES: THE CSV READER SKIPS THEM AND LINE
// NUMBERS IN ERRORS STILL MATCH THE INPUT
fn blank_capture_lines(text: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| {
            if line.starts_with(CAPTURE_PREFIX) {
                "\n"
            } else {
                line
            }
        })
        .collect()
}

pub fn parse_columns(list: &str) -> Vec<String> {
    list.split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Project `input` onto `wanted`. Returns the number of rows written,
/// header included.
pub fn project<R: Read, W: Write>(
    mut input: R,
    output: W,
    wanted: &[String],
    opts: &ProjectOptions,
) -> Result<usize> {
    let mut text = String::new();
    input
        .read_to_string(&mut text)
        .map_err(|e| SweepError::CsvParse(format!("reading input: {}", e)))?;
    if !opts.keep_capture_lines {
        text = blank_capture_lines(&text);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut writer = csv::WriterBuilder::new().from_writer(output);

    let mut records = reader.records();
    let mut header = None;
    for _ in 0..=opts.header_row {
        header = records.next().transpose()?;
    }
    let header = header.ok_or_else(|| {
        SweepError::CsvParse(format!("no header at row {}", opts.header_row))
    })?;

    let mut indices = Vec::with_capacity(wanted.len());
    for name in wanted {
        match header.iter().position(|h| h.trim() == name.trim()) {
            Some(i) => indices.push(i),
            None => match opts.missing {
                MissingColumn::Error => return Err(SweepError::ColumnNotFound(name.clone())),
                MissingColumn::Skip => warn!(column = %name, "column not in header, skipped"),
            },
        }
    }
    if indices.is_empty() {
        return Ok(0);
    }

    let select = |record: &csv::StringRecord| -> Result<Vec<String>> {
        indices
            .iter()
            .map(|&i| {
                record.get(i).map(str::to_string).ok_or_else(|| {
                    let line = record.position().map(|p| p.line()).unwrap_or(0);
                    SweepError::CsvParse(format!(
                        "line {} has {} fields, header has {}",
                        line,
                        record.len(),
                        header.len()
                    ))
                })
            })
            .collect()
    };

    writer.write_record(select(&header)?)?;
    let mut written = 1;
    for record in records {
        let record = record?;
        writer.write_record(select(&record)?)?;
        written += 1;
    }
    writer
        .flush()
        .map_err(|e| SweepError::CsvParse(format!("flushing output: {}", e)))?;
    Ok(written)
}

pub fn project_str(input: &str, wanted: &[&str], opts: &ProjectOptions) -> Result<String> {
    let wanted: Vec<String> = wanted.iter().map(|s| s.to_string()).collect();
    let mut out = Vec::new();
    project(input.as_bytes(), &mut out, &wanted, opts)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
