// PCHASE-SWEEP ERROR TAXONOMY
// EVERY FAILURE ABORTS THE ENCLOSING STUDY. NOTHING HERE IS RECOVERED LOCALLY:
// A ZEROED OR SKIPPED ROW WOULD SHIFT EVERY LATER ROW OFF ITS STRIDE.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SweepError>;

#[derive(Error, Debug)]
pub enum SweepError {
    /// The protocol file could not be written into its slot directory.
    #[error("failed to write config {}: {source}", .path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Binary missing, not a regular file, not executable, or fork/exec failed.
    #[error("failed to spawn {}: {reason}", .binary.display())]
    ProcessSpawn { binary: PathBuf, reason: String },

    #[error("{} exited with {status}{}", .binary.display(), stderr_tail(.stderr))]
    ProcessExit {
        binary: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("{} produced no output", .binary.display())]
    EmptyOutput { binary: PathBuf },

    #[error("{} output ends mid-row ({bytes} bytes read)", .binary.display())]
    TruncatedOutput { binary: PathBuf, bytes: usize },

    #[error("csv parse error: {0}")]
    CsvParse(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("invalid study: {0}")]
    InvalidStudy(String),

    #[error("failed to write {}: {source}", .path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("interrupted")]
    Interrupted,

    /// Wraps any failure with the matrix point that was in flight.
    #[error("at {point}: {source}")]
    AtPoint {
        point: String,
        #[source]
        source: Box<SweepError>,
    },
}

impl SweepError {
    pub fn at_point(self, point: impl Into<String>) -> Self {
        SweepError::AtPoint {
            point: point.into(),
            source: Box::new(self),
        }
    }

    // INNERMOST ERROR, SKIPPING AtPoint WRAPPERS
    pub fn root(&self) -> &SweepError {
        match self {
            SweepError::AtPoint { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<csv::Error> for SweepError {
    fn from(e: csv::Error) -> Self {
        SweepError::CsvParse(e.to_string())
    }
}

fn stderr_tail(stderr: &str) -> String {
    let tail = stderr.trim();
    if tail.is_empty() {
        return String::new();
    }
    let last = tail.lines().last().unwrap_or_default();
    format!(" (stderr: {})", last)
}
