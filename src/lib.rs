// PCHASE-SWEEP LIBRARY
// STUDY MATRIX, CONFIG PROTOCOL, BENCHMARK INVOCATION AND RESULT FOLDING.
// THE BINARY IS A THIN CLAP LAYER OVER THESE MODULES.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod invoke;
pub mod matrix;
pub mod pattern;
pub mod presets;
pub mod project;
pub mod sweep;
pub mod topology;

pub use error::{Result, SweepError};
