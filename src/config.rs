// PCHASE-SWEEP CONFIG EMITTER
// TYPED RUN CONFIG -> LINE PROTOCOL READ BY THE POINTER-CHASE BINARY
//
//   <THREADS>
//   <core> -c <size> -p <size> -m <load|store> <stride> -a random -n map 0:<node> -s <secs> -o csv
//   ...                                              (ONE LINE PER THREAD)
//
// THREAD 0 IS ALWAYS THE VICTIM ON CORE 0. THE BINARY READS pchase.conf FROM
// ITS WORKING DIRECTORY, SO EVERY INVOCATION GETS A PRIVATE DIRECTORY HOLDING
// EXACTLY ONE CONFIG. NO SLOT IS EVER SHARED OR REWRITTEN.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{Result, SweepError};
use crate::matrix::{MatrixPoint, Study};
use crate::pattern::{AccessPattern, ByteSize, Placement};

pub const CONFIG_FILE: &str = "pchase.conf";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OutputFormat {
    Csv,
}

impl OutputFormat {
    pub fn flag(self) -> &'static str {
        match self {
            Self::Csv => "csv",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ThreadEntry {
    pub core: u32,
    pub chain_size: ByteSize,
    pub probe_size: ByteSize,
    pub access: AccessPattern,
    pub stride: u32,
    pub node: u32,
    pub duration_secs: f64,
    pub format: OutputFormat,
}

impl ThreadEntry {
    pub fn render(&self) -> String {
        format!(
            "{} -c {} -p {} -m {} {} -a random -n map 0:{} -s {:.1} -o {}",
            self.core,
            self.chain_size,
            self.probe_size,
            self.access,
            self.stride,
            self.node,
            self.duration_secs,
            self.format.flag(),
        )
    }
}

/// The protocol for one matrix point. The thread count line is derived
/// from `threads`, so it can never disagree with the body.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    pub threads: Vec<ThreadEntry>,
}

impl RunConfig {
    pub fn for_point(study: &Study, point: &MatrixPoint) -> Self {
        let combo = &point.combination;
        let entry = |core, size, access, stride, node| ThreadEntry {
            core,
            chain_size: size,
            probe_size: size,
            access,
            stride,
            node,
            duration_secs: study.duration_secs,
            format: OutputFormat::Csv,
        };

        let mut threads = Vec::with_capacity(combo.placement.thread_count() as usize);
        match combo.placement {
            Placement::Binding(b) => {
                threads.push(entry(
                    0,
                    study.victim_size,
                    combo.access.victim,
                    point.stride.victim_stride(),
                    b.victim.resolve(study.baseline_node),
                ));
                threads.push(entry(
                    1,
                    study.aggressor_size,
                    combo.access.aggressor,
                    point.stride.aggressor,
                    b.aggressor.resolve(study.baseline_node),
                ));
            }
            Placement::Topology(t) => {
                threads.push(entry(
                    0,
                    study.victim_size,
                    combo.access.victim,
                    point.stride.victim_stride(),
                    study.node,
                ));
                for i in 1..t.threads {
                    threads.push(entry(
                        t.aggressor_core(i),
                        study.aggressor_size,
                        combo.access.aggressor,
                        point.stride.aggressor,
                        study.node,
                    ));
                }
            }
        }
        Self { threads }
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.threads.len() + 1);
        lines.push(self.threads.len().to_string());
        lines.extend(self.threads.iter().map(ThreadEntry::render));
        lines.join("\n")
    }
}

/// A private working directory holding one written config. The directory
/// (and the config) is removed when the slot drops.
pub struct ConfigSlot {
    dir: TempDir,
}

impl ConfigSlot {
    /// Empty slot: working directory for invocations that take no config.
    pub fn empty() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("pchase-sweep-")
            .tempdir()
            .map_err(|source| SweepError::ConfigWrite {
                path: std::env::temp_dir(),
                source,
            })?;
        Ok(Self { dir })
    }

    /// Write the rendered config and close the file before returning.
    pub fn write(config: &RunConfig) -> Result<Self> {
        let slot = Self::empty()?;
        let path = slot.config_path();
        let text = config.render();
        let io_err = |source| SweepError::ConfigWrite { path: path.clone(), source };

        let mut file = File::create(&path).map_err(io_err)?;
        file.write_all(text.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        Ok(slot)
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join(CONFIG_FILE)
    }
}
