// PCHASE-SWEEP BENCHMARK INVOKER
// ONE CHILD AT A TIME: WRITE CONFIG -> SPAWN -> DRAIN STDOUT -> REAP -> DROP SLOT
//
// THE CHILD RUNS IN ITS OWN PROCESS GROUP INSIDE THE CONFIG SLOT DIRECTORY.
// ChildGuard KILLS AND REAPS THE GROUP ON EVERY EARLY RETURN, SO A FAILED
// READ NEVER LEAVES A BENCHMARK RUNNING BEHIND THE NEXT MATRIX POINT.

use std::env;
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use tracing::debug;

use crate::config::{ConfigSlot, RunConfig};
use crate::error::{Result, SweepError};

const STDERR_FILE: &str = "stderr.log";
pub const HEADER_ARGS: [&str; 2] = ["-o", "hdr"];

/// Raw stdout of one invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunResult {
    text: String,
}

impl RunResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// The sweep driver only talks to the benchmark through this.
pub trait Invoke {
    /// Column header invocation (`-o hdr`), no config.
    fn header(&mut self) -> Result<RunResult>;

    /// One measurement with `config` in the working directory.
    fn run(&mut self, config: &RunConfig) -> Result<RunResult>;
}

struct ChildGuard {
    child: Option<Child>,
    pgid: i32,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        let pgid = child.id() as i32;
        Self {
            child: Some(child),
            pgid,
        }
    }

    fn take_stdout(&mut self) -> Option<std::process::ChildStdout> {
        self.child.as_mut().and_then(|c| c.stdout.take())
    }

    // ON ERROR THE CHILD STAYS IN THE GUARD AND Drop KILLS IT
    fn wait(&mut self) -> std::io::Result<ExitStatus> {
        let status = match self.child.as_mut() {
            Some(c) => c.wait()?,
            None => return Err(std::io::Error::other("child already reaped")),
        };
        self.child = None;
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let child = match self.child.as_mut() {
            Some(c) => c,
            None => return,
        };
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        unsafe {
            libc::killpg(self.pgid, libc::SIGKILL);
        }
        let _ = child.wait();
    }
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

// BARE NAMES ARE LOOKED UP ON PATH LIKE execvp. ANYTHING ELSE IS CANONICALIZED
// BECAUSE THE CHILD RUNS FROM THE SLOT DIRECTORY, NOT OURS.
pub fn resolve_binary(binary: &Path) -> Result<PathBuf> {
    let spawn_err = |reason: &str| SweepError::ProcessSpawn {
        binary: binary.to_path_buf(),
        reason: reason.to_string(),
    };

    let bare = binary.components().count() == 1 && !binary.to_string_lossy().contains('/');
    let resolved = if bare {
        env::var_os("PATH")
            .and_then(|paths| {
                env::split_paths(&paths)
                    .map(|dir| dir.join(binary))
                    .find(|p| is_executable(p))
            })
            .ok_or_else(|| spawn_err("not found on PATH"))?
    } else {
        fs::canonicalize(binary).map_err(|e| spawn_err(&e.to_string()))?
    };

    if !resolved.is_file() {
        return Err(spawn_err("not a regular file"));
    }
    if !is_executable(&resolved) {
        return Err(spawn_err("not executable"));
    }
    Ok(resolved)
}

fn describe_status(status: ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(sig)) => format!("signal {}", sig),
        (None, None) => "unknown status".to_string(),
    }
}

pub struct BenchmarkInvoker {
    binary: PathBuf,
    invocations: usize,
}

impl BenchmarkInvoker {
    /// Resolves and checks the binary up front so a bad path fails before
    /// any output file exists.
    pub fn new(binary: impl AsRef<Path>) -> Result<Self> {
        let binary = resolve_binary(binary.as_ref())?;
        Ok(Self {
            binary,
            invocations: 0,
        })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn invocations(&self) -> usize {
        self.invocations
    }

    fn invoke(&mut self, slot: &ConfigSlot, args: &[&str]) -> Result<RunResult> {
        let binary = self.binary.clone();
        let spawn_err = |reason: String| SweepError::ProcessSpawn {
            binary: binary.clone(),
            reason,
        };

        let stderr_path = slot.dir().join(STDERR_FILE);
        let stderr_file = File::create(&stderr_path).map_err(|source| SweepError::ConfigWrite {
            path: stderr_path.clone(),
            source,
        })?;

        debug!(binary = %binary.display(), dir = %slot.dir().display(), ?args, "spawning");
        let child = unsafe {
            Command::new(&binary)
                .args(args)
                .current_dir(slot.dir())
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::from(stderr_file))
                .process_group(0)
                .pre_exec(|| {
                    libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM as libc::c_ulong);
                    Ok(())
                })
                .spawn()
                .map_err(|e| spawn_err(e.to_string()))?
        };
        self.invocations += 1;
        let mut guard = ChildGuard::new(child);

        // BLOCK UNTIL THE CHILD CLOSES STDOUT, THEN REAP IT
        let mut raw = Vec::new();
        if let Some(mut stdout) = guard.take_stdout() {
            stdout
                .read_to_end(&mut raw)
                .map_err(|e| spawn_err(format!("reading stdout: {}", e)))?;
        }
        let status = guard
            .wait()
            .map_err(|e| spawn_err(format!("waiting for exit: {}", e)))?;

        let text = String::from_utf8_lossy(&raw).into_owned();
        debug!(bytes = raw.len(), status = %describe_status(status), "drained");

        if !status.success() {
            let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(SweepError::ProcessExit {
                binary,
                status: describe_status(status),
                stderr,
            });
        }
        if text.trim().is_empty() {
            return Err(SweepError::EmptyOutput { binary });
        }
        // EVERY ROW THE TOOL PRINTS IS NEWLINE-TERMINATED AND FLUSHED
        if !text.ends_with('\n') {
            return Err(SweepError::TruncatedOutput {
                binary,
                bytes: raw.len(),
            });
        }
        Ok(RunResult::new(text))
    }
}

impl Invoke for BenchmarkInvoker {
    fn header(&mut self) -> Result<RunResult> {
        let slot = ConfigSlot::empty()?;
        self.invoke(&slot, &HEADER_ARGS)
    }

    fn run(&mut self, config: &RunConfig) -> Result<RunResult> {
        // SLOT OUTLIVES THE CHILD: DROPPED ONLY AFTER invoke() HAS REAPED IT
        let slot = ConfigSlot::write(config)?;
        debug!(config = %config.render(), "config written");
        self.invoke(&slot, &[])
    }
}
