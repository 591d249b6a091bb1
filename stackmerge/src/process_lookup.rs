//! OS process table access via `/proc`.
//!
//! Process metadata is re-read on every query: a [`ProcessRecord`] is only a
//! pid plus the procfs root it lives under, never a cached snapshot, so a
//! process that exits between enumeration and query surfaces as an error
//! from that one query rather than as stale data.

#![allow(unsafe_code)] // sysconf() requires unsafe

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::admission::ProcessInfo;
use crate::domain::{Pid, ProcessError};

/// Default procfs mount point
pub const PROC_ROOT: &str = "/proc";

/// Clock tick rate assumed when `sysconf(_SC_CLK_TCK)` fails
const DEFAULT_CLOCK_TICKS: u64 = 100;

/// Index of `starttime` among the fields following `comm` in `/proc/<pid>/stat`.
///
/// `starttime` is field 22 of the full line; field 3 (`state`) is the first
/// field after the closing parenthesis of `comm`.
const STARTTIME_FIELD_AFTER_COMM: usize = 22 - 3;

/// An observed process, identified by pid.
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pid: Pid,
    proc_root: PathBuf,
}

impl ProcessRecord {
    /// Create a record for `pid` under the system `/proc`
    #[must_use]
    pub fn new(pid: Pid) -> Self {
        Self::with_proc_root(pid, PROC_ROOT)
    }

    /// Create a record for `pid` under an alternative procfs root
    #[must_use]
    pub fn with_proc_root(pid: Pid, proc_root: impl Into<PathBuf>) -> Self {
        Self { pid, proc_root: proc_root.into() }
    }

    /// Command name from `/proc/<pid>/stat`
    ///
    /// # Errors
    /// Returns an error if the process is gone or its stat line is malformed.
    pub fn command(&self) -> Result<String, ProcessError> {
        let stat = self.read_stat()?;
        extract_comm(&stat)
            .map(str::to_string)
            .ok_or_else(|| ProcessError::InvalidStat { pid: self.pid, reason: "missing comm".into() })
    }

    fn read_stat(&self) -> Result<String, ProcessError> {
        let stat_path = self.proc_root.join(self.pid.0.to_string()).join("stat");
        fs::read_to_string(&stat_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ProcessError::ProcessNotFound(self.pid),
            _ => ProcessError::Io(e),
        })
    }
}

impl ProcessInfo for ProcessRecord {
    fn pid(&self) -> Pid {
        self.pid
    }

    fn create_time(&self) -> Result<SystemTime, ProcessError> {
        let stat = self.read_stat()?;
        let start_ticks = parse_start_ticks(&stat).ok_or_else(|| ProcessError::InvalidStat {
            pid: self.pid,
            reason: "missing starttime".into(),
        })?;
        let boot = boot_time(&self.proc_root)?;
        Ok(boot + ticks_to_duration(start_ticks, clock_ticks_per_second()))
    }
}

/// List every process currently visible under the system `/proc`.
///
/// # Errors
/// Returns an error only if `/proc` itself cannot be read.
pub fn list_processes() -> Result<Vec<ProcessRecord>, ProcessError> {
    list_processes_in(Path::new(PROC_ROOT))
}

/// List every process visible under `proc_root`.
///
/// Entries that are not numeric, or that vanish while iterating, are skipped.
///
/// # Errors
/// Returns an error only if `proc_root` itself cannot be read.
pub fn list_processes_in(proc_root: &Path) -> Result<Vec<ProcessRecord>, ProcessError> {
    let mut records: Vec<ProcessRecord> = fs::read_dir(proc_root)?
        .flatten()
        .filter_map(|entry| entry.file_name().to_string_lossy().parse::<u32>().ok())
        .map(|pid| ProcessRecord::with_proc_root(Pid(pid), proc_root))
        .collect();
    records.sort_unstable_by_key(|r| r.pid);
    Ok(records)
}

/// System boot time from the `btime` line of `<proc_root>/stat`.
fn boot_time(proc_root: &Path) -> Result<SystemTime, ProcessError> {
    let stat_path = proc_root.join("stat");
    let content = fs::read_to_string(&stat_path)?;
    content
        .lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|secs| secs.trim().parse::<u64>().ok())
        .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
        .ok_or(ProcessError::BootTimeUnavailable(stat_path))
}

/// Extract command name from `/proc/<pid>/stat`.
/// Format: "pid (comm) state ..."
fn extract_comm(stat_line: &str) -> Option<&str> {
    let open = stat_line.find('(')?;
    let close = stat_line.rfind(')')?;
    if open >= close {
        return None;
    }
    Some(&stat_line[open + 1..close])
}

/// Extract `starttime` (clock ticks since boot) from `/proc/<pid>/stat`.
fn parse_start_ticks(stat_line: &str) -> Option<u64> {
    // comm may contain spaces and parentheses, so split after the last ')'
    let close = stat_line.rfind(')')?;
    stat_line[close + 1..].split_whitespace().nth(STARTTIME_FIELD_AFTER_COMM)?.parse().ok()
}

#[allow(clippy::cast_sign_loss)]
fn clock_ticks_per_second() -> u64 {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as u64
    } else {
        DEFAULT_CLOCK_TICKS
    }
}

#[allow(clippy::cast_precision_loss)]
fn ticks_to_duration(ticks: u64, ticks_per_second: u64) -> Duration {
    Duration::from_secs_f64(ticks as f64 / ticks_per_second.max(1) as f64)
}
