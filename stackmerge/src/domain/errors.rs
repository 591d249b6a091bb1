//! Structured error types for stackmerge
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! None of these escape the reconciliation core: callers of the admission
//! gate and the metrics monitor only ever see degraded results.

use super::Pid;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Process {0} not found")]
    ProcessNotFound(Pid),

    #[error("Invalid stat format for process {pid}: {reason}")]
    InvalidStat { pid: Pid, reason: String },

    #[error("Boot time not found in {}", .0.display())]
    BootTimeUnavailable(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to launch {}: {error}", .path.display())]
    SpawnFailed { path: PathBuf, error: std::io::Error },

    #[error("Failed to read metrics artifact {}: {error}", .path.display())]
    ArtifactUnreadable { path: PathBuf, error: std::io::Error },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
