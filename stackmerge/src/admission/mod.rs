//! Process admission gate
//!
//! Decides, per observed process, whether it has lived long enough to be
//! worth profiling. Short-lived processes (build scripts, container init,
//! one-shot utilities) mostly produce noise and failed profiler attaches.
//!
//! The age lookup is modelled as an `Option`: `None` means the OS could not
//! tell us (process exited, permission denied). The decision to profile such a
//! process anyway is taken once, in [`should_skip_at`], not in the lookup.

use log::{debug, info};
use std::time::{Duration, SystemTime};

use crate::domain::{Pid, ProcessError};

/// Default minimum process age before it is admitted for profiling
pub const DEFAULT_MIN_DURATION: Duration = Duration::from_secs(10);

/// Source of process identity and creation time.
///
/// Implemented by [`crate::process_lookup::ProcessRecord`] for live processes.
pub trait ProcessInfo {
    fn pid(&self) -> Pid;

    /// Wall-clock time at which the process was created
    ///
    /// # Errors
    /// Returns an error if the process is gone or its metadata is unreadable.
    fn create_time(&self) -> Result<SystemTime, ProcessError>;
}

/// Age of `process` at `now`, or `None` if its creation time is unknown.
///
/// A creation time in the future (clock skew) yields an age of zero.
pub fn process_age(process: &impl ProcessInfo, now: SystemTime) -> Option<Duration> {
    match process.create_time() {
        Ok(created) => Some(now.duration_since(created).unwrap_or(Duration::ZERO)),
        Err(e) => {
            debug!("Cannot determine age of {}: {e}", process.pid());
            None
        }
    }
}

/// Whether `process` is too young to profile at `now`.
///
/// `min_duration` of zero disables skipping. An age exactly equal to
/// `min_duration` is admitted. Unknown age is admitted.
pub fn should_skip_at(process: &impl ProcessInfo, min_duration: Duration, now: SystemTime) -> bool {
    if min_duration.is_zero() {
        return false;
    }
    match process_age(process, now) {
        Some(age) => age < min_duration,
        None => false,
    }
}

/// Whether `process` is too young to profile right now.
pub fn should_skip(process: &impl ProcessInfo, min_duration: Duration) -> bool {
    should_skip_at(process, min_duration, SystemTime::now())
}

/// Admission gate holding the configured minimum process age.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionGate {
    min_duration: Duration,
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DURATION)
    }
}

impl AdmissionGate {
    #[must_use]
    pub fn new(min_duration: Duration) -> Self {
        Self { min_duration }
    }

    #[must_use]
    pub fn from_secs(min_duration_secs: u64) -> Self {
        Self::new(Duration::from_secs(min_duration_secs))
    }

    #[must_use]
    pub fn min_duration(&self) -> Duration {
        self.min_duration
    }

    pub fn should_skip(&self, process: &impl ProcessInfo) -> bool {
        should_skip(process, self.min_duration)
    }

    /// Filter a batch of candidate processes down to those worth profiling.
    ///
    /// All candidates are judged against a single clock read.
    pub fn admit<P: ProcessInfo>(&self, candidates: impl IntoIterator<Item = P>) -> Vec<P> {
        let now = SystemTime::now();
        let mut skipped = 0usize;
        let admitted: Vec<P> = candidates
            .into_iter()
            .filter(|process| {
                let skip = should_skip_at(process, self.min_duration, now);
                if skip {
                    debug!(
                        "Skipping {}: younger than {}s",
                        process.pid(),
                        self.min_duration.as_secs_f64()
                    );
                    skipped += 1;
                }
                !skip
            })
            .collect();

        if skipped > 0 {
            info!("Skipped {skipped} short-lived processes, admitted {}", admitted.len());
        }
        admitted
    }
}
