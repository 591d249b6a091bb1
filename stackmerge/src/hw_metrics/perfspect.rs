//! PerfSpect-backed hardware metrics monitor.
//!
//! The collector is launched as `perfspect metrics --duration <secs> --output <dir>`
//! and writes, per host:
//!
//! ```text
//! <dir>/<host>_metrics.csv               raw counters
//! <dir>/<host>_metrics_summary.csv       header + "name,value,..." rows
//! <dir>/<host>_metrics_summary.html      summary report
//! ```
//!
//! The collector is the only writer and this monitor the only reader. Each
//! artifact is copied to a `_latest` path before it is read and the copy is
//! deleted right after, so a rewrite by the collector can never be observed
//! half-way. Stale artifacts are purged on construction, on every `start()`
//! and on every `stop()`, so results are never attributed to the wrong cycle.

#![allow(unsafe_code)] // gethostname() and kill() require unsafe

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use super::{MetricsMonitor, MonitorConfig};
use crate::domain::MonitorError;

/// Interval between exit checks while waiting for the collector to stop
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Host name used when `gethostname()` fails
const FALLBACK_HOST_NAME: &str = "localhost";

/// Well-known artifact locations for one host.
#[derive(Debug, Clone)]
struct ArtifactPaths {
    output_dir: PathBuf,
    raw_csv: PathBuf,
    summary_csv: PathBuf,
    summary_html: PathBuf,
    latest_csv: PathBuf,
    latest_html: PathBuf,
}

impl ArtifactPaths {
    fn new(output_dir: &Path, host: &str) -> Self {
        let file = |suffix: &str| output_dir.join(format!("{host}_{suffix}"));
        Self {
            output_dir: output_dir.to_path_buf(),
            raw_csv: file("metrics.csv"),
            summary_csv: file("metrics_summary.csv"),
            summary_html: file("metrics_summary.html"),
            latest_csv: file("metrics_summary_latest.csv"),
            latest_html: file("metrics_summary_latest.html"),
        }
    }

    /// Artifacts that must not survive a cycle boundary
    fn stale(&self) -> [&Path; 5] {
        [
            self.raw_csv.as_path(),
            self.summary_csv.as_path(),
            self.summary_html.as_path(),
            self.latest_csv.as_path(),
            self.latest_html.as_path(),
        ]
    }
}

/// Hardware metrics monitor driving an external PerfSpect process.
///
/// Holds at most one collector process. All methods take the same lock, so
/// concurrent lifecycle calls and queries are serialized.
pub struct PerfspectMonitor {
    perfspect_path: PathBuf,
    duration: Duration,
    stop_timeout: Duration,
    paths: ArtifactPaths,
    collector: Mutex<Option<Child>>,
}

impl PerfspectMonitor {
    /// Create a monitor for the collector at `perfspect_path`, naming
    /// artifacts after the local host.
    #[must_use]
    pub fn new(perfspect_path: PathBuf, config: &MonitorConfig) -> Self {
        Self::with_host(perfspect_path, config, &host_name())
    }

    /// Create a monitor whose artifacts are named after `host`.
    ///
    /// Purges stale artifacts left by a previous cycle.
    #[must_use]
    pub fn with_host(perfspect_path: PathBuf, config: &MonitorConfig, host: &str) -> Self {
        let monitor = Self {
            perfspect_path,
            duration: config.duration,
            stop_timeout: config.stop_timeout,
            paths: ArtifactPaths::new(&config.output_dir, host),
            collector: Mutex::new(None),
        };
        monitor.cleanup();
        monitor
    }

    /// Path of the summary counters artifact
    #[must_use]
    pub fn summary_csv_path(&self) -> &Path {
        &self.paths.summary_csv
    }

    /// Path of the summary report artifact
    #[must_use]
    pub fn summary_html_path(&self) -> &Path {
        &self.paths.summary_html
    }

    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.collector.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recreate the output directory if missing, otherwise remove stale artifacts.
    fn cleanup(&self) {
        if !self.paths.output_dir.exists() {
            if let Err(e) = fs::create_dir_all(&self.paths.output_dir) {
                warn!("Failed to create {}: {e}", self.paths.output_dir.display());
            }
            return;
        }
        for path in self.paths.stale() {
            match fs::remove_file(path) {
                Ok(()) => debug!("Removed stale {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {e}", path.display()),
            }
        }
    }

    fn spawn(&self) -> Result<Child, MonitorError> {
        Command::new(&self.perfspect_path)
            .arg("metrics")
            .arg("--duration")
            .arg(self.duration.as_secs().to_string())
            .arg("--output")
            .arg(&self.paths.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|error| MonitorError::SpawnFailed { path: self.perfspect_path.clone(), error })
    }

    /// Copy `source` to `latest`, read the copy with `read`, then delete the copy.
    fn read_snapshot<T>(
        source: &Path,
        latest: &Path,
        read: impl FnOnce(&Path) -> Result<T, MonitorError>,
    ) -> Option<T> {
        if !source.is_file() {
            return None;
        }
        if let Err(error) = fs::copy(source, latest) {
            // The collector may have removed or replaced it since the check
            debug!("{}", MonitorError::ArtifactUnreadable { path: source.to_path_buf(), error });
            return None;
        }
        let result = read(latest);
        if let Err(e) = fs::remove_file(latest) {
            warn!("Failed to remove {}: {e}", latest.display());
        }
        result.map_err(|e| warn!("Discarding metrics artifact: {e}")).ok()
    }
}

impl MetricsMonitor for PerfspectMonitor {
    fn start(&self) {
        let mut collector = self.lock();

        if !is_executable(&self.perfspect_path) {
            debug!(
                "Collector {} missing or not executable, hardware metrics disabled",
                self.perfspect_path.display()
            );
            return;
        }

        if let Some(child) = collector.as_mut() {
            match child.try_wait() {
                Ok(None) => {
                    debug!("Collector (pid {}) still running, not restarting", child.id());
                    return;
                }
                Ok(Some(status)) => debug!("Previous collector exited with {status}"),
                Err(e) => {
                    warn!("Failed to poll previous collector: {e}");
                    kill_and_reap(child);
                }
            }
            *collector = None;
        }

        self.cleanup();
        match self.spawn() {
            Ok(child) => {
                info!(
                    "Started hardware metrics collector (pid {}) for {}s",
                    child.id(),
                    self.duration.as_secs()
                );
                *collector = Some(child);
            }
            Err(e) => warn!("{e}"),
        }
    }

    fn stop(&self) {
        let mut collector = self.lock();
        if let Some(mut child) = collector.take() {
            terminate(&mut child, self.stop_timeout);
        }
        self.cleanup();
    }

    fn is_running(&self) -> bool {
        self.lock().as_mut().is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    fn metrics_data(&self) -> Option<HashMap<String, String>> {
        let _guard = self.lock();
        Self::read_snapshot(&self.paths.summary_csv, &self.paths.latest_csv, read_summary_csv)
    }

    fn metrics_html(&self) -> Option<String> {
        let _guard = self.lock();
        Self::read_snapshot(&self.paths.summary_html, &self.paths.latest_html, |path| {
            let html = fs::read(path)
                .map_err(|error| MonitorError::ArtifactUnreadable { path: path.to_path_buf(), error })?;
            Ok(encode_report(&html)?)
        })
    }
}

impl Drop for PerfspectMonitor {
    fn drop(&mut self) {
        let collector = self.collector.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut child) = collector.take() {
            terminate(&mut child, self.stop_timeout);
        }
    }
}

/// Parse the summary counters CSV: the header row is skipped, every following
/// row contributes `name → value`, later duplicates overwriting earlier ones.
fn read_summary_csv(path: &Path) -> Result<HashMap<String, String>, MonitorError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut metrics = HashMap::new();
    for record in reader.records() {
        let record = record?;
        if let (Some(name), Some(value)) = (record.get(0), record.get(1)) {
            metrics.insert(name.to_string(), value.to_string());
        }
    }
    Ok(metrics)
}

/// Gzip-compress `report` and encode it as standard base64.
///
/// # Errors
/// Returns an error if compression fails.
pub fn encode_report(report: &[u8]) -> io::Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(report)?;
    let compressed = encoder.finish()?;
    Ok(BASE64.encode(compressed))
}

/// Ask `child` to exit with SIGTERM, waiting at most `timeout` before SIGKILL.
fn terminate(child: &mut Child, timeout: Duration) {
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!("Collector already exited with {status}");
            return;
        }
        Ok(None) => {}
        Err(e) => {
            warn!("Failed to poll collector: {e}");
            kill_and_reap(child);
            return;
        }
    }

    if let Ok(pid) = libc::pid_t::try_from(child.id()) {
        // ESRCH here just means it exited since the poll above
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
    }

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(Some(status)) = child.try_wait() {
            debug!("Collector exited with {status}");
            return;
        }
        thread::sleep(STOP_POLL_INTERVAL);
    }

    warn!("Collector did not exit within {}ms, killing", timeout.as_millis());
    kill_and_reap(child);
}

/// SIGKILL `child` and wait for it so it never lingers as a zombie.
fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("Failed to kill collector: {e}");
    }
    match child.wait() {
        Ok(status) => debug!("Collector exited with {status}"),
        Err(e) => warn!("Failed to reap collector (pid {}): {e}", child.id()),
    }
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

/// Local host name, as used by the collector to name its artifacts
fn host_name() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return FALLBACK_HOST_NAME.to_string();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    match String::from_utf8_lossy(&buf[..len]).into_owned() {
        name if name.is_empty() => FALLBACK_HOST_NAME.to_string(),
        name => name,
    }
}
