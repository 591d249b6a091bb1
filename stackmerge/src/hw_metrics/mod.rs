//! Hardware metrics side channel
//!
//! Collects hardware performance counters through an external collector
//! (Intel PerfSpect) running as a background process next to the samplers.
//! Nothing here can fail a profiling round: a missing collector, a collector
//! that never produced output, or an unreadable artifact all degrade to
//! "no metrics" in the returned [`HwMetrics`].
//!
//! Two variants share the [`MetricsMonitor`] contract:
//! - [`PerfspectMonitor`]: drives the external collector
//! - [`NoopMonitor`]: hardware metrics disabled, answers "no data"
//!
//! [`monitor_from_config`] picks one at construction time.

pub mod perfspect;

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

pub use perfspect::{encode_report, PerfspectMonitor};

/// Default directory the collector writes its artifacts into
pub const DEFAULT_OUTPUT_DIR: &str = "/tmp/perfspect_data";

/// Default measurement duration handed to the collector
pub const DEFAULT_DURATION: Duration = Duration::from_secs(60);

/// Default interval between artifact checks in [`wait_for_hw_metrics`]
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on how long `stop()` waits for the collector to exit
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Hardware metrics for one collection cycle.
///
/// A `None` field means the collector did not produce that artifact this
/// cycle, not that something failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwMetrics {
    /// Summary counters, metric name → value
    pub metrics_data: Option<HashMap<String, String>>,

    /// Gzip-compressed, base64-encoded HTML summary report
    pub metrics_html: Option<String>,
}

impl HwMetrics {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics_data.is_none() && self.metrics_html.is_none()
    }
}

/// Hardware metrics monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Path to the collector executable; `None` disables hardware metrics
    pub perfspect_path: Option<PathBuf>,
    pub duration: Duration,
    pub output_dir: PathBuf,
    pub polling_interval: Duration,
    pub stop_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            perfspect_path: None,
            duration: DEFAULT_DURATION,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            polling_interval: DEFAULT_POLLING_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Lifecycle and query contract shared by the active and disabled monitors.
///
/// Lifecycle calls never fail; implementations log and degrade instead.
pub trait MetricsMonitor: Send + Sync {
    /// Launch a collection cycle (no-op if collection is unavailable)
    fn start(&self);

    /// End the current cycle and purge its artifacts. Safe to call at any time.
    fn stop(&self);

    /// Whether a collection cycle is currently live
    fn is_running(&self) -> bool;

    /// Summary counters produced so far in this cycle
    fn metrics_data(&self) -> Option<HashMap<String, String>>;

    /// Encoded HTML summary report produced so far in this cycle
    fn metrics_html(&self) -> Option<String>;

    fn get_hw_metrics(&self) -> HwMetrics {
        HwMetrics { metrics_data: self.metrics_data(), metrics_html: self.metrics_html() }
    }
}

/// Monitor used when hardware metrics collection is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl MetricsMonitor for NoopMonitor {
    fn start(&self) {}

    fn stop(&self) {}

    fn is_running(&self) -> bool {
        false
    }

    fn metrics_data(&self) -> Option<HashMap<String, String>> {
        None
    }

    fn metrics_html(&self) -> Option<String> {
        None
    }
}

/// Build the monitor variant matching `config`.
#[must_use]
pub fn monitor_from_config(config: &MonitorConfig) -> Box<dyn MetricsMonitor> {
    match &config.perfspect_path {
        Some(path) => Box::new(PerfspectMonitor::new(path.clone(), config)),
        None => {
            debug!("No collector configured, hardware metrics disabled");
            Box::new(NoopMonitor)
        }
    }
}

/// Poll `monitor` until summary counters appear or `timeout` elapses.
///
/// Returns immediately once the monitor is no longer running, since no
/// further artifacts can appear.
pub fn wait_for_hw_metrics(
    monitor: &dyn MetricsMonitor,
    timeout: Duration,
    poll_interval: Duration,
) -> HwMetrics {
    let deadline = Instant::now() + timeout;
    loop {
        let running = monitor.is_running();
        let metrics = monitor.get_hw_metrics();
        let now = Instant::now();
        if metrics.metrics_data.is_some() || !running || now >= deadline {
            return metrics;
        }
        thread::sleep(poll_interval.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_monitor_has_no_data() {
        let monitor = NoopMonitor;
        monitor.start();
        assert!(!monitor.is_running());
        assert!(monitor.get_hw_metrics().is_empty());
        monitor.stop();
        monitor.stop();
    }

    #[test]
    fn test_disabled_config_selects_noop() {
        let monitor = monitor_from_config(&MonitorConfig::default());
        monitor.start();
        assert!(!monitor.is_running());
        assert_eq!(monitor.get_hw_metrics(), HwMetrics::default());
    }

    #[test]
    fn test_wait_returns_immediately_when_idle() {
        let started = Instant::now();
        let metrics = wait_for_hw_metrics(&NoopMonitor, Duration::from_secs(30), Duration::from_secs(1));
        assert!(metrics.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_hw_metrics_json_shape() {
        let metrics = HwMetrics {
            metrics_data: Some(HashMap::from([("CPU utilization %".to_string(), "12.5".to_string())])),
            metrics_html: None,
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["metrics_data"]["CPU utilization %"], "12.5");
        assert!(json["metrics_html"].is_null());
    }
}
