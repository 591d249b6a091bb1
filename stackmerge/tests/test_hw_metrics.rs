use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use stackmerge::hw_metrics::{wait_for_hw_metrics, MetricsMonitor, MonitorConfig, PerfspectMonitor};

// Spawning a freshly written script races with other threads forking while
// its write handle is open (ETXTBSY), so scripts are written and collectors
// started one at a time.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

const HOST: &str = "testhost";

fn spawn_lock() -> MutexGuard<'static, ()> {
    SPAWN_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

fn write_collector(dir: &Path, body: &str) -> PathBuf {
    let _guard = spawn_lock();
    let path = dir.join("perfspect");
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn config(collector: &Path, output_dir: &Path) -> MonitorConfig {
    MonitorConfig {
        perfspect_path: Some(collector.to_path_buf()),
        duration: Duration::from_secs(30),
        output_dir: output_dir.to_path_buf(),
        polling_interval: Duration::from_millis(50),
        stop_timeout: Duration::from_secs(2),
    }
}

#[test]
fn test_collection_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("perfspect_data");
    // Invoked as: metrics --duration <secs> --output <dir>
    let collector = write_collector(
        dir.path(),
        &format!(
            "echo \"$@\" > \"$5/../args.txt\"\n\
             printf '<html>report</html>' > \"$5/{HOST}_metrics_summary.html\"\n\
             printf 'metric,value\\nCPU utilization %%,42.0\\nCPI,0.75\\n' > \"$5/tmp.csv\"\n\
             mv \"$5/tmp.csv\" \"$5/{HOST}_metrics_summary.csv\"\n\
             exec sleep 30\n"
        ),
    );

    let monitor_config = config(&collector, &output);
    let monitor = PerfspectMonitor::with_host(collector, &monitor_config, HOST);
    {
        let _guard = spawn_lock();
        monitor.start();
    }
    assert!(monitor.is_running());

    let metrics = wait_for_hw_metrics(&monitor, Duration::from_secs(10), Duration::from_millis(50));
    let data = metrics.metrics_data.expect("summary counters");
    assert_eq!(data["CPU utilization %"], "42.0");
    assert_eq!(data["CPI"], "0.75");
    assert!(metrics.metrics_html.is_some());

    let args = fs::read_to_string(dir.path().join("args.txt")).unwrap();
    assert_eq!(args.trim(), format!("metrics --duration 30 --output {}", output.display()));

    // A second start while the collector is alive keeps the same cycle
    monitor.start();
    assert!(monitor.is_running());

    let stopped = Instant::now();
    monitor.stop();
    assert!(stopped.elapsed() < Duration::from_secs(5));
    assert!(!monitor.is_running());
    assert!(!output.join(format!("{HOST}_metrics_summary.csv")).exists());
    assert!(!output.join(format!("{HOST}_metrics_summary.html")).exists());
    assert!(monitor.get_hw_metrics().is_empty());
}

#[test]
fn test_collector_exiting_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("perfspect_data");
    let collector = write_collector(dir.path(), "exit 0\n");

    let monitor_config = config(&collector, &output);
    let monitor = PerfspectMonitor::with_host(collector, &monitor_config, HOST);
    {
        let _guard = spawn_lock();
        monitor.start();
    }

    let metrics = wait_for_hw_metrics(&monitor, Duration::from_secs(10), Duration::from_millis(50));
    assert_eq!(metrics.metrics_data, None);
    assert_eq!(metrics.metrics_html, None);

    // Already exited: stop just reaps it
    monitor.stop();
    monitor.stop();
    assert!(!monitor.is_running());
    assert!(output.is_dir());
}

#[test]
fn test_missing_collector_produces_no_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let collector = dir.path().join("does-not-exist");
    let monitor = PerfspectMonitor::with_host(collector.clone(), &config(&collector, dir.path()), HOST);
    monitor.start();
    assert!(!monitor.is_running());
    assert!(monitor.get_hw_metrics().is_empty());
    monitor.stop();
}

#[test]
fn test_start_purges_previous_cycle_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("perfspect_data");
    let collector = write_collector(dir.path(), "exec sleep 30\n");

    let monitor_config = config(&collector, &output);
    let monitor = PerfspectMonitor::with_host(collector, &monitor_config, HOST);

    // Left behind by an earlier cycle after this monitor was constructed
    let stale = [
        output.join(format!("{HOST}_metrics.csv")),
        output.join(format!("{HOST}_metrics_summary.csv")),
        output.join(format!("{HOST}_metrics_summary.html")),
    ];
    fs::write(&stale[0], "raw").unwrap();
    fs::write(&stale[1], "metric,value\nCPI,9.99\n").unwrap();
    fs::write(&stale[2], "<html>old</html>").unwrap();

    {
        let _guard = spawn_lock();
        monitor.start();
    }
    assert!(monitor.is_running());
    for path in &stale {
        assert!(!path.exists(), "{} survived start()", path.display());
    }
    assert!(monitor.get_hw_metrics().is_empty());

    monitor.stop();
    assert!(!monitor.is_running());
}

#[test]
fn test_concurrent_lifecycle_calls_are_serialized() {
    const THREADS: usize = 8;

    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("perfspect_data");
    let launches = dir.path().join("launches.txt");
    let collector = write_collector(
        dir.path(),
        "echo launch >> \"$5/../launches.txt\"\nexec sleep 30\n",
    );

    let monitor_config = config(&collector, &output);
    let monitor = Arc::new(PerfspectMonitor::with_host(collector, &monitor_config, HOST));
    let _guard = spawn_lock();

    // Everyone races to start the same cycle
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let monitor = Arc::clone(&monitor);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                monitor.start();
                if i % 2 == 0 {
                    assert!(monitor.get_hw_metrics().is_empty());
                }
                monitor.is_running()
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while !launches.exists() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    // Room for a second collector to show up if one was launched
    thread::sleep(Duration::from_millis(300));
    let launch_count = fs::read_to_string(&launches).unwrap().lines().count();
    assert_eq!(launch_count, 1, "expected exactly one collector for concurrent starts");

    // Stops and queries interleaved from several threads
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let monitor = Arc::clone(&monitor);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                if i % 2 == 0 {
                    monitor.stop();
                } else {
                    let _ = monitor.get_hw_metrics();
                    let _ = monitor.is_running();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(!monitor.is_running());
    assert!(output.is_dir());
    assert!(monitor.get_hw_metrics().is_empty());
}
