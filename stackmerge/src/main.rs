//! # stackmerge - Main Entry Point
//!
//! Thin glue over the library:
//! - **merge**: reconcile one round of reference and runtime profiles read from JSON
//! - **admit**: show which live processes pass the admission gate
//! - **hw-metrics**: run one hardware metrics collection cycle

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, SystemTime};

use stackmerge::admission::{process_age, should_skip_at, AdmissionGate, ProcessInfo};
use stackmerge::cli::{Args, Command};
use stackmerge::domain::{ProcessToProfileData, ProfileData};
use stackmerge::hw_metrics::{monitor_from_config, wait_for_hw_metrics, MonitorConfig};
use stackmerge::merge::merge_profiles;
use stackmerge::process_lookup::list_processes;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

/// Extra time granted to the collector beyond its measurement duration
const HW_METRICS_GRACE: Duration = Duration::from_secs(10);

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") {
        EXIT_NOPERM
    } else if msg.contains("invalid profile file") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Merge { reference, runtime, output } => {
            run_merge(&reference, &runtime, output.as_deref(), args.quiet)
        }
        Command::Admit { min_duration } => run_admit(min_duration),
        Command::HwMetrics { perfspect, duration, output_dir, wait, poll_interval } => {
            let config = MonitorConfig {
                perfspect_path: perfspect,
                duration: Duration::from_secs(duration),
                output_dir,
                polling_interval: Duration::from_secs(poll_interval),
                ..MonitorConfig::default()
            };
            let timeout =
                wait.map_or(config.duration + HW_METRICS_GRACE, Duration::from_secs);
            run_hw_metrics(&config, timeout, args.quiet)
        }
    }
}

/// Read a JSON array of profiles, keyed by pid.
fn load_profiles(path: &Path) -> Result<ProcessToProfileData> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let profiles: Vec<ProfileData> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid profile file {}", path.display()))?;

    let mut by_pid = ProcessToProfileData::with_capacity(profiles.len());
    for profile in profiles {
        if let Some(previous) = by_pid.insert(profile.pid, profile) {
            warn!("{}: duplicate profile in {}, keeping the last one", previous.pid, path.display());
        }
    }
    Ok(by_pid)
}

fn run_merge(reference: &Path, runtime: &Path, output: Option<&Path>, quiet: bool) -> Result<()> {
    // A reference sampler that failed outright leaves nothing behind
    let reference_profiles = match load_profiles(reference) {
        Ok(profiles) => profiles,
        Err(e) => {
            warn!("Reference profiles unavailable, treating as zero samples: {e:#}");
            ProcessToProfileData::new()
        }
    };
    let runtime_profiles = load_profiles(runtime)?;
    info!(
        "Loaded {} reference and {} runtime profiles",
        reference_profiles.len(),
        runtime_profiles.len()
    );

    let merged = merge_profiles(reference_profiles, runtime_profiles);
    let mut profiles: Vec<ProfileData> = merged.into_values().collect();
    profiles.sort_unstable_by_key(|p| p.pid);

    match output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &profiles)?;
            writer.flush()?;
            if !quiet {
                println!("merged {} processes into {}", profiles.len(), path.display());
            }
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &profiles)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn run_admit(min_duration_secs: u64) -> Result<()> {
    let gate = AdmissionGate::from_secs(min_duration_secs);
    let records = list_processes().context("Failed to enumerate processes")?;
    let now = SystemTime::now();

    println!("{:>8}  {:>10}  {:<8}  COMMAND", "PID", "AGE", "DECISION");
    for record in &records {
        let age = process_age(record, now)
            .map_or_else(|| "?".to_string(), |age| format!("{:.1}s", age.as_secs_f64()));
        let decision =
            if should_skip_at(record, gate.min_duration(), now) { "skip" } else { "profile" };
        let command = record.command().unwrap_or_else(|_| "<exited>".to_string());
        println!("{:>8}  {age:>10}  {decision:<8}  {command}", record.pid().0);
    }
    Ok(())
}

fn run_hw_metrics(config: &MonitorConfig, timeout: Duration, quiet: bool) -> Result<()> {
    let monitor = monitor_from_config(config);
    monitor.start();

    if !monitor.is_running() && !quiet {
        match &config.perfspect_path {
            Some(path) => eprintln!(
                "warning: collector {} did not start, no hardware metrics will be produced",
                path.display()
            ),
            None => eprintln!("warning: no --perfspect given, hardware metrics disabled"),
        }
    }

    let metrics = wait_for_hw_metrics(monitor.as_ref(), timeout, config.polling_interval);
    monitor.stop();

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &metrics)?;
    writeln!(stdout)?;
    Ok(())
}
