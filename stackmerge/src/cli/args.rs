//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::admission::DEFAULT_MIN_DURATION;
use crate::hw_metrics::{DEFAULT_DURATION, DEFAULT_OUTPUT_DIR, DEFAULT_POLLING_INTERVAL};

#[derive(Parser)]
#[command(
    name = "stackmerge",
    about = "Reconcile stack samples from a system-wide sampler and per-runtime profilers",
    after_help = "\
EXAMPLES:
    stackmerge merge --reference perf.json --runtime runtimes.json
    stackmerge admit --min-duration 10
    sudo stackmerge hw-metrics --perfspect /opt/perfspect/perfspect --duration 30"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Merge one round of reference and runtime profiles (JSON arrays of profiles)
    Merge {
        /// Profiles from the system-wide sampler (missing file = no samples)
        #[arg(long, value_name = "FILE")]
        reference: PathBuf,

        /// Profiles from the runtime profilers
        #[arg(long, value_name = "FILE")]
        runtime: PathBuf,

        /// Write merged profiles here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// List live processes and whether they would be admitted for profiling
    Admit {
        /// Minimum process age in seconds (0 = admit everything)
        #[arg(long, default_value_t = DEFAULT_MIN_DURATION.as_secs())]
        min_duration: u64,
    },

    /// Run one hardware metrics collection cycle and print the result
    HwMetrics {
        /// Path to the PerfSpect executable (omit to disable collection)
        #[arg(long, value_name = "PATH")]
        perfspect: Option<PathBuf>,

        /// Measurement duration in seconds
        #[arg(long, default_value_t = DEFAULT_DURATION.as_secs())]
        duration: u64,

        /// Directory the collector writes into
        #[arg(long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Give up waiting for artifacts after N seconds (default: duration + 10)
        #[arg(long)]
        wait: Option<u64>,

        /// Seconds between artifact checks
        #[arg(long, default_value_t = DEFAULT_POLLING_INTERVAL.as_secs())]
        poll_interval: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_admit_defaults() {
        let args = Args::parse_from(["stackmerge", "admit"]);
        assert!(matches!(args.command, Command::Admit { min_duration: 10 }));
    }

    #[test]
    fn test_hw_metrics_defaults() {
        let args = Args::parse_from(["stackmerge", "hw-metrics"]);
        let Command::HwMetrics { perfspect, duration, output_dir, wait, poll_interval } =
            args.command
        else {
            panic!("expected hw-metrics");
        };
        assert_eq!(perfspect, None);
        assert_eq!(duration, 60);
        assert_eq!(output_dir, PathBuf::from("/tmp/perfspect_data"));
        assert_eq!(wait, None);
        assert_eq!(poll_interval, 5);
    }
}
