//! # stackmerge - Profile Reconciliation for a Continuous Whole-System Profiler
//!
//! stackmerge is the reconciliation layer of a whole-system profiler. Several
//! independent samplers run concurrently over the same measurement window: one
//! system-wide sampler (the *reference*, e.g. `perf`) and per-runtime
//! profilers (py-spy, rbspy, async-profiler, ...). This crate decides which
//! processes are worth profiling at all, and combines the samplers' output
//! into one statistically consistent profile per process, even when one of
//! them silently degrades to zero samples.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OS Process Table (/proc)                   │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ pid, creation time
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Admission Gate (admission)                     │
//! │        skip processes younger than --min-duration               │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ admitted pids
//!            ┌────────────┴─────────────┐
//!            ▼                          ▼
//! ┌────────────────────┐    ┌────────────────────────┐   ┌────────────────────┐
//! │ Reference sampler  │    │   Runtime profilers    │   │ Hardware metrics   │
//! │  (system-wide)     │    │ (py-spy, rbspy, ...)   │   │ (PerfSpect)        │
//! └─────────┬──────────┘    └───────────┬────────────┘   └─────────┬──────────┘
//!           │ pid → stacks              │ pid → stacks             │ counters
//!           └────────────┬──────────────┘                          │ + report
//!                        ▼                                         ▼
//! ┌─────────────────────────────────────────────┐   ┌────────────────────────┐
//! │            Reconciler (merge)               │   │  MetricsMonitor        │
//! │  scale → attach error stacks → combine      │   │  (hw_metrics)          │
//! └──────────────────────┬──────────────────────┘   └────────────────────────┘
//!                        │ one ProfileData per pid
//!                        ▼
//!             symbolization / export (downstream)
//! ```
//!
//! ## Module Structure
//!
//! - [`admission`]: Process admission gate (minimum process age)
//! - [`process_lookup`]: `/proc` access, process enumeration and creation time
//! - [`merge`]: Sample scaling, error stacks, and the reconciler
//!   - `scale`: Rescale a sample multiset by a ratio
//!   - `error_stack`: Detect and attach synthetic profiler-error stacks
//!   - `reconciler`: Merge reference and runtime profiles per process
//! - [`hw_metrics`]: Hardware counter side channel (active and disabled monitors)
//! - [`cli`]: Command-line argument parsing
//! - [`domain`]: Core domain types (re-exported from `stackmerge-common`) and errors
//!
//! ## Failure Model
//!
//! Every component degrades to less data instead of failing the round:
//! - An unreadable process age admits the process
//! - A reference sampler reporting zero samples leaves runtime profiles unscaled
//! - A bad profile for one process never affects another
//! - A missing hardware collector or artifact yields "no metrics"

pub mod admission;
pub mod cli;
pub mod domain;
pub mod hw_metrics;
pub mod merge;
pub mod process_lookup;
