//! Reconciliation of per-source profiles into one profile per process
//!
//! This module contains pure logic over already-collected samples:
//! - [`scale`]: rescale a sample multiset by a ratio
//! - [`error_stack`]: recognise and attach synthetic profiler-error stacks
//! - [`reconciler`]: merge the system-wide reference profile with runtime profiles

pub mod error_stack;
pub mod reconciler;
pub mod scale;

pub use error_stack::{attach_error_to_stacks, is_error_stack, split_error_stacks, ErrorStack};
pub use reconciler::{merge_process, merge_profiles, MergeDecision};
pub use scale::{scale_by_fraction, scale_sample_counts};
