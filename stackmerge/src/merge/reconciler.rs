//! Profile reconciliation.
//!
//! Combines one round of samples from the system-wide reference sampler with
//! the per-process runtime samplers (py-spy, rbspy, async-profiler, ...).
//!
//! # Volume rule
//!
//! The reference sampler sees every process at a fixed frequency, so when it
//! has samples for a process its total is authoritative for *volume*: the
//! runtime profile's stacks are rescaled so their mass matches the
//! reference's, then added to the reference's own stacks.
//!
//! When the reference reports zero samples for a process the runtime profile
//! is passed through untouched. A zero here means the reference degraded (it
//! is known to crash during native symbol resolution on GPU hosts and report
//! a hard zero), not that the process was idle, and scaling by
//! `0 / runtime_total` would wipe out a healthy runtime profile.
//!
//! ```text
//!  reference total │ runtime stacks        │ merged
//! ─────────────────┼───────────────────────┼──────────────────────────────────
//!        > 0       │ samples               │ reference + scaled(samples)
//!        > 0       │ error marker (+ any)  │ reference + scaled(samples) + marker
//!        > 0       │ none / empty          │ reference
//!          0       │ samples and/or marker │ runtime, unmodified
//!          0       │ empty                 │ empty
//! ```

// Ratio calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use log::{debug, info, warn};

use super::error_stack::{attach_error_to_stacks, split_error_stacks};
use super::scale::scale_by_fraction;
use crate::domain::{Pid, ProcessToProfileData, ProfileData, StackSamples};

/// How a process's merged profile was produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeDecision {
    /// Runtime samples were rescaled to the reference volume and added to it
    Scaled { ratio: f64 },
    /// The runtime profile carried an error marker, attached to the reference
    ErrorAttached,
    /// The reference had no samples; the runtime profile was kept as-is
    RuntimePassthrough,
    /// Only the reference had samples for this process
    ReferencePassthrough,
    /// Neither source had samples for this process
    Empty,
}

/// Merge one round of reference and runtime profiles into one profile per process.
///
/// Every process present in either input appears in the output. A bad profile
/// for one process never affects the others.
#[must_use]
pub fn merge_profiles(
    mut reference: ProcessToProfileData,
    runtime: ProcessToProfileData,
) -> ProcessToProfileData {
    let mut merged = ProcessToProfileData::with_capacity(reference.len().max(runtime.len()));
    let mut tally = DecisionTally::default();

    for (pid, mut runtime_profile) in runtime {
        // The map key is authoritative for identity
        runtime_profile.pid = pid;
        let reference_profile = reference.remove(&pid).map(|mut p| {
            p.pid = pid;
            p
        });

        let (profile, decision) = merge_process(reference_profile, runtime_profile);
        debug!("{pid}: {decision:?}, {} samples", profile.total_samples());
        tally.record(decision);
        merged.insert(pid, profile);
    }

    for (pid, mut reference_profile) in reference {
        reference_profile.pid = pid;
        reference_profile.stacks = sanitize(pid, reference_profile.stacks);
        let decision = if reference_profile.total_samples() > 0 {
            MergeDecision::ReferencePassthrough
        } else {
            reference_profile.stacks = StackSamples::new();
            MergeDecision::Empty
        };
        tally.record(decision);
        merged.insert(pid, reference_profile);
    }

    info!(
        "Merged {} processes: {} scaled, {} with errors attached, {} runtime passthrough, \
         {} reference only, {} empty",
        merged.len(),
        tally.scaled,
        tally.error_attached,
        tally.runtime_passthrough,
        tally.reference_passthrough,
        tally.empty
    );
    merged
}

/// Merge a single process's runtime profile with its reference profile, if any.
#[must_use]
pub fn merge_process(
    reference: Option<ProfileData>,
    runtime: ProfileData,
) -> (ProfileData, MergeDecision) {
    let pid = runtime.pid;
    let (reference_stacks, reference_container) = match reference {
        Some(profile) => (sanitize(pid, profile.stacks), profile.container_name),
        None => (StackSamples::new(), None),
    };

    let reference_total = reference_stacks.total();
    let (stacks, decision) = if reference_total == 0 {
        // Passed through exactly as the runtime profiler reported it
        if runtime.stacks.total() == 0 {
            (StackSamples::new(), MergeDecision::Empty)
        } else {
            (runtime.stacks, MergeDecision::RuntimePassthrough)
        }
    } else {
        merge_with_reference(reference_stacks, reference_total, sanitize(pid, runtime.stacks))
    };

    let profile = ProfileData {
        pid,
        stacks,
        container_name: runtime.container_name.or(reference_container),
        appid: runtime.appid,
        app_metadata: runtime.app_metadata,
    };
    (profile, decision)
}

/// Scale the runtime's real samples to `reference_total` and add them, plus
/// any unscaled error markers, to the reference stacks.
fn merge_with_reference(
    reference_stacks: StackSamples,
    reference_total: u64,
    runtime_stacks: StackSamples,
) -> (StackSamples, MergeDecision) {
    let (errors, samples) = split_error_stacks(runtime_stacks);
    let samples_total = samples.total();

    let mut merged = reference_stacks;
    let mut decision = MergeDecision::ReferencePassthrough;

    // Zero runtime samples means nothing to scale
    if samples_total > 0 {
        let ratio = reference_total as f64 / samples_total as f64;
        for (stack, count) in scale_by_fraction(samples, reference_total, samples_total) {
            merged.add(stack, count);
        }
        decision = MergeDecision::Scaled { ratio };
    }

    if !errors.is_empty() {
        merged = attach_error_to_stacks(merged, errors);
        decision = MergeDecision::ErrorAttached;
    }

    (merged, decision)
}

/// Drop entries with an empty stack key.
fn sanitize(pid: Pid, mut stacks: StackSamples) -> StackSamples {
    let before = stacks.len();
    stacks.retain(|stack, _| !stack.trim().is_empty());
    let dropped = before - stacks.len();
    if dropped > 0 {
        warn!("{pid}: dropped {dropped} malformed stack entries");
    }
    stacks
}

#[derive(Debug, Default)]
struct DecisionTally {
    scaled: usize,
    error_attached: usize,
    runtime_passthrough: usize,
    reference_passthrough: usize,
    empty: usize,
}

impl DecisionTally {
    fn record(&mut self, decision: MergeDecision) {
        let slot = match decision {
            MergeDecision::Scaled { .. } => &mut self.scaled,
            MergeDecision::ErrorAttached => &mut self.error_attached,
            MergeDecision::RuntimePassthrough => &mut self.runtime_passthrough,
            MergeDecision::ReferencePassthrough => &mut self.reference_passthrough,
            MergeDecision::Empty => &mut self.empty,
        };
        *slot += 1;
    }
}
