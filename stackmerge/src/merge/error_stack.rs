//! Synthetic error stacks.
//!
//! A runtime profiler that fails partway (the target exited, attach was
//! refused, the profiler crashed) reports a one-sample stack whose leaf frame
//! is a marker such as `python;[Profiling error: process exited]` instead of
//! real frames. Keeping these visible in the merged profile tells the reader
//! why a process has no runtime-level detail.

use crate::domain::{StackSamples, FRAME_DELIMITER};

/// Opening of an error marker frame
const ERROR_FRAME_PREFIX: &str = "[Profiling ";

/// Builder for synthetic error stacks.
pub struct ErrorStack;

impl ErrorStack {
    /// Build a one-sample error stack: `<comm>;[Profiling <what>: <reason>]`.
    ///
    /// An empty `comm` produces the marker frame alone.
    #[must_use]
    pub fn new(comm: &str, what: &str, reason: &str) -> StackSamples {
        let frame = format!("{ERROR_FRAME_PREFIX}{what}: {reason}]");
        let stack = if comm.is_empty() { frame } else { format!("{comm}{FRAME_DELIMITER}{frame}") };
        [(stack, 1)].into_iter().collect()
    }
}

fn is_error_frame(frame: &str) -> bool {
    frame.starts_with(ERROR_FRAME_PREFIX) && frame.ends_with(']')
}

/// Whether a single collapsed stack carries an error marker frame
#[must_use]
pub fn is_error_key(stack: &str) -> bool {
    stack.split(FRAME_DELIMITER).any(is_error_frame)
}

/// Whether any stack in `stacks` carries an error marker frame
#[must_use]
pub fn is_error_stack(stacks: &StackSamples) -> bool {
    stacks.keys().any(is_error_key)
}

/// Separate error-marker entries from real samples: `(errors, samples)`.
#[must_use]
pub fn split_error_stacks(stacks: StackSamples) -> (StackSamples, StackSamples) {
    let mut errors = StackSamples::new();
    let mut samples = StackSamples::new();
    for (stack, count) in stacks {
        if is_error_key(&stack) {
            errors.add(stack, count);
        } else {
            samples.add(stack, count);
        }
    }
    (errors, samples)
}

/// Attach `errors` to `target` by summing counts key by key.
///
/// Every key from either side is kept; a key present on both sides ends up
/// with the sum of the two counts.
#[must_use]
pub fn attach_error_to_stacks(mut target: StackSamples, errors: StackSamples) -> StackSamples {
    for (stack, count) in errors {
        target.add(stack, count);
    }
    target
}
