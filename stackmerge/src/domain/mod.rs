//! Domain model for stackmerge
//!
//! This module contains core domain types and errors that provide:
//! - The shared profile contract re-exported from `stackmerge-common`
//! - Structured error handling

pub mod errors;

// Re-export common types for convenience
pub use stackmerge_common::{
    Pid, ProcessToProfileData, ProfileData, StackSamples, FRAME_DELIMITER,
};

pub use errors::{MonitorError, ProcessError};
