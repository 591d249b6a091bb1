//! # Shared Data Structures (Sampling Sources ↔ Reconciler)
//!
//! Defines the data contract between the sampling sources (the system-wide
//! sampler and the per-runtime samplers) and the reconciler. Every source
//! produces, per profiling round, one [`ProfileData`] per process; the
//! reconciler consumes them and emits one merged [`ProfileData`] per process.
//!
//! ## Key Types
//!
//! - [`Pid`] - Process identity used as the merge key
//! - [`StackSamples`] - Multiset of collapsed stack → sample count
//! - [`ProfileData`] - Stacks plus process identity and free-form metadata
//! - [`ProcessToProfileData`] - One round's output from a single source
//!
//! All types are serde-serializable so sources running out of process can
//! hand their profiles over as JSON.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ============================================================================
// Process Identity
// ============================================================================

/// Process ID
///
/// Represents a process ID in the system (TGID in Linux terms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<u32> for Pid {
    fn from(pid: u32) -> Self {
        Pid(pid)
    }
}

// ============================================================================
// Stack Samples
// ============================================================================

/// Delimiter between frames of a collapsed stack key.
pub const FRAME_DELIMITER: char = ';';

/// Multiset of stack traces observed within one measurement window.
///
/// Keys are collapsed stacks (frames joined by [`FRAME_DELIMITER`], outermost
/// first); values are occurrence counts. A multiset whose [`total`] is zero
/// means "no usable samples", which is distinct from a missing profile.
///
/// [`total`]: StackSamples::total
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackSamples(HashMap<String, u64>);

impl StackSamples {
    /// Create an empty multiset
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count recorded for `stack`, if present
    #[must_use]
    pub fn get(&self, stack: &str) -> Option<u64> {
        self.0.get(stack).copied()
    }

    /// Add `count` occurrences of `stack`, summing with any existing count.
    pub fn add(&mut self, stack: impl Into<String>, count: u64) {
        let entry = self.0.entry(stack.into()).or_insert(0);
        *entry = entry.saturating_add(count);
    }

    /// Total sample mass across all stacks
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().fold(0u64, |acc, &count| acc.saturating_add(count))
    }

    /// Number of distinct stacks
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(stack, &count)| (stack.as_str(), count))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Keep only the entries for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&str, u64) -> bool) {
        self.0.retain(|stack, count| keep(stack, *count));
    }

    #[must_use]
    pub fn into_inner(self) -> HashMap<String, u64> {
        self.0
    }
}

impl FromIterator<(String, u64)> for StackSamples {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut samples = Self::new();
        for (stack, count) in iter {
            samples.add(stack, count);
        }
        samples
    }
}

impl<'a> FromIterator<(&'a str, u64)> for StackSamples {
    fn from_iter<I: IntoIterator<Item = (&'a str, u64)>>(iter: I) -> Self {
        iter.into_iter().map(|(stack, count)| (stack.to_string(), count)).collect()
    }
}

impl IntoIterator for StackSamples {
    type Item = (String, u64);
    type IntoIter = std::collections::hash_map::IntoIter<String, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<HashMap<String, u64>> for StackSamples {
    fn from(map: HashMap<String, u64>) -> Self {
        Self(map)
    }
}

// ============================================================================
// Profile Data
// ============================================================================

/// One process's samples for one measurement round, plus identity metadata.
///
/// Created fresh each round by a sampling source and consumed by the
/// reconciler, which produces a new merged instance rather than mutating the
/// sources' originals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    pub pid: Pid,

    pub stacks: StackSamples,

    /// Container the process runs in, when the source could resolve it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,

    /// Application identifier (e.g. a script name or JVM main class)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appid: Option<String>,

    /// Free-form, source-specific metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub app_metadata: BTreeMap<String, serde_json::Value>,
}

impl ProfileData {
    #[must_use]
    pub fn new(pid: Pid, stacks: StackSamples) -> Self {
        Self { pid, stacks, container_name: None, appid: None, app_metadata: BTreeMap::new() }
    }

    #[must_use]
    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_appid(mut self, appid: impl Into<String>) -> Self {
        self.appid = Some(appid.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.app_metadata.insert(key.into(), value);
        self
    }

    /// Total sample mass of this profile
    #[must_use]
    pub fn total_samples(&self) -> u64 {
        self.stacks.total()
    }
}

/// One round's output from a single sampling source, keyed by process.
pub type ProcessToProfileData = HashMap<Pid, ProfileData>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_sums_existing_counts() {
        let mut samples = StackSamples::new();
        samples.add("app;main", 3);
        samples.add("app;main", 4);
        samples.add("app;worker", 1);

        assert_eq!(samples.get("app;main"), Some(7));
        assert_eq!(samples.len(), 2);
        assert_eq!(samples.total(), 8);
    }

    #[test]
    fn test_empty_multiset_has_zero_total() {
        let samples = StackSamples::new();
        assert!(samples.is_empty());
        assert_eq!(samples.total(), 0);
    }

    #[test]
    fn test_zero_count_entries_are_kept() {
        let samples: StackSamples = [("app;idle", 0)].into_iter().collect();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples.total(), 0);
    }

    #[test]
    fn test_profile_data_json_shape() {
        let profile = ProfileData::new(Pid(42), [("java;Main.main", 5)].into_iter().collect())
            .with_appid("java: Main");

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["pid"], 42);
        assert_eq!(json["stacks"]["java;Main.main"], 5);
        assert_eq!(json["appid"], "java: Main");
        assert!(json.get("container_name").is_none());

        let back: ProfileData = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn test_pid_display() {
        assert_eq!(Pid(1234).to_string(), "PID:1234");
    }
}
