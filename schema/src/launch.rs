//! Launch request and PID resolution types for the launchkit core
//!
//! This module contains the data structures for describing a detached
//! application launch and for tracking how the authoritative process ID of
//! that launch was resolved.
//!
//! ## Resolution Lifecycle
//!
//! Every launch starts in the `Pending` state and ends in exactly one
//! terminal state:
//! - `Resolved`: a cooperating wrapper reported the real application PID
//!   through the resolution channel and the PID was verified live
//! - `TimedOut`: no valid report arrived within the polling budget; the
//!   PID returned by the spawn call stays authoritative
//! - `Cancelled`: the caller aborted resolution before the budget elapsed
//! - `Failed`: the resolution channel could not be set up, so the launch
//!   proceeded without resolution capability
//!
//! In every terminal state the handle carries a usable PID; only the
//! source of that PID differs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Description of a single detached application launch
///
/// The request is consumed read-only by the launcher; building the command
/// line, working directory and environment set is the responsibility of an
/// upstream caller.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    /// Human-readable identifier for the launch, used for registry records
    /// and log context
    pub name: String,

    /// Command to execute (must be in PATH or an absolute path)
    pub command: String,

    /// Command-line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables overlaid on the parent environment
    #[serde(default)]
    pub environment: HashMap<String, String>,

    /// Working directory for the process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
}

/// State of PID resolution for one launch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionState {
    /// Resolution is still polling the channel
    Pending,
    /// A live PID report was accepted from the channel
    Resolved,
    /// The polling budget elapsed without a valid report
    TimedOut,
    /// The caller aborted resolution
    Cancelled,
    /// The resolution channel could not be created; the launch ran without
    /// resolution capability
    Failed,
}

impl ResolutionState {
    /// Check if resolution has reached a terminal state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResolutionState::Pending)
    }
}

/// Which value the resolved PID came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionSource {
    /// The PID returned by the OS spawn call
    Spawn,
    /// A PID reported by the child through the resolution channel
    Channel,
}

/// Snapshot of the resolution outcome for one launch
///
/// `pid` equals the raw spawn PID until a channel report is accepted; it is
/// set exactly once, at the transition out of `Pending`, and is immutable
/// afterwards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Current resolution state
    pub state: ResolutionState,
    /// The PID considered authoritative so far
    pub pid: u32,
    /// Where `pid` came from
    pub source: ResolutionSource,
}

impl Resolution {
    /// Initial snapshot for a freshly spawned process
    #[must_use]
    pub fn pending(raw_pid: u32) -> Self {
        Self {
            state: ResolutionState::Pending,
            pid: raw_pid,
            source: ResolutionSource::Spawn,
        }
    }

    /// Terminal snapshot for an accepted channel report
    #[must_use]
    pub fn resolved(reported_pid: u32) -> Self {
        Self {
            state: ResolutionState::Resolved,
            pid: reported_pid,
            source: ResolutionSource::Channel,
        }
    }

    /// Terminal snapshot for an exhausted polling budget
    #[must_use]
    pub fn timed_out(raw_pid: u32) -> Self {
        Self {
            state: ResolutionState::TimedOut,
            pid: raw_pid,
            source: ResolutionSource::Spawn,
        }
    }

    /// Terminal snapshot for a caller-cancelled resolution
    #[must_use]
    pub fn cancelled(raw_pid: u32) -> Self {
        Self {
            state: ResolutionState::Cancelled,
            pid: raw_pid,
            source: ResolutionSource::Spawn,
        }
    }

    /// Terminal snapshot for a launch whose channel could not be created
    #[must_use]
    pub fn failed(raw_pid: u32) -> Self {
        Self {
            state: ResolutionState::Failed,
            pid: raw_pid,
            source: ResolutionSource::Spawn,
        }
    }
}

/// Tunables for the PID resolution polling loop
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolverConfig {
    /// Total polling budget in milliseconds
    #[serde(default = "default_budget_ms")]
    pub budget_ms: u64,

    /// Interval between channel reads in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl ResolverConfig {
    /// Get the polling budget as a Duration
    #[must_use]
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    /// Get the polling interval as a Duration
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            budget_ms: default_budget_ms(),
            interval_ms: default_interval_ms(),
        }
    }
}

const fn default_budget_ms() -> u64 {
    2000
}

const fn default_interval_ms() -> u64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_config_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.budget_ms, 2000);
        assert_eq!(config.interval_ms, 50);
        assert_eq!(config.budget(), Duration::from_secs(2));
        assert_eq!(config.interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_resolver_config_serde_defaults() {
        let config: ResolverConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ResolverConfig::default());

        let config: ResolverConfig =
            serde_json::from_str(r#"{"budgetMs": 500, "intervalMs": 10}"#).unwrap();
        assert_eq!(config.budget_ms, 500);
        assert_eq!(config.interval_ms, 10);
    }

    #[test]
    fn test_resolution_state_terminal() {
        assert!(!ResolutionState::Pending.is_terminal());
        assert!(ResolutionState::Resolved.is_terminal());
        assert!(ResolutionState::TimedOut.is_terminal());
        assert!(ResolutionState::Cancelled.is_terminal());
        assert!(ResolutionState::Failed.is_terminal());
    }

    #[test]
    fn test_resolution_constructors() {
        let pending = Resolution::pending(100);
        assert_eq!(pending.state, ResolutionState::Pending);
        assert_eq!(pending.pid, 100);
        assert_eq!(pending.source, ResolutionSource::Spawn);

        let resolved = Resolution::resolved(200);
        assert_eq!(resolved.state, ResolutionState::Resolved);
        assert_eq!(resolved.pid, 200);
        assert_eq!(resolved.source, ResolutionSource::Channel);

        let timed_out = Resolution::timed_out(100);
        assert_eq!(timed_out.pid, 100);
        assert_eq!(timed_out.source, ResolutionSource::Spawn);
    }

    #[test]
    fn test_launch_request_minimal_json() {
        let request: LaunchRequest = serde_json::from_str(
            r#"{"name": "editor", "command": "/usr/bin/editor"}"#,
        )
        .unwrap();
        assert_eq!(request.name, "editor");
        assert!(request.args.is_empty());
        assert!(request.environment.is_empty());
        assert!(request.working_directory.is_none());
    }

    #[test]
    fn test_resolution_state_wire_format() {
        let json = serde_json::to_string(&ResolutionState::TimedOut).unwrap();
        assert_eq!(json, "\"timedOut\"");
        let json = serde_json::to_string(&ResolutionSource::Channel).unwrap();
        assert_eq!(json, "\"channel\"");
    }
}
