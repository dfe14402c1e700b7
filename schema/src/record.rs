//! Persisted records of launched processes
//!
//! A [`ProcessRecord`] captures everything the launcher knew about a process
//! at launch time so it can be found, monitored and cleaned up later, across
//! launcher restarts. The recorded start time allows liveness checks to
//! detect PID reuse: a PID that exists but whose start time disagrees with
//! the record belongs to a different process.

use crate::launch::LaunchRequest;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Record of a launched process as stored in the process registry
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    /// Human-readable identifier of the launch
    pub name: String,

    /// Command that was executed
    pub command: String,

    /// Command-line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overlay used for the launch
    #[serde(default)]
    pub environment: HashMap<String, String>,

    /// Working directory of the process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,

    /// The resolved PID of the process
    pub pid: u32,

    /// Start time of the process in seconds since the epoch, when the
    /// platform exposes it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,

    /// RFC3339 timestamp when the record was created
    pub created_at: String,
}

impl ProcessRecord {
    /// Build a record from a launch request and the resolved PID
    #[must_use]
    pub fn from_request(request: &LaunchRequest, pid: u32, start_time: Option<f64>) -> Self {
        Self {
            name: request.name.clone(),
            command: request.command.clone(),
            args: request.args.clone(),
            environment: request.environment.clone(),
            working_directory: request.working_directory.clone(),
            pid,
            start_time,
            created_at: crate::current_timestamp(),
        }
    }

    /// Deterministic registry key for this record
    ///
    /// The start time is included (truncated to whole seconds) so a reused
    /// PID produces a distinct key.
    #[must_use]
    pub fn key(&self) -> String {
        match self.start_time {
            Some(start) => format!("{}:{}:{:.0}", self.name, self.pid, start),
            None => format!("{}:{}", self.name, self.pid),
        }
    }
}
