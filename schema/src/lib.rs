//! Schema definitions for launchkit
//!
//! This crate contains shared data structures used across the launchkit
//! ecosystem. All types here implement JSON Schema generation for external
//! consumption.

use std::time::SystemTime;

pub mod launch;
pub mod record;

pub use launch::{
    LaunchRequest, Resolution, ResolutionSource, ResolutionState, ResolverConfig,
};
pub use record::ProcessRecord;

/// Get the current timestamp in RFC3339 format
#[must_use]
pub fn current_timestamp() -> String {
    // Simple RFC3339 format: YYYY-MM-DDTHH:MM:SSZ
    format!(
        "{}Z",
        humantime::format_rfc3339_seconds(SystemTime::now())
            .to_string()
            .trim_end_matches(".000000000Z")
    )
}
