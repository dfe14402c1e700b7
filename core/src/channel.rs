//! Resolution channel: the on-disk mailbox between launcher and wrapper
//!
//! A resolution channel is an ephemeral file with a path unique to one
//! launch. The launcher creates it empty before spawning, injects its path
//! into the child environment as [`PID_FILE_ENV`], and polls it afterwards.
//! A cooperating wrapper writes the PID of the process it spawned into the
//! file as plain decimal text; a non-participating child simply leaves it
//! empty.
//!
//! The file is a single-slot mailbox: it is written at most meaningfully
//! once (later writes overwrite, last write wins) and consumed by a single
//! polling reader. Reads never trust a single malformed snapshot, since the
//! writer may be mid-flush.

use crate::{LaunchError, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Environment variable carrying the channel path to the child process.
///
/// Presence signals to a cooperating child that PID reporting is supported;
/// absence must never be treated as an error by the child.
pub const PID_FILE_ENV: &str = "LAUNCHKIT_PID_FILE";

/// Environment variable overriding the directory channel files are created in
pub const RUNTIME_DIR_ENV: &str = "LAUNCHKIT_RUNTIME_DIR";

/// Process-wide counter making concurrent channel paths unique
static CHANNEL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Outcome of a single channel read attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRead {
    /// File missing, unreadable or empty; keep polling
    Empty,
    /// Content present but not a positive decimal integer; keep polling
    Malformed,
    /// A well-formed PID report
    Reported(u32),
}

/// One launch's resolution channel file
#[derive(Debug, Clone)]
pub struct ResolutionChannel {
    path: PathBuf,
}

impl ResolutionChannel {
    /// Allocate a channel with a path unique to this launch.
    ///
    /// Uniqueness comes from the launcher PID plus a process-wide monotonic
    /// counter, so concurrent launches never share a path. The file is not
    /// created yet; see [`ResolutionChannel::create_empty`].
    pub fn allocate() -> Self {
        let dir = runtime_dir();
        let seq = CHANNEL_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("launchkit-pid-{}-{}.pid", std::process::id(), seq));
        Self { path }
    }

    /// Create a channel at an explicit path (used by tests)
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Absolute path of the channel file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the empty channel file.
    ///
    /// This happens before spawn so a racing early-writing child never finds
    /// a missing target.
    pub fn create_empty(&self) -> Result<()> {
        std::fs::write(&self.path, b"").map_err(|e| {
            LaunchError::ChannelUnavailable(format!(
                "Failed to create channel file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        debug!("Created resolution channel at {}", self.path.display());
        Ok(())
    }

    /// Read the current channel content.
    ///
    /// Unreadable files are reported as [`ChannelRead::Empty`] rather than an
    /// error: the spawner pre-creates the file, so a missing file can only be
    /// transient filesystem delay and is tolerated. Content is trimmed before
    /// parsing; anything that does not parse as a positive integer is
    /// [`ChannelRead::Malformed`] and retried by the caller.
    pub fn read_report(&self) -> ChannelRead {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return ChannelRead::Empty,
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return ChannelRead::Empty;
        }

        match trimmed.parse::<u32>() {
            Ok(pid) if pid > 0 => ChannelRead::Reported(pid),
            _ => ChannelRead::Malformed,
        }
    }

    /// Delete the channel file, best-effort.
    ///
    /// Deletion failure is logged and swallowed; a leftover file is
    /// acceptable housekeeping debt and must not fail resolution.
    pub fn remove(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed resolution channel {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Already gone; a racing cleanup path got there first
            }
            Err(e) => {
                warn!(
                    "Failed to remove resolution channel {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// Directory channel files are created in.
///
/// Order:
/// - `LAUNCHKIT_RUNTIME_DIR` env var if provided
/// - the system temp directory otherwise
fn runtime_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(RUNTIME_DIR_ENV) {
        return PathBuf::from(dir);
    }
    std::env::temp_dir()
}
