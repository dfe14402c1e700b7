//! Core functionality for the launchkit project
//!
//! This crate launches external applications as detached processes and
//! resolves which PID is authoritative for each launch. Some platforms
//! start applications through an intermediate wrapper script, so the PID
//! returned by the spawn call may belong to the wrapper rather than the
//! application; a file-based handshake lets the wrapper report the real
//! PID back, and a bounded polling protocol decides which value wins.
//!
//! ## Components
//!
//! - [`channel`]: the per-launch on-disk mailbox between launcher and wrapper
//! - [`process`]: detached spawning and signalling (Unix sessions)
//! - [`resolver`]: the bounded polling protocol deciding the final PID
//! - [`handle`]: the caller-facing handle with resolution state and
//!   liveness/wait/terminate operations
//! - [`probe`]: host liveness queries behind a mockable trait
//! - [`registry`]: persisted records of launched processes

pub mod channel;
pub mod error;
#[cfg(unix)]
pub mod handle;
#[cfg(unix)]
pub mod launcher;
pub mod probe;
#[cfg(unix)]
pub mod process;
pub mod registry;

mod resolver;

pub use channel::{ResolutionChannel, PID_FILE_ENV, RUNTIME_DIR_ENV};
pub use error::{LaunchError, Result};
#[cfg(unix)]
pub use handle::ProcessHandle;
#[cfg(unix)]
pub use launcher::{launch, launch_with_probe};
pub use probe::{HostProbe, MockProbe, ProcessProbe};
pub use registry::{default_registry_path, ProcessRegistry, RegistryEntry};

// Re-export schema types for convenience
pub use schema::{
    LaunchRequest, ProcessRecord, Resolution, ResolutionSource, ResolutionState, ResolverConfig,
};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::LaunchError::Validation(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
