//! Launch orchestration: spawn detached, then resolve the authoritative PID
//!
//! [`launch`] is the single entry point of the subsystem. It allocates a
//! resolution channel, spawns the request detached with the channel path
//! injected into the child environment, and starts one resolver task for the
//! launch. The returned [`ProcessHandle`] is immediately usable; resolution
//! proceeds in the background and callers can await it, poll it or cancel it
//! through the handle.
//!
//! A failure to create the channel file degrades gracefully: the launch
//! still happens, just without resolution capability, and the handle starts
//! in the terminal `Failed` state trusting the spawn PID. Only the spawn
//! itself can fail a launch.

use crate::channel::ResolutionChannel;
use crate::handle::ProcessHandle;
use crate::probe::{HostProbe, ProcessProbe};
use crate::process::unix::spawn_detached;
use crate::resolver::PidResolver;
use crate::Result;
use schema::{LaunchRequest, Resolution, ResolverConfig};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Launch a request as a detached process and start PID resolution.
///
/// Must be called from within a tokio runtime, since the resolver runs as a
/// background task. Returns as soon as the spawn call succeeds; the handle's
/// resolution state starts `Pending` and reaches a terminal state within the
/// configured budget.
///
/// # Errors
///
/// Only a failed spawn (missing executable, permission denied, invalid
/// working directory) is an error. Every other condition resolves into a
/// terminal resolution state on the handle.
pub fn launch(request: &LaunchRequest, config: ResolverConfig) -> Result<ProcessHandle> {
    launch_with_probe(request, config, Arc::new(HostProbe::new()))
}

/// [`launch`] with an explicit probe implementation, for tests
pub fn launch_with_probe(
    request: &LaunchRequest,
    config: ResolverConfig,
    probe: Arc<dyn ProcessProbe>,
) -> Result<ProcessHandle> {
    let channel = ResolutionChannel::allocate();

    // Create the mailbox before spawn so a racing early-writing child never
    // finds a missing target. Failure here must not block the launch.
    let channel_ready = match channel.create_empty() {
        Ok(()) => true,
        Err(e) => {
            warn!(
                "Proceeding without PID resolution for '{}': {}",
                request.name, e
            );
            false
        }
    };

    let pid_file = channel_ready.then(|| channel.path().to_path_buf());
    let child = spawn_detached(request, pid_file.as_deref())?;
    let raw_pid = child.pid();
    info!(
        "Launched '{}' as detached process {} (resolution {})",
        request.name,
        raw_pid,
        if channel_ready { "pending" } else { "unavailable" }
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);

    if !channel_ready {
        // Degraded mode: no channel, nothing to poll. The handle starts in
        // the terminal fallback state and always trusts the spawn PID.
        let (_, resolution_rx) = watch::channel(Resolution::failed(raw_pid));
        return Ok(ProcessHandle::new(
            raw_pid,
            child.into_inner(),
            resolution_rx,
            cancel_tx,
            probe,
            config,
        ));
    }

    let (resolution_tx, resolution_rx) = watch::channel(Resolution::pending(raw_pid));
    let resolver = PidResolver::new(
        channel,
        raw_pid,
        probe.clone(),
        config,
        resolution_tx,
        cancel_rx,
    );
    tokio::spawn(resolver.run());

    Ok(ProcessHandle::new(
        raw_pid,
        child.into_inner(),
        resolution_rx,
        cancel_tx,
        probe,
        config,
    ))
}
