//! Process handle: the caller-facing object tracking one launch
//!
//! A [`ProcessHandle`] is returned by the launcher as soon as the OS spawn
//! call succeeds and stays valid through both phases of a launch:
//!
//! 1. **Resolution**: a background task polls the resolution channel; the
//!    handle observes its progress through a watch channel and may cancel it
//! 2. **Liveness tracking**: once resolution is terminal, liveness, wait and
//!    terminate operations act on the resolved PID, never the raw one —
//!    which is the entire reason resolution exists
//!
//! The handle is exclusively owned by the caller. When the resolved PID is
//! the spawned child itself the OS wait channel delivers the real exit
//! status; when a wrapper reported a different PID, exit is observed by
//! liveness polling and the exit code is unavailable.

use crate::probe::ProcessProbe;
use crate::process::unix;
use crate::{LaunchError, Result};
use schema::{Resolution, ResolutionSource, ResolutionState, ResolverConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

/// How long to wait for a process to disappear after SIGKILL
const KILL_WAIT: Duration = Duration::from_secs(5);

/// Handle for a detached launch
pub struct ProcessHandle {
    /// PID returned by the OS spawn call
    raw_pid: u32,
    /// OS child handle, present until handed to a background reaper
    child: Option<Child>,
    /// Resolution progress published by the resolver task
    resolution_rx: watch::Receiver<Resolution>,
    /// Cooperative cancellation signal for the resolver task
    cancel_tx: watch::Sender<bool>,
    /// Host liveness probe
    probe: Arc<dyn ProcessProbe>,
    /// Polling tunables, reused for liveness polls after resolution
    config: ResolverConfig,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("raw_pid", &self.raw_pid)
            .field("resolution", &self.resolution())
            .finish()
    }
}

impl ProcessHandle {
    pub(crate) fn new(
        raw_pid: u32,
        child: Child,
        resolution_rx: watch::Receiver<Resolution>,
        cancel_tx: watch::Sender<bool>,
        probe: Arc<dyn ProcessProbe>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            raw_pid,
            child: Some(child),
            resolution_rx,
            cancel_tx,
            probe,
            config,
        }
    }

    /// PID returned by the OS spawn call
    pub fn raw_pid(&self) -> u32 {
        self.raw_pid
    }

    /// Current resolution snapshot
    pub fn resolution(&self) -> Resolution {
        *self.resolution_rx.borrow()
    }

    /// The PID considered authoritative so far.
    ///
    /// Equals [`ProcessHandle::raw_pid`] until a channel report is accepted;
    /// immutable once resolution is terminal.
    pub fn resolved_pid(&self) -> u32 {
        self.resolution().pid
    }

    /// Current resolution state
    pub fn resolution_state(&self) -> ResolutionState {
        self.resolution().state
    }

    /// Where the resolved PID came from
    pub fn resolution_source(&self) -> ResolutionSource {
        self.resolution().source
    }

    /// Abort resolution.
    ///
    /// The resolver observes the signal within one polling interval and
    /// terminates in `Cancelled` with the spawn PID as fallback. Calling
    /// this after resolution has already terminated has no effect.
    pub fn cancel_resolution(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Wait until resolution reaches a terminal state and return it.
    ///
    /// Resolution is bounded by the polling budget, so this never blocks
    /// longer than budget plus one interval.
    pub async fn wait_resolved(&self) -> Resolution {
        let mut rx = self.resolution_rx.clone();
        loop {
            let snapshot = *rx.borrow_and_update();
            if snapshot.state.is_terminal() {
                return snapshot;
            }
            if rx.changed().await.is_err() {
                // Resolver task is gone; the last published value stands
                return *rx.borrow();
            }
        }
    }

    /// Check whether the resolved process is currently running.
    ///
    /// When the resolved PID is our own child this reaps it first, so an
    /// exited-but-unreaped child is not mistaken for a live process.
    pub fn is_alive(&mut self) -> bool {
        let pid = self.resolved_pid();
        if pid == self.raw_pid {
            if let Some(child) = &mut self.child {
                match child.try_wait() {
                    Ok(Some(_)) => return false,
                    Ok(None) => return true,
                    Err(e) => {
                        warn!("try_wait failed for process {}: {}", pid, e);
                    }
                }
            }
        }
        self.probe.is_alive(pid)
    }

    /// Wait for the resolved process to exit.
    ///
    /// Resolution is awaited first (bounded by the budget). For our own
    /// child the OS wait channel delivers the real exit code, including a
    /// status forwarded by a wrapper that blocked on the application. For a
    /// resolved non-child process, exit is observed by liveness polling and
    /// the exit code is unavailable (`Ok(None)`).
    ///
    /// With a timeout, a still-running process yields a `Wait` error.
    pub async fn wait(&mut self, wait_timeout: Option<Duration>) -> Result<Option<i32>> {
        let resolution = self.wait_resolved().await;

        if resolution.pid == self.raw_pid {
            if let Some(child) = self.child.as_mut() {
                return Self::wait_child(child, self.raw_pid, wait_timeout).await;
            }
        } else {
            // The wrapper's own exit is no longer interesting; reap it in
            // the background so it cannot linger as a zombie.
            self.reap_in_background();
        }

        self.poll_until_gone(resolution.pid, wait_timeout).await
    }

    /// Terminate the resolved process.
    ///
    /// Sends SIGTERM, waits up to `grace` for exit, then escalates to
    /// SIGKILL. Our own detached child is a session leader, so it receives
    /// group signals covering its whole process tree; a resolved non-child
    /// PID is signalled individually. Already-exited targets are success.
    pub async fn terminate(&mut self, grace: Duration) -> Result<()> {
        let resolution = self.wait_resolved().await;
        let pid = resolution.pid;

        if pid == self.raw_pid {
            unix::signal_term_group(pid)?;
        } else {
            self.reap_in_background();
            unix::signal_term(pid)?;
        }

        if self.await_exit(pid, grace).await? {
            debug!("Process {} exited gracefully", pid);
            return Ok(());
        }

        warn!(
            "Process {} did not exit within {:?}, using SIGKILL",
            pid, grace
        );
        if pid == self.raw_pid {
            unix::signal_kill_group(pid)?;
        } else {
            unix::signal_kill(pid)?;
        }

        if self.await_exit(pid, KILL_WAIT).await? {
            return Ok(());
        }

        // If it still hasn't exited after SIGKILL, something is seriously wrong
        Err(LaunchError::Wait(format!(
            "Process {} did not exit even after SIGKILL within {:?}",
            pid, KILL_WAIT
        )))
    }

    /// Wait on our own child through the OS, honoring an optional timeout
    async fn wait_child(
        child: &mut Child,
        pid: u32,
        wait_timeout: Option<Duration>,
    ) -> Result<Option<i32>> {
        let status = match wait_timeout {
            Some(limit) => timeout(limit, child.wait()).await.map_err(|_| {
                LaunchError::Wait(format!("Process {} did not exit within {:?}", pid, limit))
            })?,
            None => child.wait().await,
        }
        .map_err(|e| LaunchError::Wait(format!("Failed to wait for process {}: {}", pid, e)))?;
        Ok(status.code())
    }

    /// Poll host liveness until the process disappears or the timeout hits
    async fn poll_until_gone(
        &self,
        pid: u32,
        wait_timeout: Option<Duration>,
    ) -> Result<Option<i32>> {
        let deadline = wait_timeout.map(|limit| (Instant::now() + limit, limit));
        while self.probe.is_alive(pid) {
            if let Some((deadline, limit)) = deadline {
                if Instant::now() >= deadline {
                    return Err(LaunchError::Wait(format!(
                        "Process {} did not exit within {:?}",
                        pid, limit
                    )));
                }
            }
            sleep(self.config.interval()).await;
        }
        // Exit observed externally; the exit code is not available for a
        // process that was never our child
        Ok(None)
    }

    /// Wait up to `limit` for the process to exit, returning whether it did
    async fn await_exit(&mut self, pid: u32, limit: Duration) -> Result<bool> {
        if pid == self.raw_pid {
            if let Some(child) = &mut self.child {
                return match timeout(limit, child.wait()).await {
                    Ok(Ok(_status)) => Ok(true),
                    Ok(Err(e)) => Err(LaunchError::Wait(format!(
                        "Failed to wait for process {}: {}",
                        pid, e
                    ))),
                    Err(_) => Ok(false),
                };
            }
        }

        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if !self.probe.is_alive(pid) {
                return Ok(true);
            }
            sleep(self.config.interval()).await;
        }
        Ok(!self.probe.is_alive(pid))
    }

    /// Hand the raw child to a background task for reaping.
    ///
    /// Used once resolution replaced the PID: the wrapper's exit status is
    /// no longer meaningful, but it must still be reaped to avoid zombies.
    fn reap_in_background(&mut self) {
        if let Some(mut child) = self.child.take() {
            let raw_pid = self.raw_pid;
            tokio::spawn(async move {
                if let Ok(status) = child.wait().await {
                    debug!("Reaped wrapper process {} ({})", raw_pid, status);
                }
            });
        }
    }
}
