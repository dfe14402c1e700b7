//! Unix detached spawning and signalling using process sessions
//!
//! This module spawns launch requests detached from the launcher: the child
//! is placed in its own session via `setsid()`, has no controlling terminal,
//! and survives launcher exit. Signals can target either the whole process
//! group (for children we spawned, which are session leaders) or a single
//! PID (for resolved processes we did not spawn ourselves).
//!
//! ## Process Sessions
//!
//! When a process calls `setsid()`, it:
//! - Creates a new session and becomes the session leader
//! - Creates a new process group and becomes the process group leader
//! - Has no controlling terminal
//!
//! This makes the child's lifetime independent of the launcher and allows
//! signalling its entire process tree through the process group.

// Allow unsafe code for this module since detachment requires libc::setsid()
#![allow(unsafe_code)]

use crate::channel::PID_FILE_ENV;
use crate::{LaunchError, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use schema::LaunchRequest;
#[allow(unused_imports)]
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, error};

/// A child process spawned detached into its own session
#[derive(Debug)]
pub struct DetachedChild {
    /// The process ID of the spawned process
    pid: Pid,
    /// The underlying Child handle for waiting and status checking
    child: Child,
}

impl DetachedChild {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Wait for the process to exit and return its exit status (async)
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        self.child.wait().await.map_err(|e| {
            LaunchError::Wait(format!("Failed to wait for process {}: {}", self.pid, e))
        })
    }

    /// Try to wait for the process to exit without blocking
    pub fn try_wait(&mut self) -> Result<Option<std::process::ExitStatus>> {
        self.child.try_wait().map_err(|e| {
            LaunchError::Wait(format!(
                "Failed to try_wait for process {}: {}",
                self.pid, e
            ))
        })
    }

    /// Consume the wrapper and return the underlying tokio child
    pub fn into_inner(self) -> Child {
        self.child
    }
}

/// Spawn a launch request detached from the launcher.
///
/// The process is placed in its own session via `setsid()` in `pre_exec`, so
/// it survives launcher exit and never becomes a zombie attached to the
/// launcher. Standard streams are redirected to the null device since a
/// detached child must not hold the launcher's terminal.
///
/// The child environment is the launcher environment overlaid with
/// `request.environment`; when `pid_file` is given it is additionally
/// exported as [`PID_FILE_ENV`] so a cooperating wrapper can report the PID
/// of the process it spawns itself.
///
/// ## Failure conditions
///
/// Missing executable, permission denied and an invalid working directory
/// all surface immediately as [`LaunchError::Spawn`]; no child is created.
///
/// ## Safety
///
/// This function uses `unsafe` code to call `libc::setsid()` in the
/// `pre_exec` closure. The safety is ensured because:
/// - `setsid()` is called in the child process before `exec()`
/// - `setsid()` is async-signal-safe and appropriate for use in `pre_exec`
/// - Error handling properly converts C errors to Rust errors
pub fn spawn_detached(request: &LaunchRequest, pid_file: Option<&Path>) -> Result<DetachedChild> {
    debug!(
        "Spawning detached process '{}': {} {:?}",
        request.name, request.command, request.args
    );

    let mut command = Command::new(&request.command);
    command.args(&request.args);
    command.envs(&request.environment);
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());
    command.stderr(Stdio::null());

    if let Some(path) = pid_file {
        command.env(PID_FILE_ENV, path);
    }

    if let Some(cwd) = &request.working_directory {
        // Command::spawn reports a missing cwd with the same NotFound kind as
        // a missing executable; check up front so the error names the cause.
        if !Path::new(cwd).is_dir() {
            return Err(LaunchError::Spawn(format!(
                "Working directory '{}' does not exist",
                cwd
            )));
        }
        command.current_dir(cwd);
    }

    // Use pre_exec to call setsid() in the child process
    // Safety: setsid() is async-signal-safe and appropriate for use in pre_exec
    #[deny(unsafe_op_in_unsafe_fn)]
    unsafe {
        command.pre_exec(|| {
            // Create a new session and process group
            let result = libc::setsid();
            if result == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| {
        error!("Failed to spawn process '{}': {}", request.command, e);
        LaunchError::Spawn(format!("Failed to spawn '{}': {}", request.command, e))
    })?;

    // tokio::process::Child::id() may return Option on some platforms
    let raw_pid = child
        .id()
        .ok_or_else(|| LaunchError::Spawn("Spawned child did not have a PID".to_string()))?;
    let pid = Pid::from_raw(raw_pid as i32);
    debug!("Successfully spawned detached process {}", pid);

    Ok(DetachedChild { pid, child })
}

/// Send a signal to the process group led by `pid` for children we spawned.
///
/// `ESRCH` (no such process) and `EPERM` (ownership changed, process likely
/// gone) are treated as success since the group has already exited.
fn signal_group(pid: u32, signal: Signal) -> Result<()> {
    let pid = Pid::from_raw(pid as i32);
    debug!("Sending {} to process group {}", signal, pid);

    match killpg(pid, signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!("Process group {} already exited", pid);
            Ok(())
        }
        Err(Errno::EPERM) => {
            debug!(
                "Permission denied signalling process group {} (likely already exited)",
                pid
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to send {} to process group {}: {}", signal, pid, e);
            Err(LaunchError::Signal(format!(
                "Failed to send {} to process group {}: {}",
                signal, pid, e
            )))
        }
    }
}

/// Send a signal to a single PID, for resolved processes we did not spawn.
///
/// Same `ESRCH`/`EPERM` tolerance as [`signal_group`].
fn signal_pid(pid: u32, signal: Signal) -> Result<()> {
    let pid = Pid::from_raw(pid as i32);
    debug!("Sending {} to process {}", signal, pid);

    match kill(pid, signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            debug!("Process {} already exited", pid);
            Ok(())
        }
        Err(Errno::EPERM) => {
            debug!(
                "Permission denied signalling process {} (likely already exited)",
                pid
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to send {} to process {}: {}", signal, pid, e);
            Err(LaunchError::Signal(format!(
                "Failed to send {} to process {}: {}",
                signal, pid, e
            )))
        }
    }
}

/// SIGTERM the process group led by `pid` for graceful termination
pub fn signal_term_group(pid: u32) -> Result<()> {
    signal_group(pid, Signal::SIGTERM)
}

/// SIGKILL the process group led by `pid` for forceful termination
pub fn signal_kill_group(pid: u32) -> Result<()> {
    signal_group(pid, Signal::SIGKILL)
}

/// SIGTERM a single process for graceful termination
pub fn signal_term(pid: u32) -> Result<()> {
    signal_pid(pid, Signal::SIGTERM)
}

/// SIGKILL a single process for forceful termination
pub fn signal_kill(pid: u32) -> Result<()> {
    signal_pid(pid, Signal::SIGKILL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(command: &str, args: &[&str]) -> LaunchRequest {
        LaunchRequest {
            name: "test".to_string(),
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            environment: HashMap::new(),
            working_directory: None,
        }
    }

    #[tokio::test]
    async fn test_spawn_simple_command() {
        let child = spawn_detached(&request("echo", &["hello"]), None)
            .expect("Failed to spawn echo");
        assert!(child.pid() > 0);
    }

    #[tokio::test]
    async fn test_spawn_and_wait() {
        let mut child =
            spawn_detached(&request("true", &[]), None).expect("Failed to spawn true");
        let status = child.wait().await.expect("Failed to wait for process");
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_command() {
        let result = spawn_detached(&request("nonexistent_command_12345", &[]), None);
        match result.unwrap_err() {
            LaunchError::Spawn(_) => {}
            e => panic!("Expected Spawn error, got: {}", e),
        }
    }

    #[tokio::test]
    async fn test_spawn_invalid_working_directory() {
        let mut req = request("true", &[]);
        req.working_directory = Some("/nonexistent/launchkit-test-dir".to_string());
        let result = spawn_detached(&req, None);
        match result.unwrap_err() {
            LaunchError::Spawn(msg) => assert!(msg.contains("Working directory")),
            e => panic!("Expected Spawn error, got: {}", e),
        }
    }

    #[tokio::test]
    async fn test_spawn_injects_pid_file_env() {
        // The child writes the injected variable back out so we can assert
        // on what it actually saw.
        let out = format!(
            "{}/launchkit-env-echo-{}.txt",
            std::env::temp_dir().display(),
            std::process::id()
        );
        let mut child = spawn_detached(
            &request("sh", &["-c", &format!("echo \"${}\" > {}", PID_FILE_ENV, out)]),
            Some(Path::new("/tmp/launchkit-test-channel.pid")),
        )
        .expect("Failed to spawn sh");
        child.wait().await.expect("Failed to wait");

        let content = std::fs::read_to_string(&out).expect("child did not write env file");
        assert_eq!(content.trim(), "/tmp/launchkit-test-channel.pid");
        let _ = std::fs::remove_file(&out);
    }

    #[tokio::test]
    async fn test_signal_term_nonexistent_process() {
        // Should succeed because ESRCH is treated as success
        assert!(signal_term_group(99999).is_ok());
        assert!(signal_term(99999).is_ok());
    }

    #[tokio::test]
    async fn test_signal_kill_nonexistent_process() {
        assert!(signal_kill_group(99999).is_ok());
        assert!(signal_kill(99999).is_ok());
    }
}
