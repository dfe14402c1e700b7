//! Process probes for abstracting host liveness queries
//!
//! This module provides the trait and implementations for asking the host
//! whether a PID refers to a live process, enabling testing with mock
//! implementations. The PID resolver never trusts a channel report without
//! probing it first, and the process registry uses the same probe to compute
//! activity flags for stored records.
//!
//! ## PID reuse
//!
//! A bare "does PID exist" query can report a recycled PID as alive. Where
//! the platform exposes process start times, [`ProcessProbe::start_time`]
//! lets callers cross-check a recorded start time against the current
//! occupant of the PID; a disagreement of more than one second means the
//! original process is gone.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Tolerance when comparing process start times, in seconds
pub const START_TIME_TOLERANCE_SECS: f64 = 1.0;

/// Trait for querying process liveness on the host
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    /// Check whether `pid` refers to a currently live process
    fn is_alive(&self, pid: u32) -> bool;

    /// Start time of `pid` in seconds since the epoch, when the platform
    /// exposes it
    async fn start_time(&self, pid: u32) -> Option<f64>;
}

/// Check whether a recorded start time still matches the probed one.
///
/// Returns true when either side is unknown; the cross-check is an optional
/// strengthening, not a requirement.
pub fn start_time_matches(recorded: Option<f64>, probed: Option<f64>) -> bool {
    match (recorded, probed) {
        (Some(recorded), Some(probed)) => {
            (recorded - probed).abs() <= START_TIME_TOLERANCE_SECS
        }
        _ => true,
    }
}

/// Probe implementation backed by the host OS
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl HostProbe {
    /// Create a new host probe
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessProbe for HostProbe {
    /// Signal-0 existence probe.
    ///
    /// `EPERM` means the process exists but belongs to another user, so it
    /// counts as alive; `ESRCH` and every other failure count as dead.
    /// PID 0 and negative values address process groups, never a single
    /// process, and are never alive.
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        if pid == 0 || pid > i32::MAX as u32 {
            return false;
        }

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        false
    }

    /// Read the process start time from `/proc/<pid>/stat`.
    ///
    /// The starttime field is in clock ticks since boot; it is converted to
    /// seconds since the epoch using the boot time from `/proc/stat`.
    /// Returns `None` on platforms without procfs or when any step fails.
    #[cfg(target_os = "linux")]
    async fn start_time(&self, pid: u32) -> Option<f64> {
        let stat = tokio::fs::read_to_string(format!("/proc/{pid}/stat"))
            .await
            .ok()?;
        // The comm field is wrapped in parens and may contain spaces;
        // everything after the closing paren is whitespace-separated.
        let after_comm = stat.rsplit_once(')')?.1;
        // starttime is field 22 of the stat line; state is field 3 and the
        // first token after the comm paren.
        let ticks: f64 = after_comm.split_whitespace().nth(19)?.parse().ok()?;

        let ticks_per_sec = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        if ticks_per_sec <= 0 {
            return None;
        }

        let boot_time = boot_time_secs().await?;
        Some(boot_time + ticks / ticks_per_sec as f64)
    }

    #[cfg(not(target_os = "linux"))]
    async fn start_time(&self, _pid: u32) -> Option<f64> {
        None
    }
}

/// Boot time of the host in seconds since the epoch, from `/proc/stat`
#[cfg(target_os = "linux")]
async fn boot_time_secs() -> Option<f64> {
    let stat = tokio::fs::read_to_string("/proc/stat").await.ok()?;
    for line in stat.lines() {
        if let Some(rest) = line.strip_prefix("btime ") {
            return rest.trim().parse().ok();
        }
    }
    None
}

/// Mock probe for testing
///
/// Tracks an explicit set of "live" PIDs and optional start times so
/// resolver and registry tests can run without spawning real processes.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    live: Arc<Mutex<HashSet<u32>>>,
    start_times: Arc<Mutex<HashMap<u32, f64>>>,
}

impl MockProbe {
    /// Create a mock probe with no live processes
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a PID as live
    pub fn add_live(&self, pid: u32) {
        self.live.lock().unwrap().insert(pid);
    }

    /// Mark a PID as dead
    pub fn remove_live(&self, pid: u32) {
        self.live.lock().unwrap().remove(&pid);
    }

    /// Set the start time reported for a PID
    pub fn set_start_time(&self, pid: u32, start_time: f64) {
        self.start_times.lock().unwrap().insert(pid, start_time);
    }
}

#[async_trait]
impl ProcessProbe for MockProbe {
    fn is_alive(&self, pid: u32) -> bool {
        self.live.lock().unwrap().contains(&pid)
    }

    async fn start_time(&self, pid: u32) -> Option<f64> {
        self.start_times.lock().unwrap().get(&pid).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_probe_own_process_is_alive() {
        let probe = HostProbe::new();
        assert!(probe.is_alive(std::process::id()));
    }

    #[test]
    fn test_host_probe_rejects_pid_zero() {
        let probe = HostProbe::new();
        assert!(!probe.is_alive(0));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_host_probe_own_start_time() {
        let probe = HostProbe::new();
        let start = probe.start_time(std::process::id()).await;
        let start = start.expect("own process start time should be readable");
        // Sanity: start time is in the past but after the epoch
        assert!(start > 0.0);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        assert!(start <= now + START_TIME_TOLERANCE_SECS);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_host_probe_start_time_for_dead_pid() {
        let probe = HostProbe::new();
        // PID u32::MAX - 1 is far above any default pid_max
        assert_eq!(probe.start_time(u32::MAX - 1).await, None);
    }

    #[test]
    fn test_start_time_matches_tolerance() {
        assert!(start_time_matches(Some(100.0), Some(100.5)));
        assert!(!start_time_matches(Some(100.0), Some(102.0)));
        // Unknown on either side never fails the check
        assert!(start_time_matches(None, Some(100.0)));
        assert!(start_time_matches(Some(100.0), None));
        assert!(start_time_matches(None, None));
    }

    #[tokio::test]
    async fn test_mock_probe() {
        let probe = MockProbe::new();
        assert!(!probe.is_alive(42));

        probe.add_live(42);
        probe.set_start_time(42, 1700000000.0);
        assert!(probe.is_alive(42));
        assert_eq!(probe.start_time(42).await, Some(1700000000.0));

        probe.remove_live(42);
        assert!(!probe.is_alive(42));
    }
}
