//! Process management utilities for the launchkit core library
//!
//! This module provides platform-specific implementations for detached
//! process spawning, signalling and lifecycle management.
//!
//! ## Platform Support
//!
//! - **Unix**: Full support; detachment via `setsid()` process groups
//!
//! ## Safety
//!
//! The implementations prioritize safe process management by:
//! - Detaching spawned processes into their own session so their lifetime is
//!   independent of the launcher
//! - Providing both graceful and forceful termination, with group signalling
//!   for processes we spawned and plain signalling for resolved PIDs we did
//!   not spawn
//! - Treating already-exited targets as success rather than errors

#[cfg(unix)]
pub mod unix;

#[cfg(unix)]
pub use unix::*;
