//! PID resolver: bounded polling of the resolution channel
//!
//! This module contains the [`PidResolver`] task that decides, within a
//! bounded time budget, which PID is authoritative for one launch. It is a
//! single-slot mailbox consumer with an untrusted, possibly-absent producer:
//!
//! - empty or unreadable channel content means "not yet", never failure
//! - malformed content is tolerated, since the writer may be mid-flush; a
//!   single garbage read is never a final verdict
//! - a well-formed report is only accepted after the host confirms the PID
//!   is live; stale or spoofed reports are ignored and polling continues
//! - the first live-verified report wins and ends polling, even if further
//!   writes follow later
//! - an exhausted budget falls back to the spawn PID, which is always usable
//!
//! Cancellation is cooperative and checked every iteration, so cancel
//! latency is bounded by the polling interval, not the budget. One resolver
//! task runs per launch; concurrent launches share no state.

use crate::channel::{ChannelRead, ResolutionChannel};
use crate::probe::ProcessProbe;
use schema::{Resolution, ResolverConfig};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Per-launch resolution task state
pub(crate) struct PidResolver {
    channel: ResolutionChannel,
    raw_pid: u32,
    probe: Arc<dyn ProcessProbe>,
    config: ResolverConfig,
    resolution_tx: watch::Sender<Resolution>,
    cancel_rx: watch::Receiver<bool>,
}

impl PidResolver {
    pub(crate) fn new(
        channel: ResolutionChannel,
        raw_pid: u32,
        probe: Arc<dyn ProcessProbe>,
        config: ResolverConfig,
        resolution_tx: watch::Sender<Resolution>,
        cancel_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            channel,
            raw_pid,
            probe,
            config,
            resolution_tx,
            cancel_rx,
        }
    }

    /// Run the polling loop to its terminal state.
    ///
    /// The terminal snapshot is published through the watch channel exactly
    /// once; the channel file is deleted on every terminal path.
    pub(crate) async fn run(mut self) {
        let deadline = Instant::now() + self.config.budget();
        let mut cancel_closed = false;

        loop {
            if *self.cancel_rx.borrow() {
                debug!(
                    "Resolution for pid {} cancelled by caller",
                    self.raw_pid
                );
                self.finish(Resolution::cancelled(self.raw_pid));
                return;
            }

            match self.channel.read_report() {
                ChannelRead::Reported(reported) => {
                    if self.probe.is_alive(reported) {
                        info!(
                            "Child reported live pid {} (spawn pid {})",
                            reported, self.raw_pid
                        );
                        self.finish(Resolution::resolved(reported));
                        return;
                    }
                    // A report naming a dead process is not authoritative;
                    // the writer may still replace it within budget.
                    debug!(
                        "Ignoring report of non-live pid {} (spawn pid {})",
                        reported, self.raw_pid
                    );
                }
                ChannelRead::Malformed => {
                    debug!(
                        "Malformed channel content for pid {}, re-polling",
                        self.raw_pid
                    );
                }
                ChannelRead::Empty => {}
            }

            if Instant::now() >= deadline {
                debug!(
                    "Resolution budget exhausted for pid {}, keeping spawn pid",
                    self.raw_pid
                );
                self.finish(Resolution::timed_out(self.raw_pid));
                return;
            }

            // Wake early on cancellation so cancel latency stays bounded by
            // the polling interval even while sleeping.
            if cancel_closed {
                sleep(self.config.interval()).await;
            } else {
                tokio::select! {
                    _ = sleep(self.config.interval()) => {}
                    changed = self.cancel_rx.changed() => {
                        if changed.is_err() {
                            // Cancel sender dropped with the handle; nobody
                            // is waiting for a precise outcome anymore, but
                            // the protocol still terminates via the budget.
                            warn!(
                                "Cancel channel closed while resolving pid {}",
                                self.raw_pid
                            );
                            cancel_closed = true;
                        }
                    }
                }
            }
        }
    }

    /// Publish the terminal snapshot and clean up the channel file
    fn finish(&self, resolution: Resolution) {
        self.channel.remove();
        let _ = self.resolution_tx.send(resolution);
    }
}
