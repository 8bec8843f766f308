//! # Watchdog: periodic liveness check against the frame probe.
//!
//! The watchdog owns no timer of its own. It exposes the instant of its next check
//! ([`Watchdog::deadline`]) and the supervisor loop folds that into its single
//! `sleep_until`. When the deadline is reached the loop calls [`Watchdog::check`].
//!
//! ```text
//!   arm(now) ──► deadline = now + interval
//!   check(now, probe):
//!       no frame yet            → NoFrameYet, reschedule
//!       now - last <= threshold → Healthy,    reschedule
//!       now - last >  threshold → Stalled,    disarm (re-armed on the next Running)
//! ```

use std::time::Duration;

use tokio::time::Instant;

use crate::pipeline::FrameProbe;

/// Result of one liveness check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    /// The probe has never fired; the graph is still warming up.
    NoFrameYet,
    /// Last frame is older than the threshold.
    Stalled { age: Duration },
}

#[derive(Debug)]
pub struct Watchdog {
    interval: Duration,
    threshold: Duration,
    next_check: Option<Instant>,
}

impl Watchdog {
    pub fn new(interval: Duration, threshold: Duration) -> Self {
        Self {
            interval,
            threshold,
            next_check: None,
        }
    }

    pub fn arm(&mut self, now: Instant) {
        self.next_check = Some(now + self.interval);
    }

    pub fn disarm(&mut self) {
        self.next_check = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_check.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next_check
    }

    /// Runs the check if it is due. Returns `None` when disarmed or not yet due.
    pub fn check(&mut self, now: Instant, probe: &FrameProbe) -> Option<Verdict> {
        match self.next_check {
            Some(at) if at <= now => {}
            _ => return None,
        }

        let verdict = match probe.last_frame() {
            None => Verdict::NoFrameYet,
            Some(last) => {
                let age = now.saturating_duration_since(last);
                if age > self.threshold {
                    Verdict::Stalled { age }
                } else {
                    Verdict::Healthy
                }
            }
        };

        if matches!(verdict, Verdict::Stalled { .. }) {
            self.disarm();
        } else {
            self.next_check = Some(now + self.interval);
        }
        Some(verdict)
    }
}
