//! # Retry delay after a failed build.
//!
//! When the backend cannot build a graph (missing plugin, camera not enumerated yet,
//! link failure) the supervisor parks in `BackoffWait` for [`BackoffPolicy::next`]
//! before the next attempt. The default is a fixed 5 second delay; `factor > 1.0`
//! turns it into an exponential schedule capped at `max`.
//!
//! The delay for consecutive failure `n` (0-based) is `first × factor^n`, clamped to
//! `max`, then jittered. The counter resets whenever a graph reaches `Running`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use pipevisor::{BackoffPolicy, JitterPolicy};
//!
//! let retry = BackoffPolicy {
//!     first: Duration::from_secs(1),
//!     max: Duration::from_secs(8),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//! assert_eq!(retry.next(0), Duration::from_secs(1));
//! assert_eq!(retry.next(2), Duration::from_secs(4));
//! assert_eq!(retry.next(10), Duration::from_secs(8));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Build-retry delay schedule.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay after the first failed build.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Growth per consecutive failure (`1.0` = fixed delay).
    pub factor: f64,
    /// Randomization applied to the clamped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Fixed 5 second retry delay, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(5),
            max: Duration::from_secs(60),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// A fixed delay with no growth and no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Delay before retrying after `failures` consecutive failed builds (0-based).
    pub fn next(&self, failures: u32) -> Duration {
        let exp = failures.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}
