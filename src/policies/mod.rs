//! Retry policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how long `BackoffWait` lasts after a failed build
//! - [`JitterPolicy`] randomization on top of that delay
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → fixed 5s, max=60s, jitter=None.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
