//! # Event subscriber trait.
//!
//! [`Subscribe`] is the extension point for reacting to supervisor events outside the
//! loop: logging, mirroring the phase to a status page, counting restarts.
//!
//! Each subscriber gets a dedicated worker task and a bounded queue. A slow or
//! panicking subscriber only affects itself; the supervisor loop never waits for it.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use pipevisor::{Event, EventKind, Subscribe};
//!
//! struct RestartCounter;
//!
//! #[async_trait]
//! impl Subscribe for RestartCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::RestartRequested {
//!             // bump a counter
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "restart-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor (it is shared with the supervisor loop).
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event. Events arrive in publication order.
    async fn on_event(&self, event: &Event);

    /// Name used when reporting overflow or panics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to at least 1). Default: 256.
    fn queue_capacity(&self) -> usize {
        256
    }
}
