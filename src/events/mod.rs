//! Supervisor events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publisher**: the `LifecycleSupervisor` loop (transitions, watchdog, status
//!   reactions, recording branch) and `SubscriberSet` workers (panic reports are
//!   logged, not re-published).
//! - **Consumers**: the subscriber listener spawned by `LifecycleSupervisor::run`, and
//!   any receiver obtained from [`Bus::subscribe`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
