//! Runtime core: the lifecycle loop and its building blocks.
//!
//! The public surface is [`SupervisorBuilder`], [`LifecycleSupervisor`] and
//! [`SupervisorHandle`]; the rest is exposed for embedding applications that want to
//! reason about phases and reactions.
//!
//! Internal modules:
//! - [`phase`]: phase enum and the transition table;
//! - [`watchdog`]: liveness check against the frame probe;
//! - [`monitor`]: classification of graph status messages;
//! - `handle`: control requests and status snapshots;
//! - `supervisor`: the loop that owns the graph;
//! - `builder`: wiring of a supervisor and its handle.

mod builder;
mod handle;
pub mod monitor;
pub mod phase;
mod supervisor;
pub mod watchdog;

pub use builder::SupervisorBuilder;
pub use handle::{Request, SupervisorHandle, SupervisorStatus};
pub use monitor::{BusEventMonitor, MonitorView, Reaction};
pub use phase::{Phase, RestartCause};
pub use supervisor::{BranchOf, LifecycleSupervisor};
pub use watchdog::{Verdict, Watchdog};
