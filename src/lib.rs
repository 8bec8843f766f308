//! # pipevisor
//!
//! **Pipevisor** keeps a long-running media graph alive on an embedded device.
//!
//! It builds the graph for a stream profile (camera sender or RTP receiver), restarts
//! it when it stalls or reports an error, and lets a secondary recording branch be
//! hot-plugged into the live graph without disturbing the primary output. Control
//! arrives as OS signals and is applied by a single cooperative loop.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   SIGUSR1/SIGUSR2/SIGINT/SIGTERM
//!              │
//!              ▼
//!      ┌──────────────┐  Request   ┌───────────────────────────────────────────────┐
//!      │ SignalBridge │──────────► │  LifecycleSupervisor (one current_thread loop) │
//!      └──────────────┘            │  - phase machine (core::phase)                │
//!                                  │  - Watchdog (frame age vs stall threshold)    │
//!   graph streaming threads        │  - BusEventMonitor (status → reaction)        │
//!     probe.mark() ──────────────► │  - RecordingBranchManager (tee branch)        │
//!     status.post(msg) ──────────► │  - MediaBackend (build / teardown)            │
//!                                  └──────┬───────────────────────┬────────────────┘
//!                                         │ publish(Event)        │ SharedStatus / Indicator
//!                                         ▼                       ▼
//!                              ┌────────────────────┐     /dev/shm/channel_data, REC led
//!                              │ Bus (broadcast)    │
//!                              └─────────┬──────────┘
//!                                        ▼
//!                               subscriber listener
//!                                        ▼
//!                                  SubscriberSet
//!                              ┌─────────┼─────────┐
//!                              ▼         ▼         ▼
//!                          LogWriter   custom    custom
//! ```
//!
//! ### Lifecycle
//! ```text
//! Stopped ─start─► Starting ─┬─ build ok, Playing ─► Running ─┬─ watchdog / Error / EOS / restart
//!                            │                                │      └─► Restarting: teardown,
//!                            │                                │          settle delay, Starting
//!                            └─ build failed ─► BackoffWait ──┘── retry delay ─► Starting
//!
//! Running | BackoffWait | Restarting ─stop─► Stopping: teardown ─► Stopped
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                              |
//! |-------------------|----------------------------------------------------------------|-------------------------------------------------|
//! | **Supervision**   | Phase machine, watchdog, restart coalescing, retry backoff.    | [`LifecycleSupervisor`], [`SupervisorHandle`]  |
//! | **Backends**      | Build graphs behind a narrow contract.                         | [`MediaBackend`], [`Graph`], [`Branch`]         |
//! | **Recording**     | Hot-plugged file branch, shared status flag, indicator.        | [`RecordingBranchManager`], [`SharedStatus`]    |
//! | **Subscriber API**| Hook into supervisor events (logging, custom subscribers).     | [`Subscribe`], [`LogWriter`]                    |
//! | **Policies**      | Retry delay schedule after failed builds.                      | [`BackoffPolicy`], [`JitterPolicy`]             |
//! | **Errors**        | Typed errors with stable labels.                               | [`BuildError`], [`BranchError`], [`SupervisorError`] |
//! | **Configuration** | Timing knobs, paths, stream profiles.                          | [`Config`], [`StreamProfile`]                   |
//!
//! ## Optional features
//! - `gst`: the GStreamer backend (`pipeline::gst`). Without it only the simulated
//!   backend (`pipeline::sim`) is available.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use pipevisor::pipeline::sim::SimBackend;
//! use pipevisor::{Config, LogWriter, Phase, SenderConfig, StreamProfile, Subscribe, SupervisorBuilder};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let profile = StreamProfile::Sender(SenderConfig {
//!         address: "192.168.1.10".parse()?,
//!         port: 5600,
//!         device: "/dev/video0".into(),
//!     });
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!
//!     let (backend, _ctl) = SimBackend::new();
//!     let (sup, handle) = SupervisorBuilder::new(Config::default(), profile)
//!         .with_subscribers(subs)
//!         .build(backend)?;
//!     let run = tokio::spawn(sup.run());
//!
//!     handle.start();
//!     assert!(handle.wait_phase(Phase::Running).await);
//!     handle.stop();
//!     run.await?;
//!     Ok(())
//! }
//! ```

mod config;
pub mod core;
mod error;
mod events;
pub mod pidfile;
pub mod pipeline;
mod policies;
pub mod recording;
#[cfg(unix)]
pub mod signals;
mod subscribers;

// ---- Public re-exports ----

pub use crate::config::{
    Codec, Config, DEFAULT_PAYLOAD_TYPE, DEFAULT_PORT, ReceiverConfig, SenderConfig,
    StreamProfile,
};
pub use crate::core::{
    LifecycleSupervisor, Phase, Request, RestartCause, SupervisorBuilder, SupervisorHandle,
    SupervisorStatus,
};
pub use crate::error::{
    BranchError, BuildError, ConfigError, StatusRegionError, StorageError, SupervisorError,
};
pub use crate::events::{Bus, Event, EventKind};
pub use crate::pipeline::{
    Branch, BranchSpec, FrameProbe, Graph, GraphContext, GraphState, MediaBackend, QosStats,
    StatusKind, StatusMessage, StatusSender,
};
pub use crate::policies::{BackoffPolicy, JitterPolicy};
pub use crate::recording::{
    Indicator, NoIndicator, RecordingBranchManager, RecordingState, SharedStatus,
    StorageLocator, SysfsLed, ToggleOutcome,
};
#[cfg(unix)]
pub use crate::signals::{ControlSignal, SignalBindings, SignalBridge};
pub use crate::subscribers::{LogWriter, Subscribe, SubscriberSet};
