//! # Lifecycle events emitted by the supervisor loop.
//!
//! The [`EventKind`] enum classifies events across four groups:
//! - **Lifecycle**: phase transitions, builds, teardowns, backoff
//! - **Liveness**: watchdog timeouts, restart requests and their coalescing
//! - **Graph status**: warnings, errors and QoS reported by the running graph
//! - **Recording**: branch attach, refusal, drain and detach
//!
//! The [`Event`] struct carries optional metadata depending on the kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. All events are published from the single supervisor loop, so `seq`
//! order is the order in which things happened.
//!
//! ## Example
//! ```rust
//! use pipevisor::{Event, EventKind, Phase};
//!
//! let ev = Event::new(EventKind::PhaseChanged)
//!     .with_transition(Phase::Running, Phase::Restarting)
//!     .with_reason("watchdog");
//!
//! assert_eq!(ev.to, Some(Phase::Restarting));
//! assert_eq!(ev.reason.as_deref(), Some("watchdog"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::{Phase, RestartCause};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of supervisor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Lifecycle ===
    /// The supervisor moved between phases.
    ///
    /// Sets: `from`, `to`, optional `reason`.
    PhaseChanged,

    /// The backend built a graph and it was set to `Playing`.
    ///
    /// Sets: `generation`.
    GraphPlaying,

    /// A build attempt failed.
    ///
    /// Sets: `attempt` (consecutive failures, 1-based), `reason`.
    BuildFailed,

    /// The next build attempt is scheduled after a failure.
    ///
    /// Sets: `attempt`, `delay_ms`.
    BackoffScheduled,

    /// A graph was driven to `Null` and released.
    ///
    /// Sets: `generation`.
    GraphTornDown,

    // === Liveness ===
    /// The watchdog found the last frame older than the stall threshold.
    ///
    /// Sets: `generation`, `delay_ms` (age of the last frame).
    WatchdogTimeout,

    /// A restart was requested.
    ///
    /// Sets: `cause`, optional `reason`.
    RestartRequested,

    /// A restart request arrived while a rebuild was already pending and was folded
    /// into it.
    ///
    /// Sets: `cause`.
    RestartCoalesced,

    // === Graph status ===
    /// A stage of the main graph reported an error (a restart follows).
    ///
    /// Sets: `generation`, `source`, `reason`.
    GraphError,

    /// A stage reported a warning. Informational only.
    ///
    /// Sets: `generation`, `source`, `reason`.
    GraphWarning,

    /// A stage reported quality-of-service numbers. Informational only.
    ///
    /// Sets: `generation`, `source`, `reason` (rendered stats).
    GraphQos,

    /// The main graph reported end-of-stream (a restart follows).
    ///
    /// Sets: `generation`, `source`.
    GraphEndOfStream,

    // === Recording ===
    /// A recording branch was attached and is writing.
    ///
    /// Sets: `path`, `source` (attach point).
    RecordingStarted,

    /// A recording start was refused (no storage, no duplication point, ...).
    ///
    /// Sets: `reason`.
    RecordingRefused,

    /// End-of-stream was injected into the branch; cleanup follows after the grace.
    ///
    /// Sets: `path`.
    RecordingDraining,

    /// The branch was detached and its attach point released.
    ///
    /// Sets: `path`, `reason` (`"drained"` or `"forced"`).
    RecordingStopped,

    /// The branch output stage failed; the branch is torn down, the main graph kept.
    ///
    /// Sets: `source`, `reason`.
    RecordingFailed,

    // === Control ===
    /// An external control request reached the loop.
    ///
    /// Sets: `reason` (request name).
    ControlRequested,
}

/// Supervisor event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Phase before a transition.
    pub from: Option<Phase>,
    /// Phase after a transition.
    pub to: Option<Phase>,
    /// Why a restart was requested.
    pub cause: Option<RestartCause>,
    /// Generation of the graph the event concerns.
    pub generation: Option<u64>,
    /// Stage name or attach point the event concerns.
    pub source: Option<Arc<str>>,
    /// Human-readable reason (errors, refusals, stats).
    pub reason: Option<Arc<str>>,
    /// Recording destination.
    pub path: Option<Arc<str>>,
    /// Delay or age in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Attempt counter.
    pub attempt: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            from: None,
            to: None,
            cause: None,
            generation: None,
            source: None,
            reason: None,
            path: None,
            delay_ms: None,
            attempt: None,
        }
    }

    #[inline]
    pub fn with_transition(mut self, from: Phase, to: Phase) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    #[inline]
    pub fn with_cause(mut self, cause: RestartCause) -> Self {
        self.cause = Some(cause);
        self
    }

    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_path(mut self, path: impl Into<Arc<str>>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    #[inline]
    pub fn is_transition_to(&self, phase: Phase) -> bool {
        self.kind == EventKind::PhaseChanged && self.to == Some(phase)
    }
}
