//! # Media backend contract.
//!
//! The supervisor never touches processing stages directly. It talks to a
//! [`MediaBackend`] that builds a [`Graph`] for a [`StreamProfile`](crate::StreamProfile),
//! and to the graph through a handful of synchronous, bounded-latency calls.
//!
//! ```text
//!  LifecycleSupervisor ── build(profile, GraphContext) ──► MediaBackend
//!          │                                                   │
//!          │ owns                                              ▼
//!          └──────────────────────────────────────────────► Graph ──► Branch (recording)
//!                                                              │
//!     streaming threads:  probe.mark() (atomic store)          │
//!                         status.post(...) (mpsc send) ◄───────┘
//! ```
//!
//! ## Rules
//! - Every graph gets a fresh [`GraphContext`] with a new generation number; messages
//!   posted through it carry that generation so late messages from a torn-down graph
//!   can be discarded.
//! - Callbacks running on backend threads only ever call [`FrameProbe::mark`] or
//!   [`StatusSender::post`].
//! - [`Graph::teardown`] drives the graph to `Null` and releases every stage,
//!   including any branch that is still attached.
//! - Recording branch stages are named with [`BranchSpec::stage_name`], so a status
//!   message can be attributed to its branch by name alone ([`branch_session`]).
//!
//! Backends:
//! - [`sim`]: scripted in-process backend (tests, dry runs).
//! - `gst` (cargo feature `gst`): GStreamer.

mod liveness;
pub mod sim;

#[cfg(feature = "gst")]
pub mod gst;

use std::path::PathBuf;

use tokio::sync::mpsc;

pub use liveness::FrameProbe;

use crate::config::StreamProfile;
use crate::error::{BranchError, BuildError};

/// Run state of a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GraphState {
    Null,
    Ready,
    Paused,
    Playing,
}

/// What a graph reports on its status channel.
#[derive(Clone, Debug, PartialEq)]
pub enum StatusKind {
    /// A stage (or the whole graph) ran out of data.
    EndOfStream,
    /// A stage failed.
    Error {
        message: String,
        debug: Option<String>,
    },
    /// A stage reported a recoverable problem.
    Warning {
        message: String,
        debug: Option<String>,
    },
    /// A stage changed run state.
    StateChanged { old: GraphState, new: GraphState },
    /// Quality-of-service report (dropped/late buffers).
    QualityOfService(QosStats),
}

/// Quality-of-service numbers carried by [`StatusKind::QualityOfService`].
///
/// Times are nanoseconds; `None` when the stage did not provide them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QosStats {
    pub live: bool,
    pub running_time: Option<u64>,
    pub stream_time: Option<u64>,
    pub timestamp: Option<u64>,
    pub duration: Option<u64>,
    pub processed: u64,
    pub dropped: u64,
}

/// One status notification, stamped with the generation of the graph that emitted it.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusMessage {
    pub generation: u64,
    /// Name of the stage the message originates from.
    pub source: String,
    pub kind: StatusKind,
}

/// Posting side of a graph's status channel.
///
/// Cheap to clone; safe to call from any thread.
#[derive(Clone, Debug)]
pub struct StatusSender {
    generation: u64,
    tx: mpsc::UnboundedSender<StatusMessage>,
}

impl StatusSender {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<StatusMessage>) -> Self {
        Self { generation, tx }
    }

    /// Posts a message; returns `false` when the supervisor loop is gone.
    pub fn post(&self, source: impl Into<String>, kind: StatusKind) -> bool {
        self.tx
            .send(StatusMessage {
                generation: self.generation,
                source: source.into(),
                kind,
            })
            .is_ok()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Everything a backend needs to wire a new graph to the supervisor.
#[derive(Clone, Debug)]
pub struct GraphContext {
    pub generation: u64,
    /// Frame-arrival probe for the entry stage.
    pub probe: FrameProbe,
    /// Status channel for this graph.
    pub status: StatusSender,
}

/// Parameters of one recording branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchSpec {
    /// Session number, unique per process; used to keep stage names unique.
    pub session: u64,
    /// Destination container file.
    pub location: PathBuf,
}

/// Name prefixes of the recording branch stages, in link order.
pub const BRANCH_STAGES: [&str; 4] = ["queue-record", "parser-record", "muxer", "file-sink"];

/// Name prefix of the branch output stage.
pub const BRANCH_SINK: &str = "file-sink";

impl BranchSpec {
    /// `{prefix}-{session}`; backends name every branch stage this way.
    pub fn stage_name(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.session)
    }
}

/// Session number of a recording branch stage, recovered from its name.
///
/// Works after the branch is gone, so late messages from a detached branch are still
/// attributed to the recording side and never to the main graph.
pub fn branch_session(stage: &str) -> Option<u64> {
    BRANCH_STAGES.iter().find_map(|prefix| {
        stage
            .strip_prefix(prefix)?
            .strip_prefix('-')?
            .parse()
            .ok()
    })
}

/// Builds graphs.
pub trait MediaBackend {
    type Graph: Graph;

    /// Builds and links a graph. The graph is left in `Null`.
    fn build(&mut self, profile: &StreamProfile, ctx: GraphContext)
    -> Result<Self::Graph, BuildError>;
}

/// A built, linked graph.
pub trait Graph {
    type Branch: Branch;

    /// Requests a run-state change.
    fn set_state(&mut self, state: GraphState) -> Result<(), BuildError>;

    fn state(&self) -> GraphState;

    /// Obtains a fresh attach point on the duplication stage, then builds and links the
    /// branch stages. The stages are not running yet.
    fn attach_branch(&mut self, spec: &BranchSpec) -> Result<Self::Branch, BranchError>;

    /// Synchronizes the branch stages with the graph's run state so data starts flowing.
    fn activate_branch(&mut self, branch: &Self::Branch) -> Result<(), BranchError>;

    /// Injects end-of-stream at the branch entry so the muxer can write its trailer.
    fn begin_drain(&mut self, branch: &Self::Branch);

    /// Stops and removes the branch stages and releases its attach point.
    fn detach_branch(&mut self, branch: Self::Branch);

    /// Drives the graph to `Null` and releases all stages.
    fn teardown(self);
}

/// Handles of an attached recording branch.
pub trait Branch {
    /// Identity of the attach point on the duplication stage.
    fn attach_point(&self) -> &str;

    /// Name of the branch's output stage (used to attribute status messages).
    fn sink_name(&self) -> &str;
}
