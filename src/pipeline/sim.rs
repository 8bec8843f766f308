//! # Scripted in-process backend.
//!
//! [`SimBackend`] builds graphs that exist only as bookkeeping. A [`SimController`]
//! shared with the backend lets a test (or a dry run) script failures, feed frames,
//! inject status messages and inspect what is alive:
//!
//! ```text
//!  test ── SimController ──┬── fail_next_build(err) / fail_next_play(err)
//!                          ├── frame()               → probe.mark() of current graph
//!                          ├── post(source, kind)    → status channel of current graph
//!                          └── stats()               → live graphs / attach points / branches
//! ```
//!
//! Receiver profiles get a tee named `tee`; sender profiles have no duplication point.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::StreamProfile;
use crate::error::{BranchError, BuildError};
use crate::pipeline::{
    BRANCH_SINK, Branch, BranchSpec, FrameProbe, Graph, GraphContext, GraphState, MediaBackend,
    StatusKind, StatusSender,
};

/// Counters of a [`SimBackend`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimStats {
    /// Successful builds.
    pub builds: u64,
    /// Builds that returned an error.
    pub failed_builds: u64,
    /// Graphs that are built and not yet torn down.
    pub live_graphs: usize,
    /// Graphs that went through `teardown`.
    pub teardowns: u64,
    /// Attach points handed out by tees over the backend's lifetime.
    pub attach_points_issued: u64,
    /// Attach points currently held by a branch.
    pub attach_points_live: usize,
    /// Branch stages currently linked into a graph.
    pub branches_live: usize,
    /// End-of-stream events injected into branches.
    pub drains: u64,
}

#[derive(Default)]
struct SimState {
    stats: SimStats,
    fail_next: VecDeque<BuildError>,
    fail_next_play: VecDeque<BuildError>,
    current: Option<(FrameProbe, StatusSender)>,
    attach_points: Vec<String>,
}

/// Test-side handle of a [`SimBackend`].
#[derive(Clone, Default)]
pub struct SimController {
    state: Arc<Mutex<SimState>>,
}

impl SimController {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next build fail with `err`. Calls queue up.
    pub fn fail_next_build(&self, err: BuildError) {
        self.lock().fail_next.push_back(err);
    }

    /// Makes the next transition to `Playing` fail with `err`. Calls queue up.
    pub fn fail_next_play(&self, err: BuildError) {
        self.lock().fail_next_play.push_back(err);
    }

    /// Marks a frame on the current graph's entry probe.
    ///
    /// Returns `false` if no graph is alive.
    pub fn frame(&self) -> bool {
        match &self.lock().current {
            Some((probe, _)) => {
                probe.mark();
                true
            }
            None => false,
        }
    }

    /// Posts a status message on behalf of the current graph.
    pub fn post(&self, source: &str, kind: StatusKind) -> bool {
        match &self.lock().current {
            Some((_, status)) => status.post(source, kind),
            None => false,
        }
    }

    /// Generation of the live graph, if any.
    pub fn current_generation(&self) -> Option<u64> {
        self.lock().current.as_ref().map(|(_, s)| s.generation())
    }

    /// Attach points currently held by branches.
    pub fn live_attach_points(&self) -> Vec<String> {
        self.lock().attach_points.clone()
    }

    pub fn stats(&self) -> SimStats {
        self.lock().stats
    }
}

/// Backend producing [`SimGraph`]s.
pub struct SimBackend {
    ctl: SimController,
}

impl SimBackend {
    /// Creates a backend together with its controller.
    pub fn new() -> (Self, SimController) {
        let ctl = SimController::default();
        (Self { ctl: ctl.clone() }, ctl)
    }
}

impl MediaBackend for SimBackend {
    type Graph = SimGraph;

    fn build(&mut self, profile: &StreamProfile, ctx: GraphContext) -> Result<SimGraph, BuildError> {
        let mut st = self.ctl.lock();
        if let Some(err) = st.fail_next.pop_front() {
            st.stats.failed_builds += 1;
            return Err(err);
        }
        st.stats.builds += 1;
        st.stats.live_graphs += 1;
        st.current = Some((ctx.probe.clone(), ctx.status.clone()));
        drop(st);

        Ok(SimGraph {
            ctl: self.ctl.clone(),
            generation: ctx.generation,
            state: GraphState::Null,
            has_tee: matches!(profile, StreamProfile::Receiver(_)),
            released: false,
        })
    }
}

/// Bookkeeping-only graph.
pub struct SimGraph {
    ctl: SimController,
    generation: u64,
    state: GraphState,
    has_tee: bool,
    released: bool,
}

/// Branch of a [`SimGraph`].
#[derive(Debug)]
pub struct SimBranch {
    attach_point: String,
    sink_name: String,
    location: PathBuf,
}

impl SimBranch {
    pub fn location(&self) -> &PathBuf {
        &self.location
    }
}

impl Branch for SimBranch {
    fn attach_point(&self) -> &str {
        &self.attach_point
    }

    fn sink_name(&self) -> &str {
        &self.sink_name
    }
}

impl Graph for SimGraph {
    type Branch = SimBranch;

    fn set_state(&mut self, state: GraphState) -> Result<(), BuildError> {
        if state == GraphState::Playing {
            if let Some(err) = self.ctl.lock().fail_next_play.pop_front() {
                return Err(err);
            }
        }
        self.state = state;
        Ok(())
    }

    fn state(&self) -> GraphState {
        self.state
    }

    fn attach_branch(&mut self, spec: &BranchSpec) -> Result<SimBranch, BranchError> {
        if !self.has_tee {
            return Err(BranchError::NoDuplicationPoint);
        }
        let mut st = self.ctl.lock();
        let pad = format!("tee.src_{}", st.stats.attach_points_issued);
        st.stats.attach_points_issued += 1;
        st.stats.attach_points_live += 1;
        st.stats.branches_live += 1;
        st.attach_points.push(pad.clone());

        Ok(SimBranch {
            attach_point: pad,
            sink_name: spec.stage_name(BRANCH_SINK),
            location: spec.location.clone(),
        })
    }

    fn activate_branch(&mut self, _branch: &SimBranch) -> Result<(), BranchError> {
        Ok(())
    }

    fn begin_drain(&mut self, _branch: &SimBranch) {
        self.ctl.lock().stats.drains += 1;
    }

    fn detach_branch(&mut self, branch: SimBranch) {
        let mut st = self.ctl.lock();
        st.stats.branches_live = st.stats.branches_live.saturating_sub(1);
        st.stats.attach_points_live = st.stats.attach_points_live.saturating_sub(1);
        st.attach_points.retain(|p| *p != branch.attach_point);
    }

    fn teardown(mut self) {
        self.state = GraphState::Null;
        self.release();
    }
}

impl SimGraph {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut st = self.ctl.lock();
        st.stats.live_graphs = st.stats.live_graphs.saturating_sub(1);
        st.stats.teardowns += 1;
        if st
            .current
            .as_ref()
            .is_some_and(|(_, s)| s.generation() == self.generation)
        {
            st.current = None;
        }
    }
}

impl Drop for SimGraph {
    fn drop(&mut self) {
        self.release();
    }
}
