//! # SupervisorHandle: the outside view of a running supervisor loop.
//!
//! Calls never touch supervisor state. Each one posts a [`Request`] marker into the
//! loop's channel and returns; the loop applies it on its next iteration. State flows
//! back through a `watch` channel as [`SupervisorStatus`] snapshots.
//!
//! ```text
//!   signal bridge / embedding app ── SupervisorHandle ── mpsc<Request> ──► loop
//!                                          ▲                                │
//!                                          └──── watch<SupervisorStatus> ◄──┘
//! ```

use tokio::sync::{mpsc, watch};

use crate::core::phase::Phase;
use crate::recording::RecordingState;

/// Control request posted into the supervisor loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Request {
    Start,
    Stop,
    Restart,
    /// Flips recording: on if idle, off if active.
    ToggleRecording,
}

impl Request {
    pub fn as_str(&self) -> &'static str {
        match self {
            Request::Start => "start",
            Request::Stop => "stop",
            Request::Restart => "restart",
            Request::ToggleRecording => "toggle_recording",
        }
    }
}

/// Snapshot published by the loop after every iteration that changed something.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub phase: Phase,
    /// Generation of the live graph.
    pub generation: Option<u64>,
    pub recording: RecordingState,
}

/// Cloneable control handle.
#[derive(Clone, Debug)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<Request>,
    status: watch::Receiver<SupervisorStatus>,
}

impl SupervisorHandle {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<Request>,
        status: watch::Receiver<SupervisorStatus>,
    ) -> Self {
        Self { tx, status }
    }

    /// Posts a request. Returns `false` if the loop has exited.
    pub fn post(&self, req: Request) -> bool {
        self.tx.send(req).is_ok()
    }

    pub fn start(&self) -> bool {
        self.post(Request::Start)
    }

    pub fn stop(&self) -> bool {
        self.post(Request::Stop)
    }

    pub fn request_restart(&self) -> bool {
        self.post(Request::Restart)
    }

    pub fn toggle_recording(&self) -> bool {
        self.post(Request::ToggleRecording)
    }

    pub fn status(&self) -> SupervisorStatus {
        *self.status.borrow()
    }

    pub fn phase(&self) -> Phase {
        self.status.borrow().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    pub fn recording(&self) -> RecordingState {
        self.status.borrow().recording
    }

    /// Waits until a snapshot satisfies `pred`. Returns `false` if the loop exited first.
    pub async fn wait_for(&self, mut pred: impl FnMut(&SupervisorStatus) -> bool) -> bool {
        let mut rx = self.status.clone();
        rx.wait_for(|s| pred(s)).await.is_ok()
    }

    /// Waits until the loop reports `phase`.
    pub async fn wait_phase(&self, phase: Phase) -> bool {
        self.wait_for(|s| s.phase == phase).await
    }
}
