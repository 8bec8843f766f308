//! # LogWriter: renders supervisor events through `tracing`.
//!
//! Lifecycle and recording events are logged at `info`, graph warnings and refusals at
//! `warn`, graph and branch errors at `error`, QoS at `debug`.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO pipevisor: phase changed from=Running to=Restarting reason=watchdog
//! WARN pipevisor: graph warning generation=3 source=decoder reason=...
//! INFO pipevisor: recording started path=/media/usb0/recording_20261018_101500.mp4
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event-to-log subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let reason = e.reason.as_deref().unwrap_or("");
        let source = e.source.as_deref().unwrap_or("");
        let path = e.path.as_deref().unwrap_or("");
        match e.kind {
            EventKind::PhaseChanged => {
                tracing::info!(from = ?e.from, to = ?e.to, reason, "phase changed");
            }
            EventKind::GraphPlaying => {
                tracing::info!(generation = e.generation, "graph playing");
            }
            EventKind::BuildFailed => {
                tracing::error!(attempt = e.attempt, reason, "failed to create pipeline");
            }
            EventKind::BackoffScheduled => {
                tracing::warn!(attempt = e.attempt, delay_ms = e.delay_ms, "retrying build after delay");
            }
            EventKind::GraphTornDown => {
                tracing::info!(generation = e.generation, "graph stopped and resources released");
            }
            EventKind::WatchdogTimeout => {
                tracing::warn!(generation = e.generation, age_ms = e.delay_ms, "no new frames detected");
            }
            EventKind::RestartRequested => {
                tracing::info!(cause = ?e.cause, reason, "restart requested");
            }
            EventKind::RestartCoalesced => {
                tracing::debug!(cause = ?e.cause, "restart already pending");
            }
            EventKind::GraphError => {
                tracing::error!(generation = e.generation, source, reason, "graph error");
            }
            EventKind::GraphWarning => {
                tracing::warn!(generation = e.generation, source, reason, "graph warning");
            }
            EventKind::GraphQos => {
                tracing::debug!(generation = e.generation, source, reason, "qos");
            }
            EventKind::GraphEndOfStream => {
                tracing::warn!(generation = e.generation, source, "end of stream on main graph");
            }
            EventKind::RecordingStarted => {
                tracing::info!(path, attach_point = source, "recording started");
            }
            EventKind::RecordingRefused => {
                tracing::warn!(reason, "recording refused");
            }
            EventKind::RecordingDraining => {
                tracing::info!(path, "recording draining");
            }
            EventKind::RecordingStopped => {
                tracing::info!(path, reason, "recording stopped");
            }
            EventKind::RecordingFailed => {
                tracing::error!(source, reason, "recording branch failed");
            }
            EventKind::ControlRequested => {
                tracing::info!(request = reason, "control request");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
