//! # BusEventMonitor: turns graph status messages into supervisor reactions.
//!
//! ```text
//!   StatusMessage ──► classify(msg, view) ──► Reaction
//!                          │
//!                          └──► Bus: GraphError / GraphWarning / GraphQos / GraphEndOfStream
//! ```
//!
//! | message                                       | reaction                   |
//! |-----------------------------------------------|----------------------------|
//! | generation != live generation                 | `Ignore` (late, discarded) |
//! | Error from a stage of the attached branch     | `StopRecording`            |
//! | Error from a stage of a detached branch       | `Ignore` (logged)          |
//! | Error from a main-graph stage                 | `Restart(GraphError)`      |
//! | EndOfStream from a recording branch stage     | `Ignore` (branch flush)    |
//! | EndOfStream from a main-graph stage           | `Restart(EndOfStream)`     |
//! | Warning, QualityOfService, StateChanged       | `Ignore` (logged only)     |
//!
//! A message belongs to a recording branch when its source carries a branch stage
//! name ([`branch_session`]). Attribution never depends on the recorder's state, so an
//! end-of-stream from the main graph restarts it even while a branch is draining.

use crate::core::phase::RestartCause;
use crate::events::{Bus, Event, EventKind};
use crate::pipeline::{StatusKind, StatusMessage, branch_session};

/// What the supervisor should do about a status message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reaction {
    Restart(RestartCause),
    /// Force-stop the recording branch only; the main graph keeps running.
    StopRecording { stage: String, message: String },
    Ignore,
}

/// The parts of supervisor state the classification depends on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonitorView {
    /// Generation of the live graph, `None` when no graph exists.
    pub generation: Option<u64>,
    /// Session number of the attached recording branch, if any.
    pub branch_session: Option<u64>,
}

pub struct BusEventMonitor {
    bus: Bus,
}

impl BusEventMonitor {
    pub fn new(bus: Bus) -> Self {
        Self { bus }
    }

    pub fn classify(&self, msg: &StatusMessage, view: MonitorView) -> Reaction {
        if view.generation != Some(msg.generation) {
            tracing::debug!(
                generation = msg.generation,
                live = ?view.generation,
                source = %msg.source,
                "discarding status message from a torn-down graph"
            );
            return Reaction::Ignore;
        }
        let session = branch_session(&msg.source);

        match &msg.kind {
            StatusKind::Error { message, debug } => {
                if let Some(session) = session {
                    if view.branch_session == Some(session) {
                        return Reaction::StopRecording {
                            stage: msg.source.clone(),
                            message: message.clone(),
                        };
                    }
                    tracing::warn!(
                        session,
                        source = %msg.source,
                        error = %message,
                        "error from a detached recording branch"
                    );
                    return Reaction::Ignore;
                }
                let reason = match debug {
                    Some(d) => format!("{message} ({d})"),
                    None => message.clone(),
                };
                self.publish(EventKind::GraphError, msg, Some(reason));
                Reaction::Restart(RestartCause::GraphError)
            }
            StatusKind::EndOfStream => {
                if session.is_some() {
                    tracing::debug!(source = %msg.source, "end-of-stream from recording branch");
                    return Reaction::Ignore;
                }
                self.publish(EventKind::GraphEndOfStream, msg, None);
                Reaction::Restart(RestartCause::EndOfStream)
            }
            StatusKind::Warning { message, .. } => {
                self.publish(EventKind::GraphWarning, msg, Some(message.clone()));
                Reaction::Ignore
            }
            StatusKind::QualityOfService(qos) => {
                let stats = format!(
                    "live={} processed={} dropped={} running_time={:?} stream_time={:?} timestamp={:?} duration={:?}",
                    qos.live,
                    qos.processed,
                    qos.dropped,
                    qos.running_time,
                    qos.stream_time,
                    qos.timestamp,
                    qos.duration
                );
                self.publish(EventKind::GraphQos, msg, Some(stats));
                Reaction::Ignore
            }
            StatusKind::StateChanged { old, new } => {
                tracing::debug!(source = %msg.source, ?old, ?new, "state changed");
                Reaction::Ignore
            }
        }
    }

    fn publish(&self, kind: EventKind, msg: &StatusMessage, reason: Option<String>) {
        let mut ev = Event::new(kind)
            .with_generation(msg.generation)
            .with_source(msg.source.as_str());
        if let Some(r) = reason {
            ev = ev.with_reason(r);
        }
        self.bus.publish(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::QosStats;

    fn msg(generation: u64, source: &str, kind: StatusKind) -> StatusMessage {
        StatusMessage {
            generation,
            source: source.into(),
            kind,
        }
    }

    fn error(text: &str) -> StatusKind {
        StatusKind::Error {
            message: text.into(),
            debug: None,
        }
    }

    fn live(generation: u64) -> MonitorView {
        MonitorView {
            generation: Some(generation),
            ..MonitorView::default()
        }
    }

    #[tokio::test]
    async fn main_graph_error_restarts_and_is_published() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let monitor = BusEventMonitor::new(bus);

        let r = monitor.classify(&msg(2, "udp-source", error("socket closed")), live(2));

        assert_eq!(r, Reaction::Restart(RestartCause::GraphError));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::GraphError);
        assert_eq!(ev.source.as_deref(), Some("udp-source"));
        assert_eq!(ev.reason.as_deref(), Some("socket closed"));
    }

    #[test]
    fn stale_generation_is_discarded() {
        let monitor = BusEventMonitor::new(Bus::new(8));
        assert_eq!(
            monitor.classify(&msg(1, "udp-source", error("late")), live(2)),
            Reaction::Ignore
        );
        assert_eq!(
            monitor.classify(&msg(1, "udp-source", StatusKind::EndOfStream), MonitorView::default()),
            Reaction::Ignore
        );
    }

    #[test]
    fn branch_sink_error_only_stops_recording() {
        let monitor = BusEventMonitor::new(Bus::new(8));
        let view = MonitorView {
            generation: Some(3),
            branch_session: Some(1),
        };
        assert_eq!(
            monitor.classify(&msg(3, "file-sink-1", error("No space left on device")), view),
            Reaction::StopRecording {
                stage: "file-sink-1".into(),
                message: "No space left on device".into(),
            }
        );
        assert_eq!(
            monitor.classify(&msg(3, "muxer-1", error("not negotiated")), view),
            Reaction::StopRecording {
                stage: "muxer-1".into(),
                message: "not negotiated".into(),
            }
        );
    }

    #[test]
    fn detached_branch_error_leaves_everything_alone() {
        let monitor = BusEventMonitor::new(Bus::new(8));
        let late = msg(3, "file-sink-1", error("Could not write to resource"));

        assert_eq!(monitor.classify(&late, live(3)), Reaction::Ignore);
        let next_session = MonitorView {
            generation: Some(3),
            branch_session: Some(2),
        };
        assert_eq!(monitor.classify(&late, next_session), Reaction::Ignore);
    }

    #[test]
    fn end_of_stream_is_attributed_by_source() {
        let monitor = BusEventMonitor::new(Bus::new(8));
        let view = MonitorView {
            generation: Some(4),
            branch_session: Some(2),
        };

        assert_eq!(
            monitor.classify(&msg(4, "rtp-viewer-pipeline", StatusKind::EndOfStream), view),
            Reaction::Restart(RestartCause::EndOfStream)
        );
        assert_eq!(
            monitor.classify(&msg(4, "file-sink-2", StatusKind::EndOfStream), view),
            Reaction::Ignore
        );
        assert_eq!(
            monitor.classify(&msg(4, "udp-source", StatusKind::EndOfStream), live(4)),
            Reaction::Restart(RestartCause::EndOfStream)
        );
    }

    #[test]
    fn warnings_and_qos_never_escalate() {
        let monitor = BusEventMonitor::new(Bus::new(8));
        let warning = StatusKind::Warning {
            message: "can't keep up".into(),
            debug: None,
        };
        let qos = StatusKind::QualityOfService(QosStats {
            live: true,
            processed: 100,
            dropped: 3,
            ..QosStats::default()
        });
        assert_eq!(monitor.classify(&msg(1, "decoder", warning), live(1)), Reaction::Ignore);
        assert_eq!(monitor.classify(&msg(1, "display", qos), live(1)), Reaction::Ignore);
    }
}
