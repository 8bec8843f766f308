//! # RecordingBranchManager: hot-plugs a file-writing branch into a live graph.
//!
//! ```text
//!                 toggle(true)                       begin_drain + grace
//!   Idle ──► Attaching ──► Active ──► toggle(false) ──► Draining ──► Detached ──► Idle
//!              │   (storage, fresh attach point,          │
//!              │    link, sync with parent)               │ force_stop (restart/stop/sink error)
//!              └── refusal: nothing created ◄─────────────┴──► Detached (no drain wait)
//! ```
//!
//! ## Rules
//! - At most one session; it only exists while the manager is armed (graph `Playing`).
//! - Each session obtains a fresh attach point; a released one is never reused.
//! - The shared status flag and the indicator are set only once the branch is `Active`
//!   and cleared whenever a session ends, drained or forced.
//! - A refusal leaves no trace other than the returned outcome and a
//!   `RecordingRefused` event.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use tokio::time::Instant;

use crate::error::BranchError;
use crate::events::{Bus, Event, EventKind};
use crate::pipeline::{Branch, BranchSpec, Graph, branch_session};
use crate::recording::indicator::Indicator;
use crate::recording::status::SharedStatus;
use crate::recording::storage::{StorageLocator, recording_file_name};

/// State of the recording branch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordingState {
    /// No session.
    #[default]
    Idle,
    /// Branch stages linked, not yet running with the graph.
    Attaching,
    /// Branch is writing.
    Active,
    /// End-of-stream injected; waiting for the grace period to elapse.
    Draining,
    /// Branch removed; the session is about to be destroyed.
    Detached,
}

/// Result of [`RecordingBranchManager::toggle`].
#[derive(Debug)]
pub enum ToggleOutcome {
    /// A branch is now writing to this file.
    Started(PathBuf),
    /// The branch is draining and will be removed after the grace period.
    Draining,
    /// Already in the requested state.
    Unchanged,
    /// A previous session is still draining; try again later.
    Busy,
    /// No graph is playing.
    Disarmed,
    /// Recording could not start; nothing was created.
    Refused(BranchError),
}

impl ToggleOutcome {
    /// `true` for outcomes where a requested start did not happen.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            ToggleOutcome::Refused(_) | ToggleOutcome::Disarmed | ToggleOutcome::Busy
        )
    }
}

/// One recording, from attach to detach.
#[derive(Debug)]
pub struct RecordingSession<Br> {
    id: u64,
    path: PathBuf,
    branch: Br,
    state: RecordingState,
    drain_deadline: Option<Instant>,
}

impl<Br: Branch> RecordingSession<Br> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn attach_point(&self) -> &str {
        self.branch.attach_point()
    }

    pub fn sink_name(&self) -> &str {
        self.branch.sink_name()
    }
}

/// Owns the recording session and its external mirrors (status flag, indicator).
pub struct RecordingBranchManager<Br> {
    storage: StorageLocator,
    status: Option<SharedStatus>,
    indicator: Box<dyn Indicator>,
    drain_grace: Duration,
    bus: Bus,
    armed: bool,
    session: Option<RecordingSession<Br>>,
    sessions_started: u64,
}

impl<Br: Branch> RecordingBranchManager<Br> {
    /// `status` is optional so devices without the shared region can still record.
    pub fn new(
        storage: StorageLocator,
        status: Option<SharedStatus>,
        indicator: Box<dyn Indicator>,
        drain_grace: Duration,
        bus: Bus,
    ) -> Self {
        Self {
            storage,
            status,
            indicator,
            drain_grace,
            bus,
            armed: false,
            session: None,
            sessions_started: 0,
        }
    }

    /// Allows attaching; called when the graph reaches `Playing`.
    pub fn arm(&mut self) {
        self.armed = true;
    }

    /// Forbids attaching. Any live session must have been stopped before.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn state(&self) -> RecordingState {
        self.session
            .as_ref()
            .map_or(RecordingState::Idle, |s| s.state)
    }

    /// `true` while a branch is writing.
    pub fn is_active(&self) -> bool {
        self.state() == RecordingState::Active
    }

    pub fn session(&self) -> Option<&RecordingSession<Br>> {
        self.session.as_ref()
    }

    /// Deadline of the pending drain cleanup, if a session is draining.
    pub fn drain_deadline(&self) -> Option<Instant> {
        self.session.as_ref().and_then(|s| s.drain_deadline)
    }

    /// `true` if `stage` is one of the current branch's stages.
    pub fn owns_stage(&self, stage: &str) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| branch_session(stage) == Some(s.id))
    }

    /// Starts or stops recording. Idempotent when already in the requested state.
    pub fn toggle<G>(&mut self, on: bool, graph: Option<&mut G>) -> ToggleOutcome
    where
        G: Graph<Branch = Br>,
    {
        if on {
            self.start(graph)
        } else {
            self.stop(graph)
        }
    }

    fn start<G>(&mut self, graph: Option<&mut G>) -> ToggleOutcome
    where
        G: Graph<Branch = Br>,
    {
        match self.state() {
            RecordingState::Active | RecordingState::Attaching => return ToggleOutcome::Unchanged,
            RecordingState::Draining | RecordingState::Detached => return ToggleOutcome::Busy,
            RecordingState::Idle => {}
        }
        let graph = match graph {
            Some(g) if self.armed => g,
            _ => {
                self.bus.publish(
                    Event::new(EventKind::RecordingRefused).with_reason("pipeline not playing"),
                );
                return ToggleOutcome::Disarmed;
            }
        };

        let mount = match self.storage.locate() {
            Ok(m) => m,
            Err(e) => return self.refuse(e.into()),
        };
        let path = mount.join(recording_file_name(Local::now()));
        self.sessions_started += 1;
        let spec = BranchSpec {
            session: self.sessions_started,
            location: path.clone(),
        };

        let branch = match graph.attach_branch(&spec) {
            Ok(b) => b,
            Err(e) => return self.refuse(e),
        };
        let mut session = RecordingSession {
            id: spec.session,
            path,
            branch,
            state: RecordingState::Attaching,
            drain_deadline: None,
        };
        if let Err(e) = graph.activate_branch(&session.branch) {
            graph.detach_branch(session.branch);
            return self.refuse(e);
        }
        session.state = RecordingState::Active;

        self.set_mirrors(true);
        self.bus.publish(
            Event::new(EventKind::RecordingStarted)
                .with_path(session.path.display().to_string())
                .with_source(session.branch.attach_point()),
        );
        let started = session.path.clone();
        self.session = Some(session);
        ToggleOutcome::Started(started)
    }

    fn refuse(&mut self, err: BranchError) -> ToggleOutcome {
        self.bus.publish(
            Event::new(EventKind::RecordingRefused)
                .with_reason(format!("{}: {err}", err.as_label())),
        );
        ToggleOutcome::Refused(err)
    }

    fn stop<G>(&mut self, graph: Option<&mut G>) -> ToggleOutcome
    where
        G: Graph<Branch = Br>,
    {
        let Some(session) = self.session.as_mut() else {
            return ToggleOutcome::Unchanged;
        };
        if session.state != RecordingState::Active {
            return ToggleOutcome::Unchanged;
        }
        let Some(graph) = graph else {
            self.force_stop::<G>(None);
            return ToggleOutcome::Unchanged;
        };

        graph.begin_drain(&session.branch);
        session.state = RecordingState::Draining;
        session.drain_deadline = Some(Instant::now() + self.drain_grace);
        self.bus.publish(
            Event::new(EventKind::RecordingDraining).with_path(session.path.display().to_string()),
        );
        ToggleOutcome::Draining
    }

    /// Completes a drain whose grace period has elapsed. Returns `true` if a session
    /// was detached.
    pub fn finish_drain<G>(&mut self, now: Instant, graph: Option<&mut G>) -> bool
    where
        G: Graph<Branch = Br>,
    {
        match self.drain_deadline() {
            Some(at) if at <= now => {}
            _ => return false,
        }
        self.detach(graph, "drained");
        true
    }

    /// Tears the branch down immediately, skipping any drain wait.
    pub fn force_stop<G>(&mut self, graph: Option<&mut G>) -> bool
    where
        G: Graph<Branch = Br>,
    {
        if self.session.is_none() {
            return false;
        }
        self.detach(graph, "forced");
        true
    }

    /// Reacts to an error from the branch output stage: the branch is forced down, the
    /// main graph is left alone.
    pub fn on_branch_error<G>(&mut self, stage: &str, message: &str, graph: Option<&mut G>)
    where
        G: Graph<Branch = Br>,
    {
        self.bus.publish(
            Event::new(EventKind::RecordingFailed)
                .with_source(stage)
                .with_reason(message),
        );
        self.force_stop(graph);
    }

    fn detach<G>(&mut self, graph: Option<&mut G>, how: &'static str)
    where
        G: Graph<Branch = Br>,
    {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.state = RecordingState::Detached;
        let path = session.path.display().to_string();
        match graph {
            Some(g) => g.detach_branch(session.branch),
            // The graph is already gone; its teardown released the branch stages.
            None => drop(session.branch),
        }
        self.set_mirrors(false);
        self.bus.publish(
            Event::new(EventKind::RecordingStopped)
                .with_path(path)
                .with_reason(how),
        );
    }

    fn set_mirrors(&mut self, on: bool) {
        if let Some(status) = self.status.as_mut() {
            status.set(on);
        }
        self.indicator.set(on);
    }

    /// Current value of the shared status flag (`false` without a region).
    pub fn status_flag(&self) -> bool {
        self.status.as_ref().is_some_and(SharedStatus::is_set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Codec, ReceiverConfig, SenderConfig, StreamProfile};
    use crate::pipeline::sim::{SimBackend, SimBranch, SimController, SimGraph};
    use crate::pipeline::{FrameProbe, GraphContext, MediaBackend, StatusSender};
    use std::fs;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    #[derive(Clone, Default)]
    struct Led(Arc<AtomicBool>);

    impl Indicator for Led {
        fn set(&mut self, on: bool) {
            self.0.store(on, Ordering::SeqCst);
        }
    }

    struct Fixture {
        _dir: TempDir,
        mount: PathBuf,
        helper: PathBuf,
        led: Led,
        ctl: SimController,
        graph: SimGraph,
        manager: RecordingBranchManager<SimBranch>,
    }

    fn fixture(profile: StreamProfile, storage: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mount = dir.path().join("usb0");
        fs::create_dir(&mount).unwrap();
        let helper = dir.path().join("mount_point");
        if storage {
            fs::write(&helper, mount.display().to_string()).unwrap();
        }
        let status = SharedStatus::open(dir.path().join("channel_data")).unwrap();

        let (mut backend, ctl) = SimBackend::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut graph = backend
            .build(
                &profile,
                GraphContext {
                    generation: 1,
                    probe: FrameProbe::new(),
                    status: StatusSender::new(1, tx),
                },
            )
            .unwrap();
        graph.set_state(crate::GraphState::Playing).unwrap();

        let led = Led::default();
        let mut manager = RecordingBranchManager::new(
            StorageLocator::new(&helper),
            Some(status),
            Box::new(led.clone()),
            Duration::from_millis(50),
            Bus::new(16),
        );
        manager.arm();
        Fixture {
            _dir: dir,
            mount,
            helper,
            led,
            ctl,
            graph,
            manager,
        }
    }

    fn receiver() -> StreamProfile {
        StreamProfile::Receiver(ReceiverConfig {
            port: 5600,
            payload_type: 96,
            codec: Codec::H264,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn start_without_storage_is_refused_silently() {
        let mut f = fixture(receiver(), false);

        let outcome = f.manager.toggle(true, Some(&mut f.graph));

        assert!(matches!(
            outcome,
            ToggleOutcome::Refused(BranchError::Storage(_))
        ));
        assert!(f.manager.session().is_none());
        assert!(!f.manager.status_flag());
        assert!(!f.led.0.load(Ordering::SeqCst));
        assert_eq!(f.ctl.stats().attach_points_issued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refusal_is_retried_on_next_toggle() {
        let mut f = fixture(receiver(), false);
        assert!(f.manager.toggle(true, Some(&mut f.graph)).is_refusal());

        fs::write(&f.helper, f.mount.display().to_string()).unwrap();
        let outcome = f.manager.toggle(true, Some(&mut f.graph));
        assert!(matches!(outcome, ToggleOutcome::Started(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn start_then_graceful_stop() {
        let mut f = fixture(receiver(), true);

        let ToggleOutcome::Started(path) = f.manager.toggle(true, Some(&mut f.graph)) else {
            panic!("recording did not start");
        };
        assert!(path.starts_with(&f.mount));
        let session = f.manager.session().unwrap();
        assert_eq!(session.path(), path.as_path());
        assert_eq!(session.branch.location(), &path);
        assert_eq!(session.sink_name(), format!("file-sink-{}", session.id()));
        assert!(f.manager.is_active());
        assert!(f.manager.status_flag());
        assert!(f.led.0.load(Ordering::SeqCst));

        assert!(matches!(
            f.manager.toggle(false, Some(&mut f.graph)),
            ToggleOutcome::Draining
        ));
        assert_eq!(f.ctl.stats().drains, 1);
        assert_eq!(f.manager.state(), RecordingState::Draining);
        assert!(f.manager.status_flag(), "flag stays up until the drain completes");

        let early = Instant::now() + Duration::from_millis(10);
        assert!(!f.manager.finish_drain(early, Some(&mut f.graph)));

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(f.manager.finish_drain(Instant::now(), Some(&mut f.graph)));
        assert_eq!(f.manager.state(), RecordingState::Idle);
        assert!(!f.manager.status_flag());
        assert!(!f.led.0.load(Ordering::SeqCst));
        assert_eq!(f.ctl.stats().attach_points_live, 0);
        assert_eq!(f.ctl.stats().branches_live, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_is_idempotent() {
        let mut f = fixture(receiver(), true);
        assert!(matches!(
            f.manager.toggle(false, Some(&mut f.graph)),
            ToggleOutcome::Unchanged
        ));
        f.manager.toggle(true, Some(&mut f.graph));
        assert!(matches!(
            f.manager.toggle(true, Some(&mut f.graph)),
            ToggleOutcome::Unchanged
        ));
        assert_eq!(f.ctl.stats().attach_points_issued, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_draining_is_busy() {
        let mut f = fixture(receiver(), true);
        f.manager.toggle(true, Some(&mut f.graph));
        f.manager.toggle(false, Some(&mut f.graph));
        assert!(matches!(
            f.manager.toggle(true, Some(&mut f.graph)),
            ToggleOutcome::Busy
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn forced_stop_skips_drain() {
        let mut f = fixture(receiver(), true);
        f.manager.toggle(true, Some(&mut f.graph));

        assert!(f.manager.force_stop(Some(&mut f.graph)));
        assert_eq!(f.ctl.stats().drains, 0);
        assert_eq!(f.manager.state(), RecordingState::Idle);
        assert!(!f.manager.status_flag());
        assert!(!f.led.0.load(Ordering::SeqCst));
        assert!(f.ctl.live_attach_points().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn every_session_gets_a_fresh_attach_point() {
        let mut f = fixture(receiver(), true);
        f.manager.toggle(true, Some(&mut f.graph));
        let first = f.manager.session().unwrap().attach_point().to_string();
        f.manager.force_stop(Some(&mut f.graph));

        f.manager.toggle(true, Some(&mut f.graph));
        let second = f.manager.session().unwrap().attach_point().to_string();
        assert_ne!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn branch_sink_error_only_drops_the_branch() {
        let mut f = fixture(receiver(), true);
        f.manager.toggle(true, Some(&mut f.graph));
        let sink = "file-sink-1";
        assert!(f.manager.owns_stage(sink));
        assert!(f.manager.owns_stage("queue-record-1"));
        assert!(!f.manager.owns_stage("file-sink-2"));
        assert!(!f.manager.owns_stage("video-sink"));

        f.manager
            .on_branch_error(sink, "No space left on device", Some(&mut f.graph));

        assert!(f.manager.session().is_none());
        assert!(!f.manager.status_flag());
        assert_eq!(f.ctl.stats().live_graphs, 1);
        assert_eq!(f.graph.state(), crate::GraphState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_manager_refuses() {
        let mut f = fixture(receiver(), true);
        assert!(f.manager.is_armed());
        f.manager.disarm();
        assert!(!f.manager.is_armed());
        assert!(matches!(
            f.manager.toggle(true, Some(&mut f.graph)),
            ToggleOutcome::Disarmed
        ));
        assert!(!f.manager.status_flag());
    }

    #[tokio::test(start_paused = true)]
    async fn sender_has_no_duplication_point() {
        let profile = StreamProfile::Sender(SenderConfig {
            address: "192.168.1.10".parse().unwrap(),
            port: 5600,
            device: PathBuf::from("/dev/video0"),
        });
        let mut f = fixture(profile, true);
        assert!(matches!(
            f.manager.toggle(true, Some(&mut f.graph)),
            ToggleOutcome::Refused(BranchError::NoDuplicationPoint)
        ));
        assert!(!f.manager.status_flag());
    }
}
