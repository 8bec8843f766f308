//! # LifecycleSupervisor: the single loop that owns the graph.
//!
//! Everything that mutates supervisor state happens inside [`LifecycleSupervisor::run`].
//! Other threads and tasks only post markers: control requests arrive over an mpsc
//! channel, graph status messages over another, frame arrivals are one atomic store on
//! the [`FrameProbe`]. Timers are deadlines folded into one `sleep_until`.
//!
//! ## High-level architecture
//! ```text
//!   SupervisorHandle ── Request ───────┐
//!   Graph (streaming threads) ── StatusMessage ──┐
//!                                      ▼         ▼
//!                         ┌──────── select! (biased) ────────┐
//!                         │ requests │ status │ sleep_until    │
//!                         └────┬─────┴───┬────┴──────┬───────┘
//!                              │         │           │ earliest of:
//!                              │         │           │   retry / settle deadline
//!                              │         │           │   watchdog check
//!                              │         │           │   recording drain deadline
//!                              ▼         ▼           ▼
//!                      on_request   BusEventMonitor   on_wake
//!                              └─────────┬───────────┘
//!                                        ▼
//!                  phase::next ──► build / teardown / RecordingBranchManager
//!                                        │
//!                                        ├──► Bus ──► listener ──► SubscriberSet
//!                                        └──► watch<SupervisorStatus> ──► SupervisorHandle
//! ```
//!
//! ## Rules
//! - At most one live graph. A restart always tears the old graph down before the
//!   settle delay starts, and the rebuild gets a new generation.
//! - The watchdog is armed only while `Running`.
//! - The recording manager may attach only while the graph is playing; any session is
//!   force-stopped before a teardown.
//! - Restart requests while a rebuild is pending are coalesced, never queued.
//! - [`run`](LifecycleSupervisor::run) returns once a stop request leaves the supervisor
//!   `Stopped`. Dropping every [`SupervisorHandle`] counts as a stop request.
//!
//! ## Example
//! ```rust
//! use pipevisor::pipeline::sim::SimBackend;
//! use pipevisor::{Codec, Config, ReceiverConfig, StreamProfile, SupervisorBuilder};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), pipevisor::SupervisorError> {
//!     let profile = StreamProfile::Receiver(ReceiverConfig {
//!         port: 5600,
//!         payload_type: 96,
//!         codec: Codec::H264,
//!     });
//!     let (backend, _ctl) = SimBackend::new();
//!     let (sup, handle) = SupervisorBuilder::new(Config::default(), profile).build(backend)?;
//!
//!     handle.start();
//!     handle.stop();
//!     sup.run().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, StreamProfile};
use crate::core::handle::{Request, SupervisorHandle, SupervisorStatus};
use crate::core::monitor::{BusEventMonitor, MonitorView, Reaction};
use crate::core::phase::{self, Input, Phase, RestartCause};
use crate::core::watchdog::{Verdict, Watchdog};
use crate::events::{Bus, Event, EventKind};
use crate::pipeline::{
    FrameProbe, Graph, GraphContext, GraphState, MediaBackend, StatusMessage, StatusSender,
};
use crate::recording::{RecordingBranchManager, RecordingState};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Branch type of a backend's graphs.
pub type BranchOf<B> = <<B as MediaBackend>::Graph as Graph>::Branch;

/// Owns the graph, the watchdog and the recording manager; see the module docs.
pub struct LifecycleSupervisor<B: MediaBackend> {
    cfg: Config,
    profile: StreamProfile,
    backend: B,
    bus: Bus,
    subscribers: Vec<Arc<dyn Subscribe>>,
    monitor: BusEventMonitor,
    watchdog: Watchdog,
    recorder: RecordingBranchManager<BranchOf<B>>,

    phase: Phase,
    graph: Option<B::Graph>,
    probe: FrameProbe,
    generation: u64,
    build_failures: u32,
    restart_pending: Option<RestartCause>,
    /// Retry deadline in `BackoffWait`, settle deadline in `Restarting`.
    wake_at: Option<Instant>,
    exit: bool,

    requests: mpsc::UnboundedReceiver<Request>,
    status_tx: mpsc::UnboundedSender<StatusMessage>,
    status_rx: mpsc::UnboundedReceiver<StatusMessage>,
    state: watch::Sender<SupervisorStatus>,
}

impl<B: MediaBackend> LifecycleSupervisor<B> {
    pub(super) fn new(
        cfg: Config,
        profile: StreamProfile,
        backend: B,
        bus: Bus,
        subscribers: Vec<Arc<dyn Subscribe>>,
        recorder: RecordingBranchManager<BranchOf<B>>,
    ) -> (Self, SupervisorHandle) {
        let (req_tx, requests) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (state, state_rx) = watch::channel(SupervisorStatus::default());

        let sup = Self {
            monitor: BusEventMonitor::new(bus.clone()),
            watchdog: Watchdog::new(cfg.watchdog_interval, cfg.stall_threshold),
            cfg,
            profile,
            backend,
            bus,
            subscribers,
            recorder,
            phase: Phase::Stopped,
            graph: None,
            probe: FrameProbe::new(),
            generation: 0,
            build_failures: 0,
            restart_pending: None,
            wake_at: None,
            exit: false,
            requests,
            status_tx,
            status_rx,
            state,
        };
        (sup, SupervisorHandle::new(req_tx, state_rx))
    }

    /// Event bus of this supervisor. Subscribe before calling [`run`](Self::run) to see
    /// every event.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs the loop until a stop request leaves the supervisor `Stopped`.
    pub async fn run(mut self) {
        let token = CancellationToken::new();
        let listener = self.subscriber_listener(token.clone());
        self.publish_status();

        while !self.exit {
            let wake = self.next_wake();
            tokio::select! {
                biased;
                req = self.requests.recv() => match req {
                    Some(req) => self.on_request(req),
                    None => {
                        tracing::debug!("all supervisor handles dropped");
                        self.on_request(Request::Stop);
                    }
                },
                Some(msg) = self.status_rx.recv() => self.on_status(msg),
                _ = time::sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                    self.on_wake(Instant::now());
                }
            }
            self.publish_status();
        }

        token.cancel();
        if let Ok(set) = listener.await {
            set.shutdown().await;
        }
    }

    /// Forwards bus events to the subscriber set until cancelled; hands the set back so
    /// the caller can drain it.
    fn subscriber_listener(&mut self, token: CancellationToken) -> JoinHandle<SubscriberSet> {
        let set = SubscriberSet::new(std::mem::take(&mut self.subscribers));
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    ev = rx.recv() => match ev {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "subscriber listener lagged behind the bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
            set
        })
    }

    fn next_wake(&self) -> Option<Instant> {
        [
            self.wake_at,
            self.watchdog.deadline(),
            self.recorder.drain_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn live_generation(&self) -> Option<u64> {
        self.graph.as_ref().map(|_| self.generation)
    }

    fn publish_status(&self) {
        let next = SupervisorStatus {
            phase: self.phase,
            generation: self.live_generation(),
            recording: self.recorder.state(),
        };
        self.state.send_if_modified(|cur| {
            if *cur == next {
                return false;
            }
            *cur = next;
            true
        });
    }

    fn transition(&mut self, input: Input) -> bool {
        let Some(to) = phase::next(self.phase, input) else {
            tracing::debug!(phase = %self.phase, input = input.as_str(), "input does not apply");
            return false;
        };
        let from = std::mem::replace(&mut self.phase, to);
        let mut ev = Event::new(EventKind::PhaseChanged)
            .with_transition(from, to)
            .with_reason(input.as_str());
        if let Input::Restart(cause) = input {
            ev = ev.with_cause(cause);
        }
        self.bus.publish(ev);
        true
    }

    fn on_request(&mut self, req: Request) {
        self.bus
            .publish(Event::new(EventKind::ControlRequested).with_reason(req.as_str()));
        match req {
            Request::Start => {
                if self.transition(Input::Start) {
                    self.build_and_play();
                }
            }
            Request::Stop => self.stop(),
            Request::Restart => self.restart(RestartCause::External),
            Request::ToggleRecording => self.toggle_recording(),
        }
    }

    fn on_status(&mut self, msg: StatusMessage) {
        let view = MonitorView {
            generation: self.live_generation(),
            branch_session: self.recorder.session().map(|s| s.id()),
        };
        match self.monitor.classify(&msg, view) {
            Reaction::Restart(cause) => self.restart(cause),
            Reaction::StopRecording { stage, message } => {
                self.recorder
                    .on_branch_error(&stage, &message, self.graph.as_mut());
            }
            Reaction::Ignore => {}
        }
    }

    fn on_wake(&mut self, now: Instant) {
        self.recorder.finish_drain(now, self.graph.as_mut());

        if self.wake_at.is_some_and(|at| at <= now) {
            self.wake_at = None;
            let input = match self.phase {
                Phase::BackoffWait => Some(Input::RetryElapsed),
                Phase::Restarting => Some(Input::SettleElapsed),
                _ => None,
            };
            if let Some(input) = input {
                if self.transition(input) {
                    self.build_and_play();
                }
            }
        }

        match self.watchdog.check(now, &self.probe) {
            Some(Verdict::Stalled { age }) => {
                self.bus.publish(
                    Event::new(EventKind::WatchdogTimeout)
                        .with_generation(self.generation)
                        .with_delay(age),
                );
                self.restart(RestartCause::Watchdog);
            }
            Some(Verdict::NoFrameYet) => {
                tracing::trace!(generation = self.generation, "no frame observed yet");
            }
            Some(Verdict::Healthy) | None => {}
        }
    }

    /// Builds a graph for the current profile and drives it to `Playing`.
    /// Called in `Starting`; leaves the supervisor `Running` or `BackoffWait`.
    fn build_and_play(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let probe = FrameProbe::new();
        let ctx = GraphContext {
            generation,
            probe: probe.clone(),
            status: StatusSender::new(generation, self.status_tx.clone()),
        };

        let started = self
            .backend
            .build(&self.profile, ctx)
            .and_then(|mut graph| match graph.set_state(GraphState::Playing) {
                Ok(()) => Ok(graph),
                Err(e) => {
                    graph.teardown();
                    Err(e)
                }
            });

        match started {
            Ok(graph) => {
                self.graph = Some(graph);
                self.probe = probe;
                self.build_failures = 0;
                self.restart_pending = None;
                self.bus
                    .publish(Event::new(EventKind::GraphPlaying).with_generation(generation));
                self.transition(Input::BuildOk);
                self.watchdog.arm(Instant::now());
                self.recorder.arm();
            }
            Err(err) => {
                self.build_failures = self.build_failures.saturating_add(1);
                let attempt = self.build_failures;
                let delay = self.cfg.retry.next(attempt - 1);
                self.bus.publish(
                    Event::new(EventKind::BuildFailed)
                        .with_generation(generation)
                        .with_attempt(attempt)
                        .with_reason(format!("{}: {err}", err.as_label())),
                );
                self.transition(Input::BuildFailed);
                self.wake_at = Some(Instant::now() + delay);
                self.bus.publish(
                    Event::new(EventKind::BackoffScheduled)
                        .with_attempt(attempt)
                        .with_delay(delay),
                );
            }
        }
    }

    fn restart(&mut self, cause: RestartCause) {
        if self.phase == Phase::Running {
            self.bus.publish(
                Event::new(EventKind::RestartRequested)
                    .with_cause(cause)
                    .with_generation(self.generation),
            );
            self.restart_pending = Some(cause);
            self.transition(Input::Restart(cause));
            self.teardown_graph();
            self.wake_at = Some(Instant::now() + self.cfg.settle_delay);
        } else if self.restart_pending.is_some() || self.phase.rebuild_pending() {
            self.bus
                .publish(Event::new(EventKind::RestartCoalesced).with_cause(cause));
        } else {
            tracing::debug!(phase = %self.phase, %cause, "restart ignored");
        }
    }

    fn stop(&mut self) {
        if self.transition(Input::Stop) {
            self.wake_at = None;
            self.restart_pending = None;
            self.teardown_graph();
            self.transition(Input::TeardownDone);
        }
        if self.phase == Phase::Stopped {
            self.exit = true;
        }
    }

    /// Disarms the watchdog, force-stops any recording and releases the graph.
    fn teardown_graph(&mut self) {
        self.watchdog.disarm();
        self.recorder.force_stop(self.graph.as_mut());
        self.recorder.disarm();
        if let Some(graph) = self.graph.take() {
            graph.teardown();
            self.bus
                .publish(Event::new(EventKind::GraphTornDown).with_generation(self.generation));
        }
    }

    fn toggle_recording(&mut self) {
        let on = !matches!(
            self.recorder.state(),
            RecordingState::Active | RecordingState::Attaching
        );
        let outcome = self.recorder.toggle(on, self.graph.as_mut());
        tracing::debug!(on, ?outcome, "recording toggled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Codec, ReceiverConfig, SenderConfig};
    use crate::core::builder::SupervisorBuilder;
    use crate::error::BuildError;
    use crate::pipeline::StatusKind;
    use crate::pipeline::sim::{SimBackend, SimController};
    use crate::recording::SharedStatus;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        status_path: PathBuf,
        handle: SupervisorHandle,
        ctl: SimController,
        events: broadcast::Receiver<Event>,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn flag(&self) -> bool {
            read_flag(&self.status_path)
        }

        fn kinds(&mut self) -> Vec<EventKind> {
            let mut out = Vec::new();
            while let Ok(ev) = self.events.try_recv() {
                out.push(ev.kind);
            }
            out
        }

        async fn running_generation(&self, generation: u64) {
            assert!(
                self.handle
                    .wait_for(|s| s.phase == Phase::Running && s.generation == Some(generation))
                    .await
            );
        }

        async fn recording(&self, state: RecordingState) {
            assert!(self.handle.wait_for(|s| s.recording == state).await);
        }

        async fn stop(self) -> TempDir {
            self.handle.stop();
            self.task.await.unwrap();
            self._dir
        }
    }

    fn read_flag(path: &Path) -> bool {
        let bytes = fs::read(path).unwrap();
        i32::from_ne_bytes(bytes[..4].try_into().unwrap()) != 0
    }

    fn receiver() -> StreamProfile {
        StreamProfile::Receiver(ReceiverConfig {
            port: 5600,
            payload_type: 96,
            codec: Codec::H265,
        })
    }

    fn harness(profile: StreamProfile) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mount = dir.path().join("usb0");
        fs::create_dir(&mount).unwrap();
        let helper = dir.path().join("mount_point");
        fs::write(&helper, mount.display().to_string()).unwrap();

        let cfg = Config {
            status_path: dir.path().join("channel_data"),
            mount_helper_path: helper,
            ..Config::default()
        };
        let status = SharedStatus::open(&cfg.status_path).unwrap();
        let status_path = cfg.status_path.clone();

        let (backend, ctl) = SimBackend::new();
        let (sup, handle) = SupervisorBuilder::new(cfg, profile)
            .with_status_region(status)
            .build(backend)
            .unwrap();
        let events = sup.bus().subscribe();
        let task = tokio::spawn(sup.run());

        Harness {
            _dir: dir,
            status_path,
            handle,
            ctl,
            events,
            task,
        }
    }

    fn graph_error() -> StatusKind {
        StatusKind::Error {
            message: "Internal data stream error.".into(),
            debug: Some("streaming stopped, reason not-linked".into()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_reaches_running() {
        let h = harness(receiver());
        h.handle.start();
        h.running_generation(1).await;

        assert!(h.handle.is_running());
        assert_eq!(h.ctl.stats().builds, 1);
        assert_eq!(h.ctl.stats().live_graphs, 1);
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn main_graph_error_rebuilds_with_new_handle() {
        let mut h = harness(receiver());
        h.handle.start();
        h.running_generation(1).await;

        assert!(h.ctl.post("udp-source", graph_error()));
        h.running_generation(2).await;

        let stats = h.ctl.stats();
        assert_eq!(stats.builds, 2);
        assert_eq!(stats.teardowns, 1);
        assert_eq!(stats.live_graphs, 1);

        let kinds = h.kinds();
        let torn = kinds.iter().position(|k| *k == EventKind::GraphTornDown).unwrap();
        let replayed = kinds.iter().rposition(|k| *k == EventKind::GraphPlaying).unwrap();
        assert!(kinds.contains(&EventKind::GraphError));
        assert!(torn < replayed, "old graph must be released before the rebuild");
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_restart_requests_coalesce() {
        let mut h = harness(receiver());
        h.handle.start();
        h.running_generation(1).await;

        for _ in 0..5 {
            h.handle.request_restart();
        }
        h.running_generation(2).await;
        time::sleep(Duration::from_secs(3)).await;

        assert_eq!(h.ctl.stats().builds, 2);
        let kinds = h.kinds();
        assert_eq!(
            kinds.iter().filter(|k| **k == EventKind::RestartRequested).count(),
            1
        );
        assert_eq!(
            kinds.iter().filter(|k| **k == EventKind::RestartCoalesced).count(),
            4
        );
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_graph_restarts_exactly_once() {
        let mut h = harness(receiver());
        h.handle.start();
        h.running_generation(1).await;

        h.ctl.frame();
        h.running_generation(2).await;
        time::sleep(Duration::from_secs(10)).await;

        assert_eq!(h.ctl.stats().builds, 2);
        assert_eq!(
            h.kinds()
                .iter()
                .filter(|k| **k == EventKind::WatchdogTimeout)
                .count(),
            1
        );
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn steady_frames_never_restart() {
        let h = harness(receiver());
        h.handle.start();
        h.running_generation(1).await;

        let ctl = h.ctl.clone();
        let feeder = tokio::spawn(async move {
            let mut tick = time::interval(Duration::from_millis(100));
            loop {
                tick.tick().await;
                ctl.frame();
            }
        });
        time::sleep(Duration::from_secs(10)).await;
        feeder.abort();

        assert_eq!(h.ctl.stats().builds, 1);
        assert!(h.handle.is_running());
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_build_waits_retry_delay() {
        let mut h = harness(receiver());
        h.ctl.fail_next_build(BuildError::CapabilityMissing {
            factory: "avdec_h265".into(),
        });
        h.handle.start();
        assert!(h.handle.wait_phase(Phase::BackoffWait).await);

        let parked = Instant::now();
        h.running_generation(2).await;
        assert!(parked.elapsed() >= Duration::from_secs(5));

        let kinds = h.kinds();
        assert!(kinds.contains(&EventKind::BuildFailed));
        assert!(kinds.contains(&EventKind::BackoffScheduled));
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn refused_state_change_backs_off() {
        let h = harness(receiver());
        h.ctl.fail_next_play(BuildError::StateChange {
            target: GraphState::Playing,
        });
        h.handle.start();
        assert!(h.handle.wait_phase(Phase::BackoffWait).await);
        assert_eq!(h.ctl.stats().live_graphs, 0);

        h.running_generation(2).await;
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_backoff_ends_the_loop() {
        let h = harness(receiver());
        h.ctl.fail_next_build(BuildError::Link {
            from: "depay".into(),
            to: "parser".into(),
        });
        h.handle.start();
        assert!(h.handle.wait_phase(Phase::BackoffWait).await);

        let handle = h.handle.clone();
        h.stop().await;
        assert_eq!(handle.phase(), Phase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn recording_toggle_on_then_off() {
        let h = harness(receiver());
        h.handle.start();
        h.running_generation(1).await;

        h.handle.toggle_recording();
        h.recording(RecordingState::Active).await;
        assert!(h.flag());

        h.handle.toggle_recording();
        h.recording(RecordingState::Draining).await;
        assert_eq!(h.ctl.stats().drains, 1);

        h.recording(RecordingState::Idle).await;
        assert!(!h.flag());
        assert!(h.ctl.live_attach_points().is_empty());
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn main_end_of_stream_while_draining_rebuilds() {
        let h = harness(receiver());
        h.handle.start();
        h.running_generation(1).await;

        h.handle.toggle_recording();
        h.recording(RecordingState::Active).await;
        h.handle.toggle_recording();
        h.recording(RecordingState::Draining).await;
        h.ctl.post("udp-source", StatusKind::EndOfStream);
        h.running_generation(2).await;

        let status = h.handle.status();
        assert_eq!(status.recording, RecordingState::Idle);
        assert_eq!(status.generation, Some(2));
        assert!(!h.flag());
        assert_eq!(h.ctl.stats().branches_live, 0);
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn branch_end_of_stream_while_draining_keeps_the_graph() {
        let h = harness(receiver());
        h.handle.start();
        h.running_generation(1).await;

        h.handle.toggle_recording();
        h.recording(RecordingState::Active).await;
        h.handle.toggle_recording();
        h.recording(RecordingState::Draining).await;
        h.ctl.post("file-sink-1", StatusKind::EndOfStream);
        h.recording(RecordingState::Idle).await;

        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(h.ctl.stats().builds, 1);
        assert!(h.handle.is_running());
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn late_error_from_detached_branch_keeps_main_graph() {
        let h = harness(receiver());
        h.handle.start();
        h.running_generation(1).await;

        h.handle.toggle_recording();
        h.recording(RecordingState::Active).await;
        h.handle.toggle_recording();
        h.recording(RecordingState::Draining).await;
        h.recording(RecordingState::Idle).await;

        h.ctl.post(
            "file-sink-1",
            StatusKind::Error {
                message: "Could not write to resource.".into(),
                debug: None,
            },
        );
        time::sleep(Duration::from_secs(5)).await;

        assert_eq!(h.ctl.stats().builds, 1);
        assert_eq!(h.handle.status().generation, Some(1));
        assert!(h.handle.is_running());
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn restart_mid_drain_drops_the_branch() {
        let h = harness(receiver());
        h.handle.start();
        h.running_generation(1).await;

        h.handle.toggle_recording();
        h.recording(RecordingState::Active).await;
        h.handle.toggle_recording();
        h.handle.request_restart();
        h.running_generation(2).await;

        assert_eq!(h.handle.recording(), RecordingState::Idle);
        assert!(!h.flag());
        assert_eq!(h.ctl.stats().branches_live, 0);
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_recording_skips_drain() {
        let h = harness(receiver());
        h.handle.start();
        h.running_generation(1).await;
        h.handle.toggle_recording();
        h.recording(RecordingState::Active).await;

        let ctl = h.ctl.clone();
        let status_path = h.status_path.clone();
        let handle = h.handle.clone();
        let _dir = h.stop().await;

        assert_eq!(handle.phase(), Phase::Stopped);
        assert_eq!(ctl.stats().drains, 0);
        assert_eq!(ctl.stats().live_graphs, 0);
        assert!(ctl.live_attach_points().is_empty());
        assert!(!read_flag(&status_path));
    }

    #[tokio::test(start_paused = true)]
    async fn branch_sink_error_keeps_main_graph() {
        let h = harness(receiver());
        h.handle.start();
        h.running_generation(1).await;
        h.handle.toggle_recording();
        h.recording(RecordingState::Active).await;

        h.ctl.post(
            "file-sink-1",
            StatusKind::Error {
                message: "Could not write to resource.".into(),
                debug: None,
            },
        );
        h.recording(RecordingState::Idle).await;

        assert!(!h.flag());
        assert!(h.handle.is_running());
        assert_eq!(h.ctl.stats().builds, 1);
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn sender_refuses_recording() {
        let mut h = harness(StreamProfile::Sender(SenderConfig {
            address: "10.0.0.2".parse().unwrap(),
            port: 5600,
            device: PathBuf::from("/dev/video0"),
        }));
        h.handle.start();
        h.running_generation(1).await;

        h.handle.toggle_recording();
        time::sleep(Duration::from_millis(10)).await;

        assert_eq!(h.handle.recording(), RecordingState::Idle);
        assert!(!h.flag());
        assert!(h.kinds().contains(&EventKind::RecordingRefused));
        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_stops() {
        let h = harness(receiver());
        h.handle.start();
        h.running_generation(1).await;

        let ctl = h.ctl.clone();
        let Harness { handle, task, .. } = h;
        drop(handle);
        task.await.unwrap();
        assert_eq!(ctl.stats().live_graphs, 0);
    }
}
