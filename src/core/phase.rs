//! # Supervisor phases and the transition table.
//!
//! ```text
//!   Stopped ──start──► Starting ──build ok──► Running ──stop──► Stopping ──teardown──► Stopped
//!                        │   ▲                  │
//!           build failed │   │ retry elapsed    │ watchdog / Error / EOS / restart request
//!                        ▼   │                  ▼
//!                     BackoffWait            Restarting ──teardown + settle──► Starting
//!
//!   BackoffWait, Restarting ──stop──► Stopping
//! ```
//!
//! [`next`] is the single source of truth; the supervisor loop feeds it one
//! [`Input`] at a time and never changes phase behind its back.

use std::fmt;

/// Lifecycle phase of the supervised graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No graph; nothing requested. Initial and terminal.
    #[default]
    Stopped,
    /// Building the graph and driving it to `Playing`.
    Starting,
    /// Graph is playing; watchdog armed.
    Running,
    /// Graph torn down; waiting for the settle delay before rebuilding.
    Restarting,
    /// Tearing down on an explicit stop.
    Stopping,
    /// A build failed; waiting for the retry delay.
    BackoffWait,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Stopped => "stopped",
            Phase::Starting => "starting",
            Phase::Running => "running",
            Phase::Restarting => "restarting",
            Phase::Stopping => "stopping",
            Phase::BackoffWait => "backoff_wait",
        }
    }

    /// `true` while a rebuild is already on its way; restart requests are folded into it.
    pub fn rebuild_pending(&self) -> bool {
        matches!(
            self,
            Phase::Starting | Phase::Restarting | Phase::BackoffWait
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a restart was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RestartCause {
    /// No frame within the stall threshold.
    Watchdog,
    /// A main-graph stage reported an error.
    GraphError,
    /// The main graph ran out of data.
    EndOfStream,
    /// Control request (signal or API).
    External,
}

impl RestartCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartCause::Watchdog => "watchdog",
            RestartCause::GraphError => "graph_error",
            RestartCause::EndOfStream => "end_of_stream",
            RestartCause::External => "external",
        }
    }
}

impl fmt::Display for RestartCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of the phase machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Input {
    Start,
    BuildOk,
    BuildFailed,
    RetryElapsed,
    Restart(RestartCause),
    SettleElapsed,
    Stop,
    TeardownDone,
}

impl Input {
    pub fn as_str(&self) -> &'static str {
        match self {
            Input::Start => "start",
            Input::BuildOk => "build_ok",
            Input::BuildFailed => "build_failed",
            Input::RetryElapsed => "retry_elapsed",
            Input::Restart(cause) => cause.as_str(),
            Input::SettleElapsed => "settle_elapsed",
            Input::Stop => "stop",
            Input::TeardownDone => "teardown_done",
        }
    }
}

/// Returns the phase reached from `from` on `input`, or `None` if the input does not
/// apply in that phase.
pub fn next(from: Phase, input: Input) -> Option<Phase> {
    use Input::*;
    use Phase::*;

    match (from, input) {
        (Stopped, Start) => Some(Starting),
        (Starting, BuildOk) => Some(Running),
        (Starting, BuildFailed) => Some(BackoffWait),
        (BackoffWait, RetryElapsed) => Some(Starting),
        (Running, Restart(_)) => Some(Restarting),
        (Restarting, SettleElapsed) => Some(Starting),
        (Running | BackoffWait | Restarting, Stop) => Some(Stopping),
        (Stopping, TeardownDone) => Some(Stopped),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Phase; 6] = [
        Phase::Stopped,
        Phase::Starting,
        Phase::Running,
        Phase::Restarting,
        Phase::Stopping,
        Phase::BackoffWait,
    ];

    #[test]
    fn happy_path_cycles_back_to_running() {
        let mut p = Phase::Stopped;
        for input in [
            Input::Start,
            Input::BuildOk,
            Input::Restart(RestartCause::Watchdog),
            Input::SettleElapsed,
            Input::BuildOk,
        ] {
            p = next(p, input).unwrap();
        }
        assert_eq!(p, Phase::Running);
    }

    #[test]
    fn failed_build_backs_off_then_retries() {
        let p = next(Phase::Starting, Input::BuildFailed).unwrap();
        assert_eq!(p, Phase::BackoffWait);
        assert_eq!(next(p, Input::RetryElapsed), Some(Phase::Starting));
    }

    #[test]
    fn restart_is_only_accepted_while_running() {
        for p in ALL {
            let got = next(p, Input::Restart(RestartCause::External));
            if p == Phase::Running {
                assert_eq!(got, Some(Phase::Restarting));
            } else {
                assert_eq!(got, None, "restart accepted in {p}");
            }
        }
    }

    #[test]
    fn stopped_is_reached_only_through_stopping() {
        for p in ALL {
            for input in [
                Input::Start,
                Input::BuildOk,
                Input::BuildFailed,
                Input::RetryElapsed,
                Input::SettleElapsed,
                Input::Stop,
                Input::TeardownDone,
            ] {
                if next(p, input) == Some(Phase::Stopped) {
                    assert_eq!((p, input), (Phase::Stopping, Input::TeardownDone));
                }
            }
        }
    }

    #[test]
    fn stop_from_stopped_is_ignored() {
        assert_eq!(next(Phase::Stopped, Input::Stop), None);
    }
}
