//! # SignalBridge: OS control signals to supervisor requests.
//!
//! Signals are received as tokio signal streams on an ordinary task; the bridge only
//! posts a [`Request`] marker into the supervisor loop.
//!
//! ```text
//!   SIGUSR1 ─┐
//!   SIGUSR2 ─┼──► SignalBridge (bindings) ──► SupervisorHandle::post(Request) ──► loop
//!   SIGINT  ─┤                                       (Stop, always)
//!   SIGTERM ─┘
//! ```
//!
//! Default bindings follow the profile: the sender restarts on `USR1` and stops on
//! `USR2`, the receiver toggles recording on `USR1` and restarts on `USR2`.

use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::StreamProfile;
use crate::core::{Request, SupervisorHandle};
use crate::error::SupervisorError;

/// Signals the bridge listens to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    User1,
    User2,
    Interrupt,
    Terminate,
}

impl ControlSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlSignal::User1 => "SIGUSR1",
            ControlSignal::User2 => "SIGUSR2",
            ControlSignal::Interrupt => "SIGINT",
            ControlSignal::Terminate => "SIGTERM",
        }
    }
}

/// Requests bound to the two user signals. `SIGINT`/`SIGTERM` always mean stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignalBindings {
    pub usr1: Request,
    pub usr2: Request,
}

impl SignalBindings {
    pub fn sender() -> Self {
        Self {
            usr1: Request::Restart,
            usr2: Request::Stop,
        }
    }

    pub fn receiver() -> Self {
        Self {
            usr1: Request::ToggleRecording,
            usr2: Request::Restart,
        }
    }

    pub fn for_profile(profile: &StreamProfile) -> Self {
        match profile {
            StreamProfile::Sender(_) => Self::sender(),
            StreamProfile::Receiver(_) => Self::receiver(),
        }
    }

    pub fn request_for(&self, sig: ControlSignal) -> Request {
        match sig {
            ControlSignal::User1 => self.usr1,
            ControlSignal::User2 => self.usr2,
            ControlSignal::Interrupt | ControlSignal::Terminate => Request::Stop,
        }
    }
}

pub struct SignalBridge {
    handle: SupervisorHandle,
    bindings: SignalBindings,
}

impl SignalBridge {
    pub fn new(handle: SupervisorHandle, bindings: SignalBindings) -> Self {
        Self { handle, bindings }
    }

    /// Posts the request bound to `sig`. Returns `false` if the loop has exited.
    pub fn dispatch(&self, sig: ControlSignal) -> bool {
        let req = self.bindings.request_for(sig);
        tracing::info!(signal = sig.as_str(), request = req.as_str(), "control signal");
        self.handle.post(req)
    }

    /// Registers the signal streams and forwards them until `token` is cancelled or the
    /// supervisor loop goes away.
    pub fn spawn(self, token: CancellationToken) -> Result<JoinHandle<()>, SupervisorError> {
        let mut usr1 = signal(SignalKind::user_defined1()).map_err(SupervisorError::Signals)?;
        let mut usr2 = signal(SignalKind::user_defined2()).map_err(SupervisorError::Signals)?;
        let mut int = signal(SignalKind::interrupt()).map_err(SupervisorError::Signals)?;
        let mut term = signal(SignalKind::terminate()).map_err(SupervisorError::Signals)?;

        Ok(tokio::spawn(async move {
            loop {
                let sig = tokio::select! {
                    _ = token.cancelled() => break,
                    Some(()) = usr1.recv() => ControlSignal::User1,
                    Some(()) = usr2.recv() => ControlSignal::User2,
                    Some(()) = int.recv() => ControlSignal::Interrupt,
                    Some(()) = term.recv() => ControlSignal::Terminate,
                    else => break,
                };
                if !self.dispatch(sig) {
                    break;
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Codec, ReceiverConfig};
    use tokio::sync::{mpsc, watch};

    fn bridge(bindings: SignalBindings) -> (SignalBridge, mpsc::UnboundedReceiver<Request>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_state, state_rx) = watch::channel(Default::default());
        (SignalBridge::new(SupervisorHandle::new(tx, state_rx), bindings), rx)
    }

    #[test]
    fn receiver_defaults_toggle_on_usr1() {
        let profile = StreamProfile::Receiver(ReceiverConfig {
            port: 5600,
            payload_type: 96,
            codec: Codec::H264,
        });
        let b = SignalBindings::for_profile(&profile);
        assert_eq!(b.request_for(ControlSignal::User1), Request::ToggleRecording);
        assert_eq!(b.request_for(ControlSignal::User2), Request::Restart);
    }

    #[test]
    fn interrupt_and_terminate_always_stop() {
        let b = SignalBindings {
            usr1: Request::ToggleRecording,
            usr2: Request::ToggleRecording,
        };
        assert_eq!(b.request_for(ControlSignal::Interrupt), Request::Stop);
        assert_eq!(b.request_for(ControlSignal::Terminate), Request::Stop);
    }

    #[test]
    fn dispatch_only_posts_a_marker() {
        let (bridge, mut rx) = bridge(SignalBindings::sender());
        assert!(bridge.dispatch(ControlSignal::User1));
        assert!(bridge.dispatch(ControlSignal::User2));
        assert_eq!(rx.try_recv().unwrap(), Request::Restart);
        assert_eq!(rx.try_recv().unwrap(), Request::Stop);

        drop(rx);
        assert!(!bridge.dispatch(ControlSignal::User1));
    }
}
