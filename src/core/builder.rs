use std::sync::Arc;

use crate::{
    config::{Config, StreamProfile},
    error::SupervisorError,
    events::Bus,
    pipeline::MediaBackend,
    recording::{Indicator, NoIndicator, RecordingBranchManager, SharedStatus, StorageLocator},
    subscribers::Subscribe,
};

use super::{handle::SupervisorHandle, supervisor::LifecycleSupervisor};

/// Builder for a [`LifecycleSupervisor`] and its control handle.
pub struct SupervisorBuilder {
    cfg: Config,
    profile: StreamProfile,
    subscribers: Vec<Arc<dyn Subscribe>>,
    status: Option<SharedStatus>,
    indicator: Box<dyn Indicator>,
}

impl SupervisorBuilder {
    /// Creates a builder for `profile` with no subscribers, no shared status region and
    /// no indicator.
    pub fn new(cfg: Config, profile: StreamProfile) -> Self {
        Self {
            cfg,
            profile,
            subscribers: Vec::new(),
            status: None,
            indicator: Box::new(NoIndicator),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive supervisor events (phase changes, restarts, recording)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Mirrors the recording state into a shared status region.
    pub fn with_status_region(mut self, status: SharedStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Drives `indicator` on while a recording is active.
    pub fn with_indicator(mut self, indicator: impl Indicator + 'static) -> Self {
        self.indicator = Box::new(indicator);
        self
    }

    /// Validates the configuration and wires the supervisor to `backend`.
    ///
    /// Nothing is spawned here; the subscriber workers start with
    /// [`LifecycleSupervisor::run`].
    pub fn build<B: MediaBackend>(
        self,
        backend: B,
    ) -> Result<(LifecycleSupervisor<B>, SupervisorHandle), SupervisorError> {
        self.cfg.validate()?;
        self.profile.validate()?;

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let recorder = RecordingBranchManager::new(
            StorageLocator::new(&self.cfg.mount_helper_path),
            self.status,
            self.indicator,
            self.cfg.drain_grace,
            bus.clone(),
        );
        Ok(LifecycleSupervisor::new(
            self.cfg,
            self.profile,
            backend,
            bus,
            self.subscribers,
            recorder,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReceiverConfig, SenderConfig};
    use crate::error::ConfigError;
    use crate::pipeline::sim::SimBackend;
    use std::time::Duration;

    #[test]
    fn invalid_profile_is_rejected() {
        let profile = StreamProfile::Sender(SenderConfig {
            address: "10.0.0.2".parse().unwrap(),
            port: 0,
            device: "/dev/video0".into(),
        });
        let (backend, _ctl) = SimBackend::new();
        let err = SupervisorBuilder::new(Config::default(), profile)
            .build(backend)
            .err()
            .unwrap();
        assert!(matches!(err, SupervisorError::Config(ConfigError::Port(0))));
    }

    #[test]
    fn zero_stall_threshold_is_rejected() {
        let cfg = Config {
            stall_threshold: Duration::ZERO,
            ..Config::default()
        };
        let profile = StreamProfile::Receiver(ReceiverConfig {
            port: 5600,
            payload_type: 96,
            codec: Default::default(),
        });
        let (backend, _ctl) = SimBackend::new();
        assert!(SupervisorBuilder::new(cfg, profile).build(backend).is_err());
    }
}
