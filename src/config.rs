//! # Runtime configuration.
//!
//! [`Config`] centralizes the supervisor's timing knobs and the well-known paths of
//! its external surfaces. [`StreamProfile`] describes which graph to build.
//!
//! ## Defaults
//! | knob                | default                                |
//! |---------------------|----------------------------------------|
//! | `watchdog_interval` | 1s                                     |
//! | `stall_threshold`   | 300ms                                  |
//! | `retry`             | fixed 5s                               |
//! | `settle_delay`      | 250ms                                  |
//! | `drain_grace`       | 50ms                                   |
//! | `bus_capacity`      | 1024                                   |
//! | `status_path`       | `/dev/shm/channel_data`                |
//! | `mount_helper_path` | `/sys/kernel/mount_helper/mount_point` |

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::policies::BackoffPolicy;

/// Default UDP port for both profiles.
pub const DEFAULT_PORT: u16 = 5600;

/// Default dynamic RTP payload type.
pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;

/// Compressed video codec carried over RTP.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Codec {
    #[default]
    H264,
    H265,
}

impl Codec {
    /// Lower-case codec tag used in stage factory names (`rtph264depay`, `h265parse`, ...).
    pub fn tag(&self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::H265 => "h265",
        }
    }

    /// RTP `encoding-name` for the caps of the network source.
    pub fn encoding_name(&self) -> &'static str {
        match self {
            Codec::H264 => "H264",
            Codec::H265 => "H265",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encoding_name())
    }
}

/// Camera → encoder → RTP/UDP sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SenderConfig {
    pub address: IpAddr,
    pub port: u16,
    /// Capture device of the camera.
    pub device: PathBuf,
}

/// RTP/UDP receiver → display, with a tee for the recording branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiverConfig {
    pub port: u16,
    pub payload_type: u8,
    pub codec: Codec,
}

/// Which graph the backend builds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamProfile {
    Sender(SenderConfig),
    Receiver(ReceiverConfig),
}

impl StreamProfile {
    /// Short name used in logs and events.
    pub fn name(&self) -> &'static str {
        match self {
            StreamProfile::Sender(_) => "camera-h264-streamer",
            StreamProfile::Receiver(_) => "rtp-viewer-pipeline",
        }
    }

    /// Checks the numeric parameters against their wire ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StreamProfile::Sender(s) => check_port(s.port),
            StreamProfile::Receiver(r) => {
                check_port(r.port)?;
                if r.payload_type > 127 {
                    return Err(ConfigError::PayloadType(u32::from(r.payload_type)));
                }
                Ok(())
            }
        }
    }
}

fn check_port(port: u16) -> Result<(), ConfigError> {
    if port == 0 {
        return Err(ConfigError::Port(0));
    }
    Ok(())
}

/// Supervisor configuration.
///
/// ## Field semantics
/// - `watchdog_interval`: how often liveness is checked while `Running`
/// - `stall_threshold`: age of the last frame that counts as a stall
/// - `retry`: delay schedule of `BackoffWait` after a failed build
/// - `settle_delay`: pause between teardown and rebuild so device nodes are released
/// - `drain_grace`: time a draining recording branch gets to flush its trailer
/// - `bus_capacity`: event bus ring buffer size (min 1)
#[derive(Clone, Debug)]
pub struct Config {
    pub watchdog_interval: Duration,
    pub stall_threshold: Duration,
    pub retry: BackoffPolicy,
    pub settle_delay: Duration,
    pub drain_grace: Duration,
    pub bus_capacity: usize,
    /// Backing file of the shared recording-status region.
    pub status_path: PathBuf,
    /// File naming the mount point of removable storage.
    pub mount_helper_path: PathBuf,
}

impl Config {
    /// Rejects zero durations where a zero would spin the loop or disable a check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watchdog_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("watchdog_interval"));
        }
        if self.stall_threshold.is_zero() {
            return Err(ConfigError::ZeroDuration("stall_threshold"));
        }
        Ok(())
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watchdog_interval: Duration::from_secs(1),
            stall_threshold: Duration::from_millis(300),
            retry: BackoffPolicy::default(),
            settle_delay: Duration::from_millis(250),
            drain_grace: Duration::from_millis(50),
            bus_capacity: 1024,
            status_path: PathBuf::from("/dev/shm/channel_data"),
            mount_helper_path: PathBuf::from("/sys/kernel/mount_helper/mount_point"),
        }
    }
}
