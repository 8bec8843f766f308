//! Error types used by the pipevisor runtime and its collaborators.
//!
//! The taxonomy follows how a failure is handled, not where it comes from:
//!
//! - [`BuildError`]: a build attempt failed (missing stage, link failure, refused
//!   state change). Aborts the attempt only; the supervisor backs off and retries.
//! - [`BranchError`]: the recording branch could not be attached. The main graph is
//!   never affected.
//! - [`StorageError`]: no writable destination is available. Surfaces as an
//!   observable refusal, never as a failure.
//! - [`StatusRegionError`]: the shared status region could not be mapped.
//! - [`ConfigError`]: startup parameters are out of range.
//! - [`SupervisorError`]: the supervisor loop itself could not run.
//!
//! Every type provides `as_label` (stable snake_case label for logs).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::GraphState;

/// # Errors produced while building or starting a graph.
///
/// All variants are retryable: the supervisor enters `BackoffWait` and tries again.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A required processing stage cannot be instantiated (plugin not installed).
    #[error("no such element or plugin \"{factory}\"")]
    CapabilityMissing {
        /// Factory name of the missing stage.
        factory: String,
    },

    /// Two stages could not be connected.
    #[error("could not link {from} to {to}")]
    Link {
        /// Upstream stage name.
        from: String,
        /// Downstream stage name.
        to: String,
    },

    /// The graph refused to change run state.
    #[error("unable to set graph to {target:?}")]
    StateChange {
        /// State that was requested.
        target: GraphState,
    },
}

impl BuildError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use pipevisor::BuildError;
    ///
    /// let err = BuildError::CapabilityMissing { factory: "v4l2h264enc".into() };
    /// assert_eq!(err.as_label(), "build_capability_missing");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BuildError::CapabilityMissing { .. } => "build_capability_missing",
            BuildError::Link { .. } => "build_link_failed",
            BuildError::StateChange { .. } => "build_state_change",
        }
    }
}

/// # Errors produced while attaching a recording branch.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BranchError {
    /// The running graph has no duplication point to attach to.
    #[error("graph has no duplication point")]
    NoDuplicationPoint,

    /// The duplication point refused to hand out a new attach point.
    #[error("duplication point refused a new attach point")]
    AttachPointUnavailable,

    /// A branch stage could not be instantiated or linked.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The recording destination is not available.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl BranchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BranchError::NoDuplicationPoint => "branch_no_duplication_point",
            BranchError::AttachPointUnavailable => "branch_attach_point_unavailable",
            BranchError::Build(_) => "branch_build_failed",
            BranchError::Storage(e) => e.as_label(),
        }
    }
}

/// # Removable storage is not usable right now.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StorageError {
    /// The mount helper file does not exist (module not loaded, nothing mounted).
    #[error("mount helper {path} is absent")]
    HelperAbsent {
        /// Path of the mount helper file.
        path: PathBuf,
    },

    /// The mount helper file exists but could not be read.
    #[error("mount helper {path} is unreadable: {source}")]
    HelperUnreadable {
        /// Path of the mount helper file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The mount helper is empty.
    #[error("no removable storage mounted")]
    NotMounted,

    /// The advertised mount point is not an existing directory.
    #[error("mount point {path} is not a directory")]
    NotADirectory {
        /// Advertised mount point.
        path: PathBuf,
    },
}

impl StorageError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StorageError::HelperAbsent { .. } => "storage_helper_absent",
            StorageError::HelperUnreadable { .. } => "storage_helper_unreadable",
            StorageError::NotMounted => "storage_not_mounted",
            StorageError::NotADirectory { .. } => "storage_not_a_directory",
        }
    }
}

/// # The shared status region could not be opened or mapped.
#[derive(Error, Debug)]
#[error("status region {path}: {source}")]
pub struct StatusRegionError {
    /// Backing file of the region.
    pub path: PathBuf,
    /// Underlying I/O error.
    #[source]
    pub source: io::Error,
}

impl StatusRegionError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        "status_region_unavailable"
    }
}

/// # Startup parameters are invalid.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Port outside 1..=65535.
    #[error("port {0} is outside 1..=65535")]
    Port(u32),

    /// RTP payload type outside 0..=127.
    #[error("payload type {0} is outside 0..=127")]
    PayloadType(u32),

    /// A duration knob that must be non-zero is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Port(_) => "config_port",
            ConfigError::PayloadType(_) => "config_payload_type",
            ConfigError::ZeroDuration(_) => "config_zero_duration",
        }
    }
}

/// # Errors that stop the supervisor loop from running at all.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The configuration was rejected before the loop started.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// OS signal registration failed.
    #[error("signal registration failed: {0}")]
    Signals(#[source] io::Error),
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::Config(e) => e.as_label(),
            SupervisorError::Signals(_) => "supervisor_signals",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_label_through_branch_error() {
        let err: BranchError = StorageError::NotMounted.into();
        assert_eq!(err.as_label(), "storage_not_mounted");
        assert_eq!(err.to_string(), "no removable storage mounted");
    }

    #[test]
    fn build_error_messages_name_the_stage() {
        let err = BuildError::Link {
            from: "parser".into(),
            to: "tee".into(),
        };
        assert_eq!(err.to_string(), "could not link parser to tee");
        assert_eq!(err.as_label(), "build_link_failed");
    }
}
