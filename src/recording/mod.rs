//! # Recording: hot-plugged file branch and its external mirrors.
//!
//! ```text
//!   toggle ──► RecordingBranchManager ──► Graph::attach_branch / begin_drain / detach_branch
//!                     │
//!                     ├──► StorageLocator   (where to write; refusal if absent)
//!                     ├──► SharedStatus     (word 0 of the shared region)
//!                     └──► Indicator        (REC led)
//! ```

mod indicator;
mod manager;
mod status;
mod storage;

pub use indicator::{Indicator, NoIndicator, SysfsLed};
pub use manager::{RecordingBranchManager, RecordingSession, RecordingState, ToggleOutcome};
pub use status::{REGION_SIZE, SharedStatus};
pub use storage::{StorageLocator, recording_file_name};
