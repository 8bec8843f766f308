//! Shared recording-status region.
//!
//! Cooperating processes (the OSD renderer, the telemetry bridge) map the same file and
//! read the first word to learn whether a recording is in progress, without any IPC
//! round-trip. Layout:
//!
//! ```text
//! offset 0..4   i32 (native endian)  recording active: 0 / 1
//! offset 4..    owned by other writers, never touched here
//! ```
//!
//! The region has a single writer (this process) and the flag is updated with one
//! aligned atomic store.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::{MmapMut, MmapOptions};

use crate::error::StatusRegionError;

/// Size the backing file is grown to if it is shorter.
pub const REGION_SIZE: u64 = 4096;

/// Writable view of the shared status region.
pub struct SharedStatus {
    path: PathBuf,
    map: MmapMut,
}

impl SharedStatus {
    /// Opens (creating if needed) and maps the region at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StatusRegionError> {
        let path = path.as_ref().to_path_buf();
        let err = |source| StatusRegionError {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(err)?;
        if file.metadata().map_err(err)?.len() < REGION_SIZE {
            file.set_len(REGION_SIZE).map_err(err)?;
        }

        // SAFETY: the mapping is shared with other processes that only ever read or
        // write whole words; we never hand out references into it.
        let map = unsafe { MmapOptions::new().len(REGION_SIZE as usize).map_mut(&file) }
            .map_err(err)?;
        let mut status = Self { path, map };
        status.set(false);
        Ok(status)
    }

    /// Publishes the recording flag.
    pub fn set(&mut self, active: bool) {
        let value = i32::from(active) as u32;
        // SAFETY: the mapping is page aligned and at least 4 bytes long, so offset 0 is
        // a valid, aligned u32 for the lifetime of `self.map`.
        let word = unsafe { &*(self.map.as_mut_ptr() as *const AtomicU32) };
        word.store(value, Ordering::Release);
    }

    /// Reads the flag back.
    pub fn is_set(&self) -> bool {
        // SAFETY: see `set`.
        let word = unsafe { &*(self.map.as_ptr() as *const AtomicU32) };
        word.load(Ordering::Acquire) != 0
    }
}

impl std::fmt::Debug for SharedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStatus")
            .field("path", &self.path)
            .field("active", &self.is_set())
            .finish()
    }
}
