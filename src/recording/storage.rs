//! Removable-storage discovery.
//!
//! A kernel helper publishes the mount point of the currently inserted stick as the
//! contents of a single sysfs file. Recording is only allowed when that file exists
//! and names an existing directory.

use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::error::StorageError;

/// Resolves the current recording destination directory.
#[derive(Clone, Debug)]
pub struct StorageLocator {
    helper: PathBuf,
}

impl StorageLocator {
    pub fn new(helper: impl Into<PathBuf>) -> Self {
        Self {
            helper: helper.into(),
        }
    }

    /// Returns the mount point of the removable storage.
    pub fn locate(&self) -> Result<PathBuf, StorageError> {
        if !self.helper.is_file() {
            return Err(StorageError::HelperAbsent {
                path: self.helper.clone(),
            });
        }
        let raw = fs::read_to_string(&self.helper).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => StorageError::HelperAbsent {
                path: self.helper.clone(),
            },
            _ => StorageError::HelperUnreadable {
                path: self.helper.clone(),
                source,
            },
        })?;

        // The helper keeps whatever was written to it, including the trailing newline.
        let mount = raw.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if mount.is_empty() {
            return Err(StorageError::NotMounted);
        }
        let mount = PathBuf::from(mount);
        if !mount.is_dir() {
            return Err(StorageError::NotADirectory { path: mount });
        }
        Ok(mount)
    }
}

/// File name of a recording started at `at`: `recording_YYYYmmdd_HHMMSS.mp4`.
pub fn recording_file_name(at: DateTime<Local>) -> String {
    format!("recording_{}.mp4", at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn missing_helper_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let locator = StorageLocator::new(dir.path().join("mount_point"));
        assert!(matches!(
            locator.locate(),
            Err(StorageError::HelperAbsent { .. })
        ));
    }

    #[test]
    fn helper_pointing_to_directory_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let mount = dir.path().join("usb0");
        fs::create_dir(&mount).unwrap();
        let helper = dir.path().join("mount_point");
        fs::write(&helper, format!("{}\n", mount.display())).unwrap();

        assert_eq!(StorageLocator::new(&helper).locate().unwrap(), mount);
    }

    #[test]
    fn empty_helper_means_not_mounted() {
        let dir = tempfile::tempdir().unwrap();
        let helper = dir.path().join("mount_point");
        fs::write(&helper, "\n").unwrap();
        assert!(matches!(
            StorageLocator::new(&helper).locate(),
            Err(StorageError::NotMounted)
        ));
    }

    #[test]
    fn stale_mount_point_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let helper = dir.path().join("mount_point");
        fs::write(&helper, dir.path().join("gone").display().to_string()).unwrap();
        assert!(matches!(
            StorageLocator::new(&helper).locate(),
            Err(StorageError::NotADirectory { .. })
        ));
    }

    #[test]
    fn file_name_uses_local_timestamp() {
        let at = Local.with_ymd_and_hms(2026, 10, 18, 9, 5, 3).unwrap();
        assert_eq!(recording_file_name(at), "recording_20261018_090503.mp4");
    }
}
