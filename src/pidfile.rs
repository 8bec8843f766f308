//! PID file at a well-known path, so helper scripts can `kill -USR1 $(cat ...)`.

use std::fs;
use std::io;
use std::path::Path;

/// Writes the current process id to `path`, replacing any previous content.
pub fn write_pid(path: impl AsRef<Path>) -> io::Result<u32> {
    let pid = std::process::id();
    fs::write(path, pid.to_string())?;
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites_stale_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream-viewer.pid");
        fs::write(&path, "999999999\n").unwrap();

        let pid = write_pid(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), pid.to_string());
    }
}
