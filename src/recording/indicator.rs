//! Recording indicator (the "REC" LED).

use std::fs;
use std::path::PathBuf;

/// Something that shows whether a recording is in progress.
///
/// Driving the indicator is best effort: failures are logged, never propagated.
pub trait Indicator: Send {
    fn set(&mut self, on: bool);
}

/// No indicator attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoIndicator;

impl Indicator for NoIndicator {
    fn set(&mut self, _on: bool) {}
}

/// LED behind a sysfs GPIO `value` file (e.g. `/sys/class/gpio/gpio22/value`).
#[derive(Clone, Debug)]
pub struct SysfsLed {
    value: PathBuf,
}

impl SysfsLed {
    /// The pin must already be exported and configured as an output.
    pub fn new(value: impl Into<PathBuf>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Indicator for SysfsLed {
    fn set(&mut self, on: bool) {
        let level = if on { "1" } else { "0" };
        if let Err(e) = fs::write(&self.value, level) {
            tracing::warn!(path = %self.value.display(), error = %e, "cannot drive recording led");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sysfs_led_writes_level() {
        let dir = tempfile::tempdir().unwrap();
        let value = dir.path().join("value");
        let mut led = SysfsLed::new(&value);

        led.set(true);
        assert_eq!(fs::read_to_string(&value).unwrap(), "1");
        led.set(false);
        assert_eq!(fs::read_to_string(&value).unwrap(), "0");
    }
}
