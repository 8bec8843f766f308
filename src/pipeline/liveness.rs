//! Frame-arrival timestamp shared between a streaming thread and the supervisor loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

/// Last-frame timestamp of one graph.
///
/// [`mark`](Self::mark) is a single atomic store and may be called from any thread.
/// The timestamp is kept as microseconds since the probe's creation, offset by one so
/// that zero means "no frame observed yet".
#[derive(Clone, Debug)]
pub struct FrameProbe {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    epoch: Instant,
    last: AtomicU64,
}

impl FrameProbe {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                epoch: Instant::now(),
                last: AtomicU64::new(0),
            }),
        }
    }

    /// Records a frame arrival now.
    pub fn mark(&self) {
        let since = Instant::now().saturating_duration_since(self.inner.epoch);
        let us = since.as_micros().min(u128::from(u64::MAX - 1)) as u64;
        self.inner.last.store(us + 1, Ordering::Release);
    }

    /// Time of the last frame, or `None` if no frame has arrived yet.
    pub fn last_frame(&self) -> Option<Instant> {
        match self.inner.last.load(Ordering::Acquire) {
            0 => None,
            us => Some(self.inner.epoch + std::time::Duration::from_micros(us - 1)),
        }
    }
}

impl Default for FrameProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn unmarked_probe_has_no_frame() {
        let probe = FrameProbe::new();
        assert!(probe.last_frame().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn mark_tracks_latest_arrival() {
        let probe = FrameProbe::new();
        tokio::time::advance(Duration::from_millis(40)).await;
        probe.mark();
        let first = probe.last_frame().unwrap();

        tokio::time::advance(Duration::from_millis(40)).await;
        probe.clone().mark();
        let second = probe.last_frame().unwrap();

        assert_eq!(second - first, Duration::from_millis(40));
        assert_eq!(Instant::now() - second, Duration::ZERO);
    }
}
