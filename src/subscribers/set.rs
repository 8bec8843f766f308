//! # SubscriberSet: per-subscriber queues behind the bus listener.
//!
//! The bus listener task calls [`SubscriberSet::emit`] for every lifecycle event. Each
//! subscriber owns a bounded queue and a worker task, so a slow log sink or a
//! panicking custom subscriber never holds up the supervisor loop or its peers.
//!
//! ```text
//!   Bus ─► listener ─► emit(&Event) ─┬─ try_send ─► [queue LogWriter] ─► worker ─► on_event
//!                                    └─ try_send ─► [queue custom]    ─► worker ─► on_event
//! ```
//!
//! Delivery is FIFO per subscriber. A full queue drops the event for that subscriber
//! only; drops are counted and reported at `warn`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::Event;

use super::Subscribe;

struct Slot {
    name: &'static str,
    queue: mpsc::Sender<Arc<Event>>,
    dropped: AtomicU64,
}

/// Fan-out of lifecycle events to the registered subscribers.
pub struct SubscriberSet {
    slots: Vec<Slot>,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let (slots, workers): (Vec<Slot>, Vec<JoinHandle<()>>) = subs
            .into_iter()
            .map(|sub| {
                let (queue, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let slot = Slot {
                    name: sub.name(),
                    queue,
                    dropped: AtomicU64::new(0),
                };
                (slot, tokio::spawn(drive(sub, rx)))
            })
            .unzip();
        Self { slots, workers }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Queues `event` for every subscriber without waiting on any of them.
    pub fn emit(&self, event: &Event) {
        if self.slots.is_empty() {
            return;
        }
        let shared = Arc::new(event.clone());
        for slot in &self.slots {
            match slot.queue.try_send(Arc::clone(&shared)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let dropped = slot.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        subscriber = slot.name,
                        seq = shared.seq,
                        kind = ?shared.kind,
                        dropped,
                        "subscriber queue full, event dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!(subscriber = slot.name, "subscriber worker is gone");
                }
            }
        }
    }

    /// Events dropped so far for the subscriber called `name`.
    pub fn dropped(&self, name: &str) -> u64 {
        self.slots
            .iter()
            .filter(|s| s.name == name)
            .map(|s| s.dropped.load(Ordering::Relaxed))
            .sum()
    }

    /// Closes the queues and waits until every worker has handled what was queued.
    pub async fn shutdown(self) {
        drop(self.slots);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "subscriber worker did not finish cleanly");
            }
        }
    }
}

async fn drive(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>) {
    while let Some(ev) = rx.recv().await {
        let handled = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await;
        if let Err(payload) = handled {
            tracing::error!(
                subscriber = sub.name(),
                seq = ev.seq,
                panic = %panic_message(payload.as_ref()),
                "subscriber panicked; event skipped"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
