//! # Event bus for supervisor events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. The supervisor loop is
//! the only publisher; observers (the subscriber fan-out, tests, embedding
//! applications) each hold their own receiver.
//!
//! ```text
//!  LifecycleSupervisor ── publish(Event) ──► Bus ──┬──► subscriber listener ──► SubscriberSet
//!                                                  └──► Bus::subscribe() (any observer)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks the loop.
//! - **Bounded capacity**: slow receivers observe `RecvError::Lagged(n)`.
//! - **No persistence**: events are lost if nobody is subscribed at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for supervisor events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers; dropped if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that observes subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_only_see_later_events() {
        let bus = Bus::new(4);
        bus.publish(Event::new(EventKind::GraphPlaying));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::GraphTornDown));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::GraphTornDown);
    }
}
