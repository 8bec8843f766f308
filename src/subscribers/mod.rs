//! # Event subscribers.
//!
//! ```text
//!   LifecycleSupervisor ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                                  ├──► LogWriter (tracing)
//!                                                                  └──► custom Subscribe impls
//! ```

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
