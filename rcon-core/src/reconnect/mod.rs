//! Reconnect policy, kept outside of [`Connection`](crate::Connection).
//!
//! A closed connection stays closed. Callers that want to stay online
//! pair a [`Supervisor`] (retry with [`Backoff`]) with a [`Monitor`]
//! that says when retrying is worthwhile.

pub mod backoff;
pub mod monitor;
pub mod supervisor;

pub use backoff::Backoff;
pub use monitor::{AvailabilityEvent, DEFAULT_MONITOR_INTERVAL, Monitor, Prober};
pub use supervisor::{Connector, Supervisor};
