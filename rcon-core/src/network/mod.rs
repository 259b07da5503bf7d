pub mod connection;
pub mod options;
pub mod probe;

pub use connection::{Connection, ConnectionInfo, Target};
pub use options::{ConnectOptions, InFlightPolicy};
pub use probe::{ProbeOutcome, ProbeReport, probe};
