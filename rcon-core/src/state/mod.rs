pub mod connection;
pub mod correlator;

pub use connection::{AuthState, ConnectionPhase};
pub use correlator::{Correlator, Dispatch, PendingRequest, Reply};
