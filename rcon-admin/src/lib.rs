//! # rcon-admin
//!
//! Command-line front end for `rcon-core`.
//!
//! ## Modes
//!
//! - **One-shot**: connect, run one command, print the result, disconnect.
//! - **Shell**: one command per stdin line, reconnecting with backoff.
//! - **Probe / Monitor**: check whether the server accepts logins, once
//!   or on an interval.
//!
//! Results print as plain text, or as `{"success":..}` JSON with `--json`.

pub mod config;
pub mod report;
pub mod shell;
