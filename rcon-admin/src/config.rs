//! Configuration for the admin client.

use std::path::Path;
use std::time::Duration;

use rcon_core::reconnect::DEFAULT_MONITOR_INTERVAL;
use rcon_core::{
    AuthMatcher, Backoff, ConnectOptions, ConnectionInfo, InFlightPolicy, Target, WireVariant,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Environment variable that overrides `[target].password`.
pub const PASSWORD_ENV: &str = "RCON_PASSWORD";

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Server to talk to.
    pub target: TargetConfig,
    /// Connect / auth / command deadlines.
    pub timeouts: TimeoutConfig,
    /// Auth acceptance phrases (opcode variant only).
    pub auth: AuthMatcher,
    /// Retry schedule for the shell.
    pub reconnect: ReconnectConfig,
    /// Availability monitor.
    pub monitor: MonitorConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
    /// Prefer `RCON_PASSWORD` over storing this in the file.
    pub password: String,
    /// Wire framing: "opcode" or "source".
    pub variant: WireVariant,
    /// "queue" or "reject" when a command is already in flight.
    pub in_flight: InFlightPolicy,
}

/// Deadlines in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_ms: u64,
    pub auth_ms: u64,
    pub command_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of each delay to randomise.
    pub jitter: f64,
    /// 0 = retry forever.
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_ms: u64,
    /// Failed probes in a row before the server is reported down.
    pub failure_threshold: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 16007,
            password: String::new(),
            variant: WireVariant::Opcode,
            in_flight: InFlightPolicy::Queue,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 10_000,
            auth_ms: 5_000,
            command_ms: 15_000,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 15_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter: 0.1,
            max_attempts: 0,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_MONITOR_INTERVAL.as_millis() as u64,
            failure_threshold: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Why a config file was not used.
#[derive(Debug)]
pub enum ConfigFileError {
    Missing,
    Invalid(toml::de::Error),
}

impl ConfigFileError {
    /// Report that defaults are in use. Needs a subscriber installed.
    pub fn log_fallback(&self, path: &Path) {
        match self {
            Self::Missing => info!("no config at {}; using defaults", path.display()),
            Self::Invalid(e) => warn!("invalid config {}: {e}; using defaults", path.display()),
        }
    }
}

impl AdminConfig {
    /// Read configuration from a TOML file.
    ///
    /// Errors are returned rather than logged, because the log level
    /// itself comes from this file.
    pub fn read(path: &Path) -> Result<Self, ConfigFileError> {
        let contents = std::fs::read_to_string(path).map_err(|_| ConfigFileError::Missing)?;
        toml::from_str(&contents).map_err(ConfigFileError::Invalid)
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Apply `RCON_PASSWORD` if it is set and non-empty.
    pub fn apply_env(&mut self) {
        self.override_password(std::env::var(PASSWORD_ENV).ok());
    }

    pub fn override_password(&mut self, password: Option<String>) {
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.target.password = password;
        }
    }

    // ── Conversions ──────────────────────────────────────────────

    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo::new(
            self.target.host.clone(),
            self.target.port,
            self.target.password.clone(),
        )
    }

    pub fn to_connect_options(&self) -> ConnectOptions {
        ConnectOptions::new(self.target.variant)
            .with_connect_timeout(Duration::from_millis(self.timeouts.connect_ms.max(1)))
            .with_auth_timeout(Duration::from_millis(self.timeouts.auth_ms.max(1)))
            .with_command_timeout(Duration::from_millis(self.timeouts.command_ms.max(1)))
            .with_auth_matcher(self.auth.clone())
            .with_in_flight(self.target.in_flight)
    }

    pub fn target(&self) -> Target {
        Target::new(self.connection_info(), self.to_connect_options())
    }

    pub fn backoff(&self) -> Backoff {
        let r = &self.reconnect;
        Backoff {
            initial: Duration::from_millis(r.initial_delay_ms),
            max: Duration::from_millis(r.max_delay_ms.max(r.initial_delay_ms)),
            multiplier: r.multiplier,
            jitter: r.jitter,
        }
    }

    /// `None` means retry forever.
    pub fn max_attempts(&self) -> Option<u32> {
        (self.reconnect.max_attempts > 0).then_some(self.reconnect.max_attempts)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.interval_ms.max(1))
    }
}

// ── Tests ────────────────────────────────────────────────────────
