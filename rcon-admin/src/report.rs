//! What gets printed for each result, as plain text or JSON.

use rcon_core::{AvailabilityEvent, ProbeReport, RconError};
use serde::Serialize;

/// Outcome of one command, in the shape HTTP bridges return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReport {
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>, result: &Result<String, RconError>) -> Self {
        let command = command.into();
        match result {
            Ok(response) => Self {
                success: true,
                command,
                response: Some(response.clone()),
                error: None,
            },
            Err(e) => Self {
                success: false,
                command,
                response: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn render(&self, json: bool) -> Result<String, serde_json::Error> {
        if json {
            return serde_json::to_string(self);
        }
        Ok(match (&self.response, &self.error) {
            (Some(response), _) => response.clone(),
            (None, Some(error)) => format!("error: {error}"),
            (None, None) => String::new(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeSummary {
    pub available: bool,
    pub outcome: String,
    pub latency_ms: u64,
}

impl From<&ProbeReport> for ProbeSummary {
    fn from(report: &ProbeReport) -> Self {
        Self {
            available: report.is_available(),
            outcome: report.outcome.to_string(),
            latency_ms: report.latency.as_millis() as u64,
        }
    }
}

impl ProbeSummary {
    pub fn render(&self, json: bool) -> Result<String, serde_json::Error> {
        if json {
            return serde_json::to_string(self);
        }
        Ok(format!("{} ({} ms)", self.outcome, self.latency_ms))
    }
}

/// One monitor transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum EventSummary {
    Available {
        latency_ms: u64,
    },
    Unavailable {
        reason: String,
        consecutive_failures: u32,
    },
}

impl From<&AvailabilityEvent> for EventSummary {
    fn from(event: &AvailabilityEvent) -> Self {
        match event {
            AvailabilityEvent::Available { latency } => EventSummary::Available {
                latency_ms: latency.as_millis() as u64,
            },
            AvailabilityEvent::Unavailable {
                reason,
                consecutive_failures,
            } => EventSummary::Unavailable {
                reason: reason.clone(),
                consecutive_failures: *consecutive_failures,
            },
        }
    }
}

impl EventSummary {
    pub fn render(&self, json: bool) -> Result<String, serde_json::Error> {
        if json {
            return serde_json::to_string(self);
        }
        Ok(match self {
            EventSummary::Available { latency_ms } => format!("available ({latency_ms} ms)"),
            EventSummary::Unavailable {
                reason,
                consecutive_failures,
            } => format!("unavailable after {consecutive_failures} failed probe(s): {reason}"),
        })
    }
}
