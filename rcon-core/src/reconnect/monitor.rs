//! Periodic availability checks.
//!
//! The monitor probes on a fixed interval and reports only changes:
//! one `Available` when logins start working, one `Unavailable` once
//! enough probes in a row have failed.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::network::{self, ProbeReport, Target};

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(15);

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self) -> ProbeReport;
}

#[async_trait]
impl Prober for Target {
    async fn probe(&self) -> ProbeReport {
        network::probe(&self.info, &self.options).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityEvent {
    Available {
        latency: Duration,
    },
    Unavailable {
        reason: String,
        consecutive_failures: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Up,
    Down,
}

pub struct Monitor<P> {
    prober: P,
    interval: Duration,
    /// Failed probes in a row before `Unavailable` is reported.
    failure_threshold: u32,
}

impl<P: Prober> Monitor<P> {
    pub fn new(prober: P, interval: Duration) -> Self {
        Self {
            prober,
            interval,
            failure_threshold: 1,
        }
    }

    pub fn failure_threshold(mut self, failures: u32) -> Self {
        self.failure_threshold = failures.max(1);
        self
    }

    /// Probe until `shutdown` flips to `true` (or its sender is dropped)
    /// or the event receiver goes away.
    pub async fn run(
        self,
        events: mpsc::Sender<AvailabilityEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut status: Option<Status> = None;
        let mut failures: u32 = 0;

        info!(interval = ?self.interval, "availability monitor started");
        loop {
            let report = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                report = async {
                    ticker.tick().await;
                    self.prober.probe().await
                } => report,
            };

            let event = if report.is_available() {
                failures = 0;
                debug!(latency = ?report.latency, "probe ok");
                (status != Some(Status::Up)).then(|| {
                    status = Some(Status::Up);
                    AvailabilityEvent::Available {
                        latency: report.latency,
                    }
                })
            } else {
                failures = failures.saturating_add(1);
                debug!(failures, outcome = %report.outcome, "probe failed");
                (status != Some(Status::Down) && failures >= self.failure_threshold).then(|| {
                    status = Some(Status::Down);
                    AvailabilityEvent::Unavailable {
                        reason: report.outcome.to_string(),
                        consecutive_failures: failures,
                    }
                })
            };

            if let Some(event) = event {
                match &event {
                    AvailabilityEvent::Available { .. } => info!("server available"),
                    AvailabilityEvent::Unavailable { reason, .. } => {
                        warn!("server unavailable: {reason}")
                    }
                }
                if events.send(event).await.is_err() {
                    break;
                }
            }
        }
        info!("availability monitor stopped");
    }
}
