//! Caller-level reconnect loop.
//!
//! A `Connection` is one TCP session and is never revived. The
//! supervisor retries "build a fresh connection + connect" with a
//! [`Backoff`] between attempts until one succeeds, the error is not
//! worth retrying, or the attempt budget runs out.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::RconError;
use crate::network::{Connection, Target};
use crate::reconnect::backoff::Backoff;

/// Something that can produce a connected session.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Send;

    async fn connect(&self) -> Result<Self::Session, RconError>;
}

#[async_trait]
impl Connector for Target {
    type Session = Connection;

    async fn connect(&self) -> Result<Connection, RconError> {
        let conn = self.connection();
        conn.connect().await?;
        Ok(conn)
    }
}

pub struct Supervisor<C> {
    connector: C,
    backoff: Backoff,
    /// Total attempts including the first; `None` retries forever.
    max_attempts: Option<u32>,
}

impl<C: Connector> Supervisor<C> {
    pub fn new(connector: C, backoff: Backoff) -> Self {
        Self {
            connector,
            backoff,
            max_attempts: None,
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Connect, retrying retryable failures.
    pub async fn connect(&self) -> Result<C::Session, RconError> {
        let mut attempt: u32 = 0;
        loop {
            let err = match self.connector.connect().await {
                Ok(session) => {
                    if attempt > 0 {
                        info!(attempts = attempt + 1, "reconnected");
                    }
                    return Ok(session);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                warn!("giving up: {err}");
                return Err(err);
            }
            attempt += 1;
            if self.max_attempts.is_some_and(|max| attempt >= max) {
                warn!(attempts = attempt, "giving up after last attempt: {err}");
                return Err(err);
            }

            let delay = self.backoff.delay(attempt - 1);
            warn!(attempt, ?delay, "connect failed: {err}; retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Fails `failures` times with `error`, then yields the attempt number.
    struct Flaky {
        failures: u32,
        error: fn() -> RconError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Connector for Flaky {
        type Session = u32;

        async fn connect(&self) -> Result<u32, RconError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err((self.error)())
            } else {
                Ok(n + 1)
            }
        }
    }

    fn flaky(failures: u32, error: fn() -> RconError) -> Flaky {
        Flaky {
            failures,
            error,
            calls: AtomicU32::new(0),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success_with_backoff() {
        let sup = Supervisor::new(
            flaky(3, || RconError::ConnectRefused("x".into())),
            Backoff::exponential(Duration::from_secs(1), Duration::from_secs(60)).with_jitter(0.0),
        );
        let started = Instant::now();
        let attempt = sup.connect().await.unwrap();
        assert_eq!(attempt, 4);
        // 1s + 2s + 4s of sleeping.
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_is_not_retried() {
        let sup = Supervisor::new(
            flaky(5, || RconError::AuthenticationFailed("bad".into())),
            Backoff::fixed(Duration::from_secs(15)),
        );
        let err = sup.connect().await.unwrap_err();
        assert!(matches!(err, RconError::AuthenticationFailed(_)));
        assert_eq!(sup.connector().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_budget_is_respected() {
        let sup = Supervisor::new(
            flaky(10, || RconError::ConnectTimeout(Duration::from_secs(1))),
            Backoff::fixed(Duration::from_secs(30)),
        )
        .max_attempts(3);
        let started = Instant::now();
        let err = sup.connect().await.unwrap_err();
        assert!(matches!(err, RconError::ConnectTimeout(_)));
        assert_eq!(sup.connector().calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
    }
}
