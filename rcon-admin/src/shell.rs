//! Line-oriented admin shell.
//!
//! Reads one console command per line, prints one result per line,
//! and reconnects through the supervisor whenever the previous
//! connection has closed.

use std::io::Write;

use rcon_core::{Connection, Connector, RconError, Supervisor};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

use crate::report::CommandReport;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShellStats {
    pub executed: usize,
    pub failed: usize,
}

pub struct AdminShell<C> {
    supervisor: Supervisor<C>,
    json: bool,
    session: Option<Connection>,
}

impl<C: Connector<Session = Connection>> AdminShell<C> {
    pub fn new(supervisor: Supervisor<C>, json: bool) -> Self {
        Self {
            supervisor,
            json,
            session: None,
        }
    }

    /// Run until `quit`/`exit`, end of input, or a connect failure the
    /// supervisor gives up on.
    pub async fn run<R, W>(
        &mut self,
        input: R,
        out: &mut W,
    ) -> Result<ShellStats, Box<dyn std::error::Error>>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        let mut stats = ShellStats::default();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line, "quit" | "exit") {
                break;
            }

            let result = self.connection().await?.execute(line).await;
            stats.executed += 1;
            if result.is_err() {
                stats.failed += 1;
            }
            writeln!(out, "{}", CommandReport::new(line, &result).render(self.json)?)?;
            out.flush()?;
        }

        if let Some(conn) = self.session.take() {
            conn.disconnect();
        }
        debug!(?stats, "shell finished");
        Ok(stats)
    }

    /// The live connection, reconnecting if the last one closed.
    async fn connection(&mut self) -> Result<&Connection, RconError> {
        let stale = self
            .session
            .as_ref()
            .is_none_or(|conn| conn.phase().is_closed());
        if stale {
            if self.session.take().is_some() {
                info!("connection lost; reconnecting");
            }
            self.session = Some(self.supervisor.connect().await?);
        }
        self.session.as_ref().ok_or(RconError::NotConnected)
    }
}
