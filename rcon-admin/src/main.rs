//! rcon-admin entry point.
//!
//! ```text
//! rcon-admin exec listplayers            Run one console command
//! rcon-admin announce Restart in 5 min   Broadcast a message
//! rcon-admin kick <player> [reason]      Kick a player
//! rcon-admin shell                       One command per stdin line
//! rcon-admin probe                       Check that logins work
//! rcon-admin monitor                     Probe on an interval
//! rcon-admin --json <command>            Print results as JSON
//! rcon-admin --gen-config                Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rcon_admin::config::AdminConfig;
use rcon_admin::report::{CommandReport, EventSummary, ProbeSummary};
use rcon_admin::shell::AdminShell;
use rcon_core::{Command, Connection, Monitor, Supervisor, WireVariant, probe};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rcon-admin", version, about = "RCON admin client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "rcon-admin.toml")]
    config: PathBuf,

    /// Server host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Server RCON port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// RCON password (overrides config and RCON_PASSWORD).
    #[arg(long)]
    password: Option<String>,

    /// Wire framing: "opcode" or "source".
    #[arg(long)]
    variant: Option<WireVariant>,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    action: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Run a free-form console command.
    Exec {
        #[arg(required = true)]
        command: Vec<String>,
    },
    /// Broadcast a message to every player.
    Announce {
        #[arg(required = true)]
        message: Vec<String>,
    },
    /// Message a single player.
    Message {
        player: String,
        #[arg(required = true)]
        message: Vec<String>,
    },
    Kick {
        player: String,
        #[arg(default_value = "")]
        reason: String,
    },
    Ban {
        player: String,
        #[arg(default_value = "")]
        reason: String,
    },
    /// List connected players.
    Players,
    PlayerData {
        player: String,
    },
    /// Server name, map and player counts.
    Details,
    Save,
    WipeCorpses,
    /// Check once whether the server accepts logins.
    Probe,
    /// Probe on an interval and report availability changes.
    Monitor,
    /// Read commands from stdin, one per line.
    Shell,
}

impl Action {
    /// The command a one-shot action sends, if it is one.
    fn command(&self) -> Option<Command> {
        Some(match self {
            Action::Exec { command } => Command::exec(command.join(" ")),
            Action::Announce { message } => Command::announce(message.join(" ")),
            Action::Message { player, message } => {
                Command::direct_message(player, &message.join(" "))
            }
            Action::Kick { player, reason } => Command::kick(player, reason),
            Action::Ban { player, reason } => Command::ban(player, reason),
            Action::Players => Command::player_list(),
            Action::PlayerData { player } => Command::player_data(player),
            Action::Details => Command::server_details(),
            Action::Save => Command::save(),
            Action::WipeCorpses => Command::wipe_corpses(),
            Action::Probe | Action::Monitor | Action::Shell => return None,
        })
    }
}

impl Cli {
    fn apply_overrides(&self, config: &mut AdminConfig) {
        if let Some(host) = &self.host {
            config.target.host = host.clone();
        }
        if let Some(port) = self.port {
            config.target.port = port;
        }
        if let Some(variant) = self.variant {
            config.target.variant = variant;
        }
        config.override_password(self.password.clone());
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&AdminConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let Some(action) = &cli.action else {
        eprintln!("no command given; see --help");
        std::process::exit(2);
    };

    // Load config: file, then environment, then flags.
    let loaded = AdminConfig::read(&cli.config);
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => AdminConfig::default(),
    };
    config.apply_env();
    cli.apply_overrides(&mut config);

    // Init tracing on stderr so stdout stays machine-readable.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    if let Err(e) = &loaded {
        e.log_fallback(&cli.config);
    }

    info!("rcon-admin v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "server: {}:{} ({})",
        config.target.host, config.target.port, config.target.variant
    );

    let ok = match action {
        Action::Probe => run_probe(&config, cli.json).await?,
        Action::Monitor => run_monitor(&config, cli.json).await?,
        Action::Shell => run_shell(&config, cli.json).await?,
        one_shot => match one_shot.command() {
            Some(command) => run_once(&config, command, cli.json).await?,
            None => true,
        },
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

// ── Modes ────────────────────────────────────────────────────────

async fn run_once(
    config: &AdminConfig,
    command: Command,
    json: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let label = command.to_string();
    let result = match Connection::open(config.connection_info(), config.to_connect_options()).await
    {
        Ok(conn) => {
            let result = conn.execute_command(command).await;
            conn.disconnect();
            result
        }
        Err(e) => Err(e),
    };

    let report = CommandReport::new(label, &result);
    println!("{}", report.render(json)?);
    Ok(report.success)
}

async fn run_probe(config: &AdminConfig, json: bool) -> Result<bool, Box<dyn std::error::Error>> {
    let report = probe(&config.connection_info(), &config.to_connect_options()).await;
    println!("{}", ProbeSummary::from(&report).render(json)?);
    Ok(report.is_available())
}

async fn run_monitor(config: &AdminConfig, json: bool) -> Result<bool, Box<dyn std::error::Error>> {
    let (events, mut rx) = mpsc::channel(16);
    let (stop, shutdown) = watch::channel(false);

    let monitor = Monitor::new(config.target(), config.monitor_interval())
        .failure_threshold(config.monitor.failure_threshold);
    let task = tokio::spawn(monitor.run(events, shutdown));

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received; shutting down");
        let _ = stop.send(true);
    });

    while let Some(event) = rx.recv().await {
        println!("{}", EventSummary::from(&event).render(json)?);
    }
    task.await?;
    Ok(true)
}

async fn run_shell(config: &AdminConfig, json: bool) -> Result<bool, Box<dyn std::error::Error>> {
    let mut supervisor = Supervisor::new(config.target(), config.backoff());
    if let Some(attempts) = config.max_attempts() {
        supervisor = supervisor.max_attempts(attempts);
    }

    let mut shell = AdminShell::new(supervisor, json);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stats = shell.run(stdin, &mut std::io::stdout()).await?;
    info!(
        executed = stats.executed,
        failed = stats.failed,
        "shell closed"
    );
    Ok(stats.failed == 0)
}
