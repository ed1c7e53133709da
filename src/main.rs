mod api;
mod client;
mod commands;
mod config;
mod domain;
mod executor;
mod server;
mod sources;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "netintent",
    version,
    about = "Scheduled intent deployments and configuration drift detection for network devices"
)]
struct Cli {
    /// Path to config file (default: ~/.config/netintent/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Daemon URL (overrides client.daemon_url)
    #[arg(long, global = true)]
    daemon_url: Option<String>,

    /// Output format (table or json)
    #[arg(long, global = true, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the netintent daemon (scheduler + REST + GraphQL)
    Daemon {
        /// HTTP listen address (overrides config)
        #[arg(long)]
        http_addr: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,

        /// Scheduler polling interval in seconds (overrides config)
        #[arg(long)]
        poll_interval: Option<u64>,
    },

    /// Daemon health and uptime
    Status,

    /// Schedule an intent deployment for later execution
    Schedule {
        /// Intent (deployment target) id
        target_id: String,

        /// When to run, RFC 3339 (e.g. 2026-11-02T03:00:00Z)
        #[arg(long)]
        at: String,

        /// Free-form notes kept with the task
        #[arg(long)]
        notes: Option<String>,

        /// Requesting actor (default: $USER@hostname)
        #[arg(long)]
        created_by: Option<String>,
    },

    /// List scheduled tasks, or show one by id
    Tasks {
        /// Show a single task
        id: Option<String>,

        /// Include completed tasks
        #[arg(long)]
        all: bool,

        /// Read the task file directly (no daemon needed)
        #[arg(long)]
        cached: bool,
    },

    /// Cancel a pending or running task
    Cancel {
        /// Task id
        id: String,
    },

    /// Compare two local configuration trees (JSON or YAML)
    Compare {
        /// Source-of-truth tree
        source: PathBuf,

        /// Observed device tree
        device: PathBuf,

        /// Exit with status 2 when any critical difference is found
        #[arg(long)]
        fail_on_critical: bool,
    },

    /// Device comparisons run by the daemon
    Comparisons {
        #[command(subcommand)]
        command: commands::comparisons::ComparisonCommands,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let daemon_url = cli.daemon_url.as_deref();
    let format = cli.format.as_str();

    if !matches!(cli.command, Commands::Daemon { .. }) {
        init_cli_tracing();
    }

    match cli.command {
        Commands::Daemon {
            http_addr,
            log_level,
            poll_interval,
        } => commands::daemon::run(http_addr, log_level, poll_interval, config),
        Commands::Status => commands::status::run(format, config, daemon_url),
        Commands::Schedule {
            target_id,
            at,
            notes,
            created_by,
        } => commands::schedule::run(
            commands::schedule::ScheduleArgs {
                target_id,
                at,
                notes,
                created_by,
            },
            format,
            config,
            daemon_url,
        ),
        Commands::Tasks { id, all, cached } => match id {
            Some(id) => commands::tasks::show(&id, format, config, daemon_url),
            None => commands::tasks::list(all, cached, format, config, daemon_url),
        },
        Commands::Cancel { id } => commands::tasks::cancel(&id, format, config, daemon_url),
        Commands::Compare {
            source,
            device,
            fail_on_critical,
        } => commands::compare::run(&source, &device, fail_on_critical, format, config),
        Commands::Comparisons { command } => {
            commands::comparisons::run(&command, format, config, daemon_url)
        }
    }
}

/// Plain, warnings-only output for one-shot commands; `RUST_LOG` overrides.
fn init_cli_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
