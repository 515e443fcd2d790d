//! buildhook worker and command line tool.

use std::path::PathBuf;

use buildhook_scheduler::DEFAULT_STALE_AFTER_SECS;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "buildhook")]
#[command(about = "Build lifecycle tracking for forge events", long_about = None)]
struct Cli {
    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Claim and run tasks from the queue
    Worker {
        /// Worker identifier stored with claimed tasks
        #[arg(long, env = "BUILDHOOK_WORKER_ID")]
        id: Option<String>,
        /// Seconds after which a claimed task is handed out again
        #[arg(long, default_value_t = DEFAULT_STALE_AFTER_SECS)]
        stale_after: i64,
    },
    /// Dispatch one event against a package configuration
    Process {
        /// Path to the event, serialized as JSON
        event: PathBuf,
        /// Path to the package configuration
        #[arg(long, default_value = ".packit.kdl")]
        config: PathBuf,
        /// Log what would happen instead of calling out
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a package configuration
    Validate {
        /// Path to the configuration file
        #[arg(default_value = ".packit.kdl")]
        path: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Worker { id, stale_after } => {
            commands::worker::run(id, stale_after).await?;
        }
        Commands::Process {
            event,
            config,
            dry_run,
        } => {
            commands::process::run(&event, &config, dry_run).await?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}
