//! STATESTASH CLI - Command Line Interface

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "statestash")]
#[command(about = "STATESTASH - Incremental state persistence")]
#[command(version)]
struct Cli {
    /// Log filter, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Directory holding the sled store
    #[arg(short, long, default_value = "./statestash-data")]
    data_dir: PathBuf,

    /// Persistor configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage key prefix, overrides the configuration file
    #[arg(long)]
    key_prefix: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a small counter app whose state is persisted as it changes
    Demo {
        /// Number of actions to dispatch
        #[arg(short, long, default_value = "10")]
        actions: u64,

        /// Delay between actions in milliseconds
        #[arg(long, default_value = "25")]
        pace_ms: u64,

        /// Drain tick interval, overrides the configuration file
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Discard stored state before starting
        #[arg(long)]
        fresh: bool,
    },

    /// Print the stored state
    Inspect {
        /// Print stored values without decoding them
        #[arg(long)]
        raw: bool,
    },

    /// Remove stored keys
    Purge {
        /// Logical keys to remove; every key under the prefix when empty
        keys: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = commands::load_config(cli.config.as_deref(), cli.key_prefix)?;

    match cli.command {
        Commands::Demo {
            actions,
            pace_ms,
            debounce_ms,
            fresh,
        } => {
            let config = match debounce_ms {
                Some(ms) => config.with_debounce_ms(ms),
                None => config,
            };
            commands::demo(&cli.data_dir, config, actions, pace_ms, fresh).await?;
        }

        Commands::Inspect { raw } => {
            commands::inspect(&cli.data_dir, config, raw).await?;
        }

        Commands::Purge { keys } => {
            commands::purge(&cli.data_dir, config, keys).await?;
        }
    }

    Ok(())
}
