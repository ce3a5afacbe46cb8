//! rsk command-line client
//!
//! Talks to RSocket servers over WebSocket or TCP:
//! - request: one request, one response
//! - stream: print items of a request-stream as they arrive
//! - fnf: fire-and-forget
//! - config: manage the configuration file

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rsk::commands::{self, PayloadArgs, StreamLimits};

#[derive(Parser)]
#[command(name = "rsk")]
#[command(author, version, about = "RSocket client for WebSocket and TCP servers")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a request-response and print the answer
    Request {
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Request a stream and print items as they arrive
    Stream {
        #[command(flatten)]
        payload: PayloadArgs,
        /// Stop after this many items
        #[arg(short = 'n', long)]
        take: Option<usize>,
        /// Request items in batches of this size instead of all at once
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        batch: Option<u32>,
    },

    /// Send a fire-and-forget request
    Fnf {
        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Request { payload } => {
            let config = commands::load_client_config(config_path)?;
            commands::request_command(&config, &payload).await?;
        }

        Commands::Stream {
            payload,
            take,
            batch,
        } => {
            let config = commands::load_client_config(config_path)?;
            commands::stream_command(&config, &payload, StreamLimits { take, batch }).await?;
        }

        Commands::Fnf { payload } => {
            let config = commands::load_client_config(config_path)?;
            commands::fnf_command(&config, &payload).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(config_path)?,
            ConfigAction::Init { force } => commands::config_init(config_path, force)?,
            ConfigAction::Path => commands::config_path(config_path)?,
        },
    }

    Ok(())
}
