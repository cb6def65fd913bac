//! # rfcserver CLI
//!
//! Runs an RFC server from a YAML configuration against the loopback backend,
//! or validates a configuration without starting anything.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rfcserver")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, env = "RFCSERVER_CONFIG", default_value = "rfcserver.yml", global = true)]
    config: PathBuf,

    /// System id overriding the SYSID parameter of the configuration
    #[arg(long, env = "RFCSERVER_SYSID", global = true)]
    sysid: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server and serve until Ctrl-C
    Run {
        /// Stop and dispose right after a successful start
        #[arg(long)]
        once: bool,
    },

    /// Validate the configuration and print the resolved parameters
    Check {
        /// Print compact JSON instead of pretty JSON
        #[arg(long)]
        compact: bool,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = commands::load_config(&cli.config, cli.sysid.as_deref())?;
    match cli.command {
        Commands::Run { once } => commands::run_server(config, once).await,
        Commands::Check { compact } => commands::check_config(&config, compact),
    }
}
