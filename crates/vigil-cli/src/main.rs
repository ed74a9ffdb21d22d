//! Vigil command-line interface
//!
//! Offline tooling around the vault recovery engine: split and combine
//! secrets with the fragment codec, replay the recovery lifecycle on a
//! simulated clock, and inspect configuration.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{
    combine::{self, CombineArgs},
    config::{self as config_cmd, ConfigCommand},
    simulate::{self, SimulateArgs},
    split::{self, SplitArgs},
};
use config::{CliConfig, LogFormat, LoggingConfig};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Vigil - dead man's switch vault recovery", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "vigil.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a secret read from stdin into hex shares
    Split(SplitArgs),
    /// Combine hex shares read from stdin into the secret
    Combine(CombineArgs),
    /// Run the recovery lifecycle on a simulated clock
    Simulate(SimulateArgs),
    /// Configuration helpers
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(&cli.config)?;
    init_logging(&config.logging, cli.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match &cli.command {
        Commands::Split(args) => split::run(args, io::stdin().lock(), &mut out)?,
        Commands::Combine(args) => combine::run(args, io::stdin().lock(), &mut out)?,
        Commands::Simulate(args) => simulate::run(args, &config, &mut out)?,
        Commands::Config(command) => config_cmd::run(command, &config, &cli.config, &mut out)?,
    }
    out.flush()?;
    Ok(())
}
