//! `vigil config`: print defaults or check a configuration file.

use crate::config::CliConfig;
use anyhow::Result;
use clap::Subcommand;
use std::io::Write;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Parse and validate a configuration file
    Check {
        /// File to check (defaults to the global --config path)
        path: Option<PathBuf>,
    },
}

pub fn run(
    command: &ConfigCommand,
    effective: &CliConfig,
    default_path: &std::path::Path,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            write!(out, "{}", effective.to_toml()?)?;
        }
        ConfigCommand::Check { path } => {
            let path = path.as_deref().unwrap_or(default_path);
            let source = std::fs::read_to_string(path)?;
            CliConfig::from_toml(&source)?;
            writeln!(out, "{}: ok", path.display())?;
        }
    }
    Ok(())
}
