//! Subcommand handlers

pub mod combine;
pub mod config;
pub mod simulate;
pub mod split;

use anyhow::{Context, Result};
use std::io::BufRead;

/// Non-empty trimmed lines from `reader`.
pub(crate) fn read_lines(reader: impl BufRead) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.context("Failed to read input")?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }
    Ok(lines)
}
