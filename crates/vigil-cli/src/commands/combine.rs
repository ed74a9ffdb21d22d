//! `vigil combine`: rebuild a secret from hex-encoded shares.

use super::read_lines;
use anyhow::{Context, Result};
use clap::Args;
use std::io::{BufRead, Write};
use vigil_core::Scheme;
use vigil_recovery::codec::{self, Share};
use zeroize::Zeroizing;

#[derive(Args, Debug)]
pub struct CombineArgs {
    /// Fragment scheme the shares were split with
    #[arg(short, long, default_value = "2-of-3")]
    pub scheme: Scheme,

    /// Print the secret as hex instead of raw text
    #[arg(long)]
    pub hex: bool,
}

/// Read one share per line from `input` and write the secret to `output`.
pub fn run(args: &CombineArgs, input: impl BufRead, mut output: impl Write) -> Result<()> {
    let mut shares = Vec::new();
    for (line_no, line) in read_lines(input)?.iter().enumerate() {
        let bytes = Zeroizing::new(
            hex::decode(line).with_context(|| format!("Share {} is not valid hex", line_no + 1))?,
        );
        shares.push(Share::from_bytes(&bytes)?);
    }

    let secret = codec::reconstruct(&shares, args.scheme)?;
    tracing::debug!(scheme = %args.scheme, shares = shares.len(), "secret reconstructed");
    if args.hex {
        writeln!(output, "{}", hex::encode(&secret[..]))?;
    } else {
        output.write_all(&secret)?;
        writeln!(output)?;
    }
    Ok(())
}
