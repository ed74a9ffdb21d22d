//! `vigil split`: cut a secret into hex-encoded shares.

use super::read_lines;
use anyhow::{bail, Context, Result};
use clap::Args;
use rand::rngs::OsRng;
use std::io::{BufRead, Write};
use vigil_core::Scheme;
use vigil_recovery::codec;
use zeroize::Zeroizing;

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Fragment scheme, e.g. `2-of-3`
    #[arg(short, long, default_value = "2-of-3")]
    pub scheme: Scheme,

    /// Treat the secret as hex instead of raw text
    #[arg(long)]
    pub hex: bool,
}

/// Read the secret from `input` and write one share per line to `output`.
pub fn run(args: &SplitArgs, input: impl BufRead, mut output: impl Write) -> Result<()> {
    let lines = Zeroizing::new(read_lines(input)?);
    let joined = Zeroizing::new(lines.join("\n"));
    if joined.is_empty() {
        bail!("No secret on standard input");
    }
    let secret = if args.hex {
        Zeroizing::new(hex::decode(joined.as_str()).context("Secret is not valid hex")?)
    } else {
        Zeroizing::new(joined.as_bytes().to_vec())
    };

    let shares = codec::split(&secret, args.scheme, &mut OsRng)?;
    tracing::debug!(scheme = %args.scheme, shares = shares.len(), "secret split");
    for share in &shares {
        writeln!(output, "{}", hex::encode(&share.to_bytes()[..]))?;
    }
    Ok(())
}
