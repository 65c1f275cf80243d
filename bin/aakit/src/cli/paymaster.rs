// This file is part of Aakit.
//
// Aakit is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Aakit is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Aakit.
// If not, see https://www.gnu.org/licenses/.

use aakit_signer::{LocalSigner, OperationSigner};
use aakit_types::{chain::ChainSpec, PaymasterAndData, ValidTimeRange};
use aakit_utils::log::LogWithContext;
use alloy_primitives::{hex, Address};
use clap::{Args, Parser, Subcommand};
use serde_json::json;

use super::op::{load_op, OpArgs};

#[derive(Debug, Parser)]
pub struct PaymasterCliArgs {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign a sponsor authorization and print the `paymasterAndData` field
    #[command(name = "encode")]
    Encode(EncodeArgs),
    /// Decode a `paymasterAndData` field
    #[command(name = "parse")]
    Parse(ParseArgs),
}

#[derive(Debug, Args)]
pub struct EncodeArgs {
    #[command(flatten)]
    op: OpArgs,

    /// Paymaster address
    #[arg(long = "paymaster", name = "paymaster", env = "PAYMASTER")]
    paymaster: Address,

    /// End of the window, exclusive. Zero means no expiry.
    #[arg(long = "valid_until", name = "valid_until", default_value = "0")]
    valid_until: u64,

    /// Start of the window
    #[arg(long = "valid_after", name = "valid_after", default_value = "0")]
    valid_after: u64,

    /// Hex encoded key of the paymaster's verifying signer
    #[arg(long = "private_key", name = "private_key", env = "PAYMASTER_PRIVATE_KEY")]
    private_key: String,
}

#[derive(Debug, Args)]
pub struct ParseArgs {
    /// Hex encoded `paymasterAndData`
    data: String,
}

pub fn run(args: PaymasterCliArgs, chain_spec: &ChainSpec) -> anyhow::Result<()> {
    match args.command {
        Command::Encode(args) => encode(args, chain_spec),
        Command::Parse(args) => parse(args),
    }
}

fn encode(args: EncodeArgs, chain_spec: &ChainSpec) -> anyhow::Result<()> {
    let signer = LocalSigner::from_private_key(&args.private_key)?;
    let op = load_op(&args.op.op)?;
    let data = signer.sign_paymaster_and_data(
        &op,
        chain_spec.id,
        args.paymaster,
        args.valid_until,
        args.valid_after,
    )?;
    tracing::info!(
        "sponsor {} authorized {} for {}",
        signer.address(),
        op.sender,
        window(data.time_range())
    );
    println!("{}", data.encode());
    Ok(())
}

fn parse(args: ParseArgs) -> anyhow::Result<()> {
    let bytes = hex::decode(args.data.trim()).log_context("paymasterAndData is not hex")?;
    let data = PaymasterAndData::parse(&bytes).log_context("invalid paymasterAndData")?;
    let out = json!({
        "paymaster": data.paymaster,
        "validUntil": data.valid_until,
        "validAfter": data.valid_after,
        "window": window(data.time_range()),
        "signature": data.signature,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn window(range: ValidTimeRange) -> String {
    format!("[{}, {})", range.valid_after, range.valid_until)
}

#[cfg(test)]
mod tests {
    use aakit_types::Timestamp;

    use super::*;

    #[test]
    fn test_window() {
        assert_eq!(
            window(ValidTimeRange::new(Timestamp::new(100), Timestamp::MAX)),
            "[1970-01-01 00:01:40 UTC, never)"
        );
    }
}
