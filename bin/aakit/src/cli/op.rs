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

use std::path::{Path, PathBuf};

use aakit_signer::{LocalSigner, OperationSigner};
use aakit_sim::{devnet::Devnet, WalletVersion};
use aakit_types::{
    calc_pre_verification_gas, chain::ChainSpec, gas::DEFAULT_VERIFICATION_GAS_LIMIT, GasFees,
    UserOperation,
};
use aakit_utils::log::LogWithContext;
use alloy_primitives::{Address, U256};
use clap::Args;
use serde_json::json;

/// Options shared by commands reading one user operation
#[derive(Debug, Args)]
pub struct OpArgs {
    /// Path to a JSON user operation (camelCase fields, hex quantities)
    #[arg(long = "op", name = "op", env = "USER_OP")]
    pub op: PathBuf,

    /// Entry point the hash is bound to
    ///
    /// Defaults to the entry point of the chain spec
    #[arg(long = "entry_point", name = "entry_point", env = "ENTRY_POINT")]
    pub entry_point: Option<Address>,
}

impl OpArgs {
    pub fn entry_point(&self, chain_spec: &ChainSpec) -> Address {
        self.entry_point.unwrap_or(chain_spec.entry_point_address)
    }
}

/// Options of the estimate command
#[derive(Debug, Args)]
pub struct EstimateArgs {
    #[command(flatten)]
    pub op: OpArgs,

    /// Priority fee observed on the network, in wei
    ///
    /// Defaults to the base fee of the chain spec
    #[arg(long = "priority_fee", name = "priority_fee", env = "PRIORITY_FEE")]
    pub priority_fee: Option<u128>,

    /// Meter callGasLimit against a devnet wallet of this version
    ///
    /// The operation's sender must be the devnet wallet.
    #[arg(long = "wallet_version", name = "wallet_version")]
    pub wallet_version: Option<WalletVersion>,
}

/// Options of the sign command
#[derive(Debug, Args)]
pub struct SignArgs {
    #[command(flatten)]
    pub op: OpArgs,

    /// Hex encoded owner key
    #[arg(long = "private_key", name = "private_key", env = "PRIVATE_KEY")]
    pub private_key: String,

    /// Fill in pre-verification gas before signing
    #[arg(long = "estimate", name = "estimate", required = false, num_args = 0)]
    pub estimate: bool,
}

pub fn load_op(path: &Path) -> anyhow::Result<UserOperation> {
    let contents = std::fs::read_to_string(path)
        .log_with_context(|| format!("failed to read user operation from {}", path.display()))?;
    serde_json::from_str(&contents).log_context("invalid user operation JSON")
}

pub fn hash(args: OpArgs, chain_spec: &ChainSpec) -> anyhow::Result<()> {
    let op = load_op(&args.op)?;
    let entry_point = args.entry_point(chain_spec);
    let out = json!({
        "opHash": op.op_hash(),
        "userOpHash": op.hash(entry_point, chain_spec.id),
        "entryPoint": entry_point,
        "chainId": chain_spec.id,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

pub fn estimate(args: EstimateArgs, chain_spec: &ChainSpec) -> anyhow::Result<()> {
    let op = load_op(&args.op.op)?;
    let fees = GasFees::suggest(
        chain_spec.base_fee,
        args.priority_fee
            .map(U256::from)
            .unwrap_or(chain_spec.base_fee),
    );
    let op = fill_gas(op, fees, args.wallet_version, chain_spec)?;
    let out = json!({
        "suggestedFees": fees,
        "callGasLimit": op.call_gas_limit,
        "verificationGasLimit": op.verification_gas_limit,
        "preVerificationGas": op.pre_verification_gas,
        "requiredPrefund": op.required_prefund(),
        "gasPrice": op.gas_price(chain_spec.base_fee),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Fill in the gas fields an operation leaves empty. Fees and the
/// verification limit are only set when zero; call gas is metered when a
/// devnet wallet version is given.
fn fill_gas(
    mut op: UserOperation,
    fees: GasFees,
    wallet_version: Option<WalletVersion>,
    chain_spec: &ChainSpec,
) -> anyhow::Result<UserOperation> {
    if op.max_fee_per_gas.is_zero() {
        fees.apply(&mut op);
    }
    if op.verification_gas_limit.is_zero() {
        op.verification_gas_limit = U256::from(DEFAULT_VERIFICATION_GAS_LIMIT);
    }
    if let Some(version) = wallet_version {
        let mut net = Devnet::with_chain_spec(version, chain_spec.clone())?;
        let wallet = net.wallet.address();
        if op.sender != wallet {
            anyhow::bail!("call gas can only be metered for the devnet wallet {wallet}");
        }
        let call_gas = net
            .estimate_call_gas(&op.call_data)
            .log_context("call gas estimation failed")?;
        tracing::debug!("metered {call_gas} call gas on a {version} wallet");
        op.call_gas_limit = U256::from(call_gas);
    }
    op.pre_verification_gas = calc_pre_verification_gas(&op, &chain_spec.overheads);
    Ok(op)
}

pub fn sign(args: SignArgs, chain_spec: &ChainSpec) -> anyhow::Result<()> {
    let signer = LocalSigner::from_private_key(&args.private_key)?;
    let mut op = load_op(&args.op.op)?;
    if args.estimate {
        op.pre_verification_gas = calc_pre_verification_gas(&op, &chain_spec.overheads);
    }
    let entry_point = args.op.entry_point(chain_spec);
    let signature = signer.sign_user_operation(&op, entry_point, chain_spec.id)?;
    tracing::info!(
        "signed {} for {} as {}",
        op.hash(entry_point, chain_spec.id),
        op.sender,
        signer.address()
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&op.with_signature(signature))?
    );
    Ok(())
}
