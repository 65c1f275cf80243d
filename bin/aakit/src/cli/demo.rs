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

use aakit_sim::{
    devnet::{Devnet, OTHER, RELAYER},
    WalletVersion,
};
use aakit_types::chain::ChainSpec;
use aakit_utils::log::LogOnError;
use anyhow::Context;
use clap::Args;
use serde_json::json;

/// Options of the demo command
#[derive(Debug, Args)]
pub struct DemoArgs {
    /// Wallet version to deploy
    #[arg(
        long = "wallet_version",
        name = "wallet_version",
        env = "WALLET_VERSION",
        default_value = "v5"
    )]
    wallet_version: WalletVersion,

    /// Tokens to transfer out of the wallet, which starts with 100
    #[arg(long = "amount", name = "amount", default_value = "10")]
    amount: u64,

    /// Have the paymaster sponsor the operation
    #[arg(long = "sponsored", name = "sponsored", required = false, num_args = 0)]
    sponsored: bool,
}

/// Submit one token transfer through the entry point: simulate it, then
/// execute it, and print what changed.
pub fn run(args: DemoArgs, chain_spec: ChainSpec) -> anyhow::Result<()> {
    let mut net = Devnet::with_chain_spec(args.wallet_version, chain_spec)?;
    let wallet = net.wallet.address();

    let mut op = net
        .transfer_op(OTHER, args.amount)
        .context("transfer would revert")?;
    if args.sponsored {
        op = net.sponsor(op, 0, 0)?;
    }
    let op = net.sign(op)?;
    tracing::info!(
        "submitting {} from {wallet} ({} wallet)",
        net.entry_point.get_user_op_hash(&net.host, &op),
        args.wallet_version
    );

    let simulated = net
        .entry_point
        .simulate_handle_op(&mut net.host, RELAYER, &op, None, &[]);
    match &simulated {
        Ok(result) => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "simulation": {
                    "success": result.success,
                    "preOpGas": result.pre_op_gas,
                    "gasUsed": result.gas_used,
                    "paid": result.paid,
                    "validUntil": result.valid_until.to_string(),
                }
            }))?
        ),
        Err(failed) => println!("simulation rejected: {failed}"),
    }

    let results = net
        .entry_point
        .handle_ops(&mut net.host, RELAYER, &[op], RELAYER)
        .log_on_error("batch rejected")?;
    for result in results {
        match result {
            Ok(receipt) => println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "receipt": {
                        "userOpHash": receipt.user_op_hash,
                        "sender": receipt.sender,
                        "paymaster": receipt.paymaster,
                        "nonce": receipt.nonce,
                        "success": receipt.success,
                        "actualGasUsed": receipt.actual_gas_used,
                        "actualGasCost": receipt.actual_gas_cost,
                        "prefund": receipt.prefund,
                        "revertReason": receipt.revert_reason,
                    }
                }))?
            ),
            Err(failed) => println!("operation rejected: {failed}"),
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "balances": {
                "walletTokens": net.token_balance(wallet),
                "recipientTokens": net.token_balance(OTHER),
                "walletNonce": net.wallet.get_nonce(&net.host),
                "walletDeposit": net.entry_point.balance_of(&net.host, wallet),
                "paymasterDeposit": net.paymaster.get_deposit(&net.host),
                "relayerDeposit": net.entry_point.balance_of(&net.host, RELAYER),
            }
        }))?
    );
    Ok(())
}
