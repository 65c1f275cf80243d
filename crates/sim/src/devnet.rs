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

//! A local development network: an entry point, a wallet, a verifying
//! paymaster and a token deployed on a fresh host, funded with well-known
//! development keys.

use std::sync::Arc;

use aakit_signer::{LocalSigner, OperationSigner};
use aakit_types::{
    calc_pre_verification_gas,
    chain::ChainSpec,
    contracts::IToken::{self, ITokenCalls},
    encode_execute,
    gas::DEFAULT_VERIFICATION_GAS_LIMIT,
    GasFees, UserOperation,
};
use alloy_primitives::{address, keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolInterface, SolValue};
use anyhow::Context;

use crate::{
    entry_point::EntryPoint,
    estimation::{self, GasEstimationError},
    host::{BlockEnv, CallContext, Code, Contract, Host, Revert},
    paymaster::VerifyingPaymaster,
    wallet::{Wallet, WalletVersion},
};

/// Address of the token
pub const TOKEN: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
/// Address of the entry point, unless the chain spec names one
pub const ENTRY_POINT: Address = address!("e7f1725E7734CE288F8367e1Bb143E90bb3F0512");
/// Address of the wallet
pub const WALLET: Address = address!("9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0");
/// Address of the paymaster
pub const PAYMASTER: Address = address!("Cf7Ed3AccA5a467e9e704C703E8D87F634fB0Fc9");
/// Recipient of transfers
pub const OTHER: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
/// Submits operations and receives their unused prefund
pub const RELAYER: Address = address!("3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");

/// Block time of the development network
pub const DEVNET_TIMESTAMP: u64 = 1_715_370_539;
/// One ether in wei
pub const ONE_ETHER: u128 = 1_000_000_000_000_000_000;
/// Tokens the wallet starts with
pub const WALLET_TOKENS: u64 = 100;

const OWNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const SPONSOR_KEY: &str = "0x47e179ec197488593b187f80a00eb0da91f1b9d0b13f8733639f19c30a34926a";

/// Minimal fungible token keeping balances in storage slot `keccak(holder, 0)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    address: Address,
}

impl Token {
    /// Create a new token
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Address of the token
    pub fn address(&self) -> Address {
        self.address
    }

    /// Balance of `holder`
    pub fn balance_of(&self, host: &Host, holder: Address) -> U256 {
        host.state().sload(self.address, balance_slot(holder))
    }

    /// Create `amount` new tokens for `to`
    pub fn mint(&self, host: &mut Host, to: Address, amount: U256) {
        let slot = balance_slot(to);
        let balance = host.state().sload(self.address, slot);
        host.state_mut()
            .sstore(self.address, slot, balance.saturating_add(amount));
    }

    fn slot(ctx: &mut CallContext<'_>, holder: Address) -> Result<B256, Revert> {
        ctx.keccak(&(holder, U256::ZERO).abi_encode())
    }
}

fn balance_slot(holder: Address) -> B256 {
    keccak256((holder, U256::ZERO).abi_encode())
}

impl Contract for Token {
    fn call(&self, ctx: &mut CallContext<'_>, input: &[u8]) -> Result<Bytes, Revert> {
        match ITokenCalls::abi_decode(input) {
            Ok(ITokenCalls::transfer(call)) => {
                let from = ctx.caller();
                let from_slot = Self::slot(ctx, from)?;
                let from_balance = ctx.sload(from_slot)?;
                if from_balance < call.amount {
                    return Err(Revert::Reason(
                        "ERC20: transfer amount exceeds balance".to_string(),
                    ));
                }
                ctx.sstore(from_slot, from_balance - call.amount)?;
                let to_slot = Self::slot(ctx, call.to)?;
                let to_balance = ctx.sload(to_slot)?;
                ctx.sstore(to_slot, to_balance.saturating_add(call.amount))?;
                Ok(true.abi_encode().into())
            }
            Ok(ITokenCalls::balanceOf(call)) => {
                let slot = Self::slot(ctx, call.owner)?;
                Ok(ctx.sload(slot)?.abi_encode().into())
            }
            Err(_) => Err(Revert::Reason("token: unknown call".to_string())),
        }
    }
}

/// Everything deployed and funded, ready to submit operations against
#[derive(Debug)]
pub struct Devnet {
    /// The host everything is deployed on
    pub host: Host,
    /// Chain the host runs
    pub chain_spec: ChainSpec,
    /// The entry point
    pub entry_point: EntryPoint,
    /// The wallet, holding one ether and [`WALLET_TOKENS`] tokens
    pub wallet: Arc<Wallet>,
    /// The paymaster, with half an ether deposited
    pub paymaster: Arc<VerifyingPaymaster>,
    /// The token
    pub token: Arc<Token>,
    /// Owner key of the wallet
    pub owner: LocalSigner,
    /// Verifying signer of the paymaster
    pub sponsor_signer: LocalSigner,
}

impl Devnet {
    /// A development network with a wallet of the given version
    pub fn new(version: WalletVersion) -> anyhow::Result<Self> {
        Self::with_chain_spec(
            version,
            ChainSpec {
                name: "Devnet".to_string(),
                entry_point_address: ENTRY_POINT,
                block_timestamp: DEVNET_TIMESTAMP,
                ..ChainSpec::default()
            },
        )
    }

    /// A development network running `chain_spec`, with the entry point at the
    /// address the chain spec names
    pub fn with_chain_spec(version: WalletVersion, chain_spec: ChainSpec) -> anyhow::Result<Self> {
        let owner = LocalSigner::from_private_key(OWNER_KEY).context("invalid owner key")?;
        let sponsor_signer =
            LocalSigner::from_private_key(SPONSOR_KEY).context("invalid sponsor key")?;
        let ep_address = chain_spec.entry_point_address;

        let entry_point = EntryPoint::new(ep_address);
        let wallet = Arc::new(Wallet::new(
            WALLET,
            owner.address(),
            ep_address,
            version.capabilities(),
        ));
        let paymaster = Arc::new(VerifyingPaymaster::new(
            PAYMASTER,
            ep_address,
            sponsor_signer.address(),
        ));
        let token = Arc::new(Token::new(TOKEN));

        let mut host = Host::new(BlockEnv::from(&chain_spec));
        host.deploy(ep_address, Code::EntryPoint(Arc::new(entry_point.clone())));
        host.deploy(WALLET, Code::Wallet(Arc::clone(&wallet)));
        host.deploy(PAYMASTER, Code::Paymaster(Arc::clone(&paymaster)));
        host.deploy(TOKEN, Code::Contract(Arc::clone(&token) as Arc<dyn Contract>));

        host.mint(WALLET, U256::from(ONE_ETHER));
        host.mint(RELAYER, U256::from(10 * ONE_ETHER));
        token.mint(&mut host, WALLET, U256::from(WALLET_TOKENS));
        host.ledger(ep_address)
            .credit(PAYMASTER, U256::from(ONE_ETHER / 2));
        host.mint(ep_address, U256::from(ONE_ETHER / 2));

        Ok(Self {
            host,
            chain_spec,
            entry_point,
            wallet,
            paymaster,
            token,
            owner,
            sponsor_signer,
        })
    }

    /// Fees suggested at the current base fee. The devnet has no fee market,
    /// so the base fee doubles as the observed tip.
    pub fn gas_fees(&self) -> GasFees {
        let base_fee = self.host.env().base_fee;
        GasFees::suggest(base_fee, base_fee)
    }

    /// Wallet `callData` transferring `amount` tokens to `to`
    pub fn transfer_call_data(&self, to: Address, amount: u64) -> Bytes {
        let transfer = IToken::transferCall {
            to,
            amount: U256::from(amount),
        }
        .abi_encode();
        encode_execute(self.token.address(), U256::ZERO, transfer)
    }

    /// Meter `call_data` on the wallet, called the way the wallet will run it:
    /// by the entry point when it mediates operations, by the owner otherwise
    pub fn estimate_call_gas(&mut self, call_data: &[u8]) -> Result<u64, GasEstimationError> {
        let caller = if self.wallet.capabilities().entry_point_mediated {
            self.entry_point.address()
        } else {
            self.wallet.owner()
        };
        estimation::estimate_call_gas(&mut self.host, caller, self.wallet.address(), call_data)
    }

    /// Unsigned operation at the wallet's current nonce, with suggested fees
    /// and pre-verification gas estimated
    pub fn user_op(&self, call_data: Bytes, call_gas_limit: u64) -> UserOperation {
        let mut op = UserOperation {
            sender: self.wallet.address(),
            nonce: self.wallet.get_nonce(&self.host),
            call_data,
            call_gas_limit: U256::from(call_gas_limit),
            verification_gas_limit: U256::from(DEFAULT_VERIFICATION_GAS_LIMIT),
            ..Default::default()
        };
        self.gas_fees().apply(&mut op);
        op.pre_verification_gas = calc_pre_verification_gas(&op, &self.chain_spec.overheads);
        op
    }

    /// Unsigned operation making the wallet transfer `amount` tokens to `to`,
    /// with its call gas limit metered against the current state
    pub fn transfer_op(&mut self, to: Address, amount: u64) -> anyhow::Result<UserOperation> {
        let call_data = self.transfer_call_data(to, amount);
        let call_gas_limit = self
            .estimate_call_gas(&call_data)
            .context("failed to estimate call gas")?;
        Ok(self.user_op(call_data, call_gas_limit))
    }

    /// Attach the owner signature
    pub fn sign(&self, op: UserOperation) -> anyhow::Result<UserOperation> {
        let signature = self.owner.sign_user_operation(
            &op,
            self.entry_point.address(),
            self.chain_spec.id,
        )?;
        Ok(op.with_signature(signature))
    }

    /// Attach a paymaster authorization for `[valid_after, valid_until)`
    pub fn sponsor(
        &self,
        op: UserOperation,
        valid_until: u64,
        valid_after: u64,
    ) -> anyhow::Result<UserOperation> {
        let data = self.sponsor_signer.sign_paymaster_and_data(
            &op,
            self.chain_spec.id,
            self.paymaster.address(),
            valid_until,
            valid_after,
        )?;
        Ok(op.with_paymaster_and_data(data.encode()))
    }

    /// Token balance of `holder`
    pub fn token_balance(&self, holder: Address) -> U256 {
        self.token.balance_of(&self.host, holder)
    }
}
