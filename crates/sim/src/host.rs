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

//! Execution host: block environment, journaled state, deployed code and
//! call frames.

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use aakit_types::{chain::ChainSpec, signature, OpError, Timestamp};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{Revert as RevertReason, SolError};
use tracing::trace;

use crate::{
    entry_point::EntryPoint,
    gas::{self, GasMeter},
    ledger::DepositLedger,
    paymaster::VerifyingPaymaster,
    state::JournaledState,
    wallet::Wallet,
};

/// Block level values visible to every call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockEnv {
    /// Chain id
    pub chain_id: u64,
    /// Block timestamp
    pub timestamp: Timestamp,
    /// Block base fee
    pub base_fee: U256,
}

impl From<&ChainSpec> for BlockEnv {
    fn from(spec: &ChainSpec) -> Self {
        Self {
            chain_id: spec.id,
            timestamp: spec.block_timestamp(),
            base_fee: spec.base_fee,
        }
    }
}

/// Why a frame was unwound
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Revert {
    /// The frame used its whole gas limit
    #[error("out of gas")]
    OutOfGas,
    /// A user operation failure
    #[error(transparent)]
    Op(#[from] OpError),
    /// A plain revert reason
    #[error("{0}")]
    Reason(String),
}

impl Revert {
    /// Encode as `Error(string)` revert data
    pub fn encode(&self) -> Bytes {
        RevertReason {
            reason: self.to_string(),
        }
        .abi_encode()
        .into()
    }

    /// Decode the reason out of `Error(string)` revert data
    pub fn decode_reason(data: &[u8]) -> Option<String> {
        RevertReason::abi_decode(data).ok().map(|r| r.reason)
    }

    /// Rebuild a revert from the output of a failed call
    pub fn from_output(output: &[u8]) -> Self {
        Self::Reason(Self::decode_reason(output).unwrap_or_else(|| "call reverted".to_string()))
    }
}

/// Anything that can be called at an address
pub trait Contract: Send + Sync + Debug {
    /// Handle a call. Empty `input` is a plain value transfer.
    fn call(&self, ctx: &mut CallContext<'_>, input: &[u8]) -> Result<Bytes, Revert>;
}

/// Code deployed at an address
#[derive(Clone, Debug)]
pub enum Code {
    /// Entry point
    EntryPoint(Arc<EntryPoint>),
    /// Wallet
    Wallet(Arc<Wallet>),
    /// Paymaster
    Paymaster(Arc<VerifyingPaymaster>),
    /// Any other callable target
    Contract(Arc<dyn Contract>),
}

impl Code {
    fn contract(&self) -> &dyn Contract {
        match self {
            Code::EntryPoint(c) => c.as_ref(),
            Code::Wallet(c) => c.as_ref(),
            Code::Paymaster(c) => c.as_ref(),
            Code::Contract(c) => c.as_ref(),
        }
    }
}

/// Result of a top level or nested call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOutcome {
    /// Whether the call completed without reverting
    pub success: bool,
    /// Return data, or `Error(string)` revert data on failure
    pub output: Bytes,
    /// Gas the callee used
    pub gas_used: u64,
}

impl CallOutcome {
    /// Reason of a failed call
    pub fn revert_reason(&self) -> Option<String> {
        if self.success {
            None
        } else {
            Some(Revert::decode_reason(&self.output).unwrap_or_else(|| "call reverted".to_string()))
        }
    }
}

/// Result of running a closure inside a checkpointed frame
#[derive(Debug)]
pub struct Frame<T, E = Revert> {
    /// Closure result. State changes were rolled back if this is an error.
    pub result: Result<T, E>,
    /// Gas charged against the frame
    pub gas_used: u64,
}

/// The execution substrate: every state change happens through a [`Host`].
#[derive(Debug)]
pub struct Host {
    env: BlockEnv,
    state: JournaledState,
    code: HashMap<Address, Code>,
}

impl Host {
    /// An empty host at the given block
    pub fn new(env: BlockEnv) -> Self {
        Self {
            env,
            state: JournaledState::default(),
            code: HashMap::new(),
        }
    }

    /// Block environment
    pub fn env(&self) -> &BlockEnv {
        &self.env
    }

    /// Move the block clock
    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        self.env.timestamp = timestamp;
    }

    /// Read access to state
    pub fn state(&self) -> &JournaledState {
        &self.state
    }

    /// Write access to state, outside of any metering
    pub fn state_mut(&mut self) -> &mut JournaledState {
        &mut self.state
    }

    /// Deposit ledger of `entry_point`
    pub fn ledger(&mut self, entry_point: Address) -> DepositLedger<'_> {
        DepositLedger::new(&mut self.state, entry_point)
    }

    /// Deploy code at `address`, replacing what was there
    pub fn deploy(&mut self, address: Address, code: Code) {
        self.code.insert(address, code);
    }

    /// Code at `address`
    pub fn code(&self, address: Address) -> Option<&Code> {
        self.code.get(&address)
    }

    /// Wallet deployed at `address`
    pub fn wallet(&self, address: Address) -> Option<Arc<Wallet>> {
        match self.code.get(&address) {
            Some(Code::Wallet(wallet)) => Some(Arc::clone(wallet)),
            _ => None,
        }
    }

    /// Paymaster deployed at `address`
    pub fn paymaster(&self, address: Address) -> Option<Arc<VerifyingPaymaster>> {
        match self.code.get(&address) {
            Some(Code::Paymaster(paymaster)) => Some(Arc::clone(paymaster)),
            _ => None,
        }
    }

    /// Native balance of `address`
    pub fn balance(&self, address: Address) -> U256 {
        self.state.balance(address)
    }

    /// Credit native value out of thin air
    pub fn mint(&mut self, address: Address, amount: U256) {
        let balance = self.state.balance(address);
        self.state.set_balance(address, balance.saturating_add(amount));
    }

    /// Run `f` as one atomic unit: its state changes are kept only if it succeeds.
    pub fn transact<T, E>(&mut self, f: impl FnOnce(&mut Host) -> Result<T, E>) -> Result<T, E> {
        let checkpoint = self.state.checkpoint();
        let result = f(self);
        if result.is_ok() {
            self.state.checkpoint_commit();
        } else {
            self.state.checkpoint_revert(checkpoint);
        }
        result
    }

    /// Run `f` and discard every state change it made, whatever the result.
    pub fn speculate<T>(&mut self, f: impl FnOnce(&mut Host) -> T) -> T {
        let checkpoint = self.state.checkpoint();
        let result = f(self);
        self.state.checkpoint_revert(checkpoint);
        result
    }

    /// Run `f` as `address` called by `caller`, inside its own checkpoint.
    ///
    /// The checkpoint commits if `f` succeeds and reverts if it fails, so a
    /// failed frame leaves no state behind.
    pub fn frame<T, E>(
        &mut self,
        caller: Address,
        address: Address,
        value: U256,
        gas_limit: u64,
        f: impl FnOnce(&mut CallContext<'_>) -> Result<T, E>,
    ) -> Frame<T, E> {
        let checkpoint = self.state.checkpoint();
        let mut ctx = CallContext {
            host: &mut *self,
            caller,
            address,
            value,
            gas: GasMeter::new(gas_limit),
        };
        let result = f(&mut ctx);
        let gas_used = ctx.gas.used();

        if result.is_ok() {
            self.state.checkpoint_commit();
        } else {
            self.state.checkpoint_revert(checkpoint);
        }
        Frame { result, gas_used }
    }

    /// Call `target`, transferring `value` from `caller` first.
    ///
    /// Calls to addresses without code are plain value transfers.
    pub fn call(
        &mut self,
        caller: Address,
        target: Address,
        value: U256,
        input: &[u8],
        gas_limit: u64,
    ) -> CallOutcome {
        let code = self.code.get(&target).cloned();
        let frame = self.frame(caller, target, value, gas_limit, |ctx| {
            ctx.host
                .state
                .transfer(caller, target, value)
                .map_err(|e| Revert::Reason(e.to_string()))?;
            match &code {
                Some(code) => code.contract().call(ctx, input),
                None => Ok(Bytes::new()),
            }
        });

        match frame.result {
            Ok(output) => CallOutcome {
                success: true,
                output,
                gas_used: frame.gas_used,
            },
            Err(revert) => {
                trace!("call from {caller} to {target} reverted: {revert}");
                CallOutcome {
                    success: false,
                    output: revert.encode(),
                    gas_used: frame.gas_used,
                }
            }
        }
    }
}

/// View of the host from inside a frame, with metered access to state.
#[derive(Debug)]
pub struct CallContext<'a> {
    host: &'a mut Host,
    caller: Address,
    address: Address,
    value: U256,
    gas: GasMeter,
}

impl CallContext<'_> {
    /// Immediate caller of this frame
    pub fn caller(&self) -> Address {
        self.caller
    }

    /// Address whose code is running
    pub fn address(&self) -> Address {
        self.address
    }

    /// Native value attached to the call
    pub fn value(&self) -> U256 {
        self.value
    }

    /// Block environment
    pub fn env(&self) -> &BlockEnv {
        &self.host.env
    }

    /// Gas meter of this frame
    pub fn gas(&self) -> &GasMeter {
        &self.gas
    }

    /// Charge gas against this frame
    pub fn charge(&mut self, amount: u64) -> Result<(), Revert> {
        self.gas.charge(amount)
    }

    /// Native balance of `address`
    pub fn balance(&self, address: Address) -> U256 {
        self.host.state.balance(address)
    }

    /// Read a slot of this contract's storage
    pub fn sload(&mut self, slot: B256) -> Result<U256, Revert> {
        self.charge(gas::SLOAD_GAS)?;
        Ok(self.host.state.sload(self.address, slot))
    }

    /// Write a slot of this contract's storage
    pub fn sstore(&mut self, slot: B256, value: U256) -> Result<(), Revert> {
        self.charge(gas::SSTORE_GAS)?;
        self.host.state.sstore(self.address, slot, value);
        Ok(())
    }

    /// Stored nonce of this wallet
    pub fn nonce(&mut self) -> Result<U256, Revert> {
        self.charge(gas::SLOAD_GAS)?;
        Ok(self.host.state.nonce(self.address))
    }

    /// Overwrite the stored nonce of this wallet
    pub fn set_nonce(&mut self, nonce: U256) -> Result<(), Revert> {
        self.charge(gas::SSTORE_GAS)?;
        self.host.state.set_nonce(self.address, nonce);
        Ok(())
    }

    /// Deposit `entry_point` holds for `account`
    pub fn deposit_of(&mut self, entry_point: Address, account: Address) -> Result<U256, Revert> {
        self.charge(gas::SLOAD_GAS)?;
        Ok(self.host.state.deposit(entry_point, account))
    }

    /// Deposit ledger of this entry point. Callers charge for the access.
    pub fn ledger(&mut self) -> DepositLedger<'_> {
        DepositLedger::new(&mut self.host.state, self.address)
    }

    /// Metered keccak256
    pub fn keccak(&mut self, data: &[u8]) -> Result<B256, Revert> {
        self.charge(gas::keccak_gas(data.len()))?;
        Ok(keccak256(data))
    }

    /// Metered personal-message signature recovery
    pub fn recover_signer(
        &mut self,
        hash: B256,
        signature: &[u8],
    ) -> Result<Option<Address>, Revert> {
        self.charge(gas::ECRECOVER_GAS)?;
        Ok(signature::recover_signer(hash, signature))
    }

    /// Call `target` from this contract, forwarding at most `gas_limit`.
    ///
    /// A failing callee does not fail this frame; inspect the outcome.
    pub fn call(
        &mut self,
        target: Address,
        value: U256,
        input: &[u8],
        gas_limit: u64,
    ) -> Result<CallOutcome, Revert> {
        let base = if value.is_zero() {
            gas::CALL_GAS
        } else {
            gas::CALL_GAS + gas::CALL_VALUE_GAS
        };
        self.charge(base)?;
        let gas_limit = gas_limit.min(self.gas.remaining());
        let outcome = self
            .host
            .call(self.address, target, value, input, gas_limit);
        self.charge(outcome.gas_used)?;
        Ok(outcome)
    }
}
