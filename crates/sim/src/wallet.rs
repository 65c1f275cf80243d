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

//! Programmable wallet holding one owner key.

use aakit_types::{
    contracts::IWallet::{self, IWalletCalls},
    OpError, SignedCall, UserOperation,
};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolInterface, SolValue};
use strum::{Display, EnumIter, EnumString};
use tracing::debug;

use crate::{
    gas,
    host::{CallContext, CallOutcome, Contract, Host, Revert},
};

/// Behaviors a wallet can be configured with
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Capabilities {
    /// The owner may call `execute` directly
    pub direct_call: bool,
    /// Anyone may relay a call carrying an owner signature over `(target, value, data)`
    pub message_signature: bool,
    /// User operations are authorized by an owner signature over their domain separated hash
    pub canonical_operation_signature: bool,
    /// The entry point may validate operations, draw prefunds and call `execute`
    pub entry_point_mediated: bool,
    /// Operations may be paid for by a paymaster
    pub paymaster_aware: bool,
}

impl Capabilities {
    const NONE: Self = Self {
        direct_call: false,
        message_signature: false,
        canonical_operation_signature: false,
        entry_point_mediated: false,
        paymaster_aware: false,
    };
}

/// Preset capability sets, from owner-only calls up to sponsored operations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum WalletVersion {
    /// Owner calls only
    V1,
    /// Message-signed calls relayed by anyone
    V2,
    /// Owner calls and operation signatures
    V3,
    /// Entry point mediated operations
    V4,
    /// Entry point mediated operations, settled with a beneficiary
    V5,
    /// Entry point mediated operations that may be sponsored
    V6,
}

impl WalletVersion {
    /// Capabilities of this preset
    pub fn capabilities(self) -> Capabilities {
        let owner_call = Capabilities {
            direct_call: true,
            ..Capabilities::NONE
        };
        let operation_signature = Capabilities {
            canonical_operation_signature: true,
            ..owner_call
        };
        let mediated = Capabilities {
            entry_point_mediated: true,
            ..operation_signature
        };
        match self {
            Self::V1 => owner_call,
            Self::V2 => Capabilities {
                message_signature: true,
                ..Capabilities::NONE
            },
            Self::V3 => operation_signature,
            Self::V4 | Self::V5 => mediated,
            Self::V6 => Capabilities {
                paymaster_aware: true,
                ..mediated
            },
        }
    }
}

/// A wallet deployed at `address`, owned by one key and bound to one entry point
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wallet {
    address: Address,
    owner: Address,
    entry_point: Address,
    capabilities: Capabilities,
}

impl Wallet {
    /// Create a new wallet
    pub fn new(
        address: Address,
        owner: Address,
        entry_point: Address,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            address,
            owner,
            entry_point,
            capabilities,
        }
    }

    /// Address of the wallet
    pub fn address(&self) -> Address {
        self.address
    }

    /// Owner key address
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Trusted entry point
    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    /// Configured capabilities
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Stored nonce
    pub fn get_nonce(&self, host: &Host) -> U256 {
        host.state().nonce(self.address)
    }

    /// Hash the owner signs for a user operation
    pub fn hash_function(&self, op: &UserOperation, chain_id: u64) -> B256 {
        op.hash(self.entry_point, chain_id)
    }

    /// Hash the owner signs for a message-signed call
    pub fn get_message_hash(target: Address, value: U256, data: &[u8]) -> B256 {
        SignedCall::message_hash(target, value, data)
    }

    /// Check the owner signed `hash`. Reads no state.
    pub fn validate_signature(&self, op: &UserOperation, hash: B256) -> Result<(), OpError> {
        if !self.capabilities.canonical_operation_signature {
            return Err(OpError::Unsupported("operation signatures"));
        }
        if aakit_types::signature::is_valid_signature(hash, &op.signature, self.owner) {
            Ok(())
        } else {
            Err(OpError::SignatureInvalid)
        }
    }

    /// Call `target` on behalf of the owner. Allowed for the owner, and for the
    /// entry point when the wallet is entry point mediated.
    pub fn execute(
        &self,
        ctx: &mut CallContext<'_>,
        target: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Bytes, Revert> {
        let caller = ctx.caller();
        let authorized = (self.capabilities.direct_call && caller == self.owner)
            || (self.capabilities.entry_point_mediated && caller == self.entry_point);
        if !authorized {
            return Err(OpError::Unauthorized(caller).into());
        }
        self.call_target(ctx, target, value, data)
    }

    /// Call on behalf of the owner, authorized by the owner's signature instead
    /// of the caller. The signature is not bound to a nonce and can be replayed.
    pub fn execute_signed(
        &self,
        ctx: &mut CallContext<'_>,
        call: &SignedCall,
    ) -> Result<Bytes, Revert> {
        if !self.capabilities.message_signature {
            return Err(OpError::Unsupported("message signatures").into());
        }
        ctx.charge(gas::keccak_gas(20 + 32 + call.data.len()))?;
        let hash = SignedCall::message_hash(call.target, call.value, &call.data);
        if ctx.recover_signer(hash, &call.signature)? != Some(self.owner) {
            return Err(OpError::SignatureInvalid.into());
        }
        self.call_target(ctx, call.target, call.value, &call.data)
    }

    /// Send `amount` of the wallet's own funds to the caller.
    pub fn pay_prefund(&self, ctx: &mut CallContext<'_>, amount: U256) -> Result<(), Revert> {
        if !self.capabilities.entry_point_mediated {
            return Err(OpError::Unsupported("prefund payments").into());
        }
        let caller = ctx.caller();
        if caller != self.owner && caller != self.entry_point {
            return Err(OpError::Unauthorized(caller).into());
        }
        self.send_prefund(ctx, amount)
    }

    /// Validation step run by the entry point: check the nonce and the owner
    /// signature over `user_op_hash`, consume the nonce and pay `missing_funds`
    /// into the entry point deposit.
    pub fn validate_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        user_op_hash: B256,
        missing_funds: U256,
    ) -> Result<(), Revert> {
        if !(self.capabilities.entry_point_mediated
            && self.capabilities.canonical_operation_signature)
        {
            return Err(OpError::Unsupported("entry point validation").into());
        }
        if ctx.caller() != self.entry_point {
            return Err(OpError::Unauthorized(ctx.caller()).into());
        }
        self.consume_nonce(ctx, op, user_op_hash)?;
        self.send_prefund(ctx, missing_funds)
    }

    /// Self-orchestrated execution of a user operation on behalf of the caller:
    /// validate, consume the nonce, pay the prefund to the caller unless the
    /// operation is sponsored, then run the inner call.
    ///
    /// A failing inner call is reported in the outcome; the nonce and prefund
    /// stay consumed.
    pub fn execute_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
    ) -> Result<CallOutcome, Revert> {
        if op.sender != self.address {
            return Err(Revert::Reason(format!("operation is for {}", op.sender)));
        }
        let hash = self.hash_function(op, ctx.env().chain_id);
        self.consume_nonce(ctx, op, hash)?;

        if op.paymaster_and_data.is_empty() {
            self.send_prefund(ctx, op.required_prefund())?;
        } else if !self.capabilities.paymaster_aware {
            return Err(OpError::PaymasterUnsupported.into());
        }

        let gas_limit = op.call_gas_limit.saturating_to::<u64>();
        match IWallet::executeCall::abi_decode(&op.call_data) {
            Ok(call) => ctx.call(call.dest, call.value, &call.func, gas_limit),
            Err(e) => Ok(CallOutcome {
                success: false,
                output: Revert::Reason(format!("invalid callData: {e}")).encode(),
                gas_used: 0,
            }),
        }
    }

    fn consume_nonce(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        hash: B256,
    ) -> Result<(), Revert> {
        let nonce = ctx.nonce()?;
        if op.nonce != nonce {
            return Err(OpError::NonceMismatch {
                expected: nonce,
                actual: op.nonce,
            }
            .into());
        }
        if !self.capabilities.canonical_operation_signature {
            return Err(OpError::Unsupported("operation signatures").into());
        }
        if ctx.recover_signer(hash, &op.signature)? != Some(self.owner) {
            return Err(OpError::SignatureInvalid.into());
        }
        ctx.set_nonce(nonce + U256::from(1))?;
        debug!("wallet {} consumed nonce {nonce}", self.address);
        Ok(())
    }

    fn send_prefund(&self, ctx: &mut CallContext<'_>, amount: U256) -> Result<(), Revert> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = ctx.balance(self.address);
        if balance < amount {
            return Err(OpError::InsufficientFunds {
                balance,
                required: amount,
            }
            .into());
        }
        let (to, gas_limit) = (ctx.caller(), ctx.gas().remaining());
        let outcome = ctx.call(to, amount, &[], gas_limit)?;
        if !outcome.success {
            return Err(Revert::from_output(&outcome.output));
        }
        Ok(())
    }

    fn call_target(
        &self,
        ctx: &mut CallContext<'_>,
        target: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Bytes, Revert> {
        let gas_limit = ctx.gas().remaining();
        let outcome = ctx.call(target, value, data, gas_limit)?;
        if outcome.success {
            Ok(outcome.output)
        } else {
            Err(Revert::from_output(&outcome.output))
        }
    }
}

impl Contract for Wallet {
    fn call(&self, ctx: &mut CallContext<'_>, input: &[u8]) -> Result<Bytes, Revert> {
        if input.is_empty() {
            return Ok(Bytes::new());
        }
        match IWalletCalls::abi_decode(input) {
            Ok(IWalletCalls::execute(call)) => self.execute(ctx, call.dest, call.value, &call.func),
            Ok(IWalletCalls::executeSigned(call)) => self.execute_signed(ctx, &call.call),
            Ok(IWalletCalls::getNonce(_)) => Ok(ctx.nonce()?.abi_encode().into()),
            Err(_) => Err(Revert::Reason("wallet: unknown call".to_string())),
        }
    }
}
