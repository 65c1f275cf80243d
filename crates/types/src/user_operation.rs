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

//! The user operation: the signed authorization unit submitted to an entry point.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

/// Verification gas multiplier applied to the prefund when a paymaster is attached.
///
/// Covers the paymaster's own validation on top of the account's.
pub const PAYMASTER_VERIFICATION_GAS_MULTIPLIER: u64 = 3;

/// A user operation
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The wallet acting
    pub sender: Address,
    /// Must equal the wallet's stored nonce at validation time
    pub nonce: U256,
    /// Encoded `execute(target, value, data)` call made on the wallet
    pub call_data: Bytes,
    /// Gas budget for the inner call
    pub call_gas_limit: U256,
    /// Gas budget for each validation step
    pub verification_gas_limit: U256,
    /// Gas paid for overhead not metered during execution
    pub pre_verification_gas: U256,
    /// Maximum fee per gas the payer agrees to
    pub max_fee_per_gas: U256,
    /// Maximum priority fee per gas the payer agrees to
    pub max_priority_fee_per_gas: U256,
    /// Sponsor address, validity window and sponsor signature. Empty when self-funded.
    #[serde(default)]
    pub paymaster_and_data: Bytes,
    /// Owner signature over the domain separated hash
    #[serde(default)]
    pub signature: Bytes,
}

impl UserOperation {
    /// Hash of every operation field except the signature and the sponsor data.
    ///
    /// `keccak256(abi.encode(sender, nonce, keccak256(callData), callGasLimit,
    /// verificationGasLimit, preVerificationGas, maxFeePerGas, maxPriorityFeePerGas))`
    pub fn op_hash(&self) -> B256 {
        keccak256(self.pack_for_hash())
    }

    /// Domain separated hash: binds [`Self::op_hash`] to an entry point and a chain.
    /// This is the value the owner signs.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        keccak256((self.op_hash(), entry_point, U256::from(chain_id)).abi_encode())
    }

    /// The sponsor named by the first 20 bytes of `paymaster_and_data`, if any
    pub fn paymaster(&self) -> Option<Address> {
        self.paymaster_and_data
            .get(..20)
            .map(Address::from_slice)
    }

    /// Maximum amount the payer can be charged for this operation.
    ///
    /// `(callGasLimit + verificationGasLimit * mul + preVerificationGas) * maxFeePerGas`
    /// where `mul` accounts for paymaster validation.
    pub fn required_prefund(&self) -> U256 {
        let mul = if self.paymaster_and_data.is_empty() {
            U256::from(1)
        } else {
            U256::from(PAYMASTER_VERIFICATION_GAS_MULTIPLIER)
        };
        let max_gas = self
            .call_gas_limit
            .saturating_add(self.verification_gas_limit.saturating_mul(mul))
            .saturating_add(self.pre_verification_gas);
        max_gas.saturating_mul(self.max_fee_per_gas)
    }

    /// Effective gas price at the given base fee.
    pub fn gas_price(&self, base_fee: U256) -> U256 {
        if self.max_fee_per_gas == self.max_priority_fee_per_gas {
            // legacy pricing, avoids reading the base fee
            self.max_fee_per_gas
        } else {
            self.max_fee_per_gas
                .min(base_fee.saturating_add(self.max_priority_fee_per_gas))
        }
    }

    /// Full transmitted encoding:
    /// `abi.encode(sender, nonce, callData, callGasLimit, verificationGasLimit,
    /// preVerificationGas, maxFeePerGas, maxPriorityFeePerGas, signature)`
    pub fn encode(&self) -> Bytes {
        (
            self.sender,
            self.nonce,
            self.call_data.clone(),
            self.call_gas_limit,
            self.verification_gas_limit,
            self.pre_verification_gas,
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
            self.signature.clone(),
        )
            .abi_encode_params()
            .into()
    }

    /// Return a copy of this operation carrying the given signature
    pub fn with_signature(self, signature: impl Into<Bytes>) -> Self {
        Self {
            signature: signature.into(),
            ..self
        }
    }

    /// Return a copy of this operation carrying the given sponsor data
    pub fn with_paymaster_and_data(self, paymaster_and_data: impl Into<Bytes>) -> Self {
        Self {
            paymaster_and_data: paymaster_and_data.into(),
            ..self
        }
    }

    fn pack_for_hash(&self) -> Vec<u8> {
        (
            self.sender,
            self.nonce,
            keccak256(&self.call_data),
            self.call_gas_limit,
            self.verification_gas_limit,
            self.pre_verification_gas,
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
        )
            .abi_encode()
    }
}
