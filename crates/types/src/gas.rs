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

//! Fee suggestions and pre-verification gas estimation.

use alloy_primitives::{Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::UserOperation;

/// Verification gas limit suggested alongside fees
pub const DEFAULT_VERIFICATION_GAS_LIMIT: u64 = 100_000;

/// Buffer added on top of the observed tip, in percent
pub const PRIORITY_FEE_BUFFER_PERCENT: u64 = 13;

/// Gas fees for a user operation
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasFees {
    /// EIP-1559 max fee per gas
    pub max_fee_per_gas: U256,
    /// EIP-1559 max priority fee per gas
    pub max_priority_fee_per_gas: U256,
}

impl GasFees {
    /// Suggest fees from the latest base fee and an observed priority fee.
    ///
    /// The priority fee is `tip` plus [`PRIORITY_FEE_BUFFER_PERCENT`], and the
    /// max fee leaves room for the base fee to double. A zero base fee means
    /// the chain has no EIP-1559 pricing, so the max fee is the priority fee.
    pub fn suggest(base_fee: U256, tip: U256) -> Self {
        let max_priority_fee_per_gas = increase_by_percent(tip, PRIORITY_FEE_BUFFER_PERCENT);
        let max_fee_per_gas = if base_fee.is_zero() {
            max_priority_fee_per_gas
        } else {
            base_fee
                .saturating_mul(U256::from(2))
                .saturating_add(max_priority_fee_per_gas)
        };
        Self {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        }
    }

    /// Copy these fees into `op`
    pub fn apply(self, op: &mut UserOperation) {
        op.max_fee_per_gas = self.max_fee_per_gas;
        op.max_priority_fee_per_gas = self.max_priority_fee_per_gas;
    }
}

// rounds the buffer down to whole hundredths of `n`
fn increase_by_percent(n: U256, percent: u64) -> U256 {
    n.saturating_add((n / U256::from(100)).saturating_mul(U256::from(percent)))
}

/// Cost table used to price the off-execution overhead of an operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasOverheads {
    /// Fixed per-bundle overhead, shared across the bundle
    pub fixed: u64,
    /// Per operation overhead
    pub per_user_op: u64,
    /// Overhead per 32-byte word of the encoded operation
    pub per_user_op_word: u64,
    /// Cost of a zero byte in the encoded operation
    pub zero_byte: u64,
    /// Cost of a non-zero byte in the encoded operation
    pub non_zero_byte: u64,
    /// Expected number of operations sharing the fixed overhead
    pub bundle_size: u64,
    /// Expected length of the final owner signature
    pub sig_size: usize,
}

impl GasOverheads {
    /// Transaction base cost
    pub const TRANSACTION_GAS_OVERHEAD: u64 = 21000;
    ///
    pub const PER_USER_OP_GAS: u64 = 18300;
    ///
    pub const PER_USER_OP_WORD_GAS: u64 = 4;
    ///
    pub const ZERO_BYTE_GAS: u64 = 4;
    ///
    pub const NON_ZERO_BYTE_GAS: u64 = 16;
    /// r, s and v
    pub const SIGNATURE_SIZE: usize = 65;
}

impl Default for GasOverheads {
    fn default() -> Self {
        Self {
            fixed: Self::TRANSACTION_GAS_OVERHEAD,
            per_user_op: Self::PER_USER_OP_GAS,
            per_user_op_word: Self::PER_USER_OP_WORD_GAS,
            zero_byte: Self::ZERO_BYTE_GAS,
            non_zero_byte: Self::NON_ZERO_BYTE_GAS,
            bundle_size: 1,
            sig_size: Self::SIGNATURE_SIZE,
        }
    }
}

/// Overhead gas for including `op`, computed from its full wire encoding.
///
/// The signature is replaced with a `sig_size` placeholder of non-zero bytes
/// so the quote is identical before and after signing.
pub fn calc_pre_verification_gas(op: &UserOperation, overheads: &GasOverheads) -> U256 {
    let placeholder = UserOperation {
        signature: Bytes::from(vec![1u8; overheads.sig_size]),
        ..op.clone()
    };
    let bundle_size = overheads.bundle_size.max(1);
    let fixed_share = (overheads.fixed + bundle_size / 2) / bundle_size;

    op_calldata_gas_cost(
        &placeholder.encode(),
        overheads.zero_byte,
        overheads.non_zero_byte,
        overheads.per_user_op_word,
    ) + U256::from(fixed_share)
        + U256::from(overheads.per_user_op)
}

/// Byte and word cost of an encoded operation
pub(crate) fn op_calldata_gas_cost(
    encoded_op: &[u8],
    zero_byte_cost: u64,
    non_zero_byte_cost: u64,
    per_word_cost: u64,
) -> U256 {
    let length_in_words = (encoded_op.len() + 31) >> 5; // ceil(encoded_op.len() / 32)
    let call_data_cost = encoded_op
        .iter()
        .map(|&x| {
            if x == 0 {
                U256::from(zero_byte_cost)
            } else {
                U256::from(non_zero_byte_cost)
            }
        })
        .fold(U256::ZERO, |a, b| a + b);

    call_data_cost + U256::from(per_word_cost) * U256::from(length_in_words)
}
