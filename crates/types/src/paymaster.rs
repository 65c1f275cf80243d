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

//! Codec for the `paymasterAndData` field of a user operation.
//!
//! Layout: `[paymaster: 20][abi.encode(uint48 validUntil, uint48 validAfter): 64][signature]`

use std::fmt;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;

use crate::{timestamp::ValidTimeRange, UserOperation};

/// Offset of the abi-encoded validity window
pub const VALID_TIMESTAMP_OFFSET: usize = 20;
/// Offset of the sponsor signature
pub const SIGNATURE_OFFSET: usize = 84;

const UINT48_MAX: u64 = (1 << 48) - 1;

/// Error parsing `paymasterAndData`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymasterDataError {
    /// The field is shorter than the fixed prefix
    #[error("paymasterAndData is {0} bytes, expected at least {SIGNATURE_OFFSET}")]
    TooShort(usize),
    /// A window word holds more than 48 bits
    #[error("{0} does not fit in uint48")]
    WindowOverflow(&'static str),
}

/// Decoded sponsor authorization
#[derive(Clone, PartialEq, Eq)]
pub struct PaymasterAndData {
    /// Sponsor identifier
    pub paymaster: Address,
    /// Expiry, exclusive. Zero means no expiry.
    pub valid_until: u64,
    /// Start, inclusive
    pub valid_after: u64,
    /// Sponsor signature over [`paymaster_hash`]
    pub signature: Bytes,
}

impl PaymasterAndData {
    /// Deserialize a `paymasterAndData` field.
    ///
    /// Only the layout is checked here; the signature may be any length.
    pub fn parse(data: &[u8]) -> Result<Self, PaymasterDataError> {
        if data.len() < SIGNATURE_OFFSET {
            return Err(PaymasterDataError::TooShort(data.len()));
        }
        let paymaster = Address::from_slice(&data[..VALID_TIMESTAMP_OFFSET]);
        let valid_until = read_uint48(&data[VALID_TIMESTAMP_OFFSET..52], "validUntil")?;
        let valid_after = read_uint48(&data[52..SIGNATURE_OFFSET], "validAfter")?;
        Ok(Self {
            paymaster,
            valid_until,
            valid_after,
            signature: Bytes::copy_from_slice(&data[SIGNATURE_OFFSET..]),
        })
    }

    /// Serialize back into the concatenated layout
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(SIGNATURE_OFFSET + self.signature.len());
        out.extend_from_slice(self.paymaster.as_slice());
        out.extend((U256::from(self.valid_until), U256::from(self.valid_after)).abi_encode());
        out.extend_from_slice(&self.signature);
        out.into()
    }

    /// The authorized window as a time range
    pub fn time_range(&self) -> ValidTimeRange {
        ValidTimeRange::from_window(self.valid_until, self.valid_after)
    }
}

impl fmt::Debug for PaymasterAndData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymasterAndData")
            .field("paymaster", &self.paymaster)
            .field("valid_until", &self.valid_until)
            .field("valid_after", &self.valid_after)
            .field("signature", &const_hex::encode_prefixed(&self.signature))
            .finish()
    }
}

fn read_uint48(word: &[u8], field: &'static str) -> Result<u64, PaymasterDataError> {
    let value = U256::from_be_slice(word);
    if value > U256::from(UINT48_MAX) {
        return Err(PaymasterDataError::WindowOverflow(field));
    }
    Ok(value.to())
}

/// Hash a sponsor signs to authorize `op` within `[valid_after, valid_until)`.
///
/// Binds the operation content (without its signature or sponsor data), the
/// chain, the paymaster itself and the window.
pub fn paymaster_hash(
    op: &UserOperation,
    chain_id: u64,
    paymaster: Address,
    valid_until: u64,
    valid_after: u64,
) -> B256 {
    keccak256(
        (
            op.op_hash(),
            U256::from(chain_id),
            paymaster,
            U256::from(valid_until),
            U256::from(valid_after),
        )
            .abi_encode(),
    )
}
