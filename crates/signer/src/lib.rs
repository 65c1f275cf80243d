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

#![warn(missing_docs, unreachable_pub, unused_crate_dependencies)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
//! Signers for owner and sponsor authorizations

use aakit_types::{paymaster_hash, PaymasterAndData, SignedCall, UserOperation};
use alloy_primitives::{Address, Bytes, B256, U256};
use tracing::debug;

mod error;
pub use error::{Error, Result};

mod local;
pub use local::LocalSigner;

/// Produces the signatures user operations and their sponsors carry.
///
/// Every signature is a 65-byte personal-message signature over a 32-byte hash.
pub trait OperationSigner {
    /// Address the signatures recover to
    fn address(&self) -> Address;

    /// Sign the raw 32 bytes of `hash` as a personal message
    fn sign_digest(&self, hash: B256) -> Result<Bytes>;

    /// Owner signature over the domain separated operation hash
    fn sign_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
        chain_id: u64,
    ) -> Result<Bytes> {
        let hash = op.hash(entry_point, chain_id);
        debug!("signing user operation {hash} for {}", op.sender);
        self.sign_digest(hash)
    }

    /// Sponsor authorization for `op` within `[valid_after, valid_until)`
    fn sign_paymaster_and_data(
        &self,
        op: &UserOperation,
        chain_id: u64,
        paymaster: Address,
        valid_until: u64,
        valid_after: u64,
    ) -> Result<PaymasterAndData> {
        let hash = paymaster_hash(op, chain_id, paymaster, valid_until, valid_after);
        debug!("signing sponsor authorization {hash} from {paymaster}");
        Ok(PaymasterAndData {
            paymaster,
            valid_until,
            valid_after,
            signature: self.sign_digest(hash)?,
        })
    }

    /// Owner authorization for a direct message-signed call
    fn sign_call(&self, target: Address, value: U256, data: Bytes) -> Result<SignedCall> {
        let hash = SignedCall::message_hash(target, value, &data);
        Ok(SignedCall {
            target,
            value,
            signature: self.sign_digest(hash)?,
            data,
        })
    }
}
