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

//! Owner and sponsor signature verification.
//!
//! Signatures are 65-byte `r || s || v` personal-message (EIP-191) signatures
//! over the raw 32 bytes of a hash.

use alloy_primitives::{Address, Signature, B256};

/// Length of an ECDSA signature
pub const SIGNATURE_LENGTH: usize = 65;

/// Recover the address that signed `hash` as a personal message.
pub fn recover_signer(hash: B256, signature: &[u8]) -> Option<Address> {
    if signature.len() != SIGNATURE_LENGTH {
        return None;
    }
    let signature = Signature::from_raw(signature).ok()?;
    signature.recover_address_from_msg(hash).ok()
}

/// True if `signature` over `hash` was produced by `signer`.
pub fn is_valid_signature(hash: B256, signature: &[u8], signer: Address) -> bool {
    recover_signer(hash, signature) == Some(signer)
}

#[cfg(test)]
mod tests {
    use alloy_primitives::b256;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    use super::*;

    const HASH: B256 = b256!("2b2a3f7e5a3f6a4e4f0b52dd1d3a3c4b2e6b5d1e3f9a8b7c6d5e4f3a2b1c0d9e");

    fn owner() -> PrivateKeySigner {
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_recovers_personal_sign() {
        let owner = owner();
        let signature = owner.sign_message_sync(HASH.as_slice()).unwrap();
        assert!(is_valid_signature(HASH, &signature.as_bytes(), owner.address()));
    }

    #[test]
    fn test_raw_hash_signature_is_rejected() {
        let owner = owner();
        let signature = owner.sign_hash_sync(&HASH).unwrap();
        assert!(!is_valid_signature(HASH, &signature.as_bytes(), owner.address()));
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        assert_eq!(recover_signer(HASH, &[0x12, 0x34]), None);
        assert_eq!(recover_signer(HASH, &[]), None);
    }
}
