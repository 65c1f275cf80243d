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

use alloy_primitives::{Address, Bytes, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::{LocalSignerError, PrivateKeySigner};
use anyhow::Context;

use crate::{Error, OperationSigner, Result};

/// Signer backed by a private key held in memory
#[derive(Clone, Debug)]
pub struct LocalSigner {
    signer: PrivateKeySigner,
}

impl LocalSigner {
    /// Parse a hex encoded private key
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let signer = private_key
            .parse::<PrivateKeySigner>()
            .context("failed to parse private key signer")?;
        Ok(Self { signer })
    }
}

impl From<PrivateKeySigner> for LocalSigner {
    fn from(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }
}

impl OperationSigner for LocalSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn sign_digest(&self, hash: B256) -> Result<Bytes> {
        let signature = self.signer.sign_message_sync(hash.as_slice())?;
        Ok(Bytes::copy_from_slice(&signature.as_bytes()))
    }
}

impl From<LocalSignerError> for Error {
    fn from(value: LocalSignerError) -> Self {
        Error::SigningError(value.to_string())
    }
}
