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

//! Failure taxonomy for user operation validation and execution.

use alloy_primitives::{Address, U256};

use crate::{entity::EntityType, paymaster::PaymasterDataError, timestamp::Timestamp};

/// Why a user operation was rejected or failed.
///
/// Validation variants carry the `AAxy` code an ERC-4337 entry point would
/// report, and every variant can be attributed to the account or the paymaster
/// with [`OpError::entity`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OpError {
    /// No wallet is deployed at the sender address
    #[error("AA20 account not deployed: {0}")]
    AccountNotDeployed(Address),
    /// The wallet could not cover its own prefund
    #[error("AA21 didn't pay prefund: wallet balance {balance} below {required}")]
    InsufficientFunds {
        /// Native balance of the wallet
        balance: U256,
        /// Amount it was asked to pay
        required: U256,
    },
    /// The payer's deposit is below the required prefund after validation
    #[error("{} didn't pay prefund: deposit {deposit} below {required}", prefund_code(.payer))]
    InsufficientPrefund {
        /// Which side was expected to pay
        payer: EntityType,
        /// Deposit held by the payer
        deposit: U256,
        /// Required prefund
        required: U256,
    },
    /// Validation step reverted for a reason outside this taxonomy
    #[error("{} reverted: {reason}", reverted_code(.entity))]
    ValidationReverted {
        /// Who reverted
        entity: EntityType,
        /// Decoded reason
        reason: String,
    },
    /// Owner signature does not recover to the wallet owner
    #[error("AA24 signature error")]
    SignatureInvalid,
    /// Nonce is not the wallet's current nonce
    #[error("AA25 invalid account nonce: expected {expected}, got {actual}")]
    NonceMismatch {
        /// Stored nonce
        expected: U256,
        /// Nonce carried by the operation
        actual: U256,
    },
    /// No paymaster is deployed at the sponsor address
    #[error("AA30 paymaster not deployed: {0}")]
    PaymasterNotDeployed(Address),
    /// Paymaster deposit below the operation's max cost
    #[error("AA31 paymaster deposit too low: {deposit} below {required}")]
    PaymasterDepositInsufficient {
        /// Paymaster deposit
        deposit: U256,
        /// Max cost of the operation
        required: U256,
    },
    /// Sponsor window closed before the current block
    #[error("AA32 paymaster expired: valid until {valid_until}, now {now}")]
    PaymasterWindowExpired {
        /// End of the window, exclusive
        valid_until: Timestamp,
        /// Block time
        now: Timestamp,
    },
    /// Sponsor window opens after the current block
    #[error("AA32 paymaster not due: valid after {valid_after}, now {now}")]
    PaymasterWindowNotYetValid {
        /// Start of the window
        valid_after: Timestamp,
        /// Block time
        now: Timestamp,
    },
    /// Sponsor signature does not recover to the verifying signer
    #[error("AA34 paymaster signature error")]
    PaymasterSignatureInvalid,
    /// Validation used more than `verificationGasLimit`
    #[error("{} over verificationGasLimit", over_gas_code(.0))]
    OverVerificationGasLimit(EntityType),
    /// Layout of `paymasterAndData` is inconsistent
    #[error("AA93 invalid paymasterAndData: {0}")]
    MalformedPaymasterData(#[from] PaymasterDataError),
    /// The wallet or entry point does not accept sponsored operations
    #[error("paymaster not supported")]
    PaymasterUnsupported,
    /// Caller is not allowed to invoke this path
    #[error("unauthorized caller {0}")]
    Unauthorized(Address),
    /// The wallet was not configured with the capability this path needs
    #[error("wallet does not support {0}")]
    Unsupported(&'static str),
    /// Inner call reverted. Nonce and prefund are still consumed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

fn prefund_code(payer: &EntityType) -> &'static str {
    match payer {
        EntityType::Account => "AA21",
        EntityType::Paymaster => "AA31",
    }
}

fn reverted_code(entity: &EntityType) -> &'static str {
    match entity {
        EntityType::Account => "AA23",
        EntityType::Paymaster => "AA33",
    }
}

fn over_gas_code(entity: &EntityType) -> &'static str {
    match entity {
        EntityType::Account => "AA40",
        EntityType::Paymaster => "AA41",
    }
}

impl OpError {
    /// The party at fault, if the failure is attributable to one
    pub fn entity(&self) -> Option<EntityType> {
        match self {
            Self::AccountNotDeployed(_)
            | Self::InsufficientFunds { .. }
            | Self::SignatureInvalid
            | Self::NonceMismatch { .. }
            | Self::ExecutionFailed(_) => Some(EntityType::Account),
            Self::PaymasterNotDeployed(_)
            | Self::PaymasterDepositInsufficient { .. }
            | Self::PaymasterWindowExpired { .. }
            | Self::PaymasterWindowNotYetValid { .. }
            | Self::PaymasterSignatureInvalid
            | Self::MalformedPaymasterData(_) => Some(EntityType::Paymaster),
            Self::InsufficientPrefund { payer: entity, .. }
            | Self::ValidationReverted { entity, .. }
            | Self::OverVerificationGasLimit(entity) => Some(*entity),
            Self::PaymasterUnsupported | Self::Unauthorized(_) | Self::Unsupported(_) => None,
        }
    }

    /// Extracts the error code string, e.g. `"AA24"`, if there is one.
    pub fn entry_point_error_code(&self) -> Option<String> {
        let message = self.to_string();
        (message.len() >= 4 && message.starts_with("AA")).then(|| message[..4].to_string())
    }

    /// True for failures of the inner call, which happen after validation.
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::ExecutionFailed(_))
    }
}

/// A rejected operation and its position in the submitted batch
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("FailedOp({index}, {reason})")]
pub struct FailedOp {
    /// Index of the operation in the batch
    pub index: usize,
    /// Why it failed
    pub reason: OpError,
}

impl FailedOp {
    /// Create a new failure for the operation at `index`
    pub fn new(index: usize, reason: impl Into<OpError>) -> Self {
        Self {
            index,
            reason: reason.into(),
        }
    }
}
