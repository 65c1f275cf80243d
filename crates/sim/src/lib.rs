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

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
//! Execution of user operations against an in-process host.
//!
//! Includes:
//!
//! - A journaled state with nested checkpoints and a metered call host
//! - The deposit ledger an entry point keeps for accounts and paymasters
//! - Wallets configured by capability, and a verifying paymaster
//! - The entry point pipeline: validation, prefund, execution, settlement
//!   and non-committing simulation
//! - Call gas estimation by metering an operation's call
//! - A development network used by the command line demo and the tests

pub mod devnet;

mod entry_point;
pub use entry_point::{
    EntryPoint, EntryPointError, ExecutionResult, OpResult, UserOperationReceipt,
};

mod estimation;
pub use estimation::{estimate_call_gas, GasEstimationError};

pub mod gas;

mod host;
pub use host::{BlockEnv, CallContext, CallOutcome, Code, Contract, Frame, Host, Revert};

mod ledger;
pub use ledger::{DepositLedger, InsufficientDeposit};

mod paymaster;
pub use paymaster::{PaymasterValidation, VerifyingPaymaster};

mod state;
pub use state::{InsufficientBalance, JournalCheckpoint, JournaledState};

mod wallet;
pub use wallet::{Capabilities, Wallet, WalletVersion};
