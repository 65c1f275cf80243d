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

//! Aakit common types: user operations, their hashing and gas estimation,
//! sponsor authorizations and the failure taxonomy.

pub mod chain;

/// Generated call surfaces
#[allow(missing_docs)]
pub mod contracts;
pub use contracts::{encode_execute, SignedCall};

mod entity;
pub use entity::{Entity, EntityType};

pub mod gas;
pub use gas::{calc_pre_verification_gas, GasFees, GasOverheads};

pub mod paymaster;
pub use paymaster::{paymaster_hash, PaymasterAndData, PaymasterDataError};

pub mod signature;

mod timestamp;
pub use timestamp::{Timestamp, ValidTimeRange};

mod user_operation;
pub use user_operation::{UserOperation, PAYMASTER_VERIFICATION_GAS_MULTIPLIER};

mod validation;
pub use validation::{FailedOp, OpError};
