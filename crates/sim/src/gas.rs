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

//! Deterministic gas schedule and per-frame metering.
//!
//! The same schedule is charged whether a pipeline is executed or simulated,
//! so a simulated cost is exactly the cost a real execution charges.

use crate::host::Revert;

/// Base cost of a nested call
pub const CALL_GAS: u64 = 700;
/// Extra cost of a nested call carrying value, net of the callee stipend
pub const CALL_VALUE_GAS: u64 = 6700;
/// Storage read
pub const SLOAD_GAS: u64 = 800;
/// Storage write
pub const SSTORE_GAS: u64 = 2900;
/// Signature recovery
pub const ECRECOVER_GAS: u64 = 3000;
/// Base cost of hashing
pub const KECCAK_GAS: u64 = 30;
/// Cost of hashing per 32-byte word
pub const KECCAK_WORD_GAS: u64 = 6;

/// Cost of hashing `len` bytes
pub fn keccak_gas(len: usize) -> u64 {
    KECCAK_GAS + KECCAK_WORD_GAS * len.div_ceil(32) as u64
}

/// Gas accounting for a single call frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    used: u64,
}

impl GasMeter {
    /// A meter that allows `limit` gas
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// Charge `amount`, consuming the whole limit if it does not fit
    pub fn charge(&mut self, amount: u64) -> Result<(), Revert> {
        match self.used.checked_add(amount) {
            Some(used) if used <= self.limit => {
                self.used = used;
                Ok(())
            }
            _ => {
                self.used = self.limit;
                Err(Revert::OutOfGas)
            }
        }
    }

    /// Gas still available
    pub fn remaining(&self) -> u64 {
        self.limit - self.used
    }

    /// Gas consumed so far
    pub fn used(&self) -> u64 {
        self.used
    }
}
