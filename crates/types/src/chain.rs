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

//! Network configuration.

use alloy_primitives::{address, Address, U256};
use serde::{Deserialize, Serialize};

use crate::{gas::GasOverheads, timestamp::Timestamp};

/// Chain specification
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainSpec {
    /// Name of the network
    pub name: String,
    /// Chain id, part of every signed user operation hash
    pub id: u64,
    /// Entry point the signed hashes are bound to
    pub entry_point_address: Address,
    /// Base fee used when executing locally
    pub base_fee: U256,
    /// Block timestamp used when executing locally. Zero means wall clock time.
    pub block_timestamp: u64,
    /// Pre-verification gas cost table
    pub overheads: GasOverheads,
}

impl ChainSpec {
    /// Block timestamp to execute against
    pub fn block_timestamp(&self) -> Timestamp {
        if self.block_timestamp == 0 {
            Timestamp::now()
        } else {
            Timestamp::new(self.block_timestamp)
        }
    }
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self {
            name: "Development".to_string(),
            id: 31337,
            entry_point_address: address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789"),
            base_fee: U256::from(1_000_000_000u64),
            block_timestamp: 0,
            overheads: GasOverheads::default(),
        }
    }
}
