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

use std::fmt::Display;

use alloy_primitives::Address;
use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// The party a validation step is attributed to
#[derive(
    Display,
    FromStr,
    Debug,
    Clone,
    Copy,
    Ord,
    Eq,
    PartialEq,
    PartialOrd,
    Hash,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[display(style = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    /// The sending wallet
    Account,
    /// The sponsoring paymaster
    Paymaster,
}

/// An entity taking part in a user operation
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// The type of entity
    pub kind: EntityType,
    /// The address of the entity
    pub address: Address,
}

impl Entity {
    /// Create a new entity of the given type and address
    pub fn new(kind: EntityType, address: Address) -> Self {
        Self { kind, address }
    }

    /// Create a new account entity at address
    pub fn account(address: Address) -> Self {
        Self::new(EntityType::Account, address)
    }

    /// Create a new paymaster entity at address
    pub fn paymaster(address: Address) -> Self {
        Self::new(EntityType::Paymaster, address)
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.address)
    }
}
