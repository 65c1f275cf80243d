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

//! Call surfaces of the wallet, entry point, paymaster and token contracts.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolValue};

sol! {
    /// Call authorized by an owner signature over `keccak256(abi.encodePacked(target, value, data))`
    struct SignedCall {
        address target;
        uint256 value;
        bytes data;
        bytes signature;
    }

    /// Wallet
    interface IWallet {
        function execute(address dest, uint256 value, bytes calldata func) external;
        function executeSigned(SignedCall calldata call) external;
        function getNonce() external view returns (uint256);
    }

    /// Entry point deposit management
    interface IEntryPoint {
        function depositTo(address account) external payable;
        function balanceOf(address account) external view returns (uint256);
        function withdrawTo(address withdrawAddress, uint256 withdrawAmount) external;
    }

    /// Paymaster deposit management
    interface IPaymaster {
        function addDeposit() external payable;
        function getDeposit() external view returns (uint256);
    }

    /// Minimal fungible token
    interface IToken {
        function transfer(address to, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
    }
}

impl SignedCall {
    /// Hash the owner signs to authorize a call
    pub fn message_hash(target: Address, value: U256, data: &[u8]) -> B256 {
        keccak256((target, value, Bytes::copy_from_slice(data)).abi_encode_packed())
    }
}

/// Encode the `callData` of a user operation that makes the wallet call `target`.
pub fn encode_execute(target: Address, value: U256, data: impl Into<Bytes>) -> Bytes {
    IWallet::executeCall {
        dest: target,
        value,
        func: data.into(),
    }
    .abi_encode()
    .into()
}
