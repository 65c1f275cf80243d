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

//! Per entry point deposit ledger.

use alloy_primitives::{Address, U256};

use crate::state::JournaledState;

/// A debit larger than the account's deposit
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("deposit of {account} is {balance}, below {required}")]
pub struct InsufficientDeposit {
    /// Account debited
    pub account: Address,
    /// Its deposit
    pub balance: U256,
    /// Amount requested
    pub required: U256,
}

/// Balances an entry point holds on behalf of accounts and paymasters.
///
/// Borrowed from the journaled state, so every credit and debit is undone
/// along with the checkpoint it happened in.
#[derive(Debug)]
pub struct DepositLedger<'a> {
    state: &'a mut JournaledState,
    entry_point: Address,
}

impl<'a> DepositLedger<'a> {
    /// Ledger of `entry_point`
    pub fn new(state: &'a mut JournaledState, entry_point: Address) -> Self {
        Self { state, entry_point }
    }

    /// Deposit of `account`
    pub fn balance_of(&self, account: Address) -> U256 {
        self.state.deposit(self.entry_point, account)
    }

    /// Add `amount` to the deposit of `account`, returning the new balance
    pub fn credit(&mut self, account: Address, amount: U256) -> U256 {
        let balance = self.balance_of(account).saturating_add(amount);
        self.state.set_deposit(self.entry_point, account, balance);
        balance
    }

    /// Remove `amount` from the deposit of `account`.
    ///
    /// The sufficiency check and the write happen together; on failure the
    /// deposit is untouched.
    pub fn debit(&mut self, account: Address, amount: U256) -> Result<U256, InsufficientDeposit> {
        let balance = self.balance_of(account);
        let remaining = balance
            .checked_sub(amount)
            .ok_or(InsufficientDeposit {
                account,
                balance,
                required: amount,
            })?;
        self.state.set_deposit(self.entry_point, account, remaining);
        Ok(remaining)
    }
}
