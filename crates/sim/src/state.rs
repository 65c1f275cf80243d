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

//! Journaled state: balances, wallet nonces, entry point deposits and contract
//! storage, with nested checkpoints that can be committed or reverted.

use std::collections::HashMap;

use alloy_primitives::{Address, B256, U256};

/// State change recorded so it can be undone
#[derive(Clone, Debug, PartialEq, Eq)]
enum JournalEntry {
    BalanceChanged { address: Address, previous: U256 },
    NonceChanged { address: Address, previous: U256 },
    DepositChanged { key: (Address, Address), previous: U256 },
    StorageChanged { key: (Address, B256), previous: U256 },
}

/// Position in the journal to revert to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JournalCheckpoint {
    journal_len: usize,
}

/// Native balance below a requested transfer
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("insufficient balance at {address}: {balance} below {required}")]
pub struct InsufficientBalance {
    /// Account that was debited
    pub address: Address,
    /// Its balance
    pub balance: U256,
    /// Amount requested
    pub required: U256,
}

/// Owned state tables behind a begin/commit/rollback interface.
///
/// Every mutation goes through a setter that journals the previous value.
#[derive(Clone, Debug, Default)]
pub struct JournaledState {
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, U256>,
    deposits: HashMap<(Address, Address), U256>,
    storage: HashMap<(Address, B256), U256>,
    journal: Vec<JournalEntry>,
    depth: usize,
}

impl JournaledState {
    /// Open a nested checkpoint
    pub fn checkpoint(&mut self) -> JournalCheckpoint {
        self.depth += 1;
        JournalCheckpoint {
            journal_len: self.journal.len(),
        }
    }

    /// Keep the changes made since the last checkpoint. Once the outermost
    /// checkpoint commits, the changes can no longer be reverted.
    pub fn checkpoint_commit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.journal.clear();
        }
    }

    /// Undo every change made since `checkpoint`
    pub fn checkpoint_revert(&mut self, checkpoint: JournalCheckpoint) {
        self.depth = self.depth.saturating_sub(1);
        while self.journal.len() > checkpoint.journal_len {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            match entry {
                JournalEntry::BalanceChanged { address, previous } => {
                    restore(&mut self.balances, address, previous)
                }
                JournalEntry::NonceChanged { address, previous } => {
                    restore(&mut self.nonces, address, previous)
                }
                JournalEntry::DepositChanged { key, previous } => {
                    restore(&mut self.deposits, key, previous)
                }
                JournalEntry::StorageChanged { key, previous } => {
                    restore(&mut self.storage, key, previous)
                }
            }
        }
    }

    fn record(&mut self, entry: JournalEntry) {
        // changes outside any checkpoint can never be reverted
        if self.depth > 0 {
            self.journal.push(entry);
        }
    }

    /// Current checkpoint nesting depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Native balance of `address`
    pub fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    /// Overwrite the native balance of `address`
    pub fn set_balance(&mut self, address: Address, balance: U256) {
        let previous = self.balance(address);
        self.record(JournalEntry::BalanceChanged { address, previous });
        self.balances.insert(address, balance);
    }

    /// Move native value between accounts
    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        value: U256,
    ) -> Result<(), InsufficientBalance> {
        let balance = self.balance(from);
        if balance < value {
            return Err(InsufficientBalance {
                address: from,
                balance,
                required: value,
            });
        }
        if value.is_zero() || from == to {
            return Ok(());
        }
        self.set_balance(from, balance - value);
        let to_balance = self.balance(to);
        self.set_balance(to, to_balance.saturating_add(value));
        Ok(())
    }

    /// Stored nonce of a wallet
    pub fn nonce(&self, address: Address) -> U256 {
        self.nonces.get(&address).copied().unwrap_or_default()
    }

    /// Overwrite the stored nonce of a wallet
    pub fn set_nonce(&mut self, address: Address, nonce: U256) {
        let previous = self.nonce(address);
        self.record(JournalEntry::NonceChanged { address, previous });
        self.nonces.insert(address, nonce);
    }

    /// Deposit held by `entry_point` for `account`
    pub fn deposit(&self, entry_point: Address, account: Address) -> U256 {
        self.deposits
            .get(&(entry_point, account))
            .copied()
            .unwrap_or_default()
    }

    /// Overwrite the deposit held by `entry_point` for `account`
    pub fn set_deposit(&mut self, entry_point: Address, account: Address, amount: U256) {
        let key = (entry_point, account);
        let previous = self.deposit(entry_point, account);
        self.record(JournalEntry::DepositChanged { key, previous });
        self.deposits.insert(key, amount);
    }

    /// Storage slot of a contract
    pub fn sload(&self, address: Address, slot: B256) -> U256 {
        self.storage
            .get(&(address, slot))
            .copied()
            .unwrap_or_default()
    }

    /// Write a storage slot of a contract
    pub fn sstore(&mut self, address: Address, slot: B256, value: U256) {
        let key = (address, slot);
        let previous = self.sload(address, slot);
        self.record(JournalEntry::StorageChanged { key, previous });
        self.storage.insert(key, value);
    }
}

fn restore<K: std::hash::Hash + Eq>(table: &mut HashMap<K, U256>, key: K, previous: U256) {
    if previous.is_zero() {
        table.remove(&key);
    } else {
        table.insert(key, previous);
    }
}
