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

//! The entry point: validates, prefunds, executes and settles user operations.

use aakit_types::{
    contracts::IEntryPoint::{self, IEntryPointCalls},
    Entity, EntityType, FailedOp, OpError, PaymasterAndData, Timestamp, UserOperation, ValidTimeRange,
};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolInterface, SolValue};
use tracing::{debug, info, instrument, warn};

use crate::{
    gas,
    host::{CallContext, Contract, Host, Revert},
    ledger::InsufficientDeposit,
    state::InsufficientBalance,
};

/// Failure of an entry point call as a whole, as opposed to one operation in it
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EntryPointError {
    /// Batch submitted with the zero address as beneficiary
    #[error("AA90 invalid beneficiary")]
    InvalidBeneficiary,
    /// Withdrawal larger than the deposit
    #[error(transparent)]
    Deposit(#[from] InsufficientDeposit),
    /// Native value transfer the sender could not cover
    #[error(transparent)]
    Balance(#[from] InsufficientBalance),
    /// Operation level failure outside a batch
    #[error(transparent)]
    Op(#[from] OpError),
    /// A call made on behalf of the caller reverted
    #[error(transparent)]
    Revert(#[from] Revert),
}

impl From<EntryPointError> for Revert {
    fn from(error: EntryPointError) -> Self {
        match error {
            EntryPointError::Op(e) => Revert::Op(e),
            EntryPointError::Revert(r) => r,
            other => Revert::Reason(other.to_string()),
        }
    }
}

/// Settlement record of an executed operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserOperationReceipt {
    /// Domain separated operation hash
    pub user_op_hash: B256,
    /// Wallet that acted
    pub sender: Address,
    /// Sponsor that paid, if any
    pub paymaster: Option<Address>,
    /// Nonce consumed
    pub nonce: U256,
    /// Whether the inner call succeeded
    pub success: bool,
    /// Gas charged, including pre-verification gas
    pub actual_gas_used: U256,
    /// Amount charged against the prefund
    pub actual_gas_cost: U256,
    /// Prefund drawn during validation
    pub prefund: U256,
    /// Revert reason of a failed inner call
    pub revert_reason: Option<String>,
}

impl UserOperationReceipt {
    /// Unused part of the prefund
    pub fn unused_prefund(&self) -> U256 {
        self.prefund.saturating_sub(self.actual_gas_cost)
    }

    /// Failure of the inner call, if it reverted
    pub fn error(&self) -> Option<OpError> {
        self.revert_reason.clone().map(OpError::ExecutionFailed)
    }
}

/// Outcome of a simulated operation. Nothing it describes was committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Pre-verification gas plus gas used by validation
    pub pre_op_gas: U256,
    /// Amount a real submission would charge
    pub paid: U256,
    /// Start of the sponsor window, or the epoch when self-funded
    pub valid_after: Timestamp,
    /// End of the sponsor window, or `never` when self-funded
    pub valid_until: Timestamp,
    /// Whether the inner call succeeded
    pub success: bool,
    /// Gas a real submission would charge
    pub gas_used: U256,
    /// Output of the inner call
    pub return_data: Bytes,
    /// Whether the follow-up call succeeded. False when none was requested.
    pub target_success: bool,
    /// Output of the follow-up call against the post-execution state
    pub target_result: Bytes,
}

/// Result of one operation in a batch
pub type OpResult = Result<UserOperationReceipt, FailedOp>;

/// Operation that passed validation, with its prefund already drawn
#[derive(Debug)]
struct ValidatedOp {
    user_op_hash: B256,
    payer: Address,
    paymaster: Option<Address>,
    prefund: U256,
    verification_gas_used: u64,
    valid_time_range: ValidTimeRange,
}

/// Entry point deployed at `address`. Deposits live in the host's state,
/// keyed by this address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPoint {
    address: Address,
}

impl EntryPoint {
    /// Create a new entry point
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Address of the entry point
    pub fn address(&self) -> Address {
        self.address
    }

    /// Credit `value` sent by `caller` to the deposit of `account`, returning
    /// the new deposit
    pub fn deposit_to(
        &self,
        host: &mut Host,
        caller: Address,
        account: Address,
        value: U256,
    ) -> Result<U256, EntryPointError> {
        let input = IEntryPoint::depositToCall { account }.abi_encode();
        let outcome = host.call(caller, self.address, value, &input, u64::MAX);
        if !outcome.success {
            return Err(Revert::from_output(&outcome.output).into());
        }
        Ok(self.balance_of(host, account))
    }

    /// Deposit of `account`
    pub fn balance_of(&self, host: &Host, account: Address) -> U256 {
        host.state().deposit(self.address, account)
    }

    /// Move `amount` out of the caller's deposit to `withdraw_address`
    pub fn withdraw_to(
        &self,
        host: &mut Host,
        caller: Address,
        withdraw_address: Address,
        amount: U256,
    ) -> Result<(), EntryPointError> {
        host.transact(|host| -> Result<(), EntryPointError> {
            host.ledger(self.address).debit(caller, amount)?;
            host.state_mut()
                .transfer(self.address, withdraw_address, amount)?;
            debug!("{caller} withdrew {amount} to {withdraw_address}");
            Ok(())
        })
    }

    /// Domain separated hash of `op` as this entry point sees it
    pub fn get_user_op_hash(&self, host: &Host, op: &UserOperation) -> B256 {
        op.hash(self.address, host.env().chain_id)
    }

    /// Have `wallet` pay `amount` into its deposit, skipping validation.
    /// Returns the wallet's new deposit.
    pub fn call_wallets_pay_prefund(
        &self,
        host: &mut Host,
        caller: Address,
        wallet: Address,
        amount: U256,
    ) -> Result<U256, EntryPointError> {
        let wallet_code = host
            .wallet(wallet)
            .ok_or(OpError::AccountNotDeployed(wallet))?;
        debug!("{caller} asked {wallet} to pay a prefund of {amount}");
        host.frame(self.address, wallet, U256::ZERO, u64::MAX, |ctx| {
            wallet_code.pay_prefund(ctx, amount)
        })
        .result?;
        Ok(self.balance_of(host, wallet))
    }

    /// Validate `op` and have the wallet pay whatever its deposit is missing
    /// toward the required prefund, without drawing the prefund or executing
    /// the call. Returns the required prefund.
    #[instrument(skip_all)]
    pub fn verification_enabled_pay_prefund(
        &self,
        host: &mut Host,
        caller: Address,
        op: &UserOperation,
    ) -> Result<U256, FailedOp> {
        debug!("{caller} validating operation from {}", op.sender);
        host.transact(|host| -> Result<U256, FailedOp> {
            if !op.paymaster_and_data.is_empty() {
                return Err(FailedOp::new(0, OpError::PaymasterUnsupported));
            }
            let user_op_hash = self.get_user_op_hash(host, op);
            let prefund = op.required_prefund();
            self.validate_account(host, op, user_op_hash, prefund, true)
                .map_err(|e| FailedOp::new(0, e))?;
            Ok(prefund)
        })
        .inspect_err(|e| log_rejection(op, e))
    }

    /// Process one self-funded operation: validate, draw the prefund, execute
    /// the call and refund the unused prefund to the wallet's deposit. The
    /// gas cost is credited to the deposit of `caller`, who submitted it.
    #[instrument(skip_all)]
    pub fn handle_ops_v1(
        &self,
        host: &mut Host,
        caller: Address,
        op: &UserOperation,
    ) -> Result<UserOperationReceipt, FailedOp> {
        debug!("{caller} submitted one operation");
        let validated = self
            .validate_prepayment(host, 0, op, false)
            .inspect_err(|e| log_rejection(op, e))?;
        let payer = validated.payer;
        let receipt = self.execute(host, op, validated);
        let mut ledger = host.ledger(self.address);
        ledger.credit(payer, receipt.unused_prefund());
        ledger.credit(caller, receipt.actual_gas_cost);
        Ok(receipt)
    }

    /// Process an ordered batch. Each operation is validated, charged and
    /// executed independently, so a failure only affects its own operation.
    /// Once the batch is done, the deposit of `beneficiary` is credited with
    /// the gas cost and the unused prefund of every executed operation.
    #[instrument(skip_all, fields(ops = ops.len()))]
    pub fn handle_ops(
        &self,
        host: &mut Host,
        caller: Address,
        ops: &[UserOperation],
        beneficiary: Address,
    ) -> Result<Vec<OpResult>, EntryPointError> {
        if beneficiary.is_zero() {
            return Err(EntryPointError::InvalidBeneficiary);
        }
        debug!("{caller} submitted {} operations", ops.len());

        let (mut gas_cost, mut unused) = (U256::ZERO, U256::ZERO);
        let results = ops
            .iter()
            .enumerate()
            .map(|(index, op)| -> OpResult {
                let validated = self
                    .validate_prepayment(host, index, op, true)
                    .inspect_err(|e| log_rejection(op, e))?;
                let receipt = self.execute(host, op, validated);
                gas_cost = gas_cost.saturating_add(receipt.actual_gas_cost);
                unused = unused.saturating_add(receipt.unused_prefund());
                Ok(receipt)
            })
            .collect::<Vec<_>>();

        let collected = gas_cost.saturating_add(unused);
        if !collected.is_zero() {
            let balance = host.ledger(self.address).credit(beneficiary, collected);
            debug!(
                "credited {gas_cost} gas cost and {unused} unused prefund to beneficiary {beneficiary}, deposit now {balance}"
            );
        }
        Ok(results)
    }

    /// Run the full pipeline for `op` and discard every change it made.
    ///
    /// When `target` is set, `target_call_data` is called on it after the
    /// operation, against the post-execution state. The charges reported are
    /// the ones a real submission from the same state would make.
    #[instrument(skip_all)]
    pub fn simulate_handle_op(
        &self,
        host: &mut Host,
        caller: Address,
        op: &UserOperation,
        target: Option<Address>,
        target_call_data: &[u8],
    ) -> Result<ExecutionResult, FailedOp> {
        debug!("{caller} simulating operation from {}", op.sender);
        host.speculate(|host| -> Result<ExecutionResult, FailedOp> {
            let validated = self.validate_prepayment(host, 0, op, true)?;
            let range = validated.valid_time_range;
            let pre_op_gas = op
                .pre_verification_gas
                .saturating_add(U256::from(validated.verification_gas_used));
            let (receipt, return_data) = self.execute_with_output(host, op, validated);

            let (target_success, target_result) = match target {
                Some(target) => {
                    let outcome =
                        host.call(self.address, target, U256::ZERO, target_call_data, u64::MAX);
                    (outcome.success, outcome.output)
                }
                None => (false, Bytes::new()),
            };

            Ok(ExecutionResult {
                pre_op_gas,
                paid: receipt.actual_gas_cost,
                valid_after: range.valid_after,
                valid_until: range.valid_until,
                success: receipt.success,
                gas_used: receipt.actual_gas_used,
                return_data,
                target_success,
                target_result,
            })
        })
    }

    /// Validate `op` and draw its prefund, all or nothing
    fn validate_prepayment(
        &self,
        host: &mut Host,
        index: usize,
        op: &UserOperation,
        allow_paymaster: bool,
    ) -> Result<ValidatedOp, FailedOp> {
        host.transact(|host| {
            self.validate_and_charge(host, op, allow_paymaster)
                .map_err(|e| FailedOp::new(index, e))
        })
    }

    fn validate_and_charge(
        &self,
        host: &mut Host,
        op: &UserOperation,
        allow_paymaster: bool,
    ) -> Result<ValidatedOp, OpError> {
        let user_op_hash = self.get_user_op_hash(host, op);
        let prefund = op.required_prefund();

        let sponsor = if op.paymaster_and_data.is_empty() {
            None
        } else {
            let wallet = host
                .wallet(op.sender)
                .ok_or(OpError::AccountNotDeployed(op.sender))?;
            if !allow_paymaster || !wallet.capabilities().paymaster_aware {
                return Err(OpError::PaymasterUnsupported);
            }
            let data = PaymasterAndData::parse(&op.paymaster_and_data)?;
            let paymaster = host
                .paymaster(data.paymaster)
                .filter(|p| p.entry_point() == self.address)
                .ok_or(OpError::PaymasterNotDeployed(data.paymaster))?;
            Some(paymaster)
        };

        let mut verification_gas_used =
            self.validate_account(host, op, user_op_hash, prefund, sponsor.is_none())?;

        let (payer, payer_type, valid_time_range) = match &sponsor {
            None => (op.sender, EntityType::Account, ValidTimeRange::all_time()),
            Some(paymaster) => {
                let gas_limit = op.verification_gas_limit.saturating_to::<u64>();
                let frame = host.frame(
                    self.address,
                    paymaster.address(),
                    U256::ZERO,
                    gas_limit,
                    |ctx| paymaster.validate_paymaster_user_op(ctx, op, prefund),
                );
                verification_gas_used += frame.gas_used;
                let validation = frame
                    .result
                    .map_err(|r| attribute(r, EntityType::Paymaster))?;
                (
                    paymaster.address(),
                    EntityType::Paymaster,
                    validation.valid_time_range,
                )
            }
        };

        host.ledger(self.address)
            .debit(payer, prefund)
            .map_err(|e| OpError::InsufficientPrefund {
                payer: payer_type,
                deposit: e.balance,
                required: e.required,
            })?;

        debug!("validated {user_op_hash}, drew {prefund} from {payer}");
        Ok(ValidatedOp {
            user_op_hash,
            payer,
            paymaster: sponsor.map(|p| p.address()),
            prefund,
            verification_gas_used,
            valid_time_range,
        })
    }

    /// Run the wallet's validation step, asking it to top its deposit up to
    /// `prefund` when `self_funded`. Returns the gas it used.
    fn validate_account(
        &self,
        host: &mut Host,
        op: &UserOperation,
        user_op_hash: B256,
        prefund: U256,
        self_funded: bool,
    ) -> Result<u64, OpError> {
        let wallet = host
            .wallet(op.sender)
            .ok_or(OpError::AccountNotDeployed(op.sender))?;
        let missing_funds = if self_funded {
            prefund.saturating_sub(self.balance_of(host, op.sender))
        } else {
            U256::ZERO
        };
        let gas_limit = op.verification_gas_limit.saturating_to::<u64>();
        let frame = host.frame(self.address, op.sender, U256::ZERO, gas_limit, |ctx| {
            wallet.validate_user_op(ctx, op, user_op_hash, missing_funds)
        });
        frame
            .result
            .map_err(|r| attribute(r, EntityType::Account))?;
        Ok(frame.gas_used)
    }

    fn execute(
        &self,
        host: &mut Host,
        op: &UserOperation,
        validated: ValidatedOp,
    ) -> UserOperationReceipt {
        self.execute_with_output(host, op, validated).0
    }

    /// Make the inner call and work out what it cost. The nonce and prefund
    /// stay consumed whatever the call does.
    fn execute_with_output(
        &self,
        host: &mut Host,
        op: &UserOperation,
        validated: ValidatedOp,
    ) -> (UserOperationReceipt, Bytes) {
        let gas_limit = op.call_gas_limit.saturating_to::<u64>();
        let outcome = host.call(self.address, op.sender, U256::ZERO, &op.call_data, gas_limit);

        let actual_gas_used = op
            .pre_verification_gas
            .saturating_add(U256::from(validated.verification_gas_used))
            .saturating_add(U256::from(outcome.gas_used));
        let gas_price = op.gas_price(host.env().base_fee);
        let actual_gas_cost = actual_gas_used
            .saturating_mul(gas_price)
            .min(validated.prefund);

        let receipt = UserOperationReceipt {
            user_op_hash: validated.user_op_hash,
            sender: op.sender,
            paymaster: validated.paymaster,
            nonce: op.nonce,
            success: outcome.success,
            actual_gas_used,
            actual_gas_cost,
            prefund: validated.prefund,
            revert_reason: outcome.revert_reason(),
        };

        if let Some(reason) = &receipt.revert_reason {
            warn!(
                "UserOperationRevertReason hash={} sender={} nonce={} reason={reason}",
                receipt.user_op_hash, receipt.sender, receipt.nonce
            );
        }
        info!(
            "UserOperationEvent hash={} sender={} paymaster={:?} nonce={} success={} actual_gas_cost={} actual_gas_used={}",
            receipt.user_op_hash,
            receipt.sender,
            receipt.paymaster,
            receipt.nonce,
            receipt.success,
            receipt.actual_gas_cost,
            receipt.actual_gas_used
        );
        (receipt, outcome.output)
    }

    fn credit(&self, ctx: &mut CallContext<'_>, account: Address) -> Result<Bytes, Revert> {
        ctx.charge(gas::SLOAD_GAS + gas::SSTORE_GAS)?;
        let value = ctx.value();
        ctx.ledger().credit(account, value);
        Ok(Bytes::new())
    }
}

fn log_rejection(op: &UserOperation, failure: &FailedOp) {
    let blamed = match failure.reason.entity() {
        Some(EntityType::Account) => Some(Entity::account(op.sender)),
        Some(EntityType::Paymaster) => op.paymaster().map(Entity::paymaster),
        None => None,
    };
    match blamed {
        Some(entity) => warn!("{failure}, blamed on {entity}"),
        None => warn!("{failure}"),
    }
}

/// Blame a failed validation frame on `entity`
fn attribute(revert: Revert, entity: EntityType) -> OpError {
    match revert {
        Revert::Op(e) => e,
        Revert::OutOfGas => OpError::OverVerificationGasLimit(entity),
        Revert::Reason(reason) => OpError::ValidationReverted { entity, reason },
    }
}

impl Contract for EntryPoint {
    fn call(&self, ctx: &mut CallContext<'_>, input: &[u8]) -> Result<Bytes, Revert> {
        if input.is_empty() {
            let caller = ctx.caller();
            return self.credit(ctx, caller);
        }
        match IEntryPointCalls::abi_decode(input) {
            Ok(IEntryPointCalls::depositTo(call)) => self.credit(ctx, call.account),
            Ok(IEntryPointCalls::balanceOf(call)) => {
                Ok(ctx.deposit_of(self.address, call.account)?.abi_encode().into())
            }
            Ok(IEntryPointCalls::withdrawTo(call)) => {
                ctx.charge(gas::SLOAD_GAS + gas::SSTORE_GAS)?;
                let caller = ctx.caller();
                ctx.ledger()
                    .debit(caller, call.withdrawAmount)
                    .map_err(|e| Revert::Reason(e.to_string()))?;
                let gas_limit = ctx.gas().remaining();
                let outcome = ctx.call(call.withdrawAddress, call.withdrawAmount, &[], gas_limit)?;
                if outcome.success {
                    Ok(Bytes::new())
                } else {
                    Err(Revert::from_output(&outcome.output))
                }
            }
            Err(_) => Err(Revert::Reason("entry point: unknown call".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use aakit_types::contracts::IToken;
    use alloy_primitives::address;

    use super::*;
    use crate::{
        devnet::{Devnet, ONE_ETHER, OTHER, RELAYER, WALLET_TOKENS},
        wallet::WalletVersion,
    };

    const BENEFICIARY: Address = address!("90F79bf6EB2c4f870365E785982E1f101E93b906");

    fn fund_wallet_deposit(net: &mut Devnet, amount: u128) {
        let wallet = net.wallet.address();
        net.entry_point
            .deposit_to(&mut net.host, RELAYER, wallet, U256::from(amount))
            .unwrap();
    }

    /// Transfers more than the wallet holds, so its call reverts
    fn failing_transfer_op(net: &Devnet) -> UserOperation {
        net.user_op(net.transfer_call_data(OTHER, 1_000), 100_000)
    }

    fn wallet_deposit(net: &Devnet) -> U256 {
        net.entry_point.balance_of(&net.host, net.wallet.address())
    }

    /// Sum of every deposit the devnet accounts can hold
    fn deposits(net: &Devnet) -> U256 {
        [
            net.wallet.address(),
            net.paymaster.address(),
            BENEFICIARY,
            RELAYER,
            OTHER,
        ]
        .into_iter()
        .fold(U256::ZERO, |acc, account| {
            acc + net.entry_point.balance_of(&net.host, account)
        })
    }

    fn handle(net: &mut Devnet, ops: &[UserOperation]) -> Vec<OpResult> {
        net.entry_point
            .handle_ops(&mut net.host, RELAYER, ops, BENEFICIARY)
            .unwrap()
    }

    #[test]
    fn test_handle_ops_end_to_end() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        fund_wallet_deposit(&mut net, ONE_ETHER / 100);
        let deposit_before = wallet_deposit(&net);
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(op).unwrap();

        let results = handle(&mut net, &[op.clone()]);
        let receipt = results[0].clone().unwrap();

        assert!(receipt.success, "{:?}", receipt.revert_reason);
        assert_eq!(receipt.user_op_hash, net.entry_point.get_user_op_hash(&net.host, &op));
        assert_eq!(receipt.prefund, op.required_prefund());
        assert_eq!(net.token_balance(OTHER), U256::from(10));
        assert_eq!(net.token_balance(op.sender), U256::from(WALLET_TOKENS - 10));
        assert_eq!(net.wallet.get_nonce(&net.host), U256::from(1));
        assert_eq!(wallet_deposit(&net), deposit_before - receipt.prefund);
        assert_eq!(
            net.entry_point.balance_of(&net.host, BENEFICIARY),
            receipt.prefund
        );
        assert!(receipt.actual_gas_cost > U256::ZERO);
        assert!(receipt.actual_gas_cost < receipt.prefund);
    }

    #[test]
    fn test_handle_ops_conserves_entry_point_funds() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let ep = net.entry_point.address();
        assert_eq!(deposits(&net), net.host.balance(ep));

        let self_funded = net.transfer_op(OTHER, 10).unwrap();
        let self_funded = net.sign(self_funded).unwrap();
        let mut sponsored = net.transfer_op(OTHER, 5).unwrap();
        sponsored.nonce = U256::from(1);
        let sponsored = net.sign(net.sponsor(sponsored, 0, 0).unwrap()).unwrap();
        let mut reverting = failing_transfer_op(&net);
        reverting.nonce = U256::from(2);
        let reverting = net.sign(reverting).unwrap();

        let results = handle(&mut net, &[self_funded, sponsored, reverting]);
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(!results[2].as_ref().unwrap().success);

        let charged = results
            .iter()
            .flatten()
            .fold(U256::ZERO, |acc, r| acc + r.actual_gas_cost);
        assert!(charged > U256::ZERO);
        assert_eq!(deposits(&net), net.host.balance(ep));
    }

    #[test]
    fn test_wallet_pays_missing_prefund() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let balance_before = net.host.balance(net.wallet.address());
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(op).unwrap();

        let receipt = handle(&mut net, &[op.clone()])[0].clone().unwrap();
        assert!(receipt.success);
        assert_eq!(wallet_deposit(&net), U256::ZERO);
        assert_eq!(
            net.host.balance(net.wallet.address()),
            balance_before - op.required_prefund()
        );
    }

    #[test]
    fn test_resubmission_is_rejected() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        fund_wallet_deposit(&mut net, ONE_ETHER / 100);
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(op).unwrap();
        handle(&mut net, &[op.clone()])[0].clone().unwrap();
        let deposit = wallet_deposit(&net);

        let results = handle(&mut net, &[op]);
        assert_eq!(
            results[0],
            Err(FailedOp::new(
                0,
                OpError::NonceMismatch {
                    expected: U256::from(1),
                    actual: U256::ZERO
                }
            ))
        );
        assert_eq!(net.token_balance(OTHER), U256::from(10));
        assert_eq!(wallet_deposit(&net), deposit);
        assert_eq!(net.wallet.get_nonce(&net.host), U256::from(1));
    }

    #[test]
    fn test_future_nonce_is_rejected_without_changes() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        fund_wallet_deposit(&mut net, ONE_ETHER / 100);
        let deposit = wallet_deposit(&net);
        let balance = net.host.balance(net.wallet.address());
        let mut op = net.transfer_op(OTHER, 10).unwrap();
        op.nonce += U256::from(1);
        let op = net.sign(op).unwrap();

        let results = handle(&mut net, &[op]);
        let failure = results[0].clone().unwrap_err();
        assert_eq!(failure.index, 0);
        assert_eq!(failure.reason.entry_point_error_code().as_deref(), Some("AA25"));
        assert_eq!(net.token_balance(OTHER), U256::ZERO);
        assert_eq!(net.token_balance(net.wallet.address()), U256::from(WALLET_TOKENS));
        assert_eq!(wallet_deposit(&net), deposit);
        assert_eq!(net.host.balance(net.wallet.address()), balance);
        assert_eq!(net.entry_point.balance_of(&net.host, BENEFICIARY), U256::ZERO);
    }

    #[test]
    fn test_bad_signature_is_rejected() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(op).unwrap();
        let mut tampered = op.clone();
        tampered.call_gas_limit += U256::from(1);

        let results = handle(&mut net, &[tampered]);
        assert_eq!(results[0], Err(FailedOp::new(0, OpError::SignatureInvalid)));
        assert_eq!(net.wallet.get_nonce(&net.host), U256::ZERO);
    }

    #[test]
    fn test_inner_failure_keeps_nonce_and_charge() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        fund_wallet_deposit(&mut net, ONE_ETHER / 100);
        let deposit = wallet_deposit(&net);
        let op = net.sign(failing_transfer_op(&net)).unwrap();

        let receipt = handle(&mut net, &[op])[0].clone().unwrap();
        assert!(!receipt.success);
        assert_eq!(
            receipt.revert_reason.as_deref(),
            Some("ERC20: transfer amount exceeds balance")
        );
        assert!(receipt.error().unwrap().is_execution_failure());
        assert_eq!(net.wallet.get_nonce(&net.host), U256::from(1));
        assert_eq!(wallet_deposit(&net), deposit - receipt.prefund);
        assert_eq!(net.token_balance(OTHER), U256::ZERO);
    }

    #[test]
    fn test_batch_operations_are_independent() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        fund_wallet_deposit(&mut net, ONE_ETHER / 10);
        let op_at = |net: &Devnet, nonce: u64, amount: u64| {
            let mut op = net.user_op(net.transfer_call_data(OTHER, amount), 100_000);
            op.nonce = U256::from(nonce);
            net.sign(op).unwrap()
        };
        let ops = [
            op_at(&net, 0, 1_000),
            op_at(&net, 1, 10),
            op_at(&net, 5, 10),
            op_at(&net, 2, 5),
        ];

        let results = handle(&mut net, &ops);
        assert_eq!(results.len(), 4);
        assert!(!results[0].as_ref().unwrap().success);
        assert!(results[1].as_ref().unwrap().success);
        assert_eq!(
            results[2],
            Err(FailedOp::new(
                2,
                OpError::NonceMismatch {
                    expected: U256::from(2),
                    actual: U256::from(5)
                }
            ))
        );
        assert!(results[3].as_ref().unwrap().success);
        assert_eq!(net.wallet.get_nonce(&net.host), U256::from(3));
        assert_eq!(net.token_balance(OTHER), U256::from(15));

        let collected = results
            .iter()
            .flatten()
            .fold(U256::ZERO, |acc, r| acc + r.actual_gas_cost + r.unused_prefund());
        assert_eq!(net.entry_point.balance_of(&net.host, BENEFICIARY), collected);
        assert_eq!(deposits(&net), net.host.balance(net.entry_point.address()));
    }

    #[test]
    fn test_zero_beneficiary_is_rejected() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(op).unwrap();
        let err = net
            .entry_point
            .handle_ops(&mut net.host, RELAYER, &[op], Address::ZERO)
            .unwrap_err();
        assert_eq!(err, EntryPointError::InvalidBeneficiary);
        assert_eq!(err.to_string(), "AA90 invalid beneficiary");
        assert_eq!(net.wallet.get_nonce(&net.host), U256::ZERO);
    }

    #[test]
    fn test_simulate_matches_handle_ops() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(op).unwrap();
        let wallet = net.wallet.address();
        let native_before = net.host.balance(wallet);
        let query = IToken::balanceOfCall { owner: OTHER }.abi_encode();

        let simulated = net
            .entry_point
            .simulate_handle_op(&mut net.host, RELAYER, &op, Some(net.token.address()), &query)
            .unwrap();
        assert!(simulated.success);
        assert!(simulated.target_success);
        assert_eq!(
            U256::abi_decode(&simulated.target_result).unwrap(),
            U256::from(10)
        );
        assert_eq!(simulated.valid_until, Timestamp::MAX);

        assert_eq!(net.wallet.get_nonce(&net.host), U256::ZERO);
        assert_eq!(wallet_deposit(&net), U256::ZERO);
        assert_eq!(net.host.balance(wallet), native_before);
        assert_eq!(net.token_balance(OTHER), U256::ZERO);
        assert_eq!(net.host.state().depth(), 0);

        let receipt = handle(&mut net, &[op])[0].clone().unwrap();
        assert_eq!(receipt.success, simulated.success);
        assert_eq!(receipt.actual_gas_used, simulated.gas_used);
        assert_eq!(receipt.actual_gas_cost, simulated.paid);
        assert!(simulated.pre_op_gas < simulated.gas_used);
    }

    #[test]
    fn test_sponsored_simulate_matches_handle_ops() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let paymaster = net.paymaster.address();
        net.paymaster
            .add_deposit(&mut net.host, RELAYER, U256::from(ONE_ETHER))
            .unwrap();
        let paymaster_deposit = net.paymaster.get_deposit(&net.host);
        let wallet_balance = net.host.balance(net.wallet.address());
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(net.sponsor(op, 0, 0).unwrap()).unwrap();

        let simulated = net
            .entry_point
            .simulate_handle_op(&mut net.host, RELAYER, &op, None, &[])
            .unwrap();
        assert!(simulated.success);
        assert_eq!(net.paymaster.get_deposit(&net.host), paymaster_deposit);
        assert_eq!(net.entry_point.balance_of(&net.host, BENEFICIARY), U256::ZERO);
        assert_eq!(net.host.balance(net.wallet.address()), wallet_balance);
        assert_eq!(net.wallet.get_nonce(&net.host), U256::ZERO);
        assert_eq!(net.host.state().depth(), 0);

        let receipt = handle(&mut net, &[op])[0].clone().unwrap();
        assert_eq!(receipt.paymaster, Some(paymaster));
        assert_eq!(receipt.success, simulated.success);
        assert_eq!(receipt.actual_gas_used, simulated.gas_used);
        assert_eq!(receipt.actual_gas_cost, simulated.paid);
        assert_eq!(
            net.paymaster.get_deposit(&net.host),
            paymaster_deposit - receipt.prefund
        );
        assert_eq!(net.host.balance(net.wallet.address()), wallet_balance);
    }

    #[test]
    fn test_simulate_reports_failures_as_data() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let op = net.sign(failing_transfer_op(&net)).unwrap();
        let simulated = net
            .entry_point
            .simulate_handle_op(&mut net.host, RELAYER, &op, None, &[])
            .unwrap();
        assert!(!simulated.success);
        assert!(!simulated.target_success);
        assert_eq!(
            Revert::decode_reason(&simulated.return_data).as_deref(),
            Some("ERC20: transfer amount exceeds balance")
        );
        assert_eq!(net.wallet.get_nonce(&net.host), U256::ZERO);

        let mut bad = op.clone();
        bad.signature = Bytes::new();
        assert_eq!(
            net.entry_point
                .simulate_handle_op(&mut net.host, RELAYER, &bad, None, &[]),
            Err(FailedOp::new(0, OpError::SignatureInvalid))
        );
    }

    #[test]
    fn test_sponsored_operation() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let paymaster_deposit = net.paymaster.get_deposit(&net.host);
        let wallet_balance = net.host.balance(net.wallet.address());
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(net.sponsor(op, 0, 0).unwrap()).unwrap();

        let receipt = handle(&mut net, &[op.clone()])[0].clone().unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.paymaster, Some(net.paymaster.address()));
        assert_eq!(receipt.prefund, op.required_prefund());
        assert_eq!(
            net.paymaster.get_deposit(&net.host),
            paymaster_deposit - receipt.prefund
        );
        assert_eq!(net.host.balance(net.wallet.address()), wallet_balance);
        assert_eq!(wallet_deposit(&net), U256::ZERO);
        assert_eq!(net.token_balance(OTHER), U256::from(10));
    }

    #[test]
    fn test_sponsored_simulation_reports_window() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let until = net.host.env().timestamp.seconds_since_epoch() + 600;
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(net.sponsor(op, until, 0).unwrap()).unwrap();
        let simulated = net
            .entry_point
            .simulate_handle_op(&mut net.host, RELAYER, &op, None, &[])
            .unwrap();
        assert_eq!(simulated.valid_until, Timestamp::new(until));
        assert_eq!(simulated.valid_after, Timestamp::new(0));
    }

    #[test]
    fn test_sponsorship_requires_capability() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(net.sponsor(op, 0, 0).unwrap()).unwrap();
        assert_eq!(
            handle(&mut net, &[op])[0],
            Err(FailedOp::new(0, OpError::PaymasterUnsupported))
        );

        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(net.sponsor(op, 0, 0).unwrap()).unwrap();
        assert_eq!(
            net.entry_point.handle_ops_v1(&mut net.host, RELAYER, &op),
            Err(FailedOp::new(0, OpError::PaymasterUnsupported))
        );
    }

    #[test]
    fn test_reused_sponsor_signature_is_attributed_to_paymaster() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let op1 = net.transfer_op(OTHER, 10).unwrap();
        let op1 = net.sponsor(op1, 0, 0).unwrap();
        let op2 = net
            .transfer_op(OTHER, 20)
            .unwrap()
            .with_paymaster_and_data(op1.paymaster_and_data.clone());
        let op2 = net.sign(op2).unwrap();

        let failure = handle(&mut net, &[op2])[0].clone().unwrap_err();
        assert_eq!(failure.reason, OpError::PaymasterSignatureInvalid);
        assert_eq!(failure.reason.entity(), Some(EntityType::Paymaster));
        assert_eq!(net.wallet.get_nonce(&net.host), U256::ZERO);
    }

    #[test]
    fn test_handle_ops_v1_refunds_wallet() {
        let mut net = Devnet::new(WalletVersion::V4).unwrap();
        let balance_before = net.host.balance(net.wallet.address());
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(op).unwrap();

        let receipt = net
            .entry_point
            .handle_ops_v1(&mut net.host, RELAYER, &op)
            .unwrap();
        assert!(receipt.success);
        assert_eq!(wallet_deposit(&net), receipt.unused_prefund());
        assert_eq!(
            net.host.balance(net.wallet.address()),
            balance_before - receipt.prefund
        );
        assert_eq!(
            net.entry_point.balance_of(&net.host, RELAYER),
            receipt.actual_gas_cost
        );
        assert_eq!(deposits(&net), net.host.balance(net.entry_point.address()));
    }

    #[test]
    fn test_wallet_without_mediation_is_rejected() {
        let mut net = Devnet::new(WalletVersion::V3).unwrap();
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(op).unwrap();
        let failure = net
            .entry_point
            .handle_ops_v1(&mut net.host, RELAYER, &op)
            .unwrap_err();
        assert!(matches!(failure.reason, OpError::Unsupported(_)));
    }

    #[test]
    fn test_insufficient_wallet_funds() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let wallet = net.wallet.address();
        net.host.state_mut().set_balance(wallet, U256::from(1));
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(op).unwrap();

        let failure = handle(&mut net, &[op])[0].clone().unwrap_err();
        assert!(matches!(failure.reason, OpError::InsufficientFunds { .. }));
        assert_eq!(failure.reason.entry_point_error_code().as_deref(), Some("AA21"));
        assert_eq!(net.wallet.get_nonce(&net.host), U256::ZERO);
        assert_eq!(net.host.balance(wallet), U256::from(1));
    }

    #[test]
    fn test_validation_over_gas_limit() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let mut op = net.transfer_op(OTHER, 10).unwrap();
        op.verification_gas_limit = U256::from(5_000);
        let op = net.sign(op).unwrap();

        let failure = handle(&mut net, &[op])[0].clone().unwrap_err();
        assert_eq!(
            failure.reason,
            OpError::OverVerificationGasLimit(EntityType::Account)
        );
        assert_eq!(net.wallet.get_nonce(&net.host), U256::ZERO);
    }

    #[test]
    fn test_verification_enabled_pay_prefund() {
        let mut net = Devnet::new(WalletVersion::V4).unwrap();
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sign(op).unwrap();

        let prefund = net
            .entry_point
            .verification_enabled_pay_prefund(&mut net.host, RELAYER, &op)
            .unwrap();
        assert_eq!(prefund, op.required_prefund());
        assert_eq!(wallet_deposit(&net), prefund);
        assert_eq!(net.wallet.get_nonce(&net.host), U256::from(1));
        assert_eq!(net.token_balance(OTHER), U256::ZERO);

        let err = net
            .entry_point
            .verification_enabled_pay_prefund(&mut net.host, RELAYER, &op)
            .unwrap_err();
        assert!(matches!(err.reason, OpError::NonceMismatch { .. }));
        assert_eq!(wallet_deposit(&net), prefund);
    }

    #[test]
    fn test_call_wallets_pay_prefund() {
        let mut net = Devnet::new(WalletVersion::V4).unwrap();
        let wallet = net.wallet.address();
        let balance = net.host.balance(wallet);
        let amount = U256::from(4_200_000_000u64);

        let deposit = net
            .entry_point
            .call_wallets_pay_prefund(&mut net.host, RELAYER, wallet, amount)
            .unwrap();
        assert_eq!(deposit, amount);
        assert_eq!(net.host.balance(wallet), balance - amount);

        let mut net = Devnet::new(WalletVersion::V1).unwrap();
        let err = net
            .entry_point
            .call_wallets_pay_prefund(&mut net.host, RELAYER, wallet, amount)
            .unwrap_err();
        assert!(matches!(
            err,
            EntryPointError::Revert(Revert::Op(OpError::Unsupported(_)))
        ));
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let deposit = net
            .entry_point
            .deposit_to(&mut net.host, RELAYER, RELAYER, U256::from(1_000))
            .unwrap();
        assert_eq!(deposit, U256::from(1_000));

        let ep = net.entry_point.address();
        let outcome = net.host.call(RELAYER, ep, U256::from(7), &[], 100_000);
        assert!(outcome.success);
        assert_eq!(net.entry_point.balance_of(&net.host, RELAYER), U256::from(1_007));

        let other_before = net.host.balance(OTHER);
        net.entry_point
            .withdraw_to(&mut net.host, RELAYER, OTHER, U256::from(400))
            .unwrap();
        assert_eq!(net.entry_point.balance_of(&net.host, RELAYER), U256::from(607));
        assert_eq!(net.host.balance(OTHER), other_before + U256::from(400));

        let err = net
            .entry_point
            .withdraw_to(&mut net.host, RELAYER, OTHER, U256::from(608))
            .unwrap_err();
        assert!(matches!(err, EntryPointError::Deposit(_)));
        assert_eq!(net.entry_point.balance_of(&net.host, RELAYER), U256::from(607));
    }

    #[test]
    fn test_contract_surface() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let ep = net.entry_point.address();
        let input = IEntryPoint::depositToCall { account: OTHER }.abi_encode();
        assert!(net.host.call(RELAYER, ep, U256::from(50), &input, 100_000).success);

        let query = IEntryPoint::balanceOfCall { account: OTHER }.abi_encode();
        let outcome = net.host.call(RELAYER, ep, U256::ZERO, &query, 100_000);
        assert_eq!(U256::abi_decode(&outcome.output).unwrap(), U256::from(50));

        let withdraw = IEntryPoint::withdrawToCall {
            withdrawAddress: RELAYER,
            withdrawAmount: U256::from(51),
        }
        .abi_encode();
        let outcome = net.host.call(OTHER, ep, U256::ZERO, &withdraw, 100_000);
        assert!(!outcome.success);
        assert_eq!(net.entry_point.balance_of(&net.host, OTHER), U256::from(50));
    }
}
