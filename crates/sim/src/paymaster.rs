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

//! Verifying paymaster: sponsors operations signed off by an off-chain signer.

use aakit_types::{
    contracts::{
        IEntryPoint,
        IPaymaster::{self, IPaymasterCalls},
    },
    paymaster_hash,
    signature::SIGNATURE_LENGTH,
    OpError, PaymasterAndData, UserOperation, ValidTimeRange,
};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolInterface, SolValue};
use tracing::debug;

use crate::{
    gas,
    host::{CallContext, Contract, Host, Revert},
};

/// Result of a successful sponsor validation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymasterValidation {
    /// Opaque context handed back to the entry point: `abi.encode(sender, opHash)`
    pub context: Bytes,
    /// Window the authorization is valid for
    pub valid_time_range: ValidTimeRange,
}

/// A paymaster that pays for any operation its verifying signer authorized
/// within a time window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyingPaymaster {
    address: Address,
    entry_point: Address,
    verifying_signer: Address,
}

impl VerifyingPaymaster {
    /// Create a new paymaster
    pub fn new(address: Address, entry_point: Address, verifying_signer: Address) -> Self {
        Self {
            address,
            entry_point,
            verifying_signer,
        }
    }

    /// Address of the paymaster
    pub fn address(&self) -> Address {
        self.address
    }

    /// Entry point holding the deposit
    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    /// Split `paymasterAndData` into its parts
    pub fn parse_paymaster_and_data(data: &[u8]) -> Result<PaymasterAndData, OpError> {
        Ok(PaymasterAndData::parse(data)?)
    }

    /// Hash the verifying signer signs for `op` and the window
    pub fn get_hash(
        &self,
        op: &UserOperation,
        chain_id: u64,
        valid_until: u64,
        valid_after: u64,
    ) -> B256 {
        paymaster_hash(op, chain_id, self.address, valid_until, valid_after)
    }

    /// Deposit the entry point holds for this paymaster
    pub fn get_deposit(&self, host: &Host) -> U256 {
        host.state().deposit(self.entry_point, self.address)
    }

    /// Fund the paymaster's deposit with `value` sent by `caller`
    pub fn add_deposit(&self, host: &mut Host, caller: Address, value: U256) -> Result<(), Revert> {
        let input = IPaymaster::addDepositCall {}.abi_encode();
        let outcome = host.call(caller, self.address, value, &input, u64::MAX);
        if outcome.success {
            Ok(())
        } else {
            Err(Revert::from_output(&outcome.output))
        }
    }

    /// Check the sponsor authorization attached to `op`.
    ///
    /// Checks run in order: layout, signature, window, then deposit against
    /// `max_cost`. Every failure is attributed to the paymaster.
    pub fn validate_paymaster_user_op(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        max_cost: U256,
    ) -> Result<PaymasterValidation, Revert> {
        if ctx.caller() != self.entry_point {
            return Err(OpError::Unauthorized(ctx.caller()).into());
        }
        let data = Self::parse_paymaster_and_data(&op.paymaster_and_data)?;
        if data.signature.len() != SIGNATURE_LENGTH {
            return Err(OpError::PaymasterSignatureInvalid.into());
        }

        ctx.charge(gas::keccak_gas(6 * 32))?;
        let chain_id = ctx.env().chain_id;
        let hash = self.get_hash(op, chain_id, data.valid_until, data.valid_after);
        if ctx.recover_signer(hash, &data.signature)? != Some(self.verifying_signer) {
            return Err(OpError::PaymasterSignatureInvalid.into());
        }

        let now = ctx.env().timestamp;
        let range = data.time_range();
        if now < range.valid_after {
            return Err(OpError::PaymasterWindowNotYetValid {
                valid_after: range.valid_after,
                now,
            }
            .into());
        }
        if range.is_expired(now) {
            return Err(OpError::PaymasterWindowExpired {
                valid_until: range.valid_until,
                now,
            }
            .into());
        }

        let deposit = ctx.deposit_of(self.entry_point, self.address)?;
        if deposit < max_cost {
            return Err(OpError::PaymasterDepositInsufficient {
                deposit,
                required: max_cost,
            }
            .into());
        }

        debug!(
            "paymaster {} sponsoring {} until {}",
            self.address, op.sender, range.valid_until
        );
        Ok(PaymasterValidation {
            context: (op.sender, op.op_hash()).abi_encode().into(),
            valid_time_range: range,
        })
    }

    fn deposit(&self, ctx: &mut CallContext<'_>) -> Result<Bytes, Revert> {
        let input = IEntryPoint::depositToCall {
            account: self.address,
        }
        .abi_encode();
        let (value, gas_limit) = (ctx.value(), ctx.gas().remaining());
        let outcome = ctx.call(self.entry_point, value, &input, gas_limit)?;
        if outcome.success {
            Ok(Bytes::new())
        } else {
            Err(Revert::from_output(&outcome.output))
        }
    }
}

impl Contract for VerifyingPaymaster {
    fn call(&self, ctx: &mut CallContext<'_>, input: &[u8]) -> Result<Bytes, Revert> {
        if input.is_empty() {
            return self.deposit(ctx);
        }
        match IPaymasterCalls::abi_decode(input) {
            Ok(IPaymasterCalls::addDeposit(_)) => self.deposit(ctx),
            Ok(IPaymasterCalls::getDeposit(_)) => {
                Ok(ctx.deposit_of(self.entry_point, self.address)?.abi_encode().into())
            }
            Err(_) => Err(Revert::Reason("paymaster: unknown call".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use aakit_signer::OperationSigner;
    use aakit_types::{PaymasterDataError, Timestamp};
    use alloy_primitives::{bytes, hex};

    use super::*;
    use crate::{
        devnet::{Devnet, OTHER, RELAYER},
        wallet::WalletVersion,
    };

    fn validate(net: &mut Devnet, op: &UserOperation) -> Result<PaymasterValidation, Revert> {
        let paymaster = net.paymaster.clone();
        let max_cost = op.required_prefund();
        net.host
            .frame(
                paymaster.entry_point(),
                paymaster.address(),
                U256::ZERO,
                1_000_000,
                |ctx| paymaster.validate_paymaster_user_op(ctx, op, max_cost),
            )
            .result
    }

    #[test]
    fn test_parse_paymaster_and_data() {
        let data = hex!("5FbDB2315678afecb367f032d93F642f64180aa300000000000000000000000000000000000000000000000000000000000012340000000000000000000000000000000000000000000000000000000000001234deadbeef");
        let parsed = VerifyingPaymaster::parse_paymaster_and_data(&data).unwrap();
        assert_eq!(parsed.valid_until, 0x1234);
        assert_eq!(parsed.valid_after, 0x1234);
        assert_eq!(parsed.signature, bytes!("deadbeef"));

        assert_eq!(
            VerifyingPaymaster::parse_paymaster_and_data(&data[..83]),
            Err(OpError::MalformedPaymasterData(PaymasterDataError::TooShort(83)))
        );
    }

    #[test]
    fn test_valid_authorization() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sponsor(op, 0, 0).unwrap();
        let validation = validate(&mut net, &op).unwrap();
        assert_eq!(validation.valid_time_range, ValidTimeRange::all_time());
        assert_eq!(
            validation.context,
            Bytes::from((op.sender, op.op_hash()).abi_encode())
        );
    }

    #[test]
    fn test_authorization_not_transferable_between_operations() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let op1 = net.transfer_op(OTHER, 10).unwrap();
        let op1 = net.sponsor(op1, 0, 0).unwrap();
        let mut op2 = net.transfer_op(OTHER, 11).unwrap();
        op2.paymaster_and_data = op1.paymaster_and_data.clone();
        assert_eq!(
            validate(&mut net, &op2),
            Err(Revert::Op(OpError::PaymasterSignatureInvalid))
        );
    }

    #[test]
    fn test_authorization_bound_to_window() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let now = net.host.env().timestamp.seconds_since_epoch();
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sponsor(op, now + 100, 0).unwrap();
        let mut data = PaymasterAndData::parse(&op.paymaster_and_data).unwrap();
        data.valid_until += 100;
        let stretched = op.clone().with_paymaster_and_data(data.encode());
        assert_eq!(
            validate(&mut net, &stretched),
            Err(Revert::Op(OpError::PaymasterSignatureInvalid))
        );
        assert!(validate(&mut net, &op).is_ok());
    }

    #[test]
    fn test_window_checks() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let now = net.host.env().timestamp;
        let until = now.seconds_since_epoch() + 60;
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sponsor(op, until, until - 30).unwrap();
        assert_eq!(
            validate(&mut net, &op),
            Err(Revert::Op(OpError::PaymasterWindowNotYetValid {
                valid_after: Timestamp::new(until - 30),
                now
            }))
        );

        net.host.set_timestamp(now + Duration::from_secs(30));
        assert!(validate(&mut net, &op).is_ok());

        net.host.set_timestamp(now + Duration::from_secs(60));
        assert_eq!(
            validate(&mut net, &op),
            Err(Revert::Op(OpError::PaymasterWindowExpired {
                valid_until: Timestamp::new(until),
                now: now + Duration::from_secs(60)
            }))
        );
    }

    #[test]
    fn test_signature_from_wrong_key() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let op = net.transfer_op(OTHER, 10).unwrap();
        let chain_id = net.host.env().chain_id;
        let data = net
            .owner
            .sign_paymaster_and_data(&op, chain_id, net.paymaster.address(), 0, 0)
            .unwrap();
        let op = op.with_paymaster_and_data(data.encode());
        assert_eq!(
            validate(&mut net, &op),
            Err(Revert::Op(OpError::PaymasterSignatureInvalid))
        );
    }

    #[test]
    fn test_short_signature_is_rejected() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let sponsored = net.transfer_op(OTHER, 10).unwrap();
        let sponsored = net.sponsor(sponsored, 0, 0).unwrap();
        let mut data = PaymasterAndData::parse(&sponsored.paymaster_and_data).unwrap();
        data.signature = bytes!("deadbeef");
        let op = net.transfer_op(OTHER, 10).unwrap().with_paymaster_and_data(data.encode());
        assert_eq!(
            validate(&mut net, &op),
            Err(Revert::Op(OpError::PaymasterSignatureInvalid))
        );
    }

    #[test]
    fn test_deposit_must_cover_max_cost() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let mut op = net.transfer_op(OTHER, 10).unwrap();
        op.max_fee_per_gas = U256::from(10u64).pow(U256::from(15));
        let op = net.sponsor(op, 0, 0).unwrap();
        assert!(matches!(
            validate(&mut net, &op),
            Err(Revert::Op(OpError::PaymasterDepositInsufficient { .. }))
        ));
    }

    #[test]
    fn test_only_entry_point_may_validate() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let op = net.transfer_op(OTHER, 10).unwrap();
        let op = net.sponsor(op, 0, 0).unwrap();
        let paymaster = net.paymaster.clone();
        let frame = net
            .host
            .frame(RELAYER, paymaster.address(), U256::ZERO, 1_000_000, |ctx| {
                paymaster.validate_paymaster_user_op(ctx, &op, U256::ZERO)
            });
        assert_eq!(frame.result, Err(Revert::Op(OpError::Unauthorized(RELAYER))));
    }

    #[test]
    fn test_add_deposit_and_receive() {
        let mut net = Devnet::new(WalletVersion::V6).unwrap();
        let paymaster = net.paymaster.clone();
        let before = paymaster.get_deposit(&net.host);

        paymaster
            .add_deposit(&mut net.host, RELAYER, U256::from(1000))
            .unwrap();
        assert_eq!(paymaster.get_deposit(&net.host), before + U256::from(1000));

        let outcome = net
            .host
            .call(RELAYER, paymaster.address(), U256::from(5), &[], 100_000);
        assert!(outcome.success);
        assert_eq!(paymaster.get_deposit(&net.host), before + U256::from(1005));
        assert_eq!(net.host.balance(paymaster.address()), U256::ZERO);
    }
}
