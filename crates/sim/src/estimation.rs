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


//! Call gas estimation by metering the inner call on the host.

use alloy_primitives::{Address, U256};

use crate::host::Host;

/// Error type for gas estimation
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GasEstimationError {
    /// No wallet is deployed at the sender
    #[error("no wallet deployed at {0}")]
    AccountNotDeployed(Address),
    /// The call reverted, so no limit makes it succeed
    #[error("user operation's call reverted: {0}")]
    RevertInCallWithMessage(String),
}

/// Gas the wallet at `sender` uses to run `call_data` when called by
/// `caller`, measured against the current state and then discarded.
///
/// Gas is charged deterministically, so an operation carrying exactly this
/// `callGasLimit` has enough gas for its call when executed from the same
/// state. Empty `call_data` makes no call and needs no gas.
pub fn estimate_call_gas(
    host: &mut Host,
    caller: Address,
    sender: Address,
    call_data: &[u8],
) -> Result<u64, GasEstimationError> {
    if host.wallet(sender).is_none() {
        return Err(GasEstimationError::AccountNotDeployed(sender));
    }
    let outcome = host.speculate(|host| host.call(caller, sender, U256::ZERO, call_data, u64::MAX));
    match outcome.revert_reason() {
        None => Ok(outcome.gas_used),
        Some(reason) => Err(GasEstimationError::RevertInCallWithMessage(reason)),
    }
}

#[cfg(test)]
mod tests {
    use aakit_types::{contracts::IToken, encode_execute};
    use alloy_sol_types::SolCall;

    use super::*;
    use crate::{
        devnet::{Devnet, OTHER, TOKEN, WALLET, WALLET_TOKENS},
        WalletVersion,
    };

    fn transfer(amount: u64) -> Vec<u8> {
        let data = IToken::transferCall {
            to: OTHER,
            amount: U256::from(amount),
        }
        .abi_encode();
        encode_execute(TOKEN, U256::ZERO, data).to_vec()
    }

    #[test]
    fn test_estimate_leaves_state_untouched() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let ep = net.entry_point.address();
        let gas = estimate_call_gas(&mut net.host, ep, WALLET, &transfer(10)).unwrap();
        assert!(gas > 0);
        assert_eq!(net.token_balance(OTHER), U256::ZERO);
        assert_eq!(net.token_balance(WALLET), U256::from(WALLET_TOKENS));
        assert_eq!(net.host.state().depth(), 0);
    }

    #[test]
    fn test_estimate_is_exactly_enough() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let ep = net.entry_point.address();
        let data = transfer(10);
        let gas = estimate_call_gas(&mut net.host, ep, WALLET, &data).unwrap();

        let short = net.host.call(ep, WALLET, U256::ZERO, &data, gas - 1);
        assert_eq!(short.revert_reason().as_deref(), Some("out of gas"));
        let exact = net.host.call(ep, WALLET, U256::ZERO, &data, gas);
        assert!(exact.success);
        assert_eq!(exact.gas_used, gas);
        assert_eq!(net.token_balance(OTHER), U256::from(10));
    }

    #[test]
    fn test_estimate_reports_reverts() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let ep = net.entry_point.address();
        assert_eq!(
            estimate_call_gas(&mut net.host, ep, WALLET, &transfer(1_000)),
            Err(GasEstimationError::RevertInCallWithMessage(
                "ERC20: transfer amount exceeds balance".to_string()
            ))
        );
        assert_eq!(
            estimate_call_gas(&mut net.host, ep, OTHER, &transfer(1)),
            Err(GasEstimationError::AccountNotDeployed(OTHER))
        );
    }

    #[test]
    fn test_estimate_empty_call_data() {
        let mut net = Devnet::new(WalletVersion::V5).unwrap();
        let ep = net.entry_point.address();
        assert_eq!(estimate_call_gas(&mut net.host, ep, WALLET, &[]), Ok(0));
    }

    #[test]
    fn test_estimate_respects_caller() {
        let mut net = Devnet::new(WalletVersion::V1).unwrap();
        let ep = net.entry_point.address();
        let owner = net.wallet.owner();
        assert!(estimate_call_gas(&mut net.host, owner, WALLET, &transfer(10)).is_ok());
        assert!(matches!(
            estimate_call_gas(&mut net.host, ep, WALLET, &transfer(10)),
            Err(GasEstimationError::RevertInCallWithMessage(_))
        ));
    }
}
