//! Account and factory call surface.
//!
//! The account contract is an external collaborator; these bindings only
//! encode calls and decode view results.

use alloy_primitives::Bytes;
use alloy_sol_types::SolCall;
use thiserror::Error;

alloy_sol_types::sol! {
    #![sol(extra_derives(Debug))]

    /// Guardian-protected account.
    #[sol(all_derives)]
    interface IAAWallet {
        function addGuardian(address guardian) external;
        function removeGuardian(uint256 index) external;
        function getGuardians() external view returns (address[] memory guardians);

        function initiateRecovery(address newSigningAddress) external;
        function supportRecovery() external;
        function executeRecovery() external;
        function getSigningAddress() external view returns (address signingAddress);
        function getRecovery() external view returns (address initiator, address newSigningAddress, address supporter);

        function createWithdrawRequest(uint256 amount, address to) external;
        function approveWithdrawRequest(uint256 id) external;
        function executeWithdrawRequest(uint256 id) external;
        function cancelWithdrawRequest(uint256 id) external;
        function getWithdrawRequest(uint256 id) external view returns (uint256 amount, address to, uint256 approvals, bool executed, bool cancelled);
        function getWithdrawRequestCount() external view returns (uint256 count);
        function getApprovalThreshold() external view returns (uint256 threshold);
    }

    /// Deploys accounts at deterministic addresses.
    #[sol(all_derives)]
    interface IWalletFactory {
        function deployWallet(bytes32 salt, address owner) external returns (address wallet);
        function aaBytecodeHash() external view returns (bytes32 hash);
    }
}

#[derive(Error, Debug)]
pub enum AbiError {
    #[error("Failed to decode {call} result: {reason}")]
    Decode { call: &'static str, reason: String },
}

/// ABI-encode a call (selector + arguments).
pub fn encode<C: SolCall>(call: &C) -> Bytes {
    Bytes::from(call.abi_encode())
}

/// Decode the return data of a view call.
pub fn decode_return<C: SolCall>(data: &[u8]) -> Result<C::Return, AbiError> {
    C::abi_decode_returns(data, true).map_err(|e| AbiError::Decode {
        call: C::SIGNATURE,
        reason: e.to_string(),
    })
}
