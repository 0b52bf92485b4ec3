//! Error taxonomy of the orchestration layer.

use alloy_primitives::{Address, B256, U256};
use std::time::Duration;
use thiserror::Error;
use warden_core::abi::AbiError;
use warden_core::{EnvelopeError, RegistryError, Role, SigningError};
use warden_rpc::RpcError;

/// Failure between broadcast and the required confirmation depth.
#[derive(Error, Debug)]
pub enum SubmissionError {
    /// The node refused the envelope (stale nonce, funds, signature).
    #[error("Broadcast rejected: {0}")]
    Rejected(String),

    /// Included with a failed status. The nonce is consumed.
    #[error("Transaction {hash} reverted in block {block}")]
    Reverted { hash: B256, block: u64 },

    #[error("Transaction {hash} not confirmed to depth {confirmations} within {waited:?}")]
    ConfirmationTimeout {
        hash: B256,
        confirmations: u64,
        waited: Duration,
    },
}

/// A protocol step was requested from a state that does not allow it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Cannot {operation} recovery in state {state}")]
    Recovery {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Supporter {0} is the recovery initiator")]
    SameGuardian(Address),

    #[error("Cannot {operation} withdraw request {id} in state {state}")]
    Withdraw {
        id: U256,
        operation: &'static str,
        state: &'static str,
    },

    #[error("Guardian {guardian} already approved withdraw request {id}")]
    DuplicateApproval { id: U256, guardian: Address },
}

#[derive(Error, Debug)]
pub enum FlowError {
    /// The live fee price could not be fetched.
    #[error("Fee query failed: {0}")]
    FeeQuery(#[source] RpcError),

    #[error("Signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("Submission failed: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Invalid transition: {0}")]
    Transition(#[from] TransitionError),

    /// Observed on-chain state disagrees with what the step should have produced.
    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Network error: {0}")]
    Network(#[from] RpcError),

    #[error(transparent)]
    Abi(#[from] AbiError),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Step {step} by {role} ({origin} -> {target}) failed: {source}")]
    Step {
        step: &'static str,
        role: Role,
        origin: Address,
        target: Address,
        #[source]
        source: Box<FlowError>,
    },
}

impl FlowError {
    /// The underlying error, with any step context peeled off.
    pub fn root(&self) -> &FlowError {
        match self {
            FlowError::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Name of the innermost step this error came from, if any.
    pub fn step(&self) -> Option<&'static str> {
        match self {
            FlowError::Step { step, source, .. } => source.step().or(Some(*step)),
            _ => None,
        }
    }
}
