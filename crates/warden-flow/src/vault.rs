//! Threshold-approved withdrawals.

use crate::error::TransitionError;
use alloy_primitives::{Address, U256};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawState {
    Created,
    /// Approvals reached the account's threshold.
    Approved,
    Executed,
    Cancelled,
}

impl WithdrawState {
    pub fn name(&self) -> &'static str {
        match self {
            WithdrawState::Created => "created",
            WithdrawState::Approved => "approved",
            WithdrawState::Executed => "executed",
            WithdrawState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawState::Executed | WithdrawState::Cancelled)
    }

    /// Derive the state from the recorded request. Terminal flags win over
    /// the approval count.
    pub fn from_observed(approvals: U256, threshold: U256, executed: bool, cancelled: bool) -> Self {
        if cancelled {
            WithdrawState::Cancelled
        } else if executed {
            WithdrawState::Executed
        } else if approvals >= threshold {
            WithdrawState::Approved
        } else {
            WithdrawState::Created
        }
    }
}

impl fmt::Display for WithdrawState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A withdraw request as last read from the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawRequest {
    pub id: U256,
    pub amount: U256,
    pub recipient: Address,
    pub approvals: U256,
    pub threshold: U256,
    pub state: WithdrawState,
}

impl WithdrawRequest {
    pub fn check_approve(&self) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(self.refuse("approve"));
        }
        Ok(())
    }

    pub fn check_execute(&self) -> Result<(), TransitionError> {
        match self.state {
            WithdrawState::Approved => Ok(()),
            _ => Err(self.refuse("execute")),
        }
    }

    pub fn check_cancel(&self) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(self.refuse("cancel"));
        }
        Ok(())
    }

    fn refuse(&self, operation: &'static str) -> TransitionError {
        TransitionError::Withdraw {
            id: self.id,
            operation,
            state: self.state.name(),
        }
    }
}
