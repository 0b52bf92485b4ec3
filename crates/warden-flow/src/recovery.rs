//! Client-side view of the guardian recovery process.
//!
//! The contract enforces the rules; this state machine only refuses steps
//! that are certain to fail so they never cost a broadcast.

use crate::error::TransitionError;
use alloy_primitives::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    None,
    Initiated {
        initiator: Address,
        proposed: Address,
    },
    Supported {
        initiator: Address,
        proposed: Address,
        supporter: Address,
    },
    Executed {
        initiator: Address,
        proposed: Address,
        supporter: Address,
    },
}

impl RecoveryState {
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryState::None => "none",
            RecoveryState::Initiated { .. } => "initiated",
            RecoveryState::Supported { .. } => "supported",
            RecoveryState::Executed { .. } => "executed",
        }
    }

    /// State as reported by `getRecovery()`. A zero initiator means no
    /// process is open; a zero supporter means it awaits support.
    pub fn from_observed(initiator: Address, proposed: Address, supporter: Address) -> Self {
        if initiator.is_zero() {
            RecoveryState::None
        } else if supporter.is_zero() {
            RecoveryState::Initiated {
                initiator,
                proposed,
            }
        } else {
            RecoveryState::Supported {
                initiator,
                proposed,
                supporter,
            }
        }
    }

    pub fn proposed(&self) -> Option<Address> {
        match self {
            RecoveryState::None => None,
            RecoveryState::Initiated { proposed, .. }
            | RecoveryState::Supported { proposed, .. }
            | RecoveryState::Executed { proposed, .. } => Some(*proposed),
        }
    }

    pub fn initiate(&self, initiator: Address, proposed: Address) -> Result<Self, TransitionError> {
        match self {
            RecoveryState::None => Ok(RecoveryState::Initiated {
                initiator,
                proposed,
            }),
            other => Err(other.refuse("initiate")),
        }
    }

    pub fn support(&self, supporter: Address) -> Result<Self, TransitionError> {
        match *self {
            RecoveryState::Initiated { initiator, .. } if initiator == supporter => {
                Err(TransitionError::SameGuardian(supporter))
            }
            RecoveryState::Initiated {
                initiator,
                proposed,
            } => Ok(RecoveryState::Supported {
                initiator,
                proposed,
                supporter,
            }),
            ref other => Err(other.refuse("support")),
        }
    }

    pub fn execute(&self) -> Result<Self, TransitionError> {
        match *self {
            RecoveryState::Supported {
                initiator,
                proposed,
                supporter,
            } => Ok(RecoveryState::Executed {
                initiator,
                proposed,
                supporter,
            }),
            ref other => Err(other.refuse("execute")),
        }
    }

    fn refuse(&self, operation: &'static str) -> TransitionError {
        TransitionError::Recovery {
            operation,
            state: self.name(),
        }
    }
}
