//! Warden Flow
//!
//! Drives multi-party protocols on a guardian-protected account:
//! - Fee estimation with a single fallback policy
//! - Submission with a fixed confirmation depth
//! - Guardian management
//! - Social recovery (initiate → support → execute)
//! - Threshold-approved withdrawals (create → approve × n → execute / cancel)
//! - Account deployment and funding
//!
//! Enforcement lives in the account contract; this crate sequences the
//! steps, signs each one with the right actor and re-reads chain state
//! between them.

pub mod error;
pub mod fees;
pub mod orchestrator;
pub mod pipeline;
pub mod recovery;
pub mod vault;

#[cfg(test)]
mod test_utils;

pub use error::{FlowError, SubmissionError, TransitionError};
pub use fees::{FeeEstimator, FeeQuote, FALLBACK_GAS_LIMIT};
pub use orchestrator::{steps, DeployedAccount, Orchestrator};
pub use pipeline::{PipelineConfig, SubmissionPipeline};
pub use recovery::RecoveryState;
pub use vault::{WithdrawRequest, WithdrawState};
