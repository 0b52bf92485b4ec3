//! Submission pipeline: broadcast, then wait for confirmation depth.
//!
//! No retries. A rejected broadcast, a reverted receipt or a timeout is
//! reported as-is and the caller decides what to do next.

use crate::error::SubmissionError;
use alloy_primitives::B256;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use warden_core::SignedEnvelope;
use warden_rpc::{NetworkProvider, Receipt, RpcError};

/// Default confirmation depth.
pub const DEFAULT_CONFIRMATIONS: u64 = 6;
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Blocks required, counting the inclusion block itself.
    pub confirmations: u64,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confirmations: DEFAULT_CONFIRMATIONS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }
}

pub struct SubmissionPipeline {
    provider: Arc<dyn NetworkProvider>,
    config: PipelineConfig,
}

impl SubmissionPipeline {
    pub fn new(provider: Arc<dyn NetworkProvider>, config: PipelineConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Broadcast `signed` and wait until it is `confirmations` blocks deep.
    pub async fn submit(&self, signed: &SignedEnvelope) -> Result<Receipt, SubmissionError> {
        let raw = signed.encode();
        let hash = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| SubmissionError::Rejected(e.to_string()))?;

        log::debug!(
            "Submitted {} (nonce {}), awaiting {} confirmations",
            hash,
            signed.envelope().nonce(),
            self.config.confirmations
        );
        self.wait_for_confirmations(hash).await
    }

    async fn wait_for_confirmations(&self, hash: B256) -> Result<Receipt, SubmissionError> {
        let started = Instant::now();
        loop {
            match self.poll(hash).await {
                Ok(Progress::Confirmed(receipt)) => return Ok(receipt),
                Ok(Progress::Reverted(receipt)) => {
                    return Err(SubmissionError::Reverted {
                        hash,
                        block: receipt.block_number,
                    })
                }
                Ok(Progress::Pending) => {}
                Err(e) => log::warn!("Polling {} failed: {}", hash, e),
            }

            if started.elapsed() >= self.config.timeout {
                return Err(SubmissionError::ConfirmationTimeout {
                    hash,
                    confirmations: self.config.confirmations,
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn poll(&self, hash: B256) -> Result<Progress, RpcError> {
        let receipt = match self.provider.transaction_receipt(hash).await? {
            Some(receipt) => receipt,
            None => return Ok(Progress::Pending),
        };
        if !receipt.status {
            return Ok(Progress::Reverted(receipt));
        }

        let head = self.provider.block_number().await?;
        let depth = confirmation_depth(head, receipt.block_number);
        log::trace!("{}: {}/{} confirmations", hash, depth, self.config.confirmations);

        if depth >= self.config.confirmations {
            Ok(Progress::Confirmed(receipt))
        } else {
            Ok(Progress::Pending)
        }
    }
}

enum Progress {
    Pending,
    Confirmed(Receipt),
    Reverted(Receipt),
}

/// `head - inclusion + 1`, or 0 while the head lags behind the inclusion block.
pub fn confirmation_depth(head: u64, inclusion: u64) -> u64 {
    if head < inclusion {
        0
    } else {
        head - inclusion + 1
    }
}
