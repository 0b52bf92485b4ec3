//! Fee estimation.
//!
//! One policy everywhere: the gas limit comes from `eth_estimateGas` and falls
//! back to [`FALLBACK_GAS_LIMIT`] on any estimation failure; the gas price is
//! always fetched live and a failure there aborts the step.

use crate::error::FlowError;
use alloy_primitives::U256;
use std::sync::Arc;
use warden_core::EnvelopeDraft;
use warden_rpc::{CallRequest, NetworkProvider};

/// Gas limit used when estimation fails.
pub const FALLBACK_GAS_LIMIT: u64 = 500_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub gas_limit: U256,
    pub gas_price: U256,
    /// `false` when the gas limit is the fallback.
    pub estimated: bool,
}

pub struct FeeEstimator {
    provider: Arc<dyn NetworkProvider>,
}

impl FeeEstimator {
    pub fn new(provider: Arc<dyn NetworkProvider>) -> Self {
        Self { provider }
    }

    pub async fn estimate(&self, draft: &EnvelopeDraft) -> Result<FeeQuote, FlowError> {
        let request = CallRequest::new(draft.to_address(), draft.data().clone())
            .with_from(draft.from_address())
            .with_value(draft.value_or_zero());

        let (gas_limit, estimated) = match self.provider.estimate_gas(&request).await {
            Ok(limit) => (limit, true),
            Err(e) => {
                log::warn!(
                    "Gas estimation for {} -> {} failed ({}), using fallback limit {}",
                    draft.from_address(),
                    draft.to_address(),
                    e,
                    FALLBACK_GAS_LIMIT
                );
                (U256::from(FALLBACK_GAS_LIMIT), false)
            }
        };

        let gas_price = self
            .provider
            .gas_price()
            .await
            .map_err(FlowError::FeeQuery)?;

        Ok(FeeQuote {
            gas_limit,
            gas_price,
            estimated,
        })
    }
}
