//! Workflow orchestrator.
//!
//! Every state-changing operation runs as one *step*: pick the actor, build
//! the envelope from live chain data (chain id, nonce, fees), sign it with
//! the actor's credential, submit it and wait for confirmation. Preconditions
//! are re-read from the chain before the step and the outcome is re-read
//! after it; nothing local is trusted across steps.
//!
//! Steps run strictly one after another. The nonce of a step is read only
//! after the previous step is confirmed.

use crate::error::{FlowError, TransitionError};
use crate::fees::FeeEstimator;
use crate::pipeline::{PipelineConfig, SubmissionPipeline};
use crate::recovery::RecoveryState;
use crate::vault::{WithdrawRequest, WithdrawState};
use alloy_primitives::utils::format_ether;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use warden_core::abi::{self, IAAWallet, IWalletFactory};
use warden_core::{
    create2_address, owner_constructor_input, sign, Actor, ActorRegistry, Credential,
    EnvelopeDraft, Role,
};
use warden_rpc::{CallRequest, NetworkProvider, Receipt};

/// Step names, as they appear in logs and errors.
pub mod steps {
    pub const ADD_GUARDIAN: &str = "add-guardian";
    pub const REMOVE_GUARDIAN: &str = "remove-guardian";
    pub const INITIATE_RECOVERY: &str = "initiate-recovery";
    pub const SUPPORT_RECOVERY: &str = "support-recovery";
    pub const EXECUTE_RECOVERY: &str = "execute-recovery";
    pub const CREATE_WITHDRAW: &str = "create-withdraw";
    pub const APPROVE_WITHDRAW: &str = "approve-withdraw";
    pub const EXECUTE_WITHDRAW: &str = "execute-withdraw";
    pub const CANCEL_WITHDRAW: &str = "cancel-withdraw";
    pub const DEPLOY_ACCOUNT: &str = "deploy-account";
    pub const FUND: &str = "fund";
}

/// A freshly deployed account and the key that controls it.
#[derive(Debug, Clone)]
pub struct DeployedAccount {
    pub address: Address,
    pub credential: Credential,
    pub bytecode_hash: B256,
    pub salt: B256,
    pub receipt: Receipt,
}

pub struct Orchestrator {
    provider: Arc<dyn NetworkProvider>,
    registry: ActorRegistry,
    fees: FeeEstimator,
    pipeline: SubmissionPipeline,
    /// Approvals sent by this orchestrator, per withdraw request id.
    approvals: Mutex<BTreeMap<U256, BTreeSet<Address>>>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn NetworkProvider>,
        registry: ActorRegistry,
        config: PipelineConfig,
    ) -> Self {
        Self {
            fees: FeeEstimator::new(provider.clone()),
            pipeline: SubmissionPipeline::new(provider.clone(), config),
            provider,
            registry,
            approvals: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn registry(&self) -> &ActorRegistry {
        &self.registry
    }

    pub fn provider(&self) -> &Arc<dyn NetworkProvider> {
        &self.provider
    }

    /// The managed account (the owner's origin address).
    pub fn account(&self) -> Result<Address, FlowError> {
        Ok(self.registry.owner()?.address)
    }

    // ------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------

    /// Build, sign, submit and confirm one envelope from `role` to `target`.
    pub async fn execute_step(
        &self,
        step: &'static str,
        role: &Role,
        target: Address,
        data: Bytes,
        value: U256,
    ) -> Result<Receipt, FlowError> {
        let actor = self.registry.get(role)?;
        self.in_step(step, actor, target, self.submit_as(step, actor, target, data, value))
            .await
    }

    async fn submit_as(
        &self,
        step: &'static str,
        actor: &Actor,
        target: Address,
        data: Bytes,
        value: U256,
    ) -> Result<Receipt, FlowError> {
        let chain_id = self.provider.chain_id().await?;
        let nonce = self.provider.transaction_count(actor.address).await?;

        let draft = EnvelopeDraft::new(actor.address, target, data)
            .value(value)?
            .chain_id(chain_id)?
            .nonce(nonce)?;
        let quote = self.fees.estimate(&draft).await?;
        let draft = draft.fees(quote.gas_limit, quote.gas_price)?;
        let signed = sign(draft, &actor.credential)?;

        log::info!(
            "{}: {} ({}) -> {}, nonce {}, gas limit {}{}",
            step,
            actor.role,
            actor.address,
            target,
            nonce,
            quote.gas_limit,
            if quote.estimated { "" } else { " (fallback)" }
        );
        let receipt = self.pipeline.submit(&signed).await?;
        log::info!(
            "{}: confirmed in block {} ({})",
            step,
            receipt.block_number,
            receipt.transaction_hash
        );
        Ok(receipt)
    }

    /// Attach step context to any error raised by `body`.
    async fn in_step<T>(
        &self,
        step: &'static str,
        actor: &Actor,
        target: Address,
        body: impl Future<Output = Result<T, FlowError>>,
    ) -> Result<T, FlowError> {
        body.await.map_err(|source| FlowError::Step {
            step,
            role: actor.role.clone(),
            origin: actor.address,
            target,
            source: Box::new(source),
        })
    }

    async fn view<C: SolCall>(&self, target: Address, call: &C) -> Result<C::Return, FlowError> {
        let data = self
            .provider
            .call(&CallRequest::new(target, abi::encode(call)))
            .await?;
        Ok(abi::decode_return::<C>(&data)?)
    }

    // ------------------------------------------------------------------
    // Preconditions
    // ------------------------------------------------------------------

    /// Fail unless `address` holds at least `minimum` wei. Returns the balance.
    pub async fn require_balance(
        &self,
        address: Address,
        minimum: U256,
    ) -> Result<U256, FlowError> {
        let balance = self.provider.balance(address).await?;
        if balance < minimum {
            return Err(FlowError::Precondition(format!(
                "{} holds {} ETH, needs at least {} ETH",
                address,
                format_ether(balance),
                format_ether(minimum)
            )));
        }
        Ok(balance)
    }

    async fn require_guardian(&self, account: Address, actor: &Actor) -> Result<(), FlowError> {
        let guardians = self.guardians_of(account).await?;
        if !guardians.contains(&actor.address) {
            return Err(FlowError::Precondition(format!(
                "{} ({}) is not a guardian of {}",
                actor.role, actor.address, account
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Guardians
    // ------------------------------------------------------------------

    pub async fn guardians(&self) -> Result<Vec<Address>, FlowError> {
        self.guardians_of(self.account()?).await
    }

    async fn guardians_of(&self, account: Address) -> Result<Vec<Address>, FlowError> {
        Ok(self
            .view(account, &IAAWallet::getGuardiansCall {})
            .await?
            .guardians)
    }

    pub async fn add_guardian(&self, guardian: Address) -> Result<Receipt, FlowError> {
        let owner = self.registry.owner()?;
        let account = owner.address;
        self.in_step(steps::ADD_GUARDIAN, owner, account, async {
            if self.guardians_of(account).await?.contains(&guardian) {
                return Err(FlowError::Precondition(format!(
                    "{} is already a guardian",
                    guardian
                )));
            }
            let call = IAAWallet::addGuardianCall { guardian };
            let receipt = self
                .submit_as(steps::ADD_GUARDIAN, owner, account, abi::encode(&call), U256::ZERO)
                .await?;

            if !self.guardians_of(account).await?.contains(&guardian) {
                return Err(FlowError::Verification(format!(
                    "{} missing from guardian set after add",
                    guardian
                )));
            }
            Ok::<_, FlowError>(receipt)
        })
        .await
    }

    /// Remove the guardian at `index` of the current `getGuardians()` list.
    pub async fn remove_guardian(&self, index: usize) -> Result<Address, FlowError> {
        let owner = self.registry.owner()?;
        let account = owner.address;
        self.in_step(steps::REMOVE_GUARDIAN, owner, account, async {
            let guardians = self.guardians_of(account).await?;
            let removed = *guardians.get(index).ok_or_else(|| {
                FlowError::Precondition(format!(
                    "no guardian at index {} ({} guardians)",
                    index,
                    guardians.len()
                ))
            })?;

            let call = IAAWallet::removeGuardianCall {
                index: U256::from(index),
            };
            self.submit_as(steps::REMOVE_GUARDIAN, owner, account, abi::encode(&call), U256::ZERO)
                .await?;

            if self.guardians_of(account).await?.contains(&removed) {
                return Err(FlowError::Verification(format!(
                    "{} still in guardian set after removal",
                    removed
                )));
            }
            Ok::<_, FlowError>(removed)
        })
        .await
    }

    // ------------------------------------------------------------------
    // Recovery
    // ------------------------------------------------------------------

    pub async fn recovery_state(&self) -> Result<RecoveryState, FlowError> {
        self.recovery_state_of(self.account()?).await
    }

    async fn recovery_state_of(&self, account: Address) -> Result<RecoveryState, FlowError> {
        let observed = self
            .view(account, &IAAWallet::getRecoveryCall {})
            .await?;
        Ok(RecoveryState::from_observed(
            observed.initiator,
            observed.newSigningAddress,
            observed.supporter,
        ))
    }

    pub async fn signing_address(&self) -> Result<Address, FlowError> {
        self.signing_address_of(self.account()?).await
    }

    async fn signing_address_of(&self, account: Address) -> Result<Address, FlowError> {
        Ok(self
            .view(account, &IAAWallet::getSigningAddressCall {})
            .await?
            .signingAddress)
    }

    async fn reconcile_recovery(
        &self,
        account: Address,
        expected: RecoveryState,
    ) -> Result<RecoveryState, FlowError> {
        let observed = self.recovery_state_of(account).await?;
        if observed != expected {
            return Err(FlowError::Verification(format!(
                "expected recovery {:?}, observed {:?}",
                expected, observed
            )));
        }
        Ok(observed)
    }

    /// Open a recovery process proposing `proposed` as the new signing address.
    pub async fn initiate_recovery(
        &self,
        guardian: &Role,
        proposed: Address,
    ) -> Result<RecoveryState, FlowError> {
        let actor = self.registry.get(guardian)?;
        let account = self.account()?;
        self.in_step(steps::INITIATE_RECOVERY, actor, account, async {
            self.require_guardian(account, actor).await?;
            let expected = self
                .recovery_state_of(account)
                .await?
                .initiate(actor.address, proposed)?;

            let call = IAAWallet::initiateRecoveryCall {
                newSigningAddress: proposed,
            };
            self.submit_as(steps::INITIATE_RECOVERY, actor, account, abi::encode(&call), U256::ZERO)
                .await?;
            self.reconcile_recovery(account, expected).await
        })
        .await
    }

    /// Second-guardian support. The supporter must differ from the initiator.
    pub async fn support_recovery(&self, guardian: &Role) -> Result<RecoveryState, FlowError> {
        let actor = self.registry.get(guardian)?;
        let account = self.account()?;
        self.in_step(steps::SUPPORT_RECOVERY, actor, account, async {
            self.require_guardian(account, actor).await?;
            let expected = self
                .recovery_state_of(account)
                .await?
                .support(actor.address)?;

            let call = IAAWallet::supportRecoveryCall {};
            self.submit_as(steps::SUPPORT_RECOVERY, actor, account, abi::encode(&call), U256::ZERO)
                .await?;
            self.reconcile_recovery(account, expected).await
        })
        .await
    }

    /// Apply a supported recovery and verify the new signing address.
    pub async fn execute_recovery(&self, guardian: &Role) -> Result<RecoveryState, FlowError> {
        let actor = self.registry.get(guardian)?;
        let account = self.account()?;
        self.in_step(steps::EXECUTE_RECOVERY, actor, account, async {
            self.require_guardian(account, actor).await?;
            let executed = self.recovery_state_of(account).await?.execute()?;

            let call = IAAWallet::executeRecoveryCall {};
            self.submit_as(steps::EXECUTE_RECOVERY, actor, account, abi::encode(&call), U256::ZERO)
                .await?;

            let signer = self.signing_address_of(account).await?;
            if Some(signer) != executed.proposed() {
                return Err(FlowError::Verification(format!(
                    "signing address is {} after recovery, expected {:?}",
                    signer,
                    executed.proposed()
                )));
            }
            log::info!("Recovery executed: {} now signs for {}", signer, account);
            Ok::<_, FlowError>(executed)
        })
        .await
    }

    /// initiate (by `initiator`) → support (by `supporter`) → execute (by `supporter`).
    pub async fn run_recovery(
        &self,
        initiator: &Role,
        supporter: &Role,
        proposed: Address,
    ) -> Result<RecoveryState, FlowError> {
        log::info!(
            "Recovery: {} initiates, {} supports, proposed signer {}",
            initiator,
            supporter,
            proposed
        );
        self.initiate_recovery(initiator, proposed).await?;
        self.support_recovery(supporter).await?;
        self.execute_recovery(supporter).await
    }

    // ------------------------------------------------------------------
    // Vault
    // ------------------------------------------------------------------

    pub async fn approval_threshold(&self) -> Result<U256, FlowError> {
        let account = self.account()?;
        Ok(self
            .view(account, &IAAWallet::getApprovalThresholdCall {})
            .await?
            .threshold)
    }

    pub async fn withdraw_request(&self, id: U256) -> Result<WithdrawRequest, FlowError> {
        let account = self.account()?;
        let count = self.withdraw_request_count(account).await?;
        if id >= count {
            return Err(FlowError::Precondition(format!(
                "withdraw request {} does not exist ({} recorded)",
                id, count
            )));
        }

        let recorded = self
            .view(account, &IAAWallet::getWithdrawRequestCall { id })
            .await?;
        let threshold = self
            .view(account, &IAAWallet::getApprovalThresholdCall {})
            .await?
            .threshold;

        Ok(WithdrawRequest {
            id,
            amount: recorded.amount,
            recipient: recorded.to,
            approvals: recorded.approvals,
            threshold,
            state: WithdrawState::from_observed(
                recorded.approvals,
                threshold,
                recorded.executed,
                recorded.cancelled,
            ),
        })
    }

    async fn withdraw_request_count(&self, account: Address) -> Result<U256, FlowError> {
        Ok(self
            .view(account, &IAAWallet::getWithdrawRequestCountCall {})
            .await?
            .count)
    }

    /// Owner files a withdrawal of `amount` wei to `recipient`.
    pub async fn create_withdraw_request(
        &self,
        amount: U256,
        recipient: Address,
    ) -> Result<WithdrawRequest, FlowError> {
        let owner = self.registry.owner()?;
        let account = owner.address;
        self.in_step(steps::CREATE_WITHDRAW, owner, account, async {
            self.require_balance(account, amount).await?;

            let call = IAAWallet::createWithdrawRequestCall {
                amount,
                to: recipient,
            };
            self.submit_as(steps::CREATE_WITHDRAW, owner, account, abi::encode(&call), U256::ZERO)
                .await?;

            let count = self.withdraw_request_count(account).await?;
            if count.is_zero() {
                return Err(FlowError::Verification(
                    "no withdraw request recorded after create".into(),
                ));
            }
            let request = self.withdraw_request(count - U256::from(1)).await?;
            if request.amount != amount
                || request.recipient != recipient
                || request.state.is_terminal()
            {
                return Err(FlowError::Verification(format!(
                    "latest withdraw request does not match: {:?}",
                    request
                )));
            }
            log::info!(
                "Withdraw request {}: {} ETH to {}",
                request.id,
                format_ether(amount),
                recipient
            );
            Ok::<_, FlowError>(request)
        })
        .await
    }

    pub async fn approve_withdraw_request(
        &self,
        id: U256,
        guardian: &Role,
    ) -> Result<WithdrawRequest, FlowError> {
        let actor = self.registry.get(guardian)?;
        let account = self.account()?;
        self.in_step(steps::APPROVE_WITHDRAW, actor, account, async {
            self.require_guardian(account, actor).await?;
            let before = self.withdraw_request(id).await?;
            before.check_approve()?;
            if self.has_approved(id, actor.address) {
                return Err(TransitionError::DuplicateApproval {
                    id,
                    guardian: actor.address,
                }
                .into());
            }

            let call = IAAWallet::approveWithdrawRequestCall { id };
            self.submit_as(steps::APPROVE_WITHDRAW, actor, account, abi::encode(&call), U256::ZERO)
                .await?;
            self.record_approval(id, actor.address);

            let after = self.withdraw_request(id).await?;
            if after.approvals != before.approvals + U256::from(1) {
                return Err(FlowError::Verification(format!(
                    "withdraw request {} has {} approvals, expected {}",
                    id,
                    after.approvals,
                    before.approvals + U256::from(1)
                )));
            }
            log::info!(
                "Withdraw request {}: {}/{} approvals ({})",
                id,
                after.approvals,
                after.threshold,
                after.state
            );
            Ok::<_, FlowError>(after)
        })
        .await
    }

    pub async fn execute_withdraw_request(&self, id: U256) -> Result<WithdrawRequest, FlowError> {
        let owner = self.registry.owner()?;
        let account = owner.address;
        self.in_step(steps::EXECUTE_WITHDRAW, owner, account, async {
            self.withdraw_request(id).await?.check_execute()?;

            let call = IAAWallet::executeWithdrawRequestCall { id };
            self.submit_as(steps::EXECUTE_WITHDRAW, owner, account, abi::encode(&call), U256::ZERO)
                .await?;
            self.expect_withdraw_state(id, WithdrawState::Executed).await
        })
        .await
    }

    pub async fn cancel_withdraw_request(&self, id: U256) -> Result<WithdrawRequest, FlowError> {
        let owner = self.registry.owner()?;
        let account = owner.address;
        self.in_step(steps::CANCEL_WITHDRAW, owner, account, async {
            self.withdraw_request(id).await?.check_cancel()?;

            let call = IAAWallet::cancelWithdrawRequestCall { id };
            self.submit_as(steps::CANCEL_WITHDRAW, owner, account, abi::encode(&call), U256::ZERO)
                .await?;
            self.expect_withdraw_state(id, WithdrawState::Cancelled).await
        })
        .await
    }

    async fn expect_withdraw_state(
        &self,
        id: U256,
        expected: WithdrawState,
    ) -> Result<WithdrawRequest, FlowError> {
        let request = self.withdraw_request(id).await?;
        if request.state != expected {
            return Err(FlowError::Verification(format!(
                "withdraw request {} is {}, expected {}",
                id, request.state, expected
            )));
        }
        Ok(request)
    }

    /// create → one approval per guardian, in order → execute.
    pub async fn run_withdrawal(
        &self,
        amount: U256,
        recipient: Address,
        guardians: &[Role],
    ) -> Result<WithdrawRequest, FlowError> {
        let request = self.create_withdraw_request(amount, recipient).await?;
        for guardian in guardians {
            self.approve_withdraw_request(request.id, guardian).await?;
        }
        self.execute_withdraw_request(request.id).await
    }

    fn has_approved(&self, id: U256, guardian: Address) -> bool {
        let approvals = self.approvals.lock().unwrap_or_else(|e| e.into_inner());
        approvals
            .get(&id)
            .is_some_and(|guardians| guardians.contains(&guardian))
    }

    fn record_approval(&self, id: U256, guardian: Address) {
        let mut approvals = self.approvals.lock().unwrap_or_else(|e| e.into_inner());
        approvals.entry(id).or_default().insert(guardian);
    }

    // ------------------------------------------------------------------
    // Deployment & funding
    // ------------------------------------------------------------------

    /// Deploy a new account through `factory` with a freshly generated
    /// signing key, paid for by `funder`.
    pub async fn deploy_account(
        &self,
        funder: &Role,
        factory: Address,
        salt: B256,
    ) -> Result<DeployedAccount, FlowError> {
        let actor = self.registry.get(funder)?;
        self.in_step(steps::DEPLOY_ACCOUNT, actor, factory, async {
            let credential = Credential::generate();
            let signer = credential.address();

            let call = IWalletFactory::deployWalletCall {
                salt,
                owner: signer,
            };
            let receipt = self
                .submit_as(steps::DEPLOY_ACCOUNT, actor, factory, abi::encode(&call), U256::ZERO)
                .await?;

            let bytecode_hash = self
                .view(factory, &IWalletFactory::aaBytecodeHashCall {})
                .await?
                .hash;
            let address =
                create2_address(factory, bytecode_hash, salt, &owner_constructor_input(signer));

            let deployed_signer = self.signing_address_of(address).await?;
            if deployed_signer != signer {
                return Err(FlowError::Verification(format!(
                    "account at {} reports signer {}, expected {}",
                    address, deployed_signer, signer
                )));
            }
            log::info!("Deployed account {} (signer {})", address, signer);

            Ok::<_, FlowError>(DeployedAccount {
                address,
                credential,
                bytecode_hash,
                salt,
                receipt,
            })
        })
        .await
    }

    /// Plain value transfer from `funder` to `to`.
    pub async fn fund(
        &self,
        funder: &Role,
        to: Address,
        amount: U256,
    ) -> Result<Receipt, FlowError> {
        let actor = self.registry.get(funder)?;
        self.in_step(steps::FUND, actor, to, async {
            self.require_balance(actor.address, amount).await?;
            let receipt = self
                .submit_as(steps::FUND, actor, to, Bytes::new(), amount)
                .await?;
            log::info!("Funded {} with {} ETH", to, format_ether(amount));
            Ok::<_, FlowError>(receipt)
        })
        .await
    }
}
