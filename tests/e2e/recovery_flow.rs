//! Guardian recovery against the simulated account.
//!
//! Run with: cargo test -p warden-e2e --test recovery_flow

use warden_core::abi::{self, IAAWallet};
use warden_core::{Credential, Role};
use warden_e2e::{milli_eth, Scenario};
use warden_flow::{steps, FlowError, RecoveryState, SubmissionError, TransitionError};

#[tokio::test]
async fn test_recovery_replaces_signing_key() {
    let scenario = Scenario::new(2, milli_eth(10));
    let orchestrator = scenario.orchestrator();
    let new_key = Credential::generate();

    let state = orchestrator
        .run_recovery(&Role::Guardian(1), &Role::Guardian(2), new_key.address())
        .await
        .unwrap();

    assert_eq!(
        state,
        RecoveryState::Executed {
            initiator: scenario.guardians[0],
            proposed: new_key.address(),
            supporter: scenario.guardians[1],
        }
    );
    let account = scenario.chain.account(scenario.account).unwrap();
    assert_eq!(account.signer, new_key.address());
    assert!(account.recovery.is_none());
    assert_eq!(orchestrator.recovery_state().await.unwrap(), RecoveryState::None);
    assert!(scenario.chain.reverts().is_empty());
}

#[tokio::test]
async fn test_recovery_steps_observed_in_order() {
    let scenario = Scenario::new(2, milli_eth(10));
    let orchestrator = scenario.orchestrator();
    let proposed = Credential::generate().address();

    let initiated = orchestrator
        .initiate_recovery(&Role::Guardian(1), proposed)
        .await
        .unwrap();
    assert_eq!(initiated.name(), "initiated");
    assert_eq!(orchestrator.recovery_state().await.unwrap(), initiated);

    let supported = orchestrator
        .support_recovery(&Role::Guardian(2))
        .await
        .unwrap();
    assert_eq!(supported.name(), "supported");

    let executed = orchestrator
        .execute_recovery(&Role::Guardian(2))
        .await
        .unwrap();
    assert_eq!(executed.proposed(), Some(proposed));
    assert_eq!(orchestrator.signing_address().await.unwrap(), proposed);
}

#[tokio::test]
async fn test_initiator_cannot_support() {
    let scenario = Scenario::new(2, milli_eth(10));
    let orchestrator = scenario.orchestrator();
    let proposed = Credential::generate().address();

    orchestrator
        .initiate_recovery(&Role::Guardian(1), proposed)
        .await
        .unwrap();
    let nonce_before = scenario.chain.nonce_of(scenario.guardians[0]);

    let err = orchestrator
        .support_recovery(&Role::Guardian(1))
        .await
        .unwrap_err();
    assert_eq!(err.step(), Some(steps::SUPPORT_RECOVERY));
    assert!(matches!(
        err.root(),
        FlowError::Transition(TransitionError::SameGuardian(g)) if *g == scenario.guardians[0]
    ));
    // Refused before anything was broadcast.
    assert_eq!(scenario.chain.nonce_of(scenario.guardians[0]), nonce_before);
    assert!(scenario.chain.reverts().is_empty());
}

#[tokio::test]
async fn test_execute_before_support_is_refused() {
    let scenario = Scenario::new(2, milli_eth(10));
    let orchestrator = scenario.orchestrator();

    let err = orchestrator
        .execute_recovery(&Role::Guardian(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err.root(),
        FlowError::Transition(TransitionError::Recovery {
            operation: "execute",
            state: "none"
        })
    ));

    orchestrator
        .initiate_recovery(&Role::Guardian(1), Credential::generate().address())
        .await
        .unwrap();
    let err = orchestrator
        .initiate_recovery(&Role::Guardian(2), Credential::generate().address())
        .await
        .unwrap_err();
    assert!(matches!(
        err.root(),
        FlowError::Transition(TransitionError::Recovery {
            operation: "initiate",
            ..
        })
    ));
}

#[tokio::test]
async fn test_non_guardian_is_refused() {
    let scenario = Scenario::new(3, milli_eth(10));
    scenario
        .chain
        .set_guardians(scenario.account, scenario.guardians[..2].to_vec());
    let orchestrator = scenario.orchestrator();

    let err = orchestrator
        .initiate_recovery(&Role::Guardian(3), Credential::generate().address())
        .await
        .unwrap_err();
    assert!(matches!(err.root(), FlowError::Precondition(_)));
    assert_eq!(scenario.chain.nonce_of(scenario.guardians[2]), 0);
}

#[tokio::test]
async fn test_contract_rejection_surfaces_as_revert() {
    let scenario = Scenario::new(2, milli_eth(10));
    let orchestrator = scenario.orchestrator();
    orchestrator
        .initiate_recovery(&Role::Guardian(1), Credential::generate().address())
        .await
        .unwrap();

    // Bypass the client-side checks: the account itself refuses.
    let call = IAAWallet::supportRecoveryCall {};
    let err = orchestrator
        .execute_step(
            steps::SUPPORT_RECOVERY,
            &Role::Guardian(1),
            scenario.account,
            abi::encode(&call),
            Default::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err.root(),
        FlowError::Submission(SubmissionError::Reverted { .. })
    ));
    assert_eq!(scenario.chain.reverts(), vec!["initiator cannot support"]);
    // A reverted transaction still consumes the nonce.
    assert_eq!(scenario.chain.nonce_of(scenario.guardians[0]), 2);
}

#[tokio::test]
async fn test_old_key_rejected_after_recovery() {
    let scenario = Scenario::new(2, milli_eth(10));
    let orchestrator = scenario.orchestrator();
    orchestrator
        .run_recovery(
            &Role::Guardian(1),
            &Role::Guardian(2),
            Credential::generate().address(),
        )
        .await
        .unwrap();

    // The registry still holds the replaced owner key.
    let err = orchestrator
        .create_withdraw_request(milli_eth(1), scenario.funder)
        .await
        .unwrap_err();
    assert!(matches!(
        err.root(),
        FlowError::Submission(SubmissionError::Rejected(msg)) if msg.contains("invalid signature")
    ));
}
