//! Threshold-approved withdrawals against the simulated account.
//!
//! Run with: cargo test -p warden-e2e --test vault_flow

use alloy_primitives::{Address, U256};
use warden_core::Role;
use warden_e2e::{milli_eth, Scenario};
use warden_flow::{steps, FlowError, SubmissionError, TransitionError, WithdrawState};

#[tokio::test]
async fn test_end_to_end_vault_scenario() {
    let scenario = Scenario::new(2, milli_eth(10));
    let orchestrator = scenario.orchestrator();
    let recipient = Address::repeat_byte(0x77);
    let amount = milli_eth(1);

    let request = orchestrator
        .run_withdrawal(amount, recipient, &[Role::Guardian(1), Role::Guardian(2)])
        .await
        .unwrap();

    assert_eq!(request.id, U256::ZERO);
    assert_eq!(request.state, WithdrawState::Executed);
    assert_eq!(request.approvals, U256::from(2));
    assert_eq!(scenario.chain.balance_of(recipient), amount);
    assert_eq!(scenario.chain.balance_of(scenario.account), milli_eth(9));

    // create + execute from the owner, one approval from each guardian.
    assert_eq!(scenario.chain.nonce_of(scenario.account), 2);
    assert_eq!(scenario.chain.nonce_of(scenario.guardians[0]), 1);
    assert_eq!(scenario.chain.nonce_of(scenario.guardians[1]), 1);

    // A second request, cancelled before any approval, never pays out.
    let second = orchestrator
        .create_withdraw_request(amount, recipient)
        .await
        .unwrap();
    assert_eq!(second.id, U256::from(1));
    assert_eq!(second.state, WithdrawState::Created);

    let cancelled = orchestrator
        .cancel_withdraw_request(second.id)
        .await
        .unwrap();
    assert_eq!(cancelled.state, WithdrawState::Cancelled);
    assert_eq!(cancelled.approvals, U256::ZERO);

    for result in [
        orchestrator.execute_withdraw_request(second.id).await,
        orchestrator
            .approve_withdraw_request(second.id, &Role::Guardian(1))
            .await,
    ] {
        let err = result.unwrap_err();
        assert!(matches!(
            err.root(),
            FlowError::Transition(TransitionError::Withdraw {
                state: "cancelled",
                ..
            })
        ));
    }
    assert_eq!(
        orchestrator.withdraw_request(second.id).await.unwrap().state,
        WithdrawState::Cancelled
    );
    assert_eq!(
        orchestrator.withdraw_request(U256::ZERO).await.unwrap().state,
        WithdrawState::Executed
    );

    assert_eq!(scenario.chain.balance_of(recipient), amount);
    assert_eq!(scenario.chain.balance_of(scenario.account), milli_eth(9));
    assert_eq!(scenario.chain.nonce_of(scenario.account), 4);
    assert_eq!(scenario.chain.nonce_of(scenario.guardians[0]), 1);
    assert!(scenario.chain.reverts().is_empty());
}

#[tokio::test]
async fn test_request_ids_follow_count() {
    let scenario = Scenario::new(2, milli_eth(10));
    let orchestrator = scenario.orchestrator();

    let first = orchestrator
        .create_withdraw_request(milli_eth(1), scenario.funder)
        .await
        .unwrap();
    let second = orchestrator
        .create_withdraw_request(milli_eth(2), scenario.funder)
        .await
        .unwrap();

    assert_eq!(first.id, U256::ZERO);
    assert_eq!(second.id, U256::from(1));
    assert_eq!(second.amount, milli_eth(2));
    assert_eq!(second.state, WithdrawState::Created);
    assert_eq!(second.threshold, U256::from(2));

    let err = orchestrator.withdraw_request(U256::from(2)).await.unwrap_err();
    assert!(matches!(err, FlowError::Precondition(_)));
}

#[tokio::test]
async fn test_execute_requires_threshold() {
    let scenario = Scenario::new(2, milli_eth(10));
    let orchestrator = scenario.orchestrator();
    let request = orchestrator
        .create_withdraw_request(milli_eth(1), scenario.funder)
        .await
        .unwrap();

    let after_one = orchestrator
        .approve_withdraw_request(request.id, &Role::Guardian(1))
        .await
        .unwrap();
    assert_eq!(after_one.state, WithdrawState::Created);

    let err = orchestrator
        .execute_withdraw_request(request.id)
        .await
        .unwrap_err();
    assert_eq!(err.step(), Some(steps::EXECUTE_WITHDRAW));
    assert!(matches!(
        err.root(),
        FlowError::Transition(TransitionError::Withdraw {
            operation: "execute",
            state: "created",
            ..
        })
    ));

    let after_two = orchestrator
        .approve_withdraw_request(request.id, &Role::Guardian(2))
        .await
        .unwrap();
    assert_eq!(after_two.state, WithdrawState::Approved);

    let executed = orchestrator
        .execute_withdraw_request(request.id)
        .await
        .unwrap();
    assert_eq!(executed.state, WithdrawState::Executed);
}

#[tokio::test]
async fn test_duplicate_approval_is_refused() {
    let scenario = Scenario::new(2, milli_eth(10));
    let orchestrator = scenario.orchestrator();
    let request = orchestrator
        .create_withdraw_request(milli_eth(1), scenario.funder)
        .await
        .unwrap();

    orchestrator
        .approve_withdraw_request(request.id, &Role::Guardian(1))
        .await
        .unwrap();
    let err = orchestrator
        .approve_withdraw_request(request.id, &Role::Guardian(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err.root(),
        FlowError::Transition(TransitionError::DuplicateApproval { guardian, .. })
            if *guardian == scenario.guardians[0]
    ));
    assert_eq!(scenario.chain.nonce_of(scenario.guardians[0]), 1);
}

#[tokio::test]
async fn test_cancel_is_terminal() {
    let scenario = Scenario::new(2, milli_eth(10));
    let orchestrator = scenario.orchestrator();
    let request = orchestrator
        .create_withdraw_request(milli_eth(1), scenario.funder)
        .await
        .unwrap();
    orchestrator
        .approve_withdraw_request(request.id, &Role::Guardian(1))
        .await
        .unwrap();

    let cancelled = orchestrator
        .cancel_withdraw_request(request.id)
        .await
        .unwrap();
    assert_eq!(cancelled.state, WithdrawState::Cancelled);

    for result in [
        orchestrator
            .approve_withdraw_request(request.id, &Role::Guardian(2))
            .await,
        orchestrator.execute_withdraw_request(request.id).await,
        orchestrator.cancel_withdraw_request(request.id).await,
    ] {
        let err = result.unwrap_err();
        assert!(matches!(
            err.root(),
            FlowError::Transition(TransitionError::Withdraw {
                state: "cancelled",
                ..
            })
        ));
    }
    assert_eq!(scenario.chain.balance_of(scenario.account), milli_eth(10));
}

#[tokio::test]
async fn test_approved_request_can_be_cancelled() {
    let scenario = Scenario::new(2, milli_eth(10));
    let orchestrator = scenario.orchestrator();
    let request = orchestrator
        .create_withdraw_request(milli_eth(1), scenario.funder)
        .await
        .unwrap();
    for guardian in [Role::Guardian(1), Role::Guardian(2)] {
        orchestrator
            .approve_withdraw_request(request.id, &guardian)
            .await
            .unwrap();
    }

    let cancelled = orchestrator
        .cancel_withdraw_request(request.id)
        .await
        .unwrap();
    assert_eq!(cancelled.state, WithdrawState::Cancelled);
    assert_eq!(cancelled.approvals, U256::from(2));
}

#[tokio::test]
async fn test_higher_threshold_needs_every_guardian() {
    let scenario = Scenario::new(3, milli_eth(10));
    scenario.chain.set_threshold(scenario.account, 3);
    let orchestrator = scenario.orchestrator();

    let err = orchestrator
        .run_withdrawal(
            milli_eth(1),
            scenario.funder,
            &[Role::Guardian(1), Role::Guardian(2)],
        )
        .await
        .unwrap_err();
    assert!(matches!(err.root(), FlowError::Transition(_)));

    let request = orchestrator
        .approve_withdraw_request(U256::ZERO, &Role::Guardian(3))
        .await
        .unwrap();
    assert_eq!(request.state, WithdrawState::Approved);
}

#[tokio::test]
async fn test_create_checks_account_balance() {
    let scenario = Scenario::new(2, milli_eth(1));
    let orchestrator = scenario.orchestrator();

    let err = orchestrator
        .create_withdraw_request(milli_eth(2), scenario.funder)
        .await
        .unwrap_err();
    assert_eq!(err.step(), Some(steps::CREATE_WITHDRAW));
    assert!(matches!(err.root(), FlowError::Precondition(_)));
    assert_eq!(scenario.chain.nonce_of(scenario.account), 0);
}

#[tokio::test]
async fn test_unchecked_execute_reverts_on_chain() {
    let scenario = Scenario::new(2, milli_eth(10));
    let orchestrator = scenario.orchestrator();
    let request = orchestrator
        .create_withdraw_request(milli_eth(1), scenario.funder)
        .await
        .unwrap();

    let call = warden_core::abi::IAAWallet::executeWithdrawRequestCall { id: request.id };
    let err = orchestrator
        .execute_step(
            steps::EXECUTE_WITHDRAW,
            &Role::Owner,
            scenario.account,
            warden_core::abi::encode(&call),
            U256::ZERO,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err.root(),
        FlowError::Submission(SubmissionError::Reverted { .. })
    ));
    assert_eq!(scenario.chain.reverts(), vec!["0/2 approvals"]);
}
