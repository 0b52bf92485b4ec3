//! Account deployment, funding and guardian management, driven the way the
//! CLI drives them: results go to the key/value store and later runs rebuild
//! the registry from it.
//!
//! Run with: cargo test -p warden-e2e --test deployment

use alloy_primitives::{Address, B256, U256};
use std::sync::Arc;
use tempfile::tempdir;
use warden_core::actors::FUNDER;
use warden_core::store::keys;
use warden_core::{create2_address, owner_constructor_input, ActorRegistry, EnvStore, Role};
use warden_e2e::{credential, fast_pipeline, milli_eth, SimChain, BYTECODE_HASH};
use warden_flow::{steps, FlowError, Orchestrator};

const FACTORY: Address = Address::new([0xfa; 20]);

fn funder() -> Role {
    Role::ThirdParty(FUNDER.to_string())
}

fn chain_with_factory() -> Arc<SimChain> {
    let chain = Arc::new(SimChain::new());
    chain.deploy_factory(FACTORY);
    chain.set_balance(credential(100).address(), milli_eth(1_000));
    chain
}

fn orchestrator(chain: &Arc<SimChain>, store: &EnvStore) -> Orchestrator {
    let registry = ActorRegistry::from_store(store).unwrap();
    Orchestrator::new(chain.clone(), registry, fast_pipeline())
}

#[tokio::test]
async fn test_deployed_address_matches_create2_rule() {
    let chain = chain_with_factory();
    let dir = tempdir().unwrap();
    let mut store = EnvStore::open(dir.path().join(".env")).unwrap();
    store
        .append(&[(keys::PRIVATE_KEY, credential(100).to_hex().to_string())])
        .unwrap();
    let orchestrator = orchestrator(&chain, &store);

    let salt = B256::repeat_byte(0x5a);
    let deployed = orchestrator
        .deploy_account(&funder(), FACTORY, salt)
        .await
        .unwrap();

    let signer = deployed.credential.address();
    let expected = create2_address(FACTORY, BYTECODE_HASH, salt, &owner_constructor_input(signer));
    assert_eq!(deployed.address, expected);
    assert_eq!(deployed.bytecode_hash, BYTECODE_HASH);
    assert!(deployed.receipt.status);
    assert_eq!(chain.account(deployed.address).unwrap().signer, signer);

    // Same salt, fresh key: a different account.
    let second = orchestrator
        .deploy_account(&funder(), FACTORY, salt)
        .await
        .unwrap();
    assert_ne!(second.address, deployed.address);
}

#[tokio::test]
async fn test_deploy_to_missing_factory_reverts() {
    let chain = Arc::new(SimChain::new());
    chain.set_balance(credential(100).address(), milli_eth(1_000));
    let dir = tempdir().unwrap();
    let mut store = EnvStore::open(dir.path().join(".env")).unwrap();
    store
        .append(&[(keys::PRIVATE_KEY, credential(100).to_hex().to_string())])
        .unwrap();

    let err = orchestrator(&chain, &store)
        .deploy_account(&funder(), FACTORY, B256::ZERO)
        .await
        .unwrap_err();
    assert_eq!(err.step(), Some(steps::DEPLOY_ACCOUNT));
    assert!(matches!(err.root(), FlowError::Submission(_)));
}

#[tokio::test]
async fn test_fund_refuses_thin_funder() {
    let chain = chain_with_factory();
    chain.set_balance(credential(100).address(), milli_eth(1));
    let dir = tempdir().unwrap();
    let mut store = EnvStore::open(dir.path().join(".env")).unwrap();
    store
        .append(&[(keys::PRIVATE_KEY, credential(100).to_hex().to_string())])
        .unwrap();

    let err = orchestrator(&chain, &store)
        .fund(&funder(), Address::repeat_byte(0x42), milli_eth(2))
        .await
        .unwrap_err();
    assert_eq!(err.step(), Some(steps::FUND));
    assert!(matches!(err.root(), FlowError::Precondition(_)));
    assert_eq!(chain.nonce_of(credential(100).address()), 0);
}

/// deploy owner + two guardians → store → rebuild registry → add guardians →
/// vault run → remove a guardian.
#[tokio::test]
async fn test_store_driven_setup() {
    let chain = chain_with_factory();
    let dir = tempdir().unwrap();
    let path = dir.path().join(".env");
    let mut store = EnvStore::open(&path).unwrap();
    store
        .append(&[(keys::PRIVATE_KEY, credential(100).to_hex().to_string())])
        .unwrap();

    {
        let orchestrator = orchestrator(&chain, &store);
        let salt = B256::ZERO;

        let owner = orchestrator
            .deploy_account(&funder(), FACTORY, salt)
            .await
            .unwrap();
        orchestrator
            .fund(&funder(), owner.address, milli_eth(10))
            .await
            .unwrap();
        store
            .append(&[
                (keys::WALLET_ADDRESS, owner.address.to_string()),
                (keys::WALLET_SIGNING_KEY, owner.credential.to_hex().to_string()),
            ])
            .unwrap();

        for index in 1..=2u8 {
            let guardian = orchestrator
                .deploy_account(&funder(), FACTORY, salt)
                .await
                .unwrap();
            orchestrator
                .fund(&funder(), guardian.address, milli_eth(1))
                .await
                .unwrap();
            store
                .append(&[
                    (keys::guardian_address(index).as_str(), guardian.address.to_string()),
                    (keys::guardian_key(index).as_str(), guardian.credential.to_hex().to_string()),
                ])
                .unwrap();
        }
    }

    // A later run starts from the file alone.
    let store = EnvStore::open(&path).unwrap();
    let orchestrator = orchestrator(&chain, &store);
    let registry = orchestrator.registry();
    assert_eq!(registry.guardians().len(), 2);
    let account = orchestrator.account().unwrap();
    assert_eq!(chain.balance_of(account), milli_eth(10));

    let guardian_1 = registry.get(&Role::Guardian(1)).unwrap().address;
    let guardian_2 = registry.get(&Role::Guardian(2)).unwrap().address;
    orchestrator.add_guardian(guardian_1).await.unwrap();
    orchestrator.add_guardian(guardian_2).await.unwrap();
    assert_eq!(
        orchestrator.guardians().await.unwrap(),
        vec![guardian_1, guardian_2]
    );

    let err = orchestrator.add_guardian(guardian_1).await.unwrap_err();
    assert_eq!(err.step(), Some(steps::ADD_GUARDIAN));
    assert!(matches!(err.root(), FlowError::Precondition(_)));

    let request = orchestrator
        .run_withdrawal(
            milli_eth(1),
            credential(100).address(),
            &[Role::Guardian(1), Role::Guardian(2)],
        )
        .await
        .unwrap();
    assert_eq!(request.id, U256::ZERO);
    assert_eq!(chain.balance_of(account), milli_eth(9));

    let removed = orchestrator.remove_guardian(0).await.unwrap();
    assert_eq!(removed, guardian_1);
    assert_eq!(orchestrator.guardians().await.unwrap(), vec![guardian_2]);

    let err = orchestrator.remove_guardian(5).await.unwrap_err();
    assert!(matches!(err.root(), FlowError::Precondition(_)));
}
