//! Tests for moving and spending expired fidelity bonds
//!
//! The lock check must reject a still-locked bond before any backend
//! traffic, and a successful move must leave every other coin's freeze
//! flag as it was.

use std::time::Duration;

use jm_wallet_libs::errors::SagaError;
use jm_wallet_libs::saga::mocks::{mock_bond, mock_tx, mock_utxo, MockFailureModes, MockWalletApi, RecordedCall};
use jm_wallet_libs::saga::{AlwaysCancel, MoveBondSaga, SpendConfirmationPoller};

/// Well past the expiry of the test bonds below
const NOW_MS: i64 = 1_700_000_000_000; // 2023-11-14

fn fast_poller() -> SpendConfirmationPoller {
    SpendConfirmationPoller::new()
        .with_initial_delay(Duration::ZERO)
        .with_poll_interval(Duration::from_millis(1))
}

#[tokio::test]
async fn test_locked_bond_is_rejected_before_any_backend_call() {
    let api = MockWalletApi::new();
    let bond = mock_bond("bond:0", 0, 100_000_000, "2999-01");
    api.set_utxos(vec![bond.clone()]);

    let saga = MoveBondSaga::new(api.clone());
    let result = saga.move_to_jar(&bond, 1, NOW_MS).await;

    assert!(matches!(result, Err(SagaError::BondStillLocked)));
    assert_eq!(api.call_count(), 0);
}

#[tokio::test]
async fn test_non_bond_is_rejected_before_any_backend_call() {
    let api = MockWalletApi::new();
    let plain = mock_utxo("plain:0", 0, 100_000_000, false);
    api.set_utxos(vec![plain.clone()]);

    let saga = MoveBondSaga::new(api.clone());
    let result = saga.spend_to_address(&plain, "bcrt1q_dest", NOW_MS).await;

    assert!(matches!(result, Err(SagaError::Validation(_))));
    assert_eq!(api.call_count(), 0);
}

#[tokio::test]
async fn test_move_to_jar_sweeps_bond_and_restores_siblings() {
    let api = MockWalletApi::new();
    let bond = mock_bond("bond:0", 0, 100_000_000, "2020-01");
    let sibling = mock_utxo("sib:0", 0, 5_000_000, false);
    api.set_utxos(vec![bond.clone(), sibling.clone()]);
    api.set_next_address("bcrt1q_jar1");
    api.set_next_tx(mock_tx("movetx", &["bond:0"]));
    // first reload builds the freeze scope, second answers the poller
    api.script_reloads(vec![
        vec![bond.clone(), sibling.clone()],
        vec![mock_utxo("sib:0", 0, 5_000_000, true)],
    ]);

    let saga = MoveBondSaga::new(api.clone()).with_poller(fast_poller());
    let tx = saga.move_to_jar(&bond, 1, NOW_MS).await.unwrap();

    assert_eq!(tx.txid, "movetx");
    assert!(api.calls().contains(&RecordedCall::NewAddress { jar: 1 }));
    assert!(api.calls().contains(&RecordedCall::DirectSend {
        jar: 0,
        destination: "bcrt1q_jar1".to_string(),
        amount_sats: 0,
    }));

    // the sibling was frozen for the sweep and thawed again afterwards
    let sib_calls: Vec<bool> = api
        .freeze_calls()
        .into_iter()
        .filter(|(id, _)| id.as_str() == "sib:0")
        .map(|(_, freeze)| freeze)
        .collect();
    assert_eq!(sib_calls, vec![true, false]);
    assert_eq!(api.frozen("sib:0"), Some(false));
}

#[tokio::test]
async fn test_spend_to_address_uses_given_destination() {
    let api = MockWalletApi::new();
    let bond = mock_bond("bond:0", 0, 100_000_000, "2020-01");
    api.set_utxos(vec![bond.clone()]);
    api.set_next_tx(mock_tx("spendtx", &["bond:0"]));
    api.script_reloads(vec![vec![bond.clone()], vec![]]);

    let saga = MoveBondSaga::new(api.clone()).with_poller(fast_poller());
    let tx = saga
        .spend_to_address(&bond, "bcrt1q_external", NOW_MS)
        .await
        .unwrap();

    assert_eq!(tx.txid, "spendtx");
    // no address derivation for an external destination
    assert!(!api
        .calls()
        .iter()
        .any(|call| matches!(call, RecordedCall::NewAddress { .. })));
    assert!(api.calls().contains(&RecordedCall::DirectSend {
        jar: 0,
        destination: "bcrt1q_external".to_string(),
        amount_sats: 0,
    }));
}

#[tokio::test]
async fn test_cancelled_confirmation_wait_is_not_success() {
    let api = MockWalletApi::new();
    let bond = mock_bond("bond:0", 0, 100_000_000, "2020-01");
    api.set_utxos(vec![bond.clone()]);
    api.set_next_tx(mock_tx("spendtx", &["bond:0"]));
    // the snapshot keeps listing the bond; only cancellation ends the wait

    let saga = MoveBondSaga::new(api.clone()).with_poller(fast_poller());
    let result = saga
        .spend_to_address_with_token(&bond, "bcrt1q_dest", NOW_MS, &AlwaysCancel)
        .await;

    assert!(matches!(result, Err(SagaError::Cancelled)));
}

#[tokio::test]
async fn test_send_failure_restores_siblings() {
    let api = MockWalletApi::new();
    let bond = mock_bond("bond:0", 0, 100_000_000, "2020-01");
    let sibling = mock_utxo("sib:0", 0, 5_000_000, false);
    api.set_utxos(vec![bond.clone(), sibling]);
    api.set_failure_modes(MockFailureModes {
        fail_direct_send: true,
        ..Default::default()
    });

    let saga = MoveBondSaga::new(api.clone()).with_poller(fast_poller());
    let result = saga.spend_to_address(&bond, "bcrt1q_dest", NOW_MS).await;

    assert!(matches!(result, Err(SagaError::Send(_))));
    assert_eq!(api.frozen("sib:0"), Some(false));
}

#[tokio::test]
async fn test_bond_gone_from_wallet_is_an_error() {
    let api = MockWalletApi::new();
    let bond = mock_bond("bond:0", 0, 100_000_000, "2020-01");
    // fresh snapshot no longer contains the bond
    api.set_utxos(vec![mock_utxo("sib:0", 0, 5_000_000, false)]);

    let saga = MoveBondSaga::new(api.clone());
    let result = saga.spend_to_address(&bond, "bcrt1q_dest", NOW_MS).await;

    assert!(matches!(result, Err(SagaError::Validation(_))));
    // nothing was frozen
    assert!(api.freeze_calls().is_empty());
}

#[tokio::test]
async fn test_stale_jar_is_rejected() {
    let api = MockWalletApi::new();
    let bond = mock_bond("bond:0", 0, 100_000_000, "2020-01");
    // the wallet meanwhile reports the bond under a different jar
    api.set_utxos(vec![mock_bond("bond:0", 2, 100_000_000, "2020-01")]);

    let saga = MoveBondSaga::new(api.clone());
    let result = saga.spend_to_address(&bond, "bcrt1q_dest", NOW_MS).await;

    assert!(matches!(result, Err(SagaError::WrongJar)));
    assert!(api.freeze_calls().is_empty());
}
