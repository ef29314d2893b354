//! Token purchase workflow tests

#[path = "integration/presale_fixtures.rs"]
mod presale_fixtures;

use std::sync::Arc;

use alloy_sol_types::SolCall;
use presale_fixtures::*;
use sra_presale::presale::contract::IPresale;
use sra_presale::wallet::{TxFailure, WalletError};
use sra_presale::{CostEstimate, Error, PresaleConfig, SubmissionState, ValidationError};

#[tokio::test]
async fn test_successful_purchase_clears_amount() {
    let wallet = MockWallet::new();
    let client = client_with(&wallet);
    client.connect().await.unwrap();
    let mut notifications = client.notifier().subscribe();

    let receipt = client.purchase().submit("1").await.unwrap();

    assert!(receipt.success);
    assert_eq!(client.purchase().state(), SubmissionState::Confirmed(receipt.hash));
    assert!(client.purchase().intent().is_none());

    let sent = wallet.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, MOCK_ACCOUNT);
    assert_eq!(sent[0].value, bnb("1"));
    assert_eq!(&sent[0].data[..4], &IPresale::buyTokensCall::SELECTOR[..]);

    let messages = drain(&mut notifications);
    assert!(messages.contains(&"Transaction in progress...".to_string()));
    assert!(messages.contains(&"Transaction successful!".to_string()));
    assert!(client.reader().sale().is_some());
}

#[tokio::test]
async fn test_amount_above_maximum_never_reaches_wallet() {
    let wallet = MockWallet::new();
    let client = client_with(&wallet);
    client.connect().await.unwrap();
    let mut notifications = client.notifier().subscribe();

    let result = client.purchase().submit("10").await;

    assert!(matches!(
        result,
        Err(Error::Validation(ValidationError::AboveMaximum { ref max })) if max == "5"
    ));
    assert!(wallet.sent().is_empty());
    assert_eq!(client.purchase().state(), SubmissionState::Idle);

    let intent = client.purchase().intent().unwrap();
    assert_eq!(intent.bnb_amount, "10");
    assert!(!intent.validated);
    assert_eq!(drain(&mut notifications), vec!["Maximum contribution is 5 BNB".to_string()]);
}

#[tokio::test]
async fn test_minimum_is_inclusive() {
    let wallet = MockWallet::new();
    let client = client_with(&wallet);
    client.connect().await.unwrap();

    assert_eq!(client.purchase().validate("0.1").await.unwrap(), bnb("0.1"));
    assert!(matches!(
        client.purchase().validate("0.09").await,
        Err(Error::Validation(ValidationError::BelowMinimum { .. }))
    ));
}

#[tokio::test]
async fn test_emergency_mode_blocks_purchase() {
    let wallet = MockWallet::new();
    wallet.set_sale(MockSale::emergency());
    let client = client_with(&wallet);
    client.connect().await.unwrap();

    let result = client.purchase().submit("1").await;

    assert!(matches!(
        result,
        Err(Error::Validation(ValidationError::EmergencyPaused))
    ));
    assert!(wallet.sent().is_empty());
}

#[tokio::test]
async fn test_inactive_sale_blocks_purchase() {
    let wallet = MockWallet::new();
    wallet.set_sale(MockSale::inactive());
    let client = client_with(&wallet);
    client.connect().await.unwrap();
    client.refresh().await.unwrap();

    let result = client.purchase().submit("1").await;

    assert!(matches!(
        result,
        Err(Error::Validation(ValidationError::SaleInactive))
    ));
    assert!(wallet.sent().is_empty());
}

#[tokio::test]
async fn test_inactive_sale_blocks_purchase_before_any_refresh() {
    let wallet = MockWallet::new();
    wallet.set_sale(MockSale::inactive());
    let client = client_with(&wallet);
    client.connect().await.unwrap();
    assert!(client.reader().sale().is_none());

    let result = client.purchase().submit("1").await;

    assert!(matches!(
        result,
        Err(Error::Validation(ValidationError::SaleInactive))
    ));
    assert!(wallet.sent().is_empty());
    assert_eq!(client.purchase().state(), SubmissionState::Idle);
}

#[tokio::test]
async fn test_unknown_sale_state_blocks_purchase() {
    let wallet = MockWallet::new();
    let client = client_with(&wallet);
    client.connect().await.unwrap();
    wallet.fail_calls(Some(WalletError::network("connection refused")));

    let result = client.purchase().submit("1").await;

    assert!(matches!(
        result,
        Err(Error::Validation(ValidationError::SaleInactive))
    ));
    assert!(wallet.sent().is_empty());
}

#[tokio::test]
async fn test_unreadable_limits_fall_back_to_configured_defaults() {
    let wallet = MockWallet::new();
    let mut config = PresaleConfig::default();
    config.limits.default_min = "0.2".to_string();
    let client = client_with_config(&wallet, config);
    client.connect().await.unwrap();

    assert!(client.purchase().validate("0.15").await.is_ok());

    wallet.fail_calls(Some(WalletError::network("connection refused")));
    let result = client.purchase().validate("0.15").await;

    assert!(matches!(
        result,
        Err(Error::Validation(ValidationError::BelowMinimum { ref min })) if min == "0.2"
    ));
}

#[tokio::test]
async fn test_submit_requires_connection() {
    let wallet = MockWallet::new();
    let client = client_with(&wallet);

    let result = client.purchase().submit("1").await;

    assert!(matches!(result, Err(Error::NotConnected)));
    assert_eq!(client.purchase().state(), SubmissionState::Idle);
}

#[tokio::test]
async fn test_second_submission_is_refused_while_pending() {
    let wallet = MockWallet::new();
    wallet.set_vesting(MockVesting::claimable("5"));
    let gate = wallet.hold_receipts();
    let client = Arc::new(client_with(&wallet));
    client.connect().await.unwrap();

    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.purchase().submit("1").await })
    };
    let mut state = client.purchase().subscribe_state();
    wait_until(&mut state, |s| matches!(s, SubmissionState::PendingConfirmation(_))).await;
    assert!(client.purchase().state().is_busy());

    assert!(matches!(client.purchase().submit("2").await, Err(Error::Busy)));
    assert!(matches!(client.claim().claim().await, Err(Error::Busy)));
    assert_eq!(client.purchase().intent().unwrap().bnb_amount, "1");

    gate.notify_one();
    first.await.unwrap().unwrap();

    assert_eq!(wallet.sent().len(), 1);
    assert!(!client.purchase().state().is_busy());
}

#[tokio::test]
async fn test_rejected_signature_keeps_amount() {
    let wallet = MockWallet::new();
    wallet.fail_send(WalletError::user_rejected());
    let client = client_with(&wallet);
    client.connect().await.unwrap();
    let mut notifications = client.notifier().subscribe();

    let result = client.purchase().submit("1").await;

    assert!(matches!(
        result,
        Err(Error::Transaction(TxFailure::UserRejected))
    ));
    assert_eq!(
        client.purchase().state(),
        SubmissionState::Rejected(TxFailure::UserRejected)
    );
    let intent = client.purchase().intent().unwrap();
    assert_eq!(intent.bnb_amount, "1");
    assert!(intent.validated);
    assert_eq!(
        drain(&mut notifications),
        vec!["Transaction rejected by user".to_string()]
    );
}

#[tokio::test]
async fn test_insufficient_funds_is_classified() {
    let wallet = MockWallet::new();
    wallet.fail_send(WalletError::new("insufficient funds for gas * price + value"));
    let client = client_with(&wallet);
    client.connect().await.unwrap();

    let result = client.purchase().submit("1").await;

    assert!(matches!(
        result,
        Err(Error::Transaction(TxFailure::InsufficientFunds))
    ));
}

#[tokio::test]
async fn test_reverted_purchase() {
    let wallet = MockWallet::new();
    wallet.revert_receipts();
    let client = client_with(&wallet);
    client.connect().await.unwrap();

    let result = client.purchase().submit("1").await;

    assert!(matches!(
        result,
        Err(Error::Transaction(TxFailure::ContractRevert(ref m))) if m == "Transaction failed"
    ));
    assert!(matches!(client.purchase().state(), SubmissionState::Reverted(_)));
    assert!(client.purchase().intent().is_some());
}

#[tokio::test]
async fn test_token_estimate_uses_last_rate() {
    let wallet = MockWallet::new();
    let client = client_with(&wallet);
    assert!(client.purchase().estimate_tokens("0.5").is_none());

    client.reader().refresh_sale().await.unwrap();

    assert_eq!(client.purchase().estimate_tokens("0.5"), Some(bnb("5000")));
    assert!(client.purchase().estimate_tokens("abc").is_none());
}

#[tokio::test]
async fn test_cost_estimate() {
    let wallet = MockWallet::new();
    let client = client_with(&wallet);

    assert_eq!(client.purchase().estimate_cost("1").await, CostEstimate::Unavailable);

    client.connect().await.unwrap();
    let estimate = client.purchase().estimate_cost("1").await;
    assert_eq!(
        estimate,
        CostEstimate::Affordable {
            gas_cost: bnb("0.0005"),
            total: bnb("1.0005"),
            display: "Gas: ~0.0005 BNB".to_string(),
        }
    );

    wallet.set_balance(bnb("1.0004"));
    let estimate = client.purchase().estimate_cost("1").await;
    assert_eq!(estimate.to_string(), "Need 1.0005 BNB (have 1.0004 BNB)");

    wallet.set_balance(bnb("0.5"));
    let estimate = client.purchase().estimate_cost("1").await;
    assert_eq!(estimate, CostEstimate::InsufficientBalance { balance: bnb("0.5") });
    assert_eq!(estimate.to_string(), "Insufficient balance (0.5 BNB)");
}

#[tokio::test]
async fn test_cost_estimate_in_usd() {
    let wallet = MockWallet::new();
    let mut config = PresaleConfig::default();
    config.display.native_usd_price = Some(600.0);
    let client = client_with_config(&wallet, config);
    client.connect().await.unwrap();

    let estimate = client.purchase().estimate_cost("1").await;

    assert_eq!(estimate.to_string(), "Gas: ~$0.30");
}
