mod common;

use bridge_coordinator::bridge::BridgeFacade;
use bridge_coordinator::config::SecurityConfigUpdate;
use bridge_coordinator::consensus::SlashOrigin;
use bridge_coordinator::error::{BridgeError, SecurityError};
use bridge_coordinator::ledger::TransactionStatus;

use chrono::{Duration, Utc};
use common::{harness, request, user};
use ethers::types::U256;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn usdc_round_trip_conserves_supply() {
    let h = harness().await;
    let bridge = &h.bridge;

    let lock = assert_ok!(bridge.lock_tokens(request(1, 100)).await);
    h.confirm(lock, 0).await;
    assert_eq!(
        assert_ok!(bridge.process_transaction(lock).await),
        TransactionStatus::Locked
    );
    assert_eq!(bridge.total_supply("USDC").await.unwrap(), U256::from(100));

    let mint = assert_ok!(bridge.mint_tokens(request(2, 40)).await);
    h.confirm(mint, 2).await;
    assert_eq!(
        assert_ok!(bridge.process_transaction(mint).await),
        TransactionStatus::Minted
    );
    assert_eq!(bridge.total_supply("USDC").await.unwrap(), U256::from(140));
    assert!(h.conserved().await);

    let burn = assert_ok!(bridge.burn_tokens(request(2, 40)).await);
    h.confirm(burn, 0).await;
    assert_eq!(
        assert_ok!(bridge.process_transaction(burn).await),
        TransactionStatus::Burned
    );

    let unlock = assert_ok!(bridge.unlock_tokens(request(1, 100)).await);
    h.confirm(unlock, 3).await;
    assert_eq!(
        assert_ok!(bridge.process_transaction(unlock).await),
        TransactionStatus::Unlocked
    );

    let asset = bridge.get_asset("USDC").await.unwrap();
    assert!(asset.locked_amount.is_zero());
    assert!(asset.minted_amount.is_zero());
    assert_eq!(asset.pending_refs, 0);
    assert!(bridge.get_pending_transactions().await.is_empty());

    let stats = bridge.stats().await;
    assert_eq!(
        (stats.locked, stats.minted, stats.burned, stats.unlocked),
        (1, 1, 1, 1)
    );
}

#[tokio::test]
async fn burn_beyond_minted_balance_is_rejected() {
    let h = harness().await;
    let err = assert_err!(h.bridge.burn_tokens(request(1, 50)).await);
    assert!(matches!(err, BridgeError::InsufficientBalance { .. }));
    assert!(h.bridge.get_pending_transactions().await.is_empty());
    assert_eq!(h.chain.submission_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_processing_completes_once() {
    let h = harness().await;
    let lock = h.bridge.lock_tokens(request(1, 500)).await.unwrap();
    h.confirm(lock, 0).await;

    let attempts = (0..8).map(|_| {
        let bridge = h.bridge.clone();
        tokio::spawn(async move { bridge.process_transaction(lock).await })
    });
    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let completed = results
        .iter()
        .filter(|r| matches!(r, Ok(TransactionStatus::Locked)))
        .count();
    assert_eq!(completed, 1);
    assert!(results.iter().all(|r| matches!(
        r,
        Ok(TransactionStatus::Locked)
            | Err(BridgeError::AlreadyProcessing { .. })
            | Err(BridgeError::NotPending { .. })
    )));
    assert_eq!(h.bridge.total_supply("USDC").await.unwrap(), U256::from(500));
}

#[tokio::test]
async fn slashed_validator_signature_stops_counting() {
    let h = harness().await;
    let mint = h.bridge.mint_tokens(request(1, 30)).await.unwrap();
    h.confirm(mint, 2).await;

    let slashed = h.validators[1].address();
    let info = h
        .bridge
        .slash_validator(slashed, SlashOrigin::Governance, None)
        .await
        .unwrap();
    assert!(!info.is_active);

    // one valid signature left against a threshold of two
    assert_eq!(
        h.bridge.process_transaction(mint).await.unwrap(),
        TransactionStatus::Pending
    );

    let third = h.validators[2].sign(mint).await.unwrap();
    h.bridge.submit_attestation(third).await.unwrap();
    assert_eq!(
        h.bridge.process_transaction(mint).await.unwrap(),
        TransactionStatus::Minted
    );
}

#[tokio::test]
async fn emergency_mode_halts_transfers_with_cooldown() {
    let h = harness().await;
    let security = h.bridge.security();
    let now = Utc::now();

    security.set_emergency_at(true, now).await.unwrap();
    let err = h.bridge.lock_tokens(request(1, 20)).await.unwrap_err();
    assert!(matches!(err, BridgeError::Security(SecurityError::EmergencyActive)));
    assert!(err.should_alert());

    let early = security
        .set_emergency_at(false, now + Duration::seconds(10))
        .await
        .unwrap_err();
    assert!(matches!(
        early,
        BridgeError::Security(SecurityError::EmergencyCooldown { .. })
    ));

    security
        .set_emergency_at(false, now + Duration::seconds(301))
        .await
        .unwrap();
    assert_ok!(h.bridge.lock_tokens(request(1, 20)).await);
}

#[tokio::test]
async fn rate_limit_applies_per_sender() {
    let h = harness().await;
    h.bridge
        .security()
        .update_config(SecurityConfigUpdate {
            rate_limit_max_transfers: Some(3),
            ..Default::default()
        })
        .await
        .unwrap();

    for _ in 0..3 {
        assert_ok!(h.bridge.lock_tokens(request(1, 20)).await);
    }
    let err = assert_err!(h.bridge.lock_tokens(request(1, 20)).await);
    assert!(matches!(
        err,
        BridgeError::Security(SecurityError::RateLimited { count: 3, .. })
    ));
    assert_ok!(h.bridge.lock_tokens(request(2, 20)).await);
}

#[tokio::test]
async fn token_policy_bounds_and_daily_cap() {
    let h = harness().await;

    let err = assert_err!(h.bridge.lock_tokens(request(1, 5)).await);
    assert!(matches!(
        err,
        BridgeError::TransferLimit { bound: "minimum transfer", .. }
    ));

    let err = assert_err!(h.bridge.lock_tokens(request(1, 1_000_001)).await);
    assert!(matches!(
        err,
        BridgeError::TransferLimit { bound: "maximum transfer", .. }
    ));

    assert_ok!(h.bridge.lock_tokens(request(1, 1_000_000)).await);
    assert_ok!(h.bridge.lock_tokens(request(2, 1_000_000)).await);
    let err = assert_err!(h.bridge.lock_tokens(request(3, 10)).await);
    assert!(matches!(err, BridgeError::TransferLimit { bound: "daily cap", .. }));
}

#[tokio::test]
async fn blacklisted_recipient_is_rejected() {
    let h = harness().await;
    let req = request(1, 20);
    h.bridge
        .security()
        .add_to_blacklist(req.recipient)
        .await
        .unwrap();

    let err = assert_err!(h.bridge.lock_tokens(req).await);
    assert!(matches!(
        err,
        BridgeError::Security(SecurityError::Blacklisted { address }) if address == user(101)
    ));
}

#[tokio::test]
async fn emergency_withdraw_requires_pause() {
    let h = harness().await;
    let lock = h.bridge.lock_tokens(request(1, 300)).await.unwrap();
    h.confirm(lock, 0).await;
    h.bridge.process_transaction(lock).await.unwrap();

    let err = assert_err!(h.bridge.emergency_withdraw("USDC").await);
    assert!(matches!(err, BridgeError::NotPaused { .. }));

    h.bridge.pause().await.unwrap();
    let withdrawal = assert_ok!(h.bridge.emergency_withdraw("USDC").await);
    h.confirm(withdrawal, 0).await;
    assert_eq!(
        h.bridge.process_transaction(withdrawal).await.unwrap(),
        TransactionStatus::Unlocked
    );
    assert!(h.bridge.total_supply("USDC").await.unwrap().is_zero());
}

#[tokio::test]
async fn sweep_cancels_expired_and_releases_reservations() {
    let h = harness().await;
    let lock = h.bridge.lock_tokens(request(1, 200)).await.unwrap();
    h.confirm(lock, 0).await;
    h.bridge.process_transaction(lock).await.unwrap();

    // inbound protocol overrides the deadline to 600s
    let unlock = h.bridge.unlock_tokens(request(1, 150)).await.unwrap();
    assert_eq!(
        h.bridge.get_asset("USDC").await.unwrap().reserved_locked,
        U256::from(150)
    );

    let swept = h
        .bridge
        .sweep_expired_at(Utc::now() + Duration::seconds(601))
        .await;
    assert_eq!(swept, vec![unlock]);
    assert_eq!(
        h.bridge.get_transaction_status(unlock).await.unwrap(),
        TransactionStatus::Cancelled
    );

    let asset = h.bridge.get_asset("USDC").await.unwrap();
    assert!(asset.reserved_locked.is_zero());
    assert_eq!(asset.locked_amount, U256::from(200));
    assert!(h.conserved().await);

    let err = assert_err!(h.bridge.process_transaction(unlock).await);
    assert!(matches!(err, BridgeError::NotPending { .. }));
}
