//! End-to-end integration tests for sealed-bid launches.
//!
//! These tests exercise the full launch lifecycle:
//! 1. Genesis: launch initialized, pool funded, bidders holding payment tokens
//! 2. Bid sealing and submission with escrow
//! 3. Cypher node settlement
//! 4. Finalization
//! 5. Claims
//!
//! Each flow runs against the in-process ledger and, where it matters,
//! against the JSON-RPC mock ledger.

#![cfg(test)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use launch_client::{prepare_bid, BidStatus};
use launch_crypto::{decrypt, encrypt, parse_bid_plaintext, NodeKeypair};
use launch_program::{LaunchGenesisConfig, LaunchProgramState, ProgramError};
use launch_settler::scoring::{LinearScoringModel, ScoringConfig};
use launch_settler::settlement::Budget;
use launch_settler::{
    open_bid, settle, ClaimError, ClaimResolver, LaunchLedger, LedgerError, LocalLedger,
    OpenedBid, RpcLedger, SettlementService, SettlerConfig, StaticWalletAges,
};
use launch_types::{Address, Bid, ClaimReceipt};
use mock_ledger::{start_server, LedgerState, ServerHandle};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

const AUTHORITY: Address = [1u8; 32];
const MINT: Address = [2u8; 32];
const PAYMENT_MINT: Address = [3u8; 32];

const ALICE: Address = [0xa1; 32];
const BOB: Address = [0xb0; 32];
const CAROL: Address = [0xc0; 32];

fn genesis(total_tokens: u64, max_allocation: u64) -> LaunchGenesisConfig {
    LaunchGenesisConfig::new(AUTHORITY, MINT, PAYMENT_MINT, total_tokens, max_allocation)
        .with_balance(ALICE, PAYMENT_MINT, 10_000)
        .with_balance(BOB, PAYMENT_MINT, 10_000)
        .with_balance(CAROL, PAYMENT_MINT, 100_000)
}

fn settler_config() -> SettlerConfig {
    SettlerConfig {
        authority: AUTHORITY,
        retry_backoff_ms: 1,
        commit_timeout_ms: 2_000,
        poll_interval_secs: 1,
        max_conflict_retries: 64,
        ..Default::default()
    }
}

fn reference_ages() -> StaticWalletAges {
    [(ALICE, 100), (BOB, 5), (CAROL, 365)].into_iter().collect()
}

fn settler(ledger: Arc<dyn LaunchLedger>, node: &NodeKeypair) -> SettlementService {
    SettlementService::new(settler_config(), ledger, node.clone())
        .unwrap()
        .with_wallet_ages(Arc::new(reference_ages()))
}

/// Seal `amount` for the node and submit it with matching escrow.
async fn place_bid(
    ledger: &dyn LaunchLedger,
    node: &NodeKeypair,
    rng: &mut StdRng,
    bidder: Address,
    amount: f64,
) -> Bid {
    let prepared = prepare_bid(node.public_key(), amount, amount as u64, rng).unwrap();
    let submission = ledger
        .submit_bid(&bidder, prepared.encrypted_payload, prepared.escrow_amount)
        .await
        .unwrap();
    assert!(submission.created);
    submission.bid
}

async fn claim(ledger: Arc<dyn LaunchLedger>, bidder: &Address) -> Result<ClaimReceipt, ClaimError> {
    ClaimResolver::new(ledger).claim(bidder).await
}

async fn start_mock_ledger(state: LedgerState) -> (ServerHandle, String) {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let (handle, local_addr) = start_server(addr, state).await.unwrap();
    (handle, format!("http://{}", local_addr))
}

fn snapshot_state(path: &Path) -> LaunchProgramState {
    LedgerState::load_snapshot(path).unwrap()
}

/// Test the complete launch flow against the in-process ledger.
#[tokio::test]
async fn test_full_launch_flow() {
    let mut rng = StdRng::seed_from_u64(100);

    // ========================================
    // Phase 1: Setup
    // ========================================

    let node = NodeKeypair::generate(&mut rng);
    let ledger = LocalLedger::from_genesis(&genesis(1_000_000, 5_000)).unwrap();
    let shared: Arc<dyn LaunchLedger> = Arc::new(ledger.clone());

    // ========================================
    // Phase 2: Sealed bids
    // ========================================

    place_bid(&ledger, &node, &mut rng, ALICE, 4000.0).await;
    place_bid(&ledger, &node, &mut rng, BOB, 100.0).await;
    place_bid(&ledger, &node, &mut rng, CAROL, 50_000.0).await;

    {
        let state = ledger.state();
        let state = state.read();
        assert_eq!(state.token_balance(&ALICE, &PAYMENT_MINT), 6_000);
        assert_eq!(state.token_balance(&BOB, &PAYMENT_MINT), 9_900);
        assert_eq!(state.token_balance(&CAROL, &PAYMENT_MINT), 50_000);
        let launch = state.launch().unwrap();
        assert_eq!(state.account_balance(&launch.payment_vault), 54_100);
    }

    let launch = ledger.fetch_launch().await.unwrap();
    let bid = ledger.fetch_bid(&ALICE).await.unwrap();
    assert_eq!(BidStatus::resolve(&launch, bid.as_ref()), BidStatus::Pending);

    // ========================================
    // Phase 3: Settlement
    // ========================================

    let report = settler(Arc::clone(&shared), &node).run_once().await.unwrap();
    let committed: Vec<(Address, u64)> =
        report.committed.iter().map(|c| (c.bidder, c.amount)).collect();
    assert_eq!(committed, vec![(ALICE, 5_000), (BOB, 82), (CAROL, 5_000)]);
    assert!(report.forfeited.is_empty());
    assert!(report.failed.is_empty());
    assert!(report.finalized);

    let launch = ledger.fetch_launch().await.unwrap();
    assert!(launch.is_finalized);
    assert_eq!(launch.tokens_distributed, 10_082);

    // ========================================
    // Phase 4: Claims
    // ========================================

    for (bidder, amount) in &committed {
        let bid = ledger.fetch_bid(bidder).await.unwrap();
        assert_eq!(
            BidStatus::resolve(&launch, bid.as_ref()),
            BidStatus::Claimable { allocation: *amount }
        );

        let receipt = claim(Arc::clone(&shared), bidder).await.unwrap();
        assert_eq!(receipt.amount, *amount);
        assert!(receipt.destination_created);
    }

    let state = ledger.state();
    let state = state.read();
    assert_eq!(state.token_balance(&ALICE, &MINT), 5_000);
    assert_eq!(state.token_balance(&BOB, &MINT), 82);
    assert_eq!(state.token_balance(&CAROL, &MINT), 5_000);
    assert_eq!(state.account_balance(&launch.pool_account), 1_000_000 - 10_082);
    assert_eq!(
        BidStatus::resolve(&launch, state.get_bid(&BOB)),
        BidStatus::Claimed { allocation: 82 }
    );
}

/// Test the same flow over JSON-RPC with a persisted mock ledger.
#[tokio::test]
async fn test_full_launch_flow_over_rpc() {
    let mut rng = StdRng::seed_from_u64(101);
    let node = NodeKeypair::generate(&mut rng);
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("ledger.snapshot");

    let state = LedgerState::new(genesis(1_000_000, 5_000).build_state().unwrap())
        .with_snapshot(snapshot.clone());
    let (handle, url) = start_mock_ledger(state).await;
    let ledger = RpcLedger::new(&url, AUTHORITY).unwrap();
    let shared: Arc<dyn LaunchLedger> = Arc::new(ledger.clone());

    place_bid(&ledger, &node, &mut rng, ALICE, 4000.0).await;
    place_bid(&ledger, &node, &mut rng, BOB, 100.0).await;
    place_bid(&ledger, &node, &mut rng, CAROL, 50_000.0).await;

    let report = settler(Arc::clone(&shared), &node).run_once().await.unwrap();
    assert_eq!(report.tokens_distributed, 10_082);
    assert!(report.finalized);

    let receipt = claim(Arc::clone(&shared), &BOB).await.unwrap();
    assert_eq!(receipt.amount, 82);
    assert_eq!(ledger.token_balance(&BOB, &MINT).await.unwrap(), 82);
    assert_eq!(ledger.token_balance(&BOB, &PAYMENT_MINT).await.unwrap(), 9_900);

    // Program rejections survive the transport intact
    let err = claim(Arc::clone(&shared), &BOB).await.unwrap_err();
    assert_eq!(err, ClaimError::AlreadyClaimed);

    let err = ledger
        .record_allocation(&ALICE, 1, report.tokens_distributed)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::Program(ProgramError::AllocationConflict {
            recorded: 5_000,
            requested: 1
        })
    );

    handle.stop().unwrap();
    handle.stopped().await;

    let restored = snapshot_state(&snapshot);
    let launch = restored.launch().unwrap();
    assert!(launch.is_finalized);
    assert_eq!(launch.tokens_distributed, 10_082);
    assert_eq!(restored.token_balance(&BOB, &MINT), 82);
}

/// A claim interrupted by a ledger restart is never paid twice.
#[tokio::test]
async fn test_claim_survives_ledger_restart() {
    let mut rng = StdRng::seed_from_u64(102);
    let node = NodeKeypair::generate(&mut rng);
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("ledger.snapshot");

    let state = LedgerState::new(genesis(10_000, 1_000).build_state().unwrap())
        .with_snapshot(snapshot.clone());
    let (handle, url) = start_mock_ledger(state).await;
    let ledger: Arc<dyn LaunchLedger> = Arc::new(RpcLedger::new(&url, AUTHORITY).unwrap());

    place_bid(ledger.as_ref(), &node, &mut rng, ALICE, 500.0).await;
    settler(Arc::clone(&ledger), &node).run_once().await.unwrap();
    let receipt = claim(Arc::clone(&ledger), &ALICE).await.unwrap();

    handle.stop().unwrap();
    handle.stopped().await;

    // Restart from the snapshot and retry the claim
    let state = LedgerState::new(snapshot_state(&snapshot)).with_snapshot(snapshot.clone());
    let (handle, url) = start_mock_ledger(state).await;
    let ledger = RpcLedger::new(&url, AUTHORITY).unwrap();

    let err = claim(Arc::new(ledger.clone()), &ALICE).await.unwrap_err();
    assert_eq!(err, ClaimError::AlreadyClaimed);
    assert_eq!(
        ledger.token_balance(&ALICE, &MINT).await.unwrap(),
        receipt.amount
    );

    handle.stop().unwrap();
}

/// Two settlers racing on one ledger never over-commit the pool.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_racing_settlers_never_overcommit() {
    let mut rng = StdRng::seed_from_u64(103);
    let node = NodeKeypair::generate(&mut rng);
    let mut config = LaunchGenesisConfig::new(AUTHORITY, MINT, PAYMENT_MINT, 3_000, 1_000);
    let bidders: Vec<Address> = (0..10u8).map(|i| [0x40 + i; 32]).collect();
    for bidder in &bidders {
        config = config.with_balance(*bidder, PAYMENT_MINT, 1_000);
    }
    let ledger = LocalLedger::from_genesis(&config).unwrap();

    for (i, bidder) in bidders.iter().enumerate() {
        place_bid(&ledger, &node, &mut rng, *bidder, 100.0 * (i + 1) as f64).await;
    }

    let runs: Vec<_> = (0..2)
        .map(|_| {
            let service = settler(Arc::new(ledger.clone()), &node);
            tokio::spawn(async move { service.run_once().await })
        })
        .collect();
    let mut reports = Vec::new();
    for run in runs {
        reports.push(run.await.unwrap().unwrap());
    }
    let (a, b) = (&reports[0], &reports[1]);

    let launch = ledger.fetch_launch().await.unwrap();
    assert!(launch.is_finalized);
    assert!(launch.tokens_distributed <= launch.total_tokens);
    assert_eq!(
        a.total_committed() + b.total_committed(),
        launch.tokens_distributed
    );

    let bids = ledger.fetch_bids().await.unwrap();
    assert!(bids.iter().all(|bid| bid.is_processed));
    assert!(bids.iter().all(|bid| bid.allocation <= 1_000));
    assert_eq!(
        bids.iter().map(|bid| bid.allocation).sum::<u64>(),
        launch.tokens_distributed
    );

    // Every bid was committed by exactly one settler
    for bidder in &bidders {
        let commits = a
            .committed
            .iter()
            .chain(b.committed.iter())
            .filter(|c| c.bidder == *bidder)
            .count();
        assert_eq!(commits, 1);
    }
}

/// Bids placed while the node is watching settle without a restart.
#[tokio::test]
async fn test_watch_settles_late_bids() {
    let mut rng = StdRng::seed_from_u64(104);
    let node = NodeKeypair::generate(&mut rng);
    let ledger = LocalLedger::from_genesis(&genesis(100_000, 5_000)).unwrap();
    place_bid(&ledger, &node, &mut rng, ALICE, 4000.0).await;

    let service = settler(Arc::new(ledger.clone()), &node);
    let late = ledger.clone();
    let mut late_rng = StdRng::seed_from_u64(105);
    let late_node = node.clone();

    let shutdown = async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        place_bid(&late, &late_node, &mut late_rng, BOB, 100.0).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    };

    let report = service.watch(shutdown).await.unwrap();
    assert!(report.finalized);

    let launch = ledger.fetch_launch().await.unwrap();
    assert_eq!(launch.tokens_distributed, 5_082);
    assert_eq!(ledger.fetch_bid(&BOB).await.unwrap().unwrap().allocation, 82);
}

#[tokio::test]
async fn test_duplicate_bid_escrows_once() {
    let mut rng = StdRng::seed_from_u64(106);
    let node = NodeKeypair::generate(&mut rng);
    let ledger = LocalLedger::from_genesis(&genesis(100_000, 5_000)).unwrap();

    let first = place_bid(&ledger, &node, &mut rng, ALICE, 4000.0).await;
    let retry = prepare_bid(node.public_key(), 9000.0, 9000, &mut rng).unwrap();
    let again = ledger
        .submit_bid(&ALICE, retry.encrypted_payload, retry.escrow_amount)
        .await
        .unwrap();

    assert!(!again.created);
    assert_eq!(again.bid, first);
    let state = ledger.state();
    assert_eq!(state.read().token_balance(&ALICE, &PAYMENT_MINT), 6_000);
}

/// A bid sealed to the wrong key settles at zero and the next bid still
/// gets its full allocation.
#[tokio::test]
async fn test_foreign_key_bid_forfeits() {
    let mut rng = StdRng::seed_from_u64(107);
    let node = NodeKeypair::generate(&mut rng);
    let imposter = NodeKeypair::generate(&mut rng);
    let ledger = LocalLedger::from_genesis(&genesis(100_000, 5_000)).unwrap();

    place_bid(&ledger, &imposter, &mut rng, ALICE, 4000.0).await;
    place_bid(&ledger, &node, &mut rng, CAROL, 50_000.0).await;

    let shared: Arc<dyn LaunchLedger> = Arc::new(ledger.clone());
    let report = settler(Arc::clone(&shared), &node).run_once().await.unwrap();
    assert_eq!(report.forfeited.len(), 1);
    assert_eq!(report.forfeited[0].bidder, ALICE);
    assert_eq!(report.tokens_distributed, 5_000);

    let err = claim(Arc::clone(&shared), &ALICE).await.unwrap_err();
    assert_eq!(err, ClaimError::NothingToClaim);
    assert_eq!(claim(shared, &CAROL).await.unwrap().amount, 5_000);
}

#[tokio::test]
async fn test_claim_before_finalization_rejected() {
    let mut rng = StdRng::seed_from_u64(108);
    let node = NodeKeypair::generate(&mut rng);
    let ledger = LocalLedger::from_genesis(&genesis(100_000, 5_000)).unwrap();
    place_bid(&ledger, &node, &mut rng, ALICE, 4000.0).await;

    let service = settler(Arc::new(ledger.clone()), &node);
    service.settle_pending().await.unwrap();

    let launch = ledger.fetch_launch().await.unwrap();
    let bid = ledger.fetch_bid(&ALICE).await.unwrap();
    assert_eq!(
        BidStatus::resolve(&launch, bid.as_ref()),
        BidStatus::Allocated { allocation: 5_000 }
    );

    let err = claim(Arc::new(ledger.clone()), &ALICE).await.unwrap_err();
    assert_eq!(err, ClaimError::NotFinalized);
    let err = claim(Arc::new(ledger.clone()), &BOB).await.unwrap_err();
    assert!(matches!(err, ClaimError::NotFinalized | ClaimError::NoBid(_)));
}

#[test]
fn test_sealed_payload_opens_only_for_node() {
    let mut rng = StdRng::seed_from_u64(109);
    let node = NodeKeypair::generate(&mut rng);
    let other = NodeKeypair::generate(&mut rng);
    let prepared = prepare_bid(node.public_key(), 1234.5, 0, &mut rng).unwrap();

    let plaintext = decrypt(&prepared.encrypted_payload, node.secret_key()).unwrap();
    assert_eq!(parse_bid_plaintext(&plaintext).unwrap(), 1234.5);
    assert!(decrypt(&prepared.encrypted_payload, other.secret_key()).is_err());

    let bid = Bid::new(ALICE, prepared.encrypted_payload, 0, 0);
    assert_eq!(open_bid(&bid, node.secret_key()).amount, Ok(1234.5));
    assert!(open_bid(&bid, other.secret_key()).is_forfeited());
}

fn opened_batch(amounts: &[f64], node: &NodeKeypair, rng: &mut StdRng) -> Vec<OpenedBid> {
    amounts
        .iter()
        .enumerate()
        .map(|(i, amount)| {
            let payload = prepare_bid(node.public_key(), *amount, 0, rng)
                .unwrap()
                .encrypted_payload;
            let bid = Bid::new([i as u8; 32], payload, 0, i as u64);
            open_bid(&bid, node.secret_key())
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_channel_roundtrip(message in proptest::collection::vec(any::<u8>(), 0..160), seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let node = NodeKeypair::generate(&mut rng);
        let payload = encrypt(&message, node.public_key(), &mut rng).unwrap();
        prop_assert_eq!(payload.len(), message.len() + 72);
        prop_assert_eq!(decrypt(&payload, node.secret_key()).unwrap(), message);
    }

    #[test]
    fn prop_settlement_respects_pool_and_cap(
        amounts in proptest::collection::vec(0.0f64..20_000.0, 1..12),
        ages in proptest::collection::vec(0u64..1_000, 12),
        total_tokens in 0u64..50_000,
        already in 0u64..50_000,
        max_allocation in 0u64..10_000,
        seed in any::<u64>(),
    ) {
        let tokens_distributed = already.min(total_tokens);
        let mut rng = StdRng::seed_from_u64(seed);
        let node = NodeKeypair::generate(&mut rng);
        let opened = opened_batch(&amounts, &node, &mut rng);

        let wallet_ages: StaticWalletAges = ages
            .iter()
            .enumerate()
            .map(|(i, days)| ([i as u8; 32], *days))
            .collect();
        let model = LinearScoringModel::new(ScoringConfig::default()).unwrap();
        let budget = Budget {
            total_tokens,
            tokens_distributed,
            max_allocation_per_user: max_allocation,
        };

        let allocations = settle(&opened, budget, &model, &wallet_ages);
        prop_assert_eq!(allocations.len(), amounts.len());

        let total: u64 = allocations.iter().map(|a| a.committed).sum();
        prop_assert!(total <= total_tokens - tokens_distributed);
        for allocation in &allocations {
            prop_assert!(allocation.committed <= max_allocation);
        }
    }
}
