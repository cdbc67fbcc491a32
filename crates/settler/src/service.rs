//! Settlement service implementation.
//!
//! A run has two stages. The first is pure: fetch the unprocessed bids,
//! open them and score them. The second commits each proposal to the ledger
//! in arrival order as a compare-and-commit against `tokens_distributed`,
//! serialized by an in-process lock. The running total is never trusted
//! locally: a stale-budget rejection re-reads the launch and recomputes the
//! commit from the ledger's value.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use launch_crypto::NodeKeypair;
use launch_program::ProgramError;
use launch_types::{short_address, Address, FinalizeOutcome, Launch, RecordOutcome};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::SettlerConfig;
use crate::decrypt::{open_bids, ForfeitReason};
use crate::error::SettlementError;
use crate::ledger::{LaunchLedger, LedgerError};
use crate::scoring::{LinearScoringModel, ScoringModel, WalletAgeSource};
use crate::settlement::{propose_all, Budget, Proposal};

/// An allocation this run wrote to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedAllocation {
    pub bidder: Address,
    pub amount: u64,
}

/// A bid that could not be opened and settled at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ForfeitedBid {
    pub bidder: Address,
    pub reason: ForfeitReason,
}

/// A bid whose commit failed and was left unprocessed.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedCommit {
    pub bidder: Address,
    pub error: LedgerError,
}

/// Outcome of a settlement run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementReport {
    /// Allocations written by this run, zero allocations included
    pub committed: Vec<CommittedAllocation>,
    /// Bids settled at zero because they could not be opened
    pub forfeited: Vec<ForfeitedBid>,
    /// Bids left unprocessed after their commit failed
    pub failed: Vec<FailedCommit>,
    /// Bids already processed, by an earlier run or another writer
    pub skipped: BTreeSet<Address>,
    /// Ledger `tokens_distributed` as last observed
    pub tokens_distributed: u64,
    /// Whether the launch is finalized as of the end of the run
    pub finalized: bool,
}

impl SettlementReport {
    /// Sum of allocations written by this run.
    pub fn total_committed(&self) -> u64 {
        self.committed.iter().map(|c| c.amount).sum()
    }

    /// Fold a later run into this report.
    ///
    /// A later run sees this report's own commits as processed; those are
    /// not counted as skipped.
    pub fn merge(&mut self, later: SettlementReport) {
        self.committed.extend(later.committed);
        self.forfeited.extend(later.forfeited);
        self.failed.extend(later.failed);
        for bidder in later.skipped {
            if !self.committed.iter().any(|c| c.bidder == bidder) {
                self.skipped.insert(bidder);
            }
        }
        self.tokens_distributed = later.tokens_distributed;
        self.finalized = later.finalized;
    }
}

/// The settlement service.
pub struct SettlementService {
    config: SettlerConfig,
    ledger: Arc<dyn LaunchLedger>,
    keypair: NodeKeypair,
    model: Arc<dyn ScoringModel>,
    wallet_ages: Arc<dyn WalletAgeSource>,
    commit_lock: Mutex<()>,
}

impl SettlementService {
    /// Create a service using the linear model and static wallet ages from
    /// `config`.
    pub fn new(
        config: SettlerConfig,
        ledger: Arc<dyn LaunchLedger>,
        keypair: NodeKeypair,
    ) -> Result<Self, SettlementError> {
        let model = LinearScoringModel::new(config.scoring.clone())?;
        let wallet_ages = config.wallet_age_source()?;
        Ok(Self {
            config,
            ledger,
            keypair,
            model: Arc::new(model),
            wallet_ages: Arc::new(wallet_ages),
            commit_lock: Mutex::new(()),
        })
    }

    /// Replace the scoring model.
    pub fn with_model(mut self, model: Arc<dyn ScoringModel>) -> Self {
        self.model = model;
        self
    }

    /// Replace the wallet age source.
    pub fn with_wallet_ages(mut self, wallet_ages: Arc<dyn WalletAgeSource>) -> Self {
        self.wallet_ages = wallet_ages;
        self
    }

    pub fn config(&self) -> &SettlerConfig {
        &self.config
    }

    /// Settle every unprocessed bid, then finalize the launch.
    ///
    /// A no-op on a launch that is already finalized. Fails if the launch
    /// could not be finalized; the commits made before that stay on the
    /// ledger and a rerun skips them.
    pub async fn run_once(&self) -> Result<SettlementReport, SettlementError> {
        let mut report = self.settle_pending().await?;
        if report.finalized {
            return Ok(report);
        }

        match self.call("finalize_launch", || self.ledger.finalize_launch()).await {
            Ok(outcome) => {
                if outcome == FinalizeOutcome::AlreadyFinalized {
                    debug!("Launch was already finalized");
                }
                report.finalized = true;
                info!(
                    tokens_distributed = report.tokens_distributed,
                    failed = report.failed.len(),
                    "Launch finalized"
                );
            }
            Err(e) => {
                error!(
                    error = %e,
                    committed = report.committed.len(),
                    "Failed to finalize launch"
                );
                return Err(e.into());
            }
        }

        Ok(report)
    }

    /// Settle every unprocessed bid without finalizing.
    pub async fn settle_pending(&self) -> Result<SettlementReport, SettlementError> {
        let launch = self.fetch_launch().await?;
        if launch.is_finalized {
            debug!("Launch already finalized, nothing to settle");
            return Ok(SettlementReport {
                tokens_distributed: launch.tokens_distributed,
                finalized: true,
                ..Default::default()
            });
        }

        let bids = self.call("fetch_bids", || self.ledger.fetch_bids()).await?;
        let mut report = SettlementReport {
            tokens_distributed: launch.tokens_distributed,
            ..Default::default()
        };

        let (processed, pending): (Vec<_>, Vec<_>) = bids.iter().partition(|b| b.is_processed);
        report.skipped.extend(processed.iter().map(|b| b.bidder));

        if pending.is_empty() {
            debug!(skipped = report.skipped.len(), "No unprocessed bids");
            return Ok(report);
        }

        info!(pending = pending.len(), "Settling bids");

        let opened = open_bids(pending, self.keypair.secret_key());
        let proposals = propose_all(
            &opened,
            self.model.as_ref(),
            self.wallet_ages.as_ref(),
            launch.max_allocation_per_user,
        );

        for proposal in &proposals {
            if let Some(reason) = &proposal.forfeit {
                report.forfeited.push(ForfeitedBid {
                    bidder: proposal.bidder,
                    reason: reason.clone(),
                });
            }
        }

        self.commit_all(&launch, &proposals, &mut report).await?;

        info!(
            committed = report.committed.len(),
            total_committed = report.total_committed(),
            forfeited = report.forfeited.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            tokens_distributed = report.tokens_distributed,
            "Settlement pass complete"
        );
        Ok(report)
    }

    /// Poll for new bids and settle them as they arrive.
    ///
    /// Returns once the launch is finalized by someone else, or when
    /// `shutdown` resolves, in which case a final run settles what is left
    /// and finalizes.
    pub async fn watch<S>(&self, shutdown: S) -> Result<SettlementReport, SettlementError>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut total = SettlementReport::default();
        let mut interval = tokio::time::interval(self.config.poll_interval());

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, finalizing launch");
                    total.merge(self.run_once().await?);
                    return Ok(total);
                }
                _ = interval.tick() => {
                    match self.settle_pending().await {
                        Ok(report) => {
                            let finalized = report.finalized;
                            total.merge(report);
                            if finalized {
                                info!("Launch is finalized, stopping watch");
                                return Ok(total);
                            }
                        }
                        Err(SettlementError::Ledger(e))
                            if e.is_retryable()
                                || e.program_error() == Some(&ProgramError::LaunchNotInitialized) =>
                        {
                            warn!(error = %e, "Ledger not ready, will poll again");
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    async fn commit_all(
        &self,
        launch: &Launch,
        proposals: &[Proposal],
        report: &mut SettlementReport,
    ) -> Result<(), SettlementError> {
        let _guard = self.commit_lock.lock().await;

        let mut budget = Budget::from_launch(launch);
        let mut conflicts = 0u32;

        for proposal in proposals {
            loop {
                let amount = proposal.commit_amount(budget.remaining());
                let expected = budget.tokens_distributed;
                let (result, retries) = self
                    .call_with_retries("record_allocation", || {
                        self.ledger
                            .record_allocation(&proposal.bidder, amount, expected)
                    })
                    .await;

                match result {
                    Ok(RecordOutcome::Recorded { tokens_distributed }) => {
                        debug!(
                            bidder = %short_address(&proposal.bidder),
                            sequence = proposal.sequence,
                            raw = proposal.raw,
                            amount,
                            tokens_distributed,
                            "Allocation committed"
                        );
                        budget.tokens_distributed = tokens_distributed;
                        report.committed.push(CommittedAllocation {
                            bidder: proposal.bidder,
                            amount,
                        });
                        break;
                    }
                    Ok(RecordOutcome::AlreadyRecorded { allocation })
                        if retries > 0 && allocation == amount =>
                    {
                        // An earlier attempt landed but its response was lost
                        debug!(
                            bidder = %short_address(&proposal.bidder),
                            amount,
                            retries,
                            "Allocation committed by an earlier attempt"
                        );
                        report.committed.push(CommittedAllocation {
                            bidder: proposal.bidder,
                            amount,
                        });
                        budget = Budget::from_launch(&self.fetch_launch().await?);
                        break;
                    }
                    Ok(RecordOutcome::AlreadyRecorded { allocation }) => {
                        debug!(
                            bidder = %short_address(&proposal.bidder),
                            allocation,
                            "Allocation already recorded"
                        );
                        report.skipped.insert(proposal.bidder);
                        budget = Budget::from_launch(&self.fetch_launch().await?);
                        break;
                    }
                    Err(LedgerError::Program(ProgramError::AllocationConflict {
                        recorded,
                        requested,
                    })) => {
                        warn!(
                            bidder = %short_address(&proposal.bidder),
                            recorded,
                            requested,
                            "Bid processed by another writer"
                        );
                        report.skipped.insert(proposal.bidder);
                        budget = Budget::from_launch(&self.fetch_launch().await?);
                        break;
                    }
                    Err(LedgerError::Program(ProgramError::StaleBudget { expected, actual })) => {
                        conflicts += 1;
                        if conflicts > self.config.max_conflict_retries {
                            error!(conflicts, "Too many stale-budget conflicts, halting commits");
                            return Err(SettlementError::BudgetConflict { conflicts });
                        }
                        warn!(
                            bidder = %short_address(&proposal.bidder),
                            expected,
                            actual,
                            conflicts,
                            "Stale budget, re-reading launch"
                        );
                        budget = Budget::from_launch(&self.fetch_launch().await?);
                    }
                    Err(e) => {
                        warn!(
                            bidder = %short_address(&proposal.bidder),
                            error = %e,
                            "Commit failed, leaving bid unprocessed"
                        );
                        report.failed.push(FailedCommit {
                            bidder: proposal.bidder,
                            error: e,
                        });
                        break;
                    }
                }
            }
        }

        report.tokens_distributed = budget.tokens_distributed;
        Ok(())
    }

    async fn fetch_launch(&self) -> Result<Launch, LedgerError> {
        self.call("fetch_launch", || self.ledger.fetch_launch()).await
    }

    async fn call<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        self.call_with_retries(op, f).await.0
    }

    /// Run a ledger call under the configured timeout, retrying transport
    /// failures with linear backoff. Also returns how many retries it took.
    async fn call_with_retries<T, F, Fut>(
        &self,
        op: &'static str,
        mut f: F,
    ) -> (Result<T, LedgerError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let timeout = self.config.commit_timeout();
        let mut attempt = 0u32;

        loop {
            let result = match tokio::time::timeout(timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(LedgerError::Timeout(timeout)),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.config.max_commit_retries => {
                    attempt += 1;
                    let delay = self.config.backoff_for_attempt(attempt);
                    warn!(op, attempt, error = %e, ?delay, "Ledger call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return (other, attempt),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LocalLedger;
    use crate::scoring::StaticWalletAges;
    use async_trait::async_trait;
    use launch_crypto::{encrypt, seal_bid_amount};
    use launch_program::LaunchGenesisConfig;
    use launch_types::{Bid, BidSubmission, ClaimReceipt};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicU32, Ordering};

    const AUTHORITY: Address = [1u8; 32];
    const MINT: Address = [2u8; 32];
    const PAYMENT_MINT: Address = [3u8; 32];

    fn test_config() -> SettlerConfig {
        SettlerConfig {
            authority: AUTHORITY,
            retry_backoff_ms: 1,
            commit_timeout_ms: 1_000,
            poll_interval_secs: 1,
            ..Default::default()
        }
    }

    fn local_ledger(total_tokens: u64, max_allocation: u64) -> LocalLedger {
        LocalLedger::from_genesis(&LaunchGenesisConfig::new(
            AUTHORITY,
            MINT,
            PAYMENT_MINT,
            total_tokens,
            max_allocation,
        ))
        .unwrap()
    }

    async fn submit_amount(
        ledger: &LocalLedger,
        node: &NodeKeypair,
        rng: &mut StdRng,
        bidder: Address,
        amount: f64,
    ) {
        let payload = seal_bid_amount(amount, node.public_key(), rng).unwrap();
        ledger.submit_bid(&bidder, payload, 0).await.unwrap();
    }

    fn service(ledger: Arc<dyn LaunchLedger>, node: &NodeKeypair) -> SettlementService {
        SettlementService::new(test_config(), ledger, node.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_reference_scenario_end_to_end() {
        let mut rng = StdRng::seed_from_u64(1);
        let node = NodeKeypair::generate(&mut rng);
        let ledger = local_ledger(1_000_000, 5_000);
        let (a, b, c) = ([0xa; 32], [0xb; 32], [0xc; 32]);

        submit_amount(&ledger, &node, &mut rng, a, 4000.0).await;
        submit_amount(&ledger, &node, &mut rng, b, 100.0).await;
        submit_amount(&ledger, &node, &mut rng, c, 50_000.0).await;

        let ages: StaticWalletAges = [(a, 100), (b, 5), (c, 365)].into_iter().collect();
        let service = service(Arc::new(ledger.clone()), &node).with_wallet_ages(Arc::new(ages));

        let report = service.run_once().await.unwrap();
        let amounts: Vec<u64> = report.committed.iter().map(|c| c.amount).collect();
        assert_eq!(amounts, vec![5_000, 82, 5_000]);
        assert_eq!(report.tokens_distributed, 10_082);
        assert!(report.finalized);

        let launch = ledger.fetch_launch().await.unwrap();
        assert!(launch.is_finalized);
        assert_eq!(launch.tokens_distributed, 10_082);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_partial_fill() {
        let mut rng = StdRng::seed_from_u64(2);
        let node = NodeKeypair::generate(&mut rng);
        let ledger = local_ledger(10, 50);
        let bidder = [4u8; 32];
        submit_amount(&ledger, &node, &mut rng, bidder, 1000.0).await;

        let report = service(Arc::new(ledger.clone()), &node).run_once().await.unwrap();
        assert_eq!(report.committed[0].amount, 10);

        let bid = ledger.fetch_bid(&bidder).await.unwrap().unwrap();
        assert_eq!(bid.allocation, 10);
        assert_eq!(ledger.fetch_launch().await.unwrap().tokens_distributed, 10);
    }

    #[tokio::test]
    async fn test_unparseable_payload_forfeits() {
        let mut rng = StdRng::seed_from_u64(3);
        let node = NodeKeypair::generate(&mut rng);
        let ledger = local_ledger(1_000, 500);
        let bidder = [5u8; 32];
        let payload = encrypt(b"ENCRYPTED:lots", node.public_key(), &mut rng).unwrap();
        ledger.submit_bid(&bidder, payload, 0).await.unwrap();

        let report = service(Arc::new(ledger.clone()), &node).run_once().await.unwrap();
        assert_eq!(report.forfeited.len(), 1);
        assert_eq!(
            report.committed,
            vec![CommittedAllocation { bidder, amount: 0 }]
        );

        let bid = ledger.fetch_bid(&bidder).await.unwrap().unwrap();
        assert!(bid.is_processed);
        assert_eq!(bid.allocation, 0);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(4);
        let node = NodeKeypair::generate(&mut rng);
        let ledger = local_ledger(1_000, 500);
        submit_amount(&ledger, &node, &mut rng, [6u8; 32], 300.0).await;
        let service = service(Arc::new(ledger.clone()), &node);

        let pending = service.settle_pending().await.unwrap();
        assert_eq!(pending.committed.len(), 1);
        let distributed = ledger.fetch_launch().await.unwrap().tokens_distributed;

        let again = service.settle_pending().await.unwrap();
        assert!(again.committed.is_empty());
        assert_eq!(again.skipped, BTreeSet::from([[6u8; 32]]));
        assert_eq!(again.tokens_distributed, distributed);

        service.run_once().await.unwrap();
        let after_finalize = service.run_once().await.unwrap();
        assert!(after_finalize.finalized);
        assert!(after_finalize.committed.is_empty());
        assert_eq!(
            ledger.fetch_launch().await.unwrap().tokens_distributed,
            distributed
        );
    }

    #[derive(Clone, Copy)]
    enum Fault {
        /// Record calls fail before reaching the ledger
        DropRequest,
        /// Record calls apply, then the response is lost
        DropResponse,
        /// Record calls always lose the compare-and-commit
        StaleBudget,
        /// The authority may record but not finalize
        RejectFinalize,
    }

    /// Wraps a local ledger, injecting `fault` into the first `count` calls
    /// it applies to.
    struct FaultyLedger {
        inner: LocalLedger,
        fault: Fault,
        count: AtomicU32,
    }

    impl FaultyLedger {
        fn new(inner: &LocalLedger, fault: Fault, count: u32) -> Self {
            Self {
                inner: inner.clone(),
                fault,
                count: AtomicU32::new(count),
            }
        }

        fn trip(&self) -> bool {
            self.count
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl LaunchLedger for FaultyLedger {
        async fn fetch_launch(&self) -> Result<Launch, LedgerError> {
            self.inner.fetch_launch().await
        }

        async fn fetch_bids(&self) -> Result<Vec<Bid>, LedgerError> {
            self.inner.fetch_bids().await
        }

        async fn fetch_bid(&self, bidder: &Address) -> Result<Option<Bid>, LedgerError> {
            self.inner.fetch_bid(bidder).await
        }

        async fn record_allocation(
            &self,
            bidder: &Address,
            amount: u64,
            expected_tokens_distributed: u64,
        ) -> Result<RecordOutcome, LedgerError> {
            match self.fault {
                Fault::DropRequest if self.trip() => {
                    Err(LedgerError::Transport("connection reset".into()))
                }
                Fault::DropResponse if self.trip() => {
                    self.inner
                        .record_allocation(bidder, amount, expected_tokens_distributed)
                        .await?;
                    Err(LedgerError::Transport("connection reset".into()))
                }
                Fault::StaleBudget if self.trip() => {
                    Err(LedgerError::Program(ProgramError::StaleBudget {
                        expected: expected_tokens_distributed,
                        actual: expected_tokens_distributed + 1,
                    }))
                }
                _ => {
                    self.inner
                        .record_allocation(bidder, amount, expected_tokens_distributed)
                        .await
                }
            }
        }

        async fn finalize_launch(&self) -> Result<FinalizeOutcome, LedgerError> {
            if matches!(self.fault, Fault::RejectFinalize) && self.trip() {
                return Err(LedgerError::Program(ProgramError::NotAuthorized));
            }
            self.inner.finalize_launch().await
        }

        async fn claim_tokens(&self, bidder: &Address) -> Result<ClaimReceipt, LedgerError> {
            self.inner.claim_tokens(bidder).await
        }

        async fn submit_bid(
            &self,
            bidder: &Address,
            encrypted_payload: Vec<u8>,
            escrow_amount: u64,
        ) -> Result<BidSubmission, LedgerError> {
            self.inner
                .submit_bid(bidder, encrypted_payload, escrow_amount)
                .await
        }
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let mut rng = StdRng::seed_from_u64(5);
        let node = NodeKeypair::generate(&mut rng);
        let ledger = local_ledger(1_000, 500);
        submit_amount(&ledger, &node, &mut rng, [7u8; 32], 10.0).await;

        let flaky = FaultyLedger::new(&ledger, Fault::DropRequest, 2);
        let report = service(Arc::new(flaky), &node).run_once().await.unwrap();
        assert_eq!(report.committed.len(), 1);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_bid_and_continue() {
        let mut rng = StdRng::seed_from_u64(6);
        let node = NodeKeypair::generate(&mut rng);
        let ledger = local_ledger(1_000, 500);
        let (first, second) = ([8u8; 32], [9u8; 32]);
        submit_amount(&ledger, &node, &mut rng, first, 10.0).await;
        submit_amount(&ledger, &node, &mut rng, second, 10.0).await;

        // Initial attempt plus three retries all fail for the first bid
        let flaky = FaultyLedger::new(&ledger, Fault::DropRequest, 4);
        let report = service(Arc::new(flaky), &node).run_once().await.unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].bidder, first);
        assert_eq!(report.committed.len(), 1);
        assert_eq!(report.committed[0].bidder, second);
        assert!(report.finalized);
        assert!(!ledger.fetch_bid(&first).await.unwrap().unwrap().is_processed);
    }

    #[tokio::test]
    async fn test_stale_budget_recomputes_from_ledger() {
        let mut rng = StdRng::seed_from_u64(7);
        let node = NodeKeypair::generate(&mut rng);
        let ledger = local_ledger(100, 80);
        let (ours, theirs) = ([10u8; 32], [11u8; 32]);
        submit_amount(&ledger, &node, &mut rng, ours, 1000.0).await;
        ledger.submit_bid(&theirs, vec![0u8; 80], 0).await.unwrap();

        let service = service(Arc::new(ledger.clone()), &node);
        let launch = ledger.fetch_launch().await.unwrap();
        let opened = open_bids(
            vec![&ledger.fetch_bid(&ours).await.unwrap().unwrap()],
            node.secret_key(),
        );
        let proposals = propose_all(
            &opened,
            &LinearScoringModel::default(),
            &StaticWalletAges::default(),
            launch.max_allocation_per_user,
        );

        // Another writer commits between our read and our commit
        ledger.record_allocation(&theirs, 70, 0).await.unwrap();

        let mut report = SettlementReport::default();
        service
            .commit_all(&launch, &proposals, &mut report)
            .await
            .unwrap();

        assert_eq!(report.committed[0].amount, 30);
        assert_eq!(report.tokens_distributed, 100);
    }

    #[tokio::test]
    async fn test_watch_settles_then_finalizes_on_shutdown() {
        let mut rng = StdRng::seed_from_u64(8);
        let node = NodeKeypair::generate(&mut rng);
        let ledger = local_ledger(1_000, 500);
        submit_amount(&ledger, &node, &mut rng, [12u8; 32], 20.0).await;
        let service = service(Arc::new(ledger.clone()), &node);

        let report = service
            .watch(tokio::time::sleep(std::time::Duration::from_millis(50)))
            .await
            .unwrap();

        assert!(report.finalized);
        assert_eq!(report.committed.len(), 1);
        assert!(ledger.fetch_launch().await.unwrap().is_finalized);
    }

    #[tokio::test]
    async fn test_lost_response_counts_as_committed() {
        let mut rng = StdRng::seed_from_u64(9);
        let node = NodeKeypair::generate(&mut rng);
        let ledger = local_ledger(1_000, 500);
        let (first, second) = ([13u8; 32], [14u8; 32]);
        submit_amount(&ledger, &node, &mut rng, first, 30.0).await;
        submit_amount(&ledger, &node, &mut rng, second, 40.0).await;

        let lossy = FaultyLedger::new(&ledger, Fault::DropResponse, 1);
        let report = service(Arc::new(lossy), &node).run_once().await.unwrap();

        let bidders: Vec<Address> = report.committed.iter().map(|c| c.bidder).collect();
        assert_eq!(bidders, vec![first, second]);
        assert!(report.skipped.is_empty());
        assert!(report.failed.is_empty());

        let launch = ledger.fetch_launch().await.unwrap();
        assert_eq!(report.total_committed(), launch.tokens_distributed);
        assert_eq!(report.tokens_distributed, launch.tokens_distributed);
    }

    #[tokio::test]
    async fn test_persistent_stale_budget_halts_run() {
        let mut rng = StdRng::seed_from_u64(10);
        let node = NodeKeypair::generate(&mut rng);
        let ledger = local_ledger(1_000, 500);
        let (first, second) = ([15u8; 32], [16u8; 32]);
        submit_amount(&ledger, &node, &mut rng, first, 10.0).await;
        submit_amount(&ledger, &node, &mut rng, second, 10.0).await;

        let stale = FaultyLedger::new(&ledger, Fault::StaleBudget, u32::MAX);
        let config = SettlerConfig {
            max_conflict_retries: 2,
            ..test_config()
        };
        let service = SettlementService::new(config, Arc::new(stale), node.clone()).unwrap();

        let result = service.run_once().await;
        assert!(matches!(
            result,
            Err(SettlementError::BudgetConflict { conflicts: 3 })
        ));

        let launch = ledger.fetch_launch().await.unwrap();
        assert!(!launch.is_finalized);
        assert_eq!(launch.tokens_distributed, 0);
        for bidder in [first, second] {
            assert!(!ledger.fetch_bid(&bidder).await.unwrap().unwrap().is_processed);
        }
    }

    #[tokio::test]
    async fn test_finalize_failure_fails_run() {
        let mut rng = StdRng::seed_from_u64(11);
        let node = NodeKeypair::generate(&mut rng);
        let ledger = local_ledger(1_000, 500);
        let bidder = [17u8; 32];
        submit_amount(&ledger, &node, &mut rng, bidder, 10.0).await;

        let rejecting = FaultyLedger::new(&ledger, Fault::RejectFinalize, 1);
        let service = service(Arc::new(rejecting), &node);

        let err = service.run_once().await.unwrap_err();
        assert!(matches!(
            err,
            SettlementError::Ledger(LedgerError::Program(ProgramError::NotAuthorized))
        ));
        assert!(ledger.fetch_bid(&bidder).await.unwrap().unwrap().is_processed);
        assert!(!ledger.fetch_launch().await.unwrap().is_finalized);

        // The fault is spent; a rerun skips the commit and finalizes
        let rerun = service.run_once().await.unwrap();
        assert!(rerun.finalized);
        assert!(rerun.committed.is_empty());
        assert_eq!(rerun.skipped, BTreeSet::from([bidder]));
    }

    #[tokio::test]
    async fn test_merged_polls_skip_each_bid_once() {
        let mut rng = StdRng::seed_from_u64(12);
        let node = NodeKeypair::generate(&mut rng);
        let ledger = local_ledger(1_000, 500);
        let (earlier, ours) = ([18u8; 32], [19u8; 32]);
        submit_amount(&ledger, &node, &mut rng, earlier, 10.0).await;
        ledger.record_allocation(&earlier, 10, 0).await.unwrap();
        submit_amount(&ledger, &node, &mut rng, ours, 20.0).await;

        let service = service(Arc::new(ledger.clone()), &node);
        let mut total = SettlementReport::default();
        for _ in 0..3 {
            total.merge(service.settle_pending().await.unwrap());
        }

        assert_eq!(total.skipped, BTreeSet::from([earlier]));
        assert_eq!(total.committed.len(), 1);
        assert_eq!(total.committed[0].bidder, ours);
    }
}
