//! Allocation settlement.
//!
//! Bids are settled first-come-first-served by arrival sequence. Each bid's
//! raw allocation is clamped to the per-user maximum, then to whatever is
//! left in the pool; once the pool is exhausted every later bid gets zero.
//! Forfeited bids always settle at zero.

use launch_types::{Address, Launch};

use crate::decrypt::{ForfeitReason, OpenedBid};
use crate::scoring::{ScoringInputs, ScoringModel, WalletAgeSource};

/// The launch fields that bound allocations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Budget {
    pub total_tokens: u64,
    pub tokens_distributed: u64,
    pub max_allocation_per_user: u64,
}

impl Budget {
    pub fn from_launch(launch: &Launch) -> Self {
        Self {
            total_tokens: launch.total_tokens,
            tokens_distributed: launch.tokens_distributed,
            max_allocation_per_user: launch.max_allocation_per_user,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.total_tokens.saturating_sub(self.tokens_distributed)
    }
}

/// A bid's allocation after the per-user cap, before the pool cap.
#[derive(Clone, Debug, PartialEq)]
pub struct Proposal {
    pub bidder: Address,
    pub sequence: u64,
    /// Raw allocation from the scoring model
    pub raw: u64,
    /// `min(raw, max_allocation_per_user)`
    pub clamped: u64,
    pub forfeit: Option<ForfeitReason>,
}

impl Proposal {
    /// Amount to commit given what is left in the pool.
    pub fn commit_amount(&self, remaining: u64) -> u64 {
        self.clamped.min(remaining)
    }
}

/// A settled allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub bidder: Address,
    pub committed: u64,
}

/// Score an opened bid and apply the per-user cap.
pub fn propose(
    opened: &OpenedBid,
    model: &dyn ScoringModel,
    ages: &dyn WalletAgeSource,
    max_allocation_per_user: u64,
) -> Proposal {
    let (raw, forfeit) = match &opened.amount {
        Ok(amount) => {
            let inputs = ScoringInputs {
                bid_amount: *amount,
                wallet_age_days: ages.wallet_age_days(&opened.bidder),
            };
            (model.allocate(&inputs), None)
        }
        Err(reason) => (0, Some(reason.clone())),
    };

    Proposal {
        bidder: opened.bidder,
        sequence: opened.sequence,
        raw,
        clamped: raw.min(max_allocation_per_user),
        forfeit,
    }
}

/// Score every bid, in arrival order.
pub fn propose_all(
    opened: &[OpenedBid],
    model: &dyn ScoringModel,
    ages: &dyn WalletAgeSource,
    max_allocation_per_user: u64,
) -> Vec<Proposal> {
    let mut proposals: Vec<Proposal> = opened
        .iter()
        .map(|bid| propose(bid, model, ages, max_allocation_per_user))
        .collect();
    proposals.sort_by_key(|p| p.sequence);
    proposals
}

/// Settle a batch against a budget.
///
/// Returns one allocation per bid in arrival order. The sum of committed
/// amounts never exceeds `budget.remaining()`.
pub fn settle(
    opened: &[OpenedBid],
    budget: Budget,
    model: &dyn ScoringModel,
    ages: &dyn WalletAgeSource,
) -> Vec<Allocation> {
    let mut remaining = budget.remaining();

    propose_all(opened, model, ages, budget.max_allocation_per_user)
        .into_iter()
        .map(|proposal| {
            let committed = proposal.commit_amount(remaining);
            remaining -= committed;
            Allocation {
                bidder: proposal.bidder,
                committed,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{LinearScoringModel, StaticWalletAges};
    use launch_crypto::PlaintextError;

    const A: Address = [0xa; 32];
    const B: Address = [0xb; 32];
    const C: Address = [0xc; 32];

    fn opened(bidder: Address, sequence: u64, amount: f64) -> OpenedBid {
        OpenedBid {
            bidder,
            sequence,
            amount: Ok(amount),
        }
    }

    fn budget(total_tokens: u64, max_allocation_per_user: u64) -> Budget {
        Budget {
            total_tokens,
            tokens_distributed: 0,
            max_allocation_per_user,
        }
    }

    #[test]
    fn test_reference_scenario() {
        let model = LinearScoringModel::default();
        let ages: StaticWalletAges = [(A, 100), (B, 5), (C, 365)].into_iter().collect();
        let bids = [opened(A, 0, 4000.0), opened(B, 1, 100.0), opened(C, 2, 50_000.0)];

        let allocations = settle(&bids, budget(1_000_000, 5_000), &model, &ages);

        let committed: Vec<u64> = allocations.iter().map(|a| a.committed).collect();
        assert_eq!(committed, vec![5_000, 82, 5_000]);
        assert_eq!(committed.iter().sum::<u64>(), 10_082);
    }

    #[test]
    fn test_pool_exhaustion_partial_fill() {
        let model = LinearScoringModel::default();
        let ages = StaticWalletAges::default();
        // Each bid clamps to 50 before the pool cap
        let bids = [opened(A, 0, 1000.0), opened(B, 1, 1000.0)];

        let allocations = settle(&bids, budget(10, 50), &model, &ages);
        assert_eq!(allocations[0].committed, 10);
        assert_eq!(allocations[1].committed, 0);
    }

    #[test]
    fn test_arrival_order_wins() {
        let model = LinearScoringModel::default();
        let ages = StaticWalletAges::default();
        // Input order differs from arrival order
        let bids = [opened(B, 5, 1000.0), opened(A, 2, 1000.0)];

        let allocations = settle(&bids, budget(60, 50), &model, &ages);
        assert_eq!(allocations[0], Allocation { bidder: A, committed: 50 });
        assert_eq!(allocations[1], Allocation { bidder: B, committed: 10 });
    }

    #[test]
    fn test_forfeited_bid_settles_at_zero() {
        let model = LinearScoringModel::default();
        let ages = StaticWalletAges::default();
        let bids = [
            OpenedBid {
                bidder: A,
                sequence: 0,
                amount: Err(ForfeitReason::Plaintext(PlaintextError::MissingTag)),
            },
            opened(B, 1, 1000.0),
        ];

        let proposals = propose_all(&bids, &model, &ages, 5_000);
        assert_eq!(proposals[0].clamped, 0);
        assert!(proposals[0].forfeit.is_some());

        let allocations = settle(&bids, budget(1_000, 5_000), &model, &ages);
        assert_eq!(allocations[0].committed, 0);
        assert_eq!(allocations[1].committed, 1_000);
    }

    #[test]
    fn test_budget_accounts_for_prior_distribution() {
        let model = LinearScoringModel::default();
        let ages = StaticWalletAges::default();
        let bids = [opened(A, 0, 1000.0)];
        let budget = Budget {
            total_tokens: 1_000,
            tokens_distributed: 990,
            max_allocation_per_user: 5_000,
        };

        assert_eq!(budget.remaining(), 10);
        assert_eq!(settle(&bids, budget, &model, &ages)[0].committed, 10);
    }
}
