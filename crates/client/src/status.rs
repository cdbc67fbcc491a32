//! Bidder-facing view of a bid's progress.

use std::fmt;

use launch_types::{Bid, BidState, Launch};

/// Where a bid stands from the bidder's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidStatus {
    /// No bid on the ledger
    NoBid,
    /// Waiting for the cypher node
    Pending,
    /// Allocated, waiting for finalization
    Allocated { allocation: u64 },
    /// Finalized with a positive allocation, not yet claimed
    Claimable { allocation: u64 },
    /// Finalized with nothing to claim
    NothingToClaim,
    Claimed { allocation: u64 },
}

impl BidStatus {
    /// Derive the status from ledger records.
    pub fn resolve(launch: &Launch, bid: Option<&Bid>) -> Self {
        let Some(bid) = bid else {
            return BidStatus::NoBid;
        };

        match bid.state() {
            BidState::Unprocessed => BidStatus::Pending,
            BidState::Claimed { allocation } => BidStatus::Claimed { allocation },
            BidState::Processed { allocation } if !launch.is_finalized => {
                BidStatus::Allocated { allocation }
            }
            BidState::Processed { allocation: 0 } => BidStatus::NothingToClaim,
            BidState::Processed { allocation } => BidStatus::Claimable { allocation },
        }
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BidStatus::NoBid => write!(f, "no bid"),
            BidStatus::Pending => write!(f, "pending settlement"),
            BidStatus::Allocated { allocation } => {
                write!(f, "allocated {} (awaiting finalization)", allocation)
            }
            BidStatus::Claimable { allocation } => write!(f, "claimable: {}", allocation),
            BidStatus::NothingToClaim => write!(f, "settled with no allocation"),
            BidStatus::Claimed { allocation } => write!(f, "claimed {}", allocation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launch_types::{payment_vault_address, pool_account_address};

    fn launch(is_finalized: bool) -> Launch {
        Launch {
            authority: [1u8; 32],
            mint: [2u8; 32],
            payment_mint: [3u8; 32],
            pool_account: pool_account_address(&[2u8; 32]),
            payment_vault: payment_vault_address(&[3u8; 32]),
            total_tokens: 100,
            tokens_distributed: 0,
            max_allocation_per_user: 10,
            is_finalized,
        }
    }

    #[test]
    fn test_status_progression() {
        let mut bid = Bid::new([4u8; 32], vec![0u8; 80], 0, 0);
        assert_eq!(BidStatus::resolve(&launch(false), None), BidStatus::NoBid);
        assert_eq!(BidStatus::resolve(&launch(false), Some(&bid)), BidStatus::Pending);

        bid.is_processed = true;
        bid.allocation = 7;
        assert_eq!(
            BidStatus::resolve(&launch(false), Some(&bid)),
            BidStatus::Allocated { allocation: 7 }
        );
        assert_eq!(
            BidStatus::resolve(&launch(true), Some(&bid)),
            BidStatus::Claimable { allocation: 7 }
        );

        bid.is_claimed = true;
        assert_eq!(
            BidStatus::resolve(&launch(true), Some(&bid)),
            BidStatus::Claimed { allocation: 7 }
        );
    }

    #[test]
    fn test_zero_allocation() {
        let mut bid = Bid::new([4u8; 32], vec![0u8; 80], 0, 0);
        bid.is_processed = true;
        assert_eq!(
            BidStatus::resolve(&launch(true), Some(&bid)),
            BidStatus::NothingToClaim
        );
    }
}
