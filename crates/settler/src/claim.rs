//! Claiming settled allocations.

use std::sync::Arc;

use launch_program::ProgramError;
use launch_types::{short_address, Address, Bid, ClaimReceipt};
use thiserror::Error;
use tracing::info;

use crate::ledger::{LaunchLedger, LedgerError};

/// Reasons a claim is rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClaimError {
    #[error("Launch has not been finalized")]
    NotFinalized,

    #[error("No bid for bidder {0}")]
    NoBid(String),

    #[error("Bid has not been processed")]
    NotProcessed,

    #[error("Nothing to claim")]
    NothingToClaim,

    #[error("Allocation already claimed")]
    AlreadyClaimed,

    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for ClaimError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Program(ProgramError::LaunchNotFinalized) => ClaimError::NotFinalized,
            LedgerError::Program(ProgramError::BidNotFound(bidder)) => ClaimError::NoBid(bidder),
            LedgerError::Program(ProgramError::BidNotProcessed) => ClaimError::NotProcessed,
            LedgerError::Program(ProgramError::NothingToClaim) => ClaimError::NothingToClaim,
            LedgerError::Program(ProgramError::AlreadyClaimed) => ClaimError::AlreadyClaimed,
            other => ClaimError::Ledger(other),
        }
    }
}

/// Resolves and executes claims against the ledger.
///
/// Preconditions are checked on a fresh read first so obvious rejections
/// never reach the ledger; the ledger re-validates all of them inside the
/// claim transaction.
pub struct ClaimResolver {
    ledger: Arc<dyn LaunchLedger>,
}

impl ClaimResolver {
    pub fn new(ledger: Arc<dyn LaunchLedger>) -> Self {
        Self { ledger }
    }

    /// Check that `bidder` could claim now, returning their bid.
    pub async fn check(&self, bidder: &Address) -> Result<Bid, ClaimError> {
        let launch = self.ledger.fetch_launch().await?;
        if !launch.is_finalized {
            return Err(ClaimError::NotFinalized);
        }

        let bid = self
            .ledger
            .fetch_bid(bidder)
            .await?
            .ok_or_else(|| ClaimError::NoBid(hex::encode(bidder)))?;

        if bid.is_claimable(&launch) {
            return Ok(bid);
        }

        Err(if !bid.is_processed {
            ClaimError::NotProcessed
        } else if bid.is_claimed {
            ClaimError::AlreadyClaimed
        } else {
            ClaimError::NothingToClaim
        })
    }

    /// Claim `bidder`'s allocation into their associated token account.
    pub async fn claim(&self, bidder: &Address) -> Result<ClaimReceipt, ClaimError> {
        self.check(bidder).await?;
        let receipt = self.ledger.claim_tokens(bidder).await?;

        info!(
            bidder = %short_address(bidder),
            amount = receipt.amount,
            destination = %short_address(&receipt.destination),
            destination_created = receipt.destination_created,
            "Allocation claimed"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LocalLedger;
    use launch_program::LaunchGenesisConfig;
    use launch_types::associated_token_address;

    const AUTHORITY: Address = [1u8; 32];
    const MINT: Address = [2u8; 32];
    const BIDDER: Address = [4u8; 32];

    async fn settled_ledger(allocation: u64, finalize: bool) -> LocalLedger {
        let ledger = LocalLedger::from_genesis(&LaunchGenesisConfig::new(
            AUTHORITY, MINT, [3u8; 32], 1_000, 500,
        ))
        .unwrap();
        ledger.submit_bid(&BIDDER, vec![1u8; 80], 0).await.unwrap();
        ledger.record_allocation(&BIDDER, allocation, 0).await.unwrap();
        if finalize {
            ledger.finalize_launch().await.unwrap();
        }
        ledger
    }

    #[tokio::test]
    async fn test_claim_once() {
        let ledger = settled_ledger(250, true).await;
        let resolver = ClaimResolver::new(Arc::new(ledger.clone()));

        let receipt = resolver.claim(&BIDDER).await.unwrap();
        assert_eq!(receipt.amount, 250);
        assert_eq!(receipt.destination, associated_token_address(&BIDDER, &MINT));
        assert_eq!(ledger.state().read().token_balance(&BIDDER, &MINT), 250);

        assert_eq!(resolver.claim(&BIDDER).await, Err(ClaimError::AlreadyClaimed));
        assert_eq!(ledger.state().read().token_balance(&BIDDER, &MINT), 250);
    }

    #[tokio::test]
    async fn test_claim_preconditions() {
        let ledger = settled_ledger(250, false).await;
        let resolver = ClaimResolver::new(Arc::new(ledger));
        assert_eq!(resolver.claim(&BIDDER).await, Err(ClaimError::NotFinalized));

        let ledger = settled_ledger(0, true).await;
        let resolver = ClaimResolver::new(Arc::new(ledger));
        assert_eq!(resolver.claim(&BIDDER).await, Err(ClaimError::NothingToClaim));
        assert!(matches!(
            resolver.claim(&[9u8; 32]).await,
            Err(ClaimError::NoBid(_))
        ));
    }

    #[test]
    fn test_ledger_rejections_map_to_claim_errors() {
        assert_eq!(
            ClaimError::from(LedgerError::Program(ProgramError::AlreadyClaimed)),
            ClaimError::AlreadyClaimed
        );
        assert!(matches!(
            ClaimError::from(LedgerError::Transport("down".into())),
            ClaimError::Ledger(_)
        ));
    }
}
