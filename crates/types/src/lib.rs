//! Core type definitions for sealed-bid token launches.
//!
//! This crate provides the records shared by the ledger program, the cypher
//! node and bidder clients: the launch singleton, per-bidder bid records,
//! token accounts, and the deterministic address scheme used to locate them.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use thiserror::Error;

pub mod rpc;

// =========================
// ADDRESSES
// =========================

/// Generic address type (32 bytes)
pub type Address = [u8; 32];

/// Program identifier mixed into every derived address.
pub const PROGRAM_ID: Address = *b"SealedLaunchProgram1111111111111";

/// Seed for the launch singleton.
pub const LAUNCH_SEED: &[u8] = b"launch";

/// Seed prefix for bid records.
pub const BID_SEED: &[u8] = b"bid";

/// Seed prefix for associated token accounts.
pub const ATA_SEED: &[u8] = b"ata";

/// Seed prefix for the payment vault.
pub const VAULT_SEED: &[u8] = b"vault";

/// Errors from parsing textual addresses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Address must be 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Derive a deterministic address from a list of seeds.
///
/// Each seed is length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
/// never collide.
pub fn derive_address(seeds: &[&[u8]]) -> Address {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"LAUNCH_ADDRESS_V1:");
    hasher.update(PROGRAM_ID);
    for seed in seeds {
        hasher.update((seed.len() as u32).to_le_bytes());
        hasher.update(seed);
    }
    hasher.finalize().into()
}

/// Address of the launch singleton.
pub fn launch_address() -> Address {
    derive_address(&[LAUNCH_SEED])
}

/// Address of the bid record owned by `bidder`.
pub fn bid_address(bidder: &Address) -> Address {
    derive_address(&[BID_SEED, bidder])
}

/// Address of the token account holding `mint` tokens for `owner`.
pub fn associated_token_address(owner: &Address, mint: &Address) -> Address {
    derive_address(&[ATA_SEED, owner, mint])
}

/// Address of the launch pool: the launch's associated account for `mint`.
pub fn pool_account_address(mint: &Address) -> Address {
    associated_token_address(&launch_address(), mint)
}

/// Address of the vault receiving escrowed payments.
pub fn payment_vault_address(payment_mint: &Address) -> Address {
    derive_address(&[VAULT_SEED, &launch_address(), payment_mint])
}

/// Parse a hex address, with or without a `0x` prefix.
pub fn parse_address(s: &str) -> Result<Address, AddressError> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| AddressError::InvalidHex(e.to_string()))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| AddressError::InvalidLength(len))
}

/// Short form of an address for log lines.
pub fn short_address(address: &Address) -> String {
    hex::encode(&address[..4])
}

// =========================
// LEDGER RECORDS
// =========================

/// Launch lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchState {
    /// Accepting bids and allocations
    Open,
    /// Allocations fixed, claims open
    Finalized,
}

/// The launch singleton.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Launch {
    #[serde_as(as = "Hex")]
    pub authority: Address,

    /// Mint of the token being distributed
    #[serde_as(as = "Hex")]
    pub mint: Address,

    /// Mint of the token escrowed alongside bids
    #[serde_as(as = "Hex")]
    pub payment_mint: Address,

    /// Token account holding the distributable supply
    #[serde_as(as = "Hex")]
    pub pool_account: Address,

    /// Token account receiving escrowed payments
    #[serde_as(as = "Hex")]
    pub payment_vault: Address,

    pub total_tokens: u64,
    pub tokens_distributed: u64,
    pub max_allocation_per_user: u64,
    pub is_finalized: bool,
}

impl Launch {
    /// Tokens still available for allocation.
    pub fn remaining(&self) -> u64 {
        self.total_tokens.saturating_sub(self.tokens_distributed)
    }

    pub fn state(&self) -> LaunchState {
        if self.is_finalized {
            LaunchState::Finalized
        } else {
            LaunchState::Open
        }
    }
}

/// Bid lifecycle state, derived from the record flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BidState {
    Unprocessed,
    Processed { allocation: u64 },
    Claimed { allocation: u64 },
}

/// A sealed bid (one per bidder).
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Bid {
    #[serde_as(as = "Hex")]
    pub bidder: Address,

    /// Confidential channel payload: nonce || ephemeral pubkey || ciphertext
    #[serde_as(as = "Hex")]
    pub encrypted_payload: Vec<u8>,

    /// Payment tokens moved into the vault at submission
    pub escrowed_amount: u64,

    /// Arrival order assigned by the ledger
    pub sequence: u64,

    pub is_processed: bool,
    pub allocation: u64,
    pub is_claimed: bool,
}

impl Bid {
    /// Create a fresh, unprocessed bid.
    pub fn new(bidder: Address, encrypted_payload: Vec<u8>, escrowed_amount: u64, sequence: u64) -> Self {
        Self {
            bidder,
            encrypted_payload,
            escrowed_amount,
            sequence,
            is_processed: false,
            allocation: 0,
            is_claimed: false,
        }
    }

    pub fn state(&self) -> BidState {
        match (self.is_processed, self.is_claimed) {
            (false, _) => BidState::Unprocessed,
            (true, false) => BidState::Processed {
                allocation: self.allocation,
            },
            (true, true) => BidState::Claimed {
                allocation: self.allocation,
            },
        }
    }

    /// Whether a claim against this bid would pass every precondition.
    pub fn is_claimable(&self, launch: &Launch) -> bool {
        launch.is_finalized && self.is_processed && self.allocation > 0 && !self.is_claimed
    }
}

/// A token-holding account.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct TokenAccount {
    #[serde_as(as = "Hex")]
    pub address: Address,
    #[serde_as(as = "Hex")]
    pub mint: Address,
    #[serde_as(as = "Hex")]
    pub owner: Address,
    pub amount: u64,
}

// =========================
// OPERATION OUTCOMES
// =========================

/// Result of a bid submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidSubmission {
    pub bid: Bid,
    /// False when the bidder already had a bid and it was returned unchanged
    pub created: bool,
}

/// Result of recording an allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOutcome {
    /// Allocation written; carries the launch total after the write
    Recorded { tokens_distributed: u64 },
    /// Bid was already processed with this exact allocation
    AlreadyRecorded { allocation: u64 },
}

/// Result of finalizing the launch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalizeOutcome {
    Finalized,
    AlreadyFinalized,
}

/// Receipt for a successful claim.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    #[serde_as(as = "Hex")]
    pub bidder: Address,
    /// Bidder's associated token account for the launch mint
    #[serde_as(as = "Hex")]
    pub destination: Address,
    pub amount: u64,
    /// Whether the destination account was created by this claim
    pub destination_created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_launch() -> Launch {
        Launch {
            authority: [1u8; 32],
            mint: [2u8; 32],
            payment_mint: [3u8; 32],
            pool_account: pool_account_address(&[2u8; 32]),
            payment_vault: payment_vault_address(&[3u8; 32]),
            total_tokens: 1_000,
            tokens_distributed: 250,
            max_allocation_per_user: 100,
            is_finalized: false,
        }
    }

    #[test]
    fn test_derived_addresses_are_distinct() {
        let bidder = [7u8; 32];
        let mint = [2u8; 32];

        let addresses = [
            launch_address(),
            bid_address(&bidder),
            associated_token_address(&bidder, &mint),
            pool_account_address(&mint),
            payment_vault_address(&mint),
        ];

        for (i, a) in addresses.iter().enumerate() {
            for b in &addresses[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(bid_address(&bidder), bid_address(&bidder));
    }

    #[test]
    fn test_seed_boundaries_do_not_collide() {
        assert_ne!(derive_address(&[b"ab", b"c"]), derive_address(&[b"a", b"bc"]));
    }

    #[test]
    fn test_parse_address() {
        let addr = [0xabu8; 32];
        let text = hex::encode(addr);
        assert_eq!(parse_address(&text), Ok(addr));
        assert_eq!(parse_address(&format!("0x{}", text)), Ok(addr));
        assert_eq!(parse_address("abcd"), Err(AddressError::InvalidLength(2)));
        assert!(matches!(parse_address("zz"), Err(AddressError::InvalidHex(_))));
    }

    #[test]
    fn test_launch_remaining() {
        let mut launch = sample_launch();
        assert_eq!(launch.remaining(), 750);
        assert_eq!(launch.state(), LaunchState::Open);

        launch.tokens_distributed = launch.total_tokens;
        assert_eq!(launch.remaining(), 0);
    }

    #[test]
    fn test_bid_state_and_claimability() {
        let mut launch = sample_launch();
        let mut bid = Bid::new([9u8; 32], vec![1, 2, 3], 50, 0);
        assert_eq!(bid.state(), BidState::Unprocessed);
        assert!(!bid.is_claimable(&launch));

        bid.is_processed = true;
        bid.allocation = 40;
        assert_eq!(bid.state(), BidState::Processed { allocation: 40 });
        assert!(!bid.is_claimable(&launch));

        launch.is_finalized = true;
        assert!(bid.is_claimable(&launch));

        bid.is_claimed = true;
        assert_eq!(bid.state(), BidState::Claimed { allocation: 40 });
        assert!(!bid.is_claimable(&launch));
    }

    #[test]
    fn test_records_serialize_addresses_as_hex() {
        let launch = sample_launch();
        let json = serde_json::to_value(&launch).unwrap();
        assert_eq!(json["authority"], hex::encode([1u8; 32]));

        let back: Launch = serde_json::from_value(json).unwrap();
        assert_eq!(back, launch);
    }
}
