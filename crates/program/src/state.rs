//! Ledger-resident state for the launch program.

use borsh::{BorshDeserialize, BorshSerialize};
use launch_types::{associated_token_address, Address, Bid, Launch, TokenAccount};
use std::collections::HashMap;

use crate::error::ProgramError;

/// Launch program state.
///
/// A single launch, its bids keyed by bidder, and the token accounts the
/// program moves funds between.
#[derive(Debug, Default, Clone, BorshSerialize, BorshDeserialize)]
pub struct LaunchProgramState {
    /// The launch singleton, once initialized
    pub launch: Option<Launch>,

    /// Bids keyed by bidder
    pub bids: HashMap<Address, Bid>,

    /// Bidders in arrival order
    pub bid_order: Vec<Address>,

    /// Token accounts keyed by account address
    pub token_accounts: HashMap<Address, TokenAccount>,

    /// Sequence number for the next bid
    pub next_sequence: u64,
}

impl LaunchProgramState {
    /// Create an empty program state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the launch, failing if it has not been initialized.
    pub fn launch(&self) -> Result<&Launch, ProgramError> {
        self.launch.as_ref().ok_or(ProgramError::LaunchNotInitialized)
    }

    /// Get the mutable launch.
    pub fn launch_mut(&mut self) -> Result<&mut Launch, ProgramError> {
        self.launch.as_mut().ok_or(ProgramError::LaunchNotInitialized)
    }

    /// Get a bid by bidder.
    pub fn get_bid(&self, bidder: &Address) -> Option<&Bid> {
        self.bids.get(bidder)
    }

    /// All bids in arrival order.
    pub fn ordered_bids(&self) -> Vec<&Bid> {
        self.bid_order
            .iter()
            .filter_map(|bidder| self.bids.get(bidder))
            .collect()
    }

    /// Get the next bid sequence number and increment.
    pub fn allocate_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    /// Balance held at a token account address (zero if absent).
    pub fn account_balance(&self, address: &Address) -> u64 {
        self.token_accounts
            .get(address)
            .map(|a| a.amount)
            .unwrap_or(0)
    }

    /// Balance of `owner`'s associated account for `mint`.
    pub fn token_balance(&self, owner: &Address, mint: &Address) -> u64 {
        self.account_balance(&associated_token_address(owner, mint))
    }

    /// Ensure a token account exists at `address`. Returns true if it was
    /// created by this call.
    pub fn open_account(&mut self, address: Address, owner: Address, mint: Address) -> bool {
        if self.token_accounts.contains_key(&address) {
            return false;
        }
        self.token_accounts.insert(
            address,
            TokenAccount {
                address,
                mint,
                owner,
                amount: 0,
            },
        );
        true
    }

    /// Ensure `owner`'s associated account for `mint` exists.
    pub fn open_associated_account(&mut self, owner: Address, mint: Address) -> (Address, bool) {
        let address = associated_token_address(&owner, &mint);
        let created = self.open_account(address, owner, mint);
        (address, created)
    }

    /// Credit an associated token account, creating it if needed.
    ///
    /// Only used to seed balances at genesis.
    pub fn mint_to(&mut self, owner: Address, mint: Address, amount: u64) {
        let (address, _) = self.open_associated_account(owner, mint);
        if let Some(account) = self.token_accounts.get_mut(&address) {
            account.amount = account.amount.saturating_add(amount);
        }
    }

    /// Move tokens between two existing accounts. Either both sides change
    /// or neither does.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), ProgramError> {
        let available = self.account_balance(from);
        if available < amount {
            return Err(ProgramError::InsufficientFunds {
                required: amount,
                available,
            });
        }
        if !self.token_accounts.contains_key(to) {
            return Err(ProgramError::AccountNotFound(hex::encode(to)));
        }

        if let Some(source) = self.token_accounts.get_mut(from) {
            source.amount -= amount;
        }
        if let Some(dest) = self.token_accounts.get_mut(to) {
            dest.amount += amount;
        }
        Ok(())
    }

    /// Serialize the full state for persistence.
    pub fn to_snapshot(&self) -> Result<Vec<u8>, ProgramError> {
        borsh::to_vec(self).map_err(|e| ProgramError::InvalidSnapshot(e.to_string()))
    }

    /// Restore state from a snapshot.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, ProgramError> {
        borsh::from_slice(bytes).map_err(|e| ProgramError::InvalidSnapshot(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_sequence() {
        let mut state = LaunchProgramState::new();
        assert_eq!(state.allocate_sequence(), 0);
        assert_eq!(state.allocate_sequence(), 1);
        assert_eq!(state.allocate_sequence(), 2);
    }

    #[test]
    fn test_token_operations() {
        let mut state = LaunchProgramState::new();
        let alice = [1u8; 32];
        let bob = [2u8; 32];
        let mint = [9u8; 32];

        assert_eq!(state.token_balance(&alice, &mint), 0);

        state.mint_to(alice, mint, 100);
        assert_eq!(state.token_balance(&alice, &mint), 100);

        let (bob_ata, created) = state.open_associated_account(bob, mint);
        assert!(created);
        let (_, created) = state.open_associated_account(bob, mint);
        assert!(!created);

        let alice_ata = associated_token_address(&alice, &mint);
        state.transfer(&alice_ata, &bob_ata, 60).unwrap();
        assert_eq!(state.token_balance(&alice, &mint), 40);
        assert_eq!(state.token_balance(&bob, &mint), 60);

        let err = state.transfer(&alice_ata, &bob_ata, 41).unwrap_err();
        assert_eq!(
            err,
            ProgramError::InsufficientFunds {
                required: 41,
                available: 40
            }
        );
        assert_eq!(state.token_balance(&alice, &mint), 40);
        assert_eq!(state.token_balance(&bob, &mint), 60);
    }

    #[test]
    fn test_snapshot_restores_bids_in_order() {
        let mut state = LaunchProgramState::new();
        for i in 0..3u8 {
            let bidder = [i + 1; 32];
            let seq = state.allocate_sequence();
            state.bids.insert(bidder, Bid::new(bidder, vec![i; 80], 10, seq));
            state.bid_order.push(bidder);
        }

        let restored = LaunchProgramState::from_snapshot(&state.to_snapshot().unwrap()).unwrap();
        let order: Vec<u64> = restored.ordered_bids().iter().map(|b| b.sequence).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(restored.next_sequence, 3);
    }
}
