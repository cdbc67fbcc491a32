//! Launch program error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by launch program handlers.
///
/// Serializable so remote ledgers can hand the exact rejection back to
/// callers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ProgramError {
    #[error("Launch not initialized")]
    LaunchNotInitialized,

    #[error("Launch already initialized")]
    LaunchAlreadyInitialized,

    #[error("The launch has already been finalized")]
    LaunchFinalized,

    #[error("The launch has not been finalized")]
    LaunchNotFinalized,

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Bid not found for bidder {0}")]
    BidNotFound(String),

    #[error("Bid has not been processed")]
    BidNotProcessed,

    #[error("Allocation already recorded as {recorded}, refusing {requested}")]
    AllocationConflict { recorded: u64, requested: u64 },

    #[error("Stale budget: expected {expected} tokens distributed, ledger has {actual}")]
    StaleBudget { expected: u64, actual: u64 },

    #[error("Allocation {amount} exceeds per-user maximum {max}")]
    ExceedsMaxAllocation { amount: u64, max: u64 },

    #[error("Pool exhausted: requested {requested}, remaining {remaining}")]
    PoolExhausted { requested: u64, remaining: u64 },

    #[error("Nothing to claim")]
    NothingToClaim,

    #[error("Allocation already claimed")]
    AlreadyClaimed,

    #[error("Insufficient funds: need {required}, have {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Token account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid bid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid launch configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}
