//! Call message types for the launch program.

use borsh::{BorshDeserialize, BorshSerialize};
use launch_types::{Address, BidSubmission, ClaimReceipt, FinalizeOutcome, Launch, RecordOutcome};
use serde::{Deserialize, Serialize};

/// Call messages for the launch program.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum LaunchCall {
    // === Launch Lifecycle ===
    /// Create the launch singleton. The sender becomes its authority.
    InitializeLaunch {
        mint: Address,
        payment_mint: Address,
        total_tokens: u64,
        max_allocation_per_user: u64,
    },

    /// Close the launch to new allocations and open claims (authority only).
    FinalizeLaunch,

    // === Bidding ===
    /// Submit a sealed bid and escrow payment.
    SubmitBid {
        encrypted_payload: Vec<u8>,
        escrow_amount: u64,
    },

    /// Record a bidder's allocation against the budget the caller read
    /// (authority only).
    RecordAllocation {
        bidder: Address,
        amount: u64,
        expected_tokens_distributed: u64,
    },

    // === Settlement ===
    /// Move the sender's allocation out of the pool.
    ClaimTokens,
}

impl LaunchCall {
    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            LaunchCall::InitializeLaunch { .. } => "initialize_launch",
            LaunchCall::FinalizeLaunch => "finalize_launch",
            LaunchCall::SubmitBid { .. } => "submit_bid",
            LaunchCall::RecordAllocation { .. } => "record_allocation",
            LaunchCall::ClaimTokens => "claim_tokens",
        }
    }
}

/// What a dispatched call produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallOutcome {
    Initialized(Launch),
    BidSubmitted(BidSubmission),
    AllocationRecorded(RecordOutcome),
    Finalized(FinalizeOutcome),
    Claimed(ClaimReceipt),
}
