//! JSON-RPC parameter types shared by the mock ledger and its clients.
//!
//! Records (`Launch`, `Bid`, `ClaimReceipt`) serialize addresses and payloads
//! as hex already, so they travel as-is; only call parameters live here.

use serde::{Deserialize, Serialize};

/// JSON-RPC error code used for rejected ledger calls.
///
/// The program error itself rides in the error's `data` field.
pub const PROGRAM_ERROR_CODE: i32 = -32000;

/// Default endpoint of the mock ledger.
pub const DEFAULT_RPC_ENDPOINT: &str = "http://127.0.0.1:9944";

/// Parameters for submitting a sealed bid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBidParams {
    /// Hex-encoded bidder address
    pub sender: String,
    /// Hex-encoded confidential channel payload
    pub encrypted_payload: String,
    /// Payment tokens to escrow
    pub escrow_amount: u64,
}

/// Parameters for recording a bidder's allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAllocationParams {
    /// Hex-encoded launch authority
    pub sender: String,
    /// Hex-encoded bidder address
    pub bidder: String,
    pub amount: u64,
    /// The `tokens_distributed` value the caller based `amount` on
    pub expected_tokens_distributed: u64,
}

/// Parameters for a token balance lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalanceParams {
    /// Hex-encoded owner address
    pub owner: String,
    /// Hex-encoded mint address
    pub mint: String,
}
