//! Cypher node settlement pipeline for sealed-bid token launches.
//!
//! The node:
//! 1. Fetches unprocessed bids from the ledger in arrival order
//! 2. Opens each sealed bid with its secret key
//! 3. Scores each bid and clamps it to the per-user cap
//! 4. Commits allocations first-come-first-served against the ledger's
//!    `tokens_distributed` until the pool runs out
//! 5. Finalizes the launch so bidders can claim
//!
//! Undecryptable bids settle at zero; they never stall the batch.

pub mod claim;
pub mod config;
pub mod decrypt;
pub mod error;
pub mod ledger;
pub mod rpc;
pub mod scoring;
pub mod service;
pub mod settlement;

pub use claim::{ClaimError, ClaimResolver};
pub use config::{ConfigError, SettlerConfig};
pub use decrypt::{open_bid, ForfeitReason, OpenedBid};
pub use error::SettlementError;
pub use ledger::{LaunchLedger, LedgerError, LocalLedger};
pub use rpc::RpcLedger;
pub use scoring::{
    LinearScoringModel, ScoringConfig, ScoringInputs, ScoringModel, StaticWalletAges,
    WalletAgeSource,
};
pub use service::{SettlementReport, SettlementService};
pub use settlement::{settle, Allocation, Budget};
