//! Query handlers for the launch program.
//!
//! These functions provide read-only access to launch state.

use crate::state::LaunchProgramState;
use launch_types::{Address, Bid, Launch};
use serde::{Deserialize, Serialize};

/// Query request types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LaunchQuery {
    /// Get the launch singleton.
    GetLaunch,

    /// Get all bids in arrival order.
    GetBids,

    /// Get a specific bid.
    GetBid { bidder: Address },

    /// Get an owner's associated token balance for a mint.
    GetTokenBalance { owner: Address, mint: Address },
}

/// Query response types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LaunchQueryResponse {
    Launch(Option<Launch>),
    Bids(Vec<Bid>),
    Bid(Option<Bid>),
    TokenBalance(u64),
}

/// Handle a query.
pub fn handle_query(state: &LaunchProgramState, query: LaunchQuery) -> LaunchQueryResponse {
    match query {
        LaunchQuery::GetLaunch => LaunchQueryResponse::Launch(state.launch.clone()),

        LaunchQuery::GetBids => {
            LaunchQueryResponse::Bids(state.ordered_bids().into_iter().cloned().collect())
        }

        LaunchQuery::GetBid { bidder } => LaunchQueryResponse::Bid(state.get_bid(&bidder).cloned()),

        LaunchQuery::GetTokenBalance { owner, mint } => {
            LaunchQueryResponse::TokenBalance(state.token_balance(&owner, &mint))
        }
    }
}

/// Progress summary of the launch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LaunchSummary {
    pub total_tokens: u64,
    pub tokens_distributed: u64,
    pub is_finalized: bool,
    pub num_bids: usize,
    pub num_processed: usize,
    pub num_claimed: usize,
}

/// Summarize launch progress, if a launch exists.
pub fn get_launch_summary(state: &LaunchProgramState) -> Option<LaunchSummary> {
    let launch = state.launch.as_ref()?;
    let bids = state.ordered_bids();
    Some(LaunchSummary {
        total_tokens: launch.total_tokens,
        tokens_distributed: launch.tokens_distributed,
        is_finalized: launch.is_finalized,
        num_bids: bids.len(),
        num_processed: bids.iter().filter(|b| b.is_processed).count(),
        num_claimed: bids.iter().filter(|b| b.is_claimed).count(),
    })
}
