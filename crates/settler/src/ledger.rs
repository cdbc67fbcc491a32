//! Ledger access for the cypher node and bidders.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use launch_program::handlers::{self, CallContext};
use launch_program::{GenesisValidationError, LaunchGenesisConfig, LaunchProgramState, ProgramError};
use launch_types::{Address, Bid, BidSubmission, ClaimReceipt, FinalizeOutcome, Launch, RecordOutcome};
use parking_lot::RwLock;
use thiserror::Error;

/// Errors from a ledger call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The program rejected the call
    #[error("Program error: {0}")]
    Program(#[from] ProgramError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Ledger call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),
}

impl LedgerError {
    /// Whether the call may succeed if simply sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Transport(_) | LedgerError::Timeout(_))
    }

    /// The program error, if the program rejected the call.
    pub fn program_error(&self) -> Option<&ProgramError> {
        match self {
            LedgerError::Program(err) => Some(err),
            _ => None,
        }
    }
}

/// Operations the settlement pipeline and bidders need from the ledger.
///
/// Authority-signed calls (`record_allocation`, `finalize_launch`) are
/// signed by the adapter's configured authority.
#[async_trait]
pub trait LaunchLedger: Send + Sync {
    async fn fetch_launch(&self) -> Result<Launch, LedgerError>;

    /// All bids, in arrival order.
    async fn fetch_bids(&self) -> Result<Vec<Bid>, LedgerError>;

    async fn fetch_bid(&self, bidder: &Address) -> Result<Option<Bid>, LedgerError>;

    /// Compare-and-commit an allocation against `expected_tokens_distributed`.
    async fn record_allocation(
        &self,
        bidder: &Address,
        amount: u64,
        expected_tokens_distributed: u64,
    ) -> Result<RecordOutcome, LedgerError>;

    async fn finalize_launch(&self) -> Result<FinalizeOutcome, LedgerError>;

    async fn claim_tokens(&self, bidder: &Address) -> Result<ClaimReceipt, LedgerError>;

    async fn submit_bid(
        &self,
        bidder: &Address,
        encrypted_payload: Vec<u8>,
        escrow_amount: u64,
    ) -> Result<BidSubmission, LedgerError>;
}

/// In-process ledger over shared program state.
///
/// Each call holds the write lock for the whole handler, so every call is
/// atomic with respect to every other caller sharing the state.
#[derive(Clone)]
pub struct LocalLedger {
    state: Arc<RwLock<LaunchProgramState>>,
    authority: Address,
}

impl LocalLedger {
    pub fn new(state: Arc<RwLock<LaunchProgramState>>, authority: Address) -> Self {
        Self { state, authority }
    }

    /// Build a fresh ledger from a genesis configuration.
    pub fn from_genesis(config: &LaunchGenesisConfig) -> Result<Self, GenesisValidationError> {
        let state = config.build_state()?;
        Ok(Self::new(Arc::new(RwLock::new(state)), config.authority))
    }

    /// Shared handle to the underlying state.
    pub fn state(&self) -> Arc<RwLock<LaunchProgramState>> {
        Arc::clone(&self.state)
    }

    /// Same state, signing as a different authority.
    pub fn with_authority(&self, authority: Address) -> Self {
        Self {
            state: Arc::clone(&self.state),
            authority,
        }
    }

    fn context(sender: Address) -> CallContext {
        CallContext { sender }
    }
}

#[async_trait]
impl LaunchLedger for LocalLedger {
    async fn fetch_launch(&self) -> Result<Launch, LedgerError> {
        Ok(self.state.read().launch()?.clone())
    }

    async fn fetch_bids(&self) -> Result<Vec<Bid>, LedgerError> {
        Ok(self
            .state
            .read()
            .ordered_bids()
            .into_iter()
            .cloned()
            .collect())
    }

    async fn fetch_bid(&self, bidder: &Address) -> Result<Option<Bid>, LedgerError> {
        Ok(self.state.read().get_bid(bidder).cloned())
    }

    async fn record_allocation(
        &self,
        bidder: &Address,
        amount: u64,
        expected_tokens_distributed: u64,
    ) -> Result<RecordOutcome, LedgerError> {
        let mut state = self.state.write();
        Ok(handlers::handle_record_allocation(
            &mut state,
            &Self::context(self.authority),
            *bidder,
            amount,
            expected_tokens_distributed,
        )?)
    }

    async fn finalize_launch(&self) -> Result<FinalizeOutcome, LedgerError> {
        let mut state = self.state.write();
        Ok(handlers::handle_finalize_launch(
            &mut state,
            &Self::context(self.authority),
        )?)
    }

    async fn claim_tokens(&self, bidder: &Address) -> Result<ClaimReceipt, LedgerError> {
        let mut state = self.state.write();
        Ok(handlers::handle_claim_tokens(
            &mut state,
            &Self::context(*bidder),
        )?)
    }

    async fn submit_bid(
        &self,
        bidder: &Address,
        encrypted_payload: Vec<u8>,
        escrow_amount: u64,
    ) -> Result<BidSubmission, LedgerError> {
        let mut state = self.state.write();
        Ok(handlers::handle_submit_bid(
            &mut state,
            &Self::context(*bidder),
            encrypted_payload,
            escrow_amount,
        )?)
    }
}
