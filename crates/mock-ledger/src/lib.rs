//! Mock ledger server for local testing of sealed-bid launches.
//!
//! This provides a JSON-RPC server that runs the launch program against
//! in-memory state, optionally persisted to a borsh snapshot after every
//! state-changing call.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::Server;
use jsonrpsee::types::error::{INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE};
use jsonrpsee::types::ErrorObjectOwned;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

pub use jsonrpsee::server::ServerHandle;

use launch_program::{
    dispatch, handle_query, CallContext, CallOutcome, LaunchCall, LaunchProgramState,
    LaunchQuery, LaunchQueryResponse, ProgramError,
};
use launch_types::rpc::{
    RecordAllocationParams, SubmitBidParams, TokenBalanceParams, PROGRAM_ERROR_CODE,
};
use launch_types::{
    parse_address, short_address, Address, Bid, BidSubmission, ClaimReceipt, FinalizeOutcome,
    Launch, RecordOutcome,
};

/// Errors from loading or saving ledger snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid snapshot: {0}")]
    Program(#[from] ProgramError),
}

/// Program state plus where to persist it.
pub struct LedgerState {
    pub program: LaunchProgramState,
    snapshot_path: Option<PathBuf>,
}

impl LedgerState {
    pub fn new(program: LaunchProgramState) -> Self {
        Self {
            program,
            snapshot_path: None,
        }
    }

    /// Persist to `path` after every state-changing call.
    pub fn with_snapshot(mut self, path: PathBuf) -> Self {
        self.snapshot_path = Some(path);
        self
    }

    /// Load program state from a snapshot file.
    pub fn load_snapshot(path: &Path) -> Result<LaunchProgramState, SnapshotError> {
        let bytes = fs::read(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(LaunchProgramState::from_snapshot(&bytes)?)
    }

    /// Write the current state's snapshot, if one is configured.
    pub fn persist(&self) -> Result<(), SnapshotError> {
        self.write_snapshot(&self.program)
    }

    /// Write `program` as the snapshot, if one is configured.
    ///
    /// Writes to a sibling temp file and renames it into place so a crash
    /// never leaves a torn snapshot.
    fn write_snapshot(&self, program: &LaunchProgramState) -> Result<(), SnapshotError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let bytes = program.to_snapshot()?;
        let tmp = path.with_extension("tmp");
        let io_err = |source| SnapshotError::Io {
            path: path.clone(),
            source,
        };
        fs::write(&tmp, bytes).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        debug!(path = %path.display(), "Snapshot written");
        Ok(())
    }
}

/// RPC API definition for the mock ledger.
#[rpc(server)]
pub trait MockLedgerApi {
    // ============ Launch Methods ============

    /// Submit a sealed bid with escrow.
    #[method(name = "launch_submitBid")]
    async fn launch_submit_bid(
        &self,
        params: SubmitBidParams,
    ) -> Result<BidSubmission, ErrorObjectOwned>;

    /// Record a bidder's allocation (authority only).
    #[method(name = "launch_recordAllocation")]
    async fn launch_record_allocation(
        &self,
        params: RecordAllocationParams,
    ) -> Result<RecordOutcome, ErrorObjectOwned>;

    /// Finalize the launch (authority only).
    #[method(name = "launch_finalize")]
    async fn launch_finalize(&self, sender: String) -> Result<FinalizeOutcome, ErrorObjectOwned>;

    /// Claim the sender's allocation.
    #[method(name = "launch_claimTokens")]
    async fn launch_claim_tokens(&self, sender: String) -> Result<ClaimReceipt, ErrorObjectOwned>;

    // ============ Query Methods ============

    /// Get the launch.
    #[method(name = "query_getLaunch")]
    async fn query_get_launch(&self) -> Result<Option<Launch>, ErrorObjectOwned>;

    /// Get all bids in arrival order.
    #[method(name = "query_getBids")]
    async fn query_get_bids(&self) -> Result<Vec<Bid>, ErrorObjectOwned>;

    /// Get one bid.
    #[method(name = "query_getBid")]
    async fn query_get_bid(&self, bidder: String) -> Result<Option<Bid>, ErrorObjectOwned>;

    /// Get an associated token balance.
    #[method(name = "query_getTokenBalance")]
    async fn query_get_token_balance(
        &self,
        params: TokenBalanceParams,
    ) -> Result<u64, ErrorObjectOwned>;
}

/// Implementation of the mock ledger RPC server.
pub struct MockLedgerServer {
    state: Arc<RwLock<LedgerState>>,
}

impl MockLedgerServer {
    pub fn new(state: LedgerState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Shared handle to the ledger state.
    pub fn state(&self) -> Arc<RwLock<LedgerState>> {
        Arc::clone(&self.state)
    }

    /// Run one call as an atomic transaction.
    ///
    /// The call runs against a copy of the state; the copy replaces the live
    /// state only once its snapshot is written, so a failed write leaves
    /// both unchanged.
    fn execute(&self, sender: Address, call: LaunchCall) -> Result<CallOutcome, ErrorObjectOwned> {
        let mut state = self.state.write();
        let ctx = CallContext { sender };

        let mut next = state.program.clone();
        let outcome = dispatch(&mut next, &ctx, call).map_err(|e| {
            debug!(sender = %short_address(&sender), error = %e, "Call rejected");
            program_error(e)
        })?;

        state
            .write_snapshot(&next)
            .map_err(|e| internal_error(&format!("Failed to persist snapshot: {}", e)))?;
        state.program = next;
        Ok(outcome)
    }

    fn query(&self, query: LaunchQuery) -> LaunchQueryResponse {
        handle_query(&self.state.read().program, query)
    }
}

/// Error object carrying a program error in its `data` field.
pub fn program_error(err: ProgramError) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(PROGRAM_ERROR_CODE, err.to_string(), Some(err))
}

fn invalid_params(msg: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(INVALID_PARAMS_CODE, msg.to_string(), None::<()>)
}

fn internal_error(msg: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(INTERNAL_ERROR_CODE, msg.to_string(), None::<()>)
}

fn unexpected_outcome(outcome: CallOutcome) -> ErrorObjectOwned {
    internal_error(&format!("Unexpected call outcome: {:?}", outcome))
}

fn unexpected_response(response: LaunchQueryResponse) -> ErrorObjectOwned {
    internal_error(&format!("Unexpected query response: {:?}", response))
}

fn address_param(name: &str, value: &str) -> Result<Address, ErrorObjectOwned> {
    parse_address(value).map_err(|e| invalid_params(&format!("Invalid {}: {}", name, e)))
}

#[async_trait]
impl MockLedgerApiServer for MockLedgerServer {
    async fn launch_submit_bid(
        &self,
        params: SubmitBidParams,
    ) -> Result<BidSubmission, ErrorObjectOwned> {
        let sender = address_param("sender", &params.sender)?;
        let encrypted_payload = hex::decode(params.encrypted_payload.trim_start_matches("0x"))
            .map_err(|e| invalid_params(&format!("Invalid payload hex: {}", e)))?;

        let call = LaunchCall::SubmitBid {
            encrypted_payload,
            escrow_amount: params.escrow_amount,
        };
        match self.execute(sender, call)? {
            CallOutcome::BidSubmitted(submission) => {
                info!(
                    bidder = %short_address(&sender),
                    sequence = submission.bid.sequence,
                    created = submission.created,
                    "Bid submitted"
                );
                Ok(submission)
            }
            other => Err(unexpected_outcome(other)),
        }
    }

    async fn launch_record_allocation(
        &self,
        params: RecordAllocationParams,
    ) -> Result<RecordOutcome, ErrorObjectOwned> {
        let sender = address_param("sender", &params.sender)?;
        let bidder = address_param("bidder", &params.bidder)?;

        let call = LaunchCall::RecordAllocation {
            bidder,
            amount: params.amount,
            expected_tokens_distributed: params.expected_tokens_distributed,
        };
        match self.execute(sender, call)? {
            CallOutcome::AllocationRecorded(outcome) => {
                info!(bidder = %short_address(&bidder), amount = params.amount, ?outcome, "Allocation recorded");
                Ok(outcome)
            }
            other => Err(unexpected_outcome(other)),
        }
    }

    async fn launch_finalize(&self, sender: String) -> Result<FinalizeOutcome, ErrorObjectOwned> {
        let sender = address_param("sender", &sender)?;
        match self.execute(sender, LaunchCall::FinalizeLaunch)? {
            CallOutcome::Finalized(outcome) => {
                info!(?outcome, "Finalize requested");
                Ok(outcome)
            }
            other => Err(unexpected_outcome(other)),
        }
    }

    async fn launch_claim_tokens(&self, sender: String) -> Result<ClaimReceipt, ErrorObjectOwned> {
        let sender = address_param("sender", &sender)?;
        match self.execute(sender, LaunchCall::ClaimTokens)? {
            CallOutcome::Claimed(receipt) => {
                info!(bidder = %short_address(&sender), amount = receipt.amount, "Tokens claimed");
                Ok(receipt)
            }
            other => Err(unexpected_outcome(other)),
        }
    }

    async fn query_get_launch(&self) -> Result<Option<Launch>, ErrorObjectOwned> {
        match self.query(LaunchQuery::GetLaunch) {
            LaunchQueryResponse::Launch(launch) => Ok(launch),
            other => Err(unexpected_response(other)),
        }
    }

    async fn query_get_bids(&self) -> Result<Vec<Bid>, ErrorObjectOwned> {
        match self.query(LaunchQuery::GetBids) {
            LaunchQueryResponse::Bids(bids) => Ok(bids),
            other => Err(unexpected_response(other)),
        }
    }

    async fn query_get_bid(&self, bidder: String) -> Result<Option<Bid>, ErrorObjectOwned> {
        let bidder = address_param("bidder", &bidder)?;
        match self.query(LaunchQuery::GetBid { bidder }) {
            LaunchQueryResponse::Bid(bid) => Ok(bid),
            other => Err(unexpected_response(other)),
        }
    }

    async fn query_get_token_balance(
        &self,
        params: TokenBalanceParams,
    ) -> Result<u64, ErrorObjectOwned> {
        let owner = address_param("owner", &params.owner)?;
        let mint = address_param("mint", &params.mint)?;
        match self.query(LaunchQuery::GetTokenBalance { owner, mint }) {
            LaunchQueryResponse::TokenBalance(balance) => Ok(balance),
            other => Err(unexpected_response(other)),
        }
    }
}

/// Start the server on `addr`, returning its handle and bound address.
pub async fn start_server(
    addr: SocketAddr,
    state: LedgerState,
) -> anyhow::Result<(ServerHandle, SocketAddr)> {
    let server = Server::builder().build(addr).await?;
    let local_addr = server.local_addr()?;
    let handle = server.start(MockLedgerServer::new(state).into_rpc());
    Ok((handle, local_addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use launch_program::LaunchGenesisConfig;

    fn genesis_state() -> LaunchProgramState {
        LaunchGenesisConfig::new([1u8; 32], [2u8; 32], [3u8; 32], 100, 50)
            .build_state()
            .unwrap()
    }

    #[test]
    fn test_program_error_data_roundtrip() {
        let err = program_error(ProgramError::StaleBudget {
            expected: 1,
            actual: 2,
        });
        assert_eq!(err.code(), PROGRAM_ERROR_CODE);
        let data = err.data().unwrap();
        let decoded: ProgramError = serde_json::from_str(data.get()).unwrap();
        assert_eq!(
            decoded,
            ProgramError::StaleBudget {
                expected: 1,
                actual: 2
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_call_leaves_state_unchanged() {
        let server = MockLedgerServer::new(LedgerState::new(genesis_state()));
        let err = server
            .launch_record_allocation(RecordAllocationParams {
                sender: hex::encode([1u8; 32]),
                bidder: hex::encode([9u8; 32]),
                amount: 10,
                expected_tokens_distributed: 0,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), PROGRAM_ERROR_CODE);

        let launch = server.query_get_launch().await.unwrap().unwrap();
        assert_eq!(launch.tokens_distributed, 0);
    }

    #[tokio::test]
    async fn test_bad_address_is_invalid_params() {
        let server = MockLedgerServer::new(LedgerState::new(genesis_state()));
        let err = server.query_get_bid("xyz".into()).await.unwrap_err();
        assert_eq!(err.code(), INVALID_PARAMS_CODE);
    }

    #[tokio::test]
    async fn test_snapshot_written_after_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.snapshot");
        let server =
            MockLedgerServer::new(LedgerState::new(genesis_state()).with_snapshot(path.clone()));

        server.launch_finalize(hex::encode([1u8; 32])).await.unwrap();

        let restored = LedgerState::load_snapshot(&path).unwrap();
        assert!(restored.launch().unwrap().is_finalized);
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("ledger.snapshot");
        let server = MockLedgerServer::new(LedgerState::new(genesis_state()).with_snapshot(path));

        let err = server
            .launch_finalize(hex::encode([1u8; 32]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), INTERNAL_ERROR_CODE);

        let launch = server.query_get_launch().await.unwrap().unwrap();
        assert!(!launch.is_finalized);
    }

    #[tokio::test]
    async fn test_queries_read_bids_in_arrival_order() {
        let server = MockLedgerServer::new(LedgerState::new(genesis_state()));
        for bidder in [[7u8; 32], [5u8; 32]] {
            server
                .launch_submit_bid(SubmitBidParams {
                    sender: hex::encode(bidder),
                    encrypted_payload: hex::encode([0u8; 80]),
                    escrow_amount: 0,
                })
                .await
                .unwrap();
        }

        let bids = server.query_get_bids().await.unwrap();
        let bidders: Vec<Address> = bids.iter().map(|b| b.bidder).collect();
        assert_eq!(bidders, vec![[7u8; 32], [5u8; 32]]);

        let bid = server.query_get_bid(hex::encode([5u8; 32])).await.unwrap();
        assert_eq!(bid.map(|b| b.sequence), Some(1));
        assert!(server
            .query_get_bid(hex::encode([6u8; 32]))
            .await
            .unwrap()
            .is_none());
    }
}
