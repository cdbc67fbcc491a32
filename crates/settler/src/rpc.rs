//! JSON-RPC ledger adapter for the mock ledger service.

use std::time::Duration;

use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::ClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use launch_program::ProgramError;
use launch_types::rpc::{
    RecordAllocationParams, SubmitBidParams, TokenBalanceParams, PROGRAM_ERROR_CODE,
};
use launch_types::{Address, Bid, BidSubmission, ClaimReceipt, FinalizeOutcome, Launch, RecordOutcome};
use tracing::debug;

use crate::ledger::{LaunchLedger, LedgerError};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Ledger adapter speaking JSON-RPC over HTTP.
#[derive(Clone)]
pub struct RpcLedger {
    client: HttpClient,
    authority: Address,
    request_timeout: Duration,
}

impl RpcLedger {
    /// Connect to `endpoint`, signing authority calls as `authority`.
    pub fn new(endpoint: &str, authority: Address) -> Result<Self, LedgerError> {
        Self::with_timeout(endpoint, authority, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: &str,
        authority: Address,
        request_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let client = HttpClientBuilder::default()
            .request_timeout(request_timeout)
            .build(endpoint)
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            authority,
            request_timeout,
        })
    }

    /// Balance of `owner`'s associated token account for `mint`.
    pub async fn token_balance(&self, owner: &Address, mint: &Address) -> Result<u64, LedgerError> {
        let params = TokenBalanceParams {
            owner: hex::encode(owner),
            mint: hex::encode(mint),
        };
        self.client
            .request("query_getTokenBalance", vec![params])
            .await
            .map_err(|e| self.map_error(e))
    }

    fn map_error(&self, err: ClientError) -> LedgerError {
        match err {
            ClientError::Call(obj) => {
                if obj.code() == PROGRAM_ERROR_CODE {
                    if let Some(data) = obj.data() {
                        if let Ok(program_error) = serde_json::from_str::<ProgramError>(data.get())
                        {
                            return LedgerError::Program(program_error);
                        }
                    }
                }
                LedgerError::InvalidResponse(obj.message().to_string())
            }
            ClientError::RequestTimeout => LedgerError::Timeout(self.request_timeout),
            ClientError::ParseError(e) => LedgerError::InvalidResponse(e.to_string()),
            other => LedgerError::Transport(other.to_string()),
        }
    }
}

#[async_trait]
impl LaunchLedger for RpcLedger {
    async fn fetch_launch(&self) -> Result<Launch, LedgerError> {
        let launch: Option<Launch> = self
            .client
            .request("query_getLaunch", Vec::<()>::new())
            .await
            .map_err(|e| self.map_error(e))?;
        launch.ok_or(LedgerError::Program(ProgramError::LaunchNotInitialized))
    }

    async fn fetch_bids(&self) -> Result<Vec<Bid>, LedgerError> {
        self.client
            .request("query_getBids", Vec::<()>::new())
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn fetch_bid(&self, bidder: &Address) -> Result<Option<Bid>, LedgerError> {
        self.client
            .request("query_getBid", vec![hex::encode(bidder)])
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn record_allocation(
        &self,
        bidder: &Address,
        amount: u64,
        expected_tokens_distributed: u64,
    ) -> Result<RecordOutcome, LedgerError> {
        let params = RecordAllocationParams {
            sender: hex::encode(self.authority),
            bidder: hex::encode(bidder),
            amount,
            expected_tokens_distributed,
        };
        debug!(bidder = %hex::encode(bidder), amount, "Sending launch_recordAllocation");
        self.client
            .request("launch_recordAllocation", vec![params])
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn finalize_launch(&self) -> Result<FinalizeOutcome, LedgerError> {
        self.client
            .request("launch_finalize", vec![hex::encode(self.authority)])
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn claim_tokens(&self, bidder: &Address) -> Result<ClaimReceipt, LedgerError> {
        self.client
            .request("launch_claimTokens", vec![hex::encode(bidder)])
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn submit_bid(
        &self,
        bidder: &Address,
        encrypted_payload: Vec<u8>,
        escrow_amount: u64,
    ) -> Result<BidSubmission, LedgerError> {
        let params = SubmitBidParams {
            sender: hex::encode(bidder),
            encrypted_payload: hex::encode(encrypted_payload),
            escrow_amount,
        };
        self.client
            .request("launch_submitBid", vec![params])
            .await
            .map_err(|e| self.map_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::types::ErrorObjectOwned;

    fn ledger() -> RpcLedger {
        RpcLedger::new("http://127.0.0.1:1", [1u8; 32]).unwrap()
    }

    #[test]
    fn test_program_error_travels_in_data() {
        let err = ErrorObjectOwned::owned(
            PROGRAM_ERROR_CODE,
            "Stale budget",
            Some(ProgramError::StaleBudget {
                expected: 0,
                actual: 10,
            }),
        );
        let mapped = ledger().map_error(ClientError::Call(err));
        assert_eq!(
            mapped,
            LedgerError::Program(ProgramError::StaleBudget {
                expected: 0,
                actual: 10
            })
        );
    }

    #[test]
    fn test_error_without_program_data() {
        let err = ErrorObjectOwned::owned(-32602, "Invalid params", None::<()>);
        assert!(matches!(
            ledger().map_error(ClientError::Call(err)),
            LedgerError::InvalidResponse(_)
        ));
        assert!(ledger().map_error(ClientError::RequestTimeout).is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let err = ledger().fetch_launch().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
