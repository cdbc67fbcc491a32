//! Opening sealed bids.
//!
//! A bid that cannot be opened is never an error for the batch: it is
//! forfeited with a zero allocation and still marked processed.

use launch_crypto::{decrypt, parse_bid_plaintext, CryptoError, PlaintextError, SecretKey};
use launch_types::{short_address, Address, Bid};
use thiserror::Error;
use tracing::warn;

/// Why a bid was forfeited.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForfeitReason {
    #[error("payload too short ({len} bytes)")]
    MalformedPayload { len: usize },

    #[error("payload failed authentication")]
    AuthenticationFailed,

    #[error("unusable plaintext: {0}")]
    Plaintext(#[from] PlaintextError),
}

impl From<CryptoError> for ForfeitReason {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MalformedPayload { len, .. } => ForfeitReason::MalformedPayload { len },
            _ => ForfeitReason::AuthenticationFailed,
        }
    }
}

/// A bid after decryption.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedBid {
    pub bidder: Address,
    pub sequence: u64,
    pub amount: Result<f64, ForfeitReason>,
}

impl OpenedBid {
    pub fn is_forfeited(&self) -> bool {
        self.amount.is_err()
    }
}

/// Decrypt and parse a single bid.
pub fn open_bid(bid: &Bid, secret_key: &SecretKey) -> OpenedBid {
    let amount = decrypt(&bid.encrypted_payload, secret_key)
        .map_err(ForfeitReason::from)
        .and_then(|plaintext| parse_bid_plaintext(&plaintext).map_err(ForfeitReason::from));

    if let Err(reason) = &amount {
        warn!(
            bidder = %short_address(&bid.bidder),
            sequence = bid.sequence,
            %reason,
            "Forfeiting bid"
        );
    }

    OpenedBid {
        bidder: bid.bidder,
        sequence: bid.sequence,
        amount,
    }
}

/// Open every bid, preserving input order.
pub fn open_bids<'a>(
    bids: impl IntoIterator<Item = &'a Bid>,
    secret_key: &SecretKey,
) -> Vec<OpenedBid> {
    bids.into_iter().map(|bid| open_bid(bid, secret_key)).collect()
}
