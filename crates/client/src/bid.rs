//! Bid sealing.

use rand::{CryptoRng, RngCore};
use thiserror::Error;

use launch_crypto::{seal_bid_amount, CryptoError, PublicKey};

/// Errors that can occur during bid creation.
#[derive(Debug, Error)]
pub enum BidError {
    #[error("Bid amount must be finite and non-negative, got {0}")]
    InvalidAmount(f64),

    #[error("Encryption failed: {0}")]
    Encryption(#[from] CryptoError),
}

/// A sealed bid ready for submission.
#[derive(Debug, Clone)]
pub struct PreparedBid {
    /// Confidential channel payload for the ledger
    pub encrypted_payload: Vec<u8>,
    /// Payment tokens to escrow (public)
    pub escrow_amount: u64,
    /// The bid amount (keep secret)
    pub amount: f64,
}

/// Seal a bid amount to the cypher node's public key.
///
/// # Arguments
/// * `node_public_key` - The cypher node's X25519 public key
/// * `amount` - The bid amount
/// * `escrow_amount` - Payment tokens moved into the vault on submission
/// * `rng` - Cryptographically secure random number generator
pub fn prepare_bid<R: RngCore + CryptoRng>(
    node_public_key: &PublicKey,
    amount: f64,
    escrow_amount: u64,
    rng: &mut R,
) -> Result<PreparedBid, BidError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(BidError::InvalidAmount(amount));
    }

    let encrypted_payload = seal_bid_amount(amount, node_public_key, rng)?;

    Ok(PreparedBid {
        encrypted_payload,
        escrow_amount,
        amount,
    })
}

/// Builder for creating bids with additional options.
pub struct BidBuilder {
    node_public_key: PublicKey,
    amount: f64,
    escrow_amount: u64,
}

impl BidBuilder {
    /// Create a new bid builder.
    pub fn new(node_public_key: PublicKey) -> Self {
        Self {
            node_public_key,
            amount: 0.0,
            escrow_amount: 0,
        }
    }

    /// Set the bid amount.
    pub fn amount(mut self, amount: f64) -> Self {
        self.amount = amount;
        self
    }

    /// Set the escrow amount.
    pub fn escrow(mut self, escrow_amount: u64) -> Self {
        self.escrow_amount = escrow_amount;
        self
    }

    /// Build the prepared bid.
    pub fn build<R: RngCore + CryptoRng>(self, rng: &mut R) -> Result<PreparedBid, BidError> {
        prepare_bid(&self.node_public_key, self.amount, self.escrow_amount, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launch_crypto::{decrypt, parse_bid_plaintext, NodeKeypair};
    use rand::rngs::OsRng;

    #[test]
    fn test_prepare_bid_opens_for_node() {
        let mut rng = OsRng;
        let node = NodeKeypair::generate(&mut rng);

        let bid = prepare_bid(node.public_key(), 1234.5, 10, &mut rng).unwrap();
        assert_eq!(bid.escrow_amount, 10);

        let plaintext = decrypt(&bid.encrypted_payload, node.secret_key()).unwrap();
        assert_eq!(parse_bid_plaintext(&plaintext), Ok(1234.5));
    }

    #[test]
    fn test_bid_builder() {
        let mut rng = OsRng;
        let node = NodeKeypair::generate(&mut rng);

        let bid = BidBuilder::new(node.public_key().clone())
            .amount(500.0)
            .escrow(25)
            .build(&mut rng)
            .unwrap();

        assert_eq!(bid.amount, 500.0);
        assert_eq!(bid.escrow_amount, 25);
    }

    #[test]
    fn test_rejects_negative_amount() {
        let node = NodeKeypair::generate(&mut OsRng);
        assert!(matches!(
            prepare_bid(node.public_key(), -1.0, 0, &mut OsRng),
            Err(BidError::InvalidAmount(_))
        ));
    }
}
