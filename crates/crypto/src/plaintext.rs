//! Bid plaintext encoding: `ENCRYPTED:<decimal amount>`.

use rand::{CryptoRng, RngCore};

use crate::channel;
use crate::error::{CryptoError, PlaintextError};
use crypto_box::PublicKey;

/// Tag preceding the amount in every bid plaintext.
pub const BID_TAG: &str = "ENCRYPTED:";

/// Encode a bid amount as plaintext.
pub fn encode_bid_plaintext(amount: f64) -> String {
    format!("{}{}", BID_TAG, amount)
}

/// Decode a decrypted plaintext into a bid amount.
pub fn parse_bid_plaintext(plaintext: &[u8]) -> Result<f64, PlaintextError> {
    let text = std::str::from_utf8(plaintext).map_err(|_| PlaintextError::NotUtf8)?;
    let amount_str = text.strip_prefix(BID_TAG).ok_or(PlaintextError::MissingTag)?;

    let amount: f64 = amount_str
        .parse()
        .map_err(|_| PlaintextError::NotNumeric(amount_str.to_string()))?;

    if !amount.is_finite() || amount < 0.0 {
        return Err(PlaintextError::OutOfRange(amount));
    }

    Ok(amount)
}

/// Encode and seal a bid amount for the node in one step.
pub fn seal_bid_amount<R: RngCore + CryptoRng>(
    amount: f64,
    node_public_key: &PublicKey,
    rng: &mut R,
) -> Result<Vec<u8>, CryptoError> {
    channel::encrypt(encode_bid_plaintext(amount).as_bytes(), node_public_key, rng)
}
