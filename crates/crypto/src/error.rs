//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur on the confidential channel.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Malformed payload: {len} bytes is shorter than the {min} byte minimum")]
    MalformedPayload { len: usize, min: usize },

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Invalid public key encoding")]
    InvalidPublicKey,

    #[error("Invalid secret key encoding")]
    InvalidSecretKey,

    #[error("Key file error: {0}")]
    KeyFile(String),
}

/// Errors from decoding a decrypted bid plaintext.
///
/// These are scoring failures, not channel failures: the payload
/// authenticated but its content is not a usable bid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaintextError {
    #[error("Plaintext is not valid UTF-8")]
    NotUtf8,

    #[error("Plaintext is missing the bid tag")]
    MissingTag,

    #[error("Bid amount is not a number: {0:?}")]
    NotNumeric(String),

    #[error("Bid amount must be finite and non-negative, got {0}")]
    OutOfRange(f64),
}
