//! Confidential channel for sealed bids.
//!
//! Bidders seal their bid amount to the cypher node's public key; only the
//! node's secret key can open it.
//!
//! # Overview
//!
//! 1. **Identity**: The node holds a long-lived X25519 keypair
//!    ([`NodeKeypair`]) and publishes the public half.
//!
//! 2. **Sealing**: A bidder encodes `ENCRYPTED:<amount>` and encrypts it
//!    with a fresh ephemeral keypair and nonce ([`encrypt`]).
//!
//! 3. **Opening**: The node splits the payload, recomputes the shared key
//!    and verifies the Poly1305 tag before returning any plaintext
//!    ([`decrypt`]).

pub mod channel;
pub mod error;
pub mod keys;
pub mod plaintext;

pub use channel::{decrypt, encrypt, SealedPayload};
pub use crypto_box::{PublicKey, SecretKey};
pub use error::{CryptoError, PlaintextError};
pub use keys::{parse_public_key, NodeKeypair};
pub use plaintext::{encode_bid_plaintext, parse_bid_plaintext, seal_bid_amount};
