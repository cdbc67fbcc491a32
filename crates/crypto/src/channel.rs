//! Authenticated public-key channel from bidders to the cypher node.
//!
//! This is the NaCl `crypto_box` construction (X25519 key agreement with
//! XSalsa20-Poly1305), byte-compatible with tweetnacl's `nacl.box`.
//!
//! # Payload format
//!
//! ```text
//! [ nonce (24) ][ sender ephemeral public key (32) ][ ciphertext + tag (16+) ]
//! ```
//!
//! The sender's keypair is generated per message from the caller's rng, so
//! a payload plus the node's secret key is all that is needed to open it.

use crypto_box::{
    aead::{generic_array::GenericArray, Aead},
    PublicKey, SalsaBox, SecretKey,
};
use rand::{CryptoRng, RngCore};

use crate::error::CryptoError;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 24;

/// X25519 public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Poly1305 tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Length of the nonce and sender key prefix.
pub const HEADER_LEN: usize = NONCE_LEN + PUBLIC_KEY_LEN;

/// Smallest well-formed payload (empty plaintext).
pub const MIN_PAYLOAD_LEN: usize = HEADER_LEN + TAG_LEN;

/// A payload split into its parts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedPayload {
    pub nonce: [u8; NONCE_LEN],
    pub sender_public_key: [u8; PUBLIC_KEY_LEN],
    /// Box output, tag included
    pub ciphertext: Vec<u8>,
}

impl SealedPayload {
    /// Split raw payload bytes. Rejects anything shorter than
    /// [`MIN_PAYLOAD_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_PAYLOAD_LEN {
            return Err(CryptoError::MalformedPayload {
                len: bytes.len(),
                min: MIN_PAYLOAD_LEN,
            });
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);
        let mut sender_public_key = [0u8; PUBLIC_KEY_LEN];
        sender_public_key.copy_from_slice(&bytes[NONCE_LEN..HEADER_LEN]);

        Ok(Self {
            nonce,
            sender_public_key,
            ciphertext: bytes[HEADER_LEN..].to_vec(),
        })
    }

    /// Concatenate into wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.sender_public_key);
        out.extend_from_slice(&self.ciphertext);
        out
    }
}

/// Encrypt `plaintext` for the holder of `recipient`'s secret key.
///
/// A fresh ephemeral keypair and nonce are drawn from `rng` on every call.
pub fn encrypt<R: RngCore + CryptoRng>(
    plaintext: &[u8],
    recipient: &PublicKey,
    rng: &mut R,
) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = SecretKey::generate(rng);

    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let salsa_box = SalsaBox::new(recipient, &ephemeral);
    let ciphertext = salsa_box
        .encrypt(GenericArray::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(SealedPayload {
        nonce,
        sender_public_key: *ephemeral.public_key().as_bytes(),
        ciphertext,
    }
    .to_bytes())
}

/// Open a payload with the recipient's secret key.
///
/// Fails closed: short input is `MalformedPayload`, a bad tag (wrong key,
/// tampering, truncation) is `AuthenticationFailed`.
pub fn decrypt(payload: &[u8], recipient: &SecretKey) -> Result<Vec<u8>, CryptoError> {
    let sealed = SealedPayload::from_bytes(payload)?;
    let sender = PublicKey::from(sealed.sender_public_key);

    let salsa_box = SalsaBox::new(&sender, recipient);
    salsa_box
        .decrypt(GenericArray::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
        .map_err(|_| CryptoError::AuthenticationFailed)
}
