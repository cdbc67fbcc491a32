//! Cypher node identity.
//!
//! The secret key file is a JSON array of the 32 secret key bytes, the same
//! layout the node has always written.

use std::fs;
use std::path::Path;

use crypto_box::{PublicKey, SecretKey};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::channel::PUBLIC_KEY_LEN;
use crate::error::CryptoError;

/// The node's long-lived X25519 keypair.
#[derive(Clone)]
pub struct NodeKeypair {
    secret: SecretKey,
    public: PublicKey,
}

impl std::fmt::Debug for NodeKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeKeypair")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl NodeKeypair {
    /// Generate a new keypair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = SecretKey::generate(rng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Rebuild a keypair from its secret key bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Hex form of the public key, as handed to bidders.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.as_bytes())
    }

    /// Load the keypair at `path`, creating and saving a new one if the file
    /// does not exist. Returns the keypair and whether it was generated.
    pub fn load_or_generate<R: RngCore + CryptoRng>(
        path: &Path,
        rng: &mut R,
    ) -> Result<(Self, bool), CryptoError> {
        if path.exists() {
            return Ok((Self::load(path)?, false));
        }
        let keypair = Self::generate(rng);
        keypair.save(path)?;
        Ok((keypair, true))
    }

    /// Load a keypair from a secret key file.
    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let data = Zeroizing::new(
            fs::read_to_string(path).map_err(|e| CryptoError::KeyFile(e.to_string()))?,
        );
        let bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
            serde_json::from_str(&data).map_err(|e| CryptoError::KeyFile(e.to_string()))?,
        );
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self::from_secret_bytes(secret))
    }

    /// Write the secret key file.
    pub fn save(&self, path: &Path) -> Result<(), CryptoError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CryptoError::KeyFile(e.to_string()))?;
        }
        let bytes = Zeroizing::new(self.secret.to_bytes().to_vec());
        let data = Zeroizing::new(
            serde_json::to_string(&*bytes).map_err(|e| CryptoError::KeyFile(e.to_string()))?,
        );
        fs::write(path, data.as_bytes()).map_err(|e| CryptoError::KeyFile(e.to_string()))
    }
}

/// Parse a hex-encoded node public key.
pub fn parse_public_key(hex_str: &str) -> Result<PublicKey, CryptoError> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x"))
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let bytes: [u8; PUBLIC_KEY_LEN] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    Ok(PublicKey::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_load_or_generate_persists_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node").join("keypair.json");

        let (first, generated) = NodeKeypair::load_or_generate(&path, &mut OsRng).unwrap();
        assert!(generated);
        assert!(path.exists());

        let (second, generated) = NodeKeypair::load_or_generate(&path, &mut OsRng).unwrap();
        assert!(!generated);
        assert_eq!(first.public_key(), second.public_key());
    }

    #[test]
    fn test_load_rejects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.json");
        fs::write(&path, "[1,2,3]").unwrap();

        assert!(matches!(
            NodeKeypair::load(&path),
            Err(CryptoError::InvalidSecretKey)
        ));
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let keypair = NodeKeypair::generate(&mut OsRng);
        let parsed = parse_public_key(&keypair.public_key_hex()).unwrap();
        assert_eq!(&parsed, keypair.public_key());

        assert!(parse_public_key("abcd").is_err());
    }
}
