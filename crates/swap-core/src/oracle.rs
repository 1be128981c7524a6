//! Signing oracle: the only component that touches private keys.

use async_trait::async_trait;
use chain_btc::signer::{HashSigner, PrivateKeySigner};

use crate::error::SwapError;

/// Signs digests on behalf of the core, typically in a separate process or
/// a hardware device. Implementations must serialize concurrent requests
/// for the same key if the backing signer is not thread-safe.
#[async_trait]
pub trait SigningOracle: Send + Sync {
    /// DER-encoded ECDSA signature over `hash` with the key at `key_path`.
    async fn sign_hash(&self, hash: [u8; 32], key_path: &str) -> Result<Vec<u8>, SwapError>;

    /// Compressed public key at `key_path`.
    async fn public_key(&self, key_path: &str) -> Result<Vec<u8>, SwapError>;
}

/// Oracle backed by in-memory keys.
#[derive(Debug, Default)]
pub struct LocalKeyOracle {
    signer: PrivateKeySigner,
}

impl LocalKeyOracle {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl SigningOracle for LocalKeyOracle {
    async fn sign_hash(&self, hash: [u8; 32], key_path: &str) -> Result<Vec<u8>, SwapError> {
        self.signer
            .sign_hash(&hash, key_path)
            .map_err(|e| SwapError::Oracle(e.to_string()))
    }

    async fn public_key(&self, key_path: &str) -> Result<Vec<u8>, SwapError> {
        self.signer
            .public_key(key_path)
            .map_err(|e| SwapError::Oracle(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_oracle_signs_with_registered_key() {
        let signer = PrivateKeySigner::new().with_key("m/0", &[0x01; 32]).unwrap();
        let oracle = LocalKeyOracle::new(signer);

        let hash = [0x09; 32];
        let sig = oracle.sign_hash(hash, "m/0").await.unwrap();
        let pk = oracle.public_key("m/0").await.unwrap();
        chain_btc::signer::verify_signature(&hash, &sig, &pk).unwrap();
    }

    #[tokio::test]
    async fn unknown_key_is_an_oracle_error() {
        let oracle = LocalKeyOracle::default();
        assert!(matches!(oracle.public_key("m/1").await, Err(SwapError::Oracle(_))));
    }
}
