use rand::RngCore;
use rand_core::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::hash::HashAlgorithm;

/// The preimage that unlocks the redeem branch of a swap script.
///
/// Zeroed when dropped. `Debug` never prints the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SwapSecret(Vec<u8>);

impl SwapSecret {
    /// Default secret size used by freshly generated secrets.
    pub const DEFAULT_LEN: usize = 32;

    /// Generate a secret of [`Self::DEFAULT_LEN`] bytes from the OS RNG.
    pub fn generate() -> Self {
        Self::generate_with_len(Self::DEFAULT_LEN)
    }

    /// Generate a secret of `len` bytes from the OS RNG.
    pub fn generate_with_len(len: usize) -> Self {
        let mut buf = vec![0u8; len];
        OsRng.fill_bytes(&mut buf);
        Self(buf)
    }

    /// Wrap existing secret bytes, e.g. a secret revealed on-chain by the
    /// counterparty.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.is_empty() {
            return Err(CryptoError::InvalidSecretLength {
                expected: Self::DEFAULT_LEN,
                actual: 0,
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hash the secret with `algorithm`, producing the value embedded in the
    /// swap script.
    pub fn hash(&self, algorithm: HashAlgorithm) -> Vec<u8> {
        algorithm.digest(&self.0)
    }

    /// Check whether this secret opens `secret_hash` under `algorithm`.
    pub fn matches(&self, algorithm: HashAlgorithm, secret_hash: &[u8]) -> bool {
        self.hash(algorithm) == secret_hash
    }
}

impl std::fmt::Debug for SwapSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SwapSecret([REDACTED; {}])", self.0.len())
    }
}

impl PartialEq for SwapSecret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for SwapSecret {}
