use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

/// Hash functions a swap script may use to lock funds to a secret.
///
/// The variant decides both the opcode emitted into the script and the
/// length of the secret hash pushed next to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// Single SHA256 (`OP_SHA256`), 32-byte digest.
    Sha256,
    /// Double SHA256 (`OP_HASH256`), 32-byte digest.
    Hash256,
    /// RIPEMD160 of SHA256 (`OP_HASH160`), 20-byte digest.
    Hash160,
}

impl HashAlgorithm {
    /// Length in bytes of the digest produced by this algorithm.
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Sha256 | HashAlgorithm::Hash256 => 32,
            HashAlgorithm::Hash160 => 20,
        }
    }

    /// Hash `data` with this algorithm.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => sha256(data).to_vec(),
            HashAlgorithm::Hash256 => hash256(data).to_vec(),
            HashAlgorithm::Hash160 => hash160(data).to_vec(),
        }
    }

    /// Check that `hash` has the digest length this algorithm produces.
    pub fn check_len(self, hash: &[u8]) -> Result<(), CryptoError> {
        if hash.len() != self.digest_len() {
            return Err(CryptoError::InvalidHashLength {
                expected: self.digest_len(),
                actual: hash.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Sha256 => write!(f, "sha256"),
            HashAlgorithm::Hash256 => write!(f, "hash256"),
            HashAlgorithm::Hash160 => write!(f, "hash160"),
        }
    }
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA256(SHA256(data)), as computed by `OP_HASH256`.
pub fn hash256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// RIPEMD160(SHA256(data)), as computed by `OP_HASH160`.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty_vector() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hash256_empty_vector() {
        assert_eq!(
            hex::encode(hash256(b"")),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn hash160_of_generator_pubkey() {
        // Compressed secp256k1 generator point; its HASH160 is the witness
        // program of bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4.
        let pubkey =
            hex::decode("0279BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798")
                .unwrap();
        assert_eq!(
            hex::encode(hash160(&pubkey)),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn digest_lengths_match_algorithm() {
        for alg in [
            HashAlgorithm::Sha256,
            HashAlgorithm::Hash256,
            HashAlgorithm::Hash160,
        ] {
            assert_eq!(alg.digest(b"swap").len(), alg.digest_len());
        }
    }

    #[test]
    fn check_len_rejects_wrong_size() {
        assert!(HashAlgorithm::Hash160.check_len(&[0u8; 20]).is_ok());
        assert!(HashAlgorithm::Hash160.check_len(&[0u8; 32]).is_err());
        assert!(HashAlgorithm::Hash256.check_len(&[0u8; 20]).is_err());
    }

    #[test]
    fn display_names() {
        assert_eq!(HashAlgorithm::Sha256.to_string(), "sha256");
        assert_eq!(HashAlgorithm::Hash256.to_string(), "hash256");
        assert_eq!(HashAlgorithm::Hash160.to_string(), "hash160");
    }
}
