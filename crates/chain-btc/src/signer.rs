use std::collections::BTreeMap;

use bitcoin::secp256k1::{ecdsa, All, Message, PublicKey, Secp256k1, SecretKey};
use bitcoin::sighash::EcdsaSighashType;

use crate::error::BtcError;

/// Signs 32-byte digests with keys the core never sees.
///
/// `key_path` identifies the key to the implementation (typically a BIP32
/// derivation path); the core treats it as opaque.
pub trait HashSigner {
    /// DER-encoded ECDSA signature over `hash`, without a sighash type byte.
    fn sign_hash(&self, hash: &[u8; 32], key_path: &str) -> Result<Vec<u8>, BtcError>;

    /// Compressed public key for `key_path`.
    fn public_key(&self, key_path: &str) -> Result<Vec<u8>, BtcError>;
}

/// In-memory secp256k1 keys indexed by key path.
pub struct PrivateKeySigner {
    secp: Secp256k1<All>,
    keys: BTreeMap<String, SecretKey>,
}

impl PrivateKeySigner {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
            keys: BTreeMap::new(),
        }
    }

    /// Register a 32-byte private key under `key_path`.
    pub fn insert(&mut self, key_path: &str, private_key: &[u8]) -> Result<(), BtcError> {
        let secret_key = SecretKey::from_slice(private_key)
            .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid secret key: {e}")))?;
        self.keys.insert(key_path.to_string(), secret_key);
        Ok(())
    }

    pub fn with_key(mut self, key_path: &str, private_key: &[u8]) -> Result<Self, BtcError> {
        self.insert(key_path, private_key)?;
        Ok(self)
    }

    fn key(&self, key_path: &str) -> Result<&SecretKey, BtcError> {
        self.keys
            .get(key_path)
            .ok_or_else(|| BtcError::SigningError(format!("no key for path {key_path}")))
    }
}

impl Default for PrivateKeySigner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PrivateKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeySigner")
            .field("key_paths", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HashSigner for PrivateKeySigner {
    fn sign_hash(&self, hash: &[u8; 32], key_path: &str) -> Result<Vec<u8>, BtcError> {
        let msg = Message::from_digest(*hash);
        let signature = self.secp.sign_ecdsa(&msg, self.key(key_path)?);
        Ok(signature.serialize_der().to_vec())
    }

    fn public_key(&self, key_path: &str) -> Result<Vec<u8>, BtcError> {
        let pk = PublicKey::from_secret_key(&self.secp, self.key(key_path)?);
        Ok(pk.serialize().to_vec())
    }
}

/// Check a DER signature over `hash` against a serialized public key.
///
/// High-S signatures are accepted; they are normalized before verification
/// and again by [`encode_signature`].
pub fn verify_signature(hash: &[u8; 32], der_signature: &[u8], pubkey: &[u8]) -> Result<(), BtcError> {
    let mut signature = parse_der(der_signature)?;
    signature.normalize_s();
    let pubkey = PublicKey::from_slice(pubkey)
        .map_err(|e| BtcError::InvalidPublicKey(format!("failed to parse public key: {e}")))?;

    Secp256k1::verification_only()
        .verify_ecdsa(&Message::from_digest(*hash), &signature, &pubkey)
        .map_err(|e| BtcError::SigningError(format!("signature does not verify: {e}")))
}

/// Script-ready signature: low-S normalized DER followed by the sighash type byte.
pub fn encode_signature(der_signature: &[u8], sighash_type: EcdsaSighashType) -> Result<Vec<u8>, BtcError> {
    let mut signature = parse_der(der_signature)?;
    signature.normalize_s();
    Ok(bitcoin::ecdsa::Signature {
        signature,
        sighash_type,
    }
    .to_vec())
}

fn parse_der(der_signature: &[u8]) -> Result<ecdsa::Signature, BtcError> {
    ecdsa::Signature::from_der(der_signature)
        .map_err(|e| BtcError::SigningError(format!("malformed DER signature: {e}")))
}

/// Re-encode a DER signature with S replaced by n - S.
#[cfg(test)]
pub(crate) fn negate_s(der_signature: &[u8]) -> Vec<u8> {
    let mut compact = parse_der(der_signature).unwrap().serialize_compact();
    let s = SecretKey::from_slice(&compact[32..]).unwrap().negate();
    compact[32..].copy_from_slice(&s.secret_bytes());
    ecdsa::Signature::from_compact(&compact).unwrap().serialize_der().to_vec()
}
