//! # crypto-utils
//!
//! Swap secret generation and the hash functions used by atomic-swap
//! scripts (SHA256, double SHA256 and HASH160).

pub mod error;
pub mod hash;
pub mod secret;

pub use error::CryptoError;
pub use hash::HashAlgorithm;
pub use secret::SwapSecret;
