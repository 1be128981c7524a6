//! Bitcoin chain support for atomic swaps.
//!
//! Provides the swap script templates, UTXO classification, fee and coin
//! selection, a transaction wrapper with signing and policy verification,
//! the swap transaction factory and the counterparty payment verifier.
//! Everything in this crate is synchronous and free of I/O.

pub mod address;
pub mod error;
pub mod fee;
pub mod network;
pub mod script;
pub mod selection;
pub mod send;
pub mod signer;
pub mod swap;
pub mod transaction;
pub mod utxo;
pub mod verifier;

pub use error::BtcError;
pub use network::BtcNetwork;
