use chain_btc::BtcError;
use crypto_utils::CryptoError;
use thiserror::Error;

use crate::source::SourceError;

/// Errors surfaced by swap orchestration.
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("BTC: {0}")]
    Btc(#[from] BtcError),

    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),

    #[error("blockchain source: {0}")]
    Source(#[from] SourceError),

    #[error("signing oracle failed: {0}")]
    Oracle(String),

    /// The source accepted the request but returned no transaction id, or
    /// rejected the transaction.
    #[error("transaction broadcast failed: {0}")]
    TransactionBroadcast(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SwapError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SwapError::Source(e) if e.is_transient())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btc_errors_keep_their_message() {
        let err: SwapError = BtcError::InsufficientFunds {
            needed: 10,
            available: 5,
        }
        .into();
        assert_eq!(err.to_string(), "BTC: insufficient funds: need 10 sat, have 5 sat");
    }

    #[test]
    fn only_transient_source_errors_are_transient() {
        assert!(SwapError::from(SourceError::Transient("timeout".into())).is_transient());
        assert!(!SwapError::from(SourceError::Rejected("bad tx".into())).is_transient());
        assert!(!SwapError::Cancelled.is_transient());
    }

    #[test]
    fn display_broadcast() {
        let err = SwapError::TransactionBroadcast("no txid returned".into());
        assert_eq!(err.to_string(), "transaction broadcast failed: no txid returned");
    }
}
