//! Blockchain data the swap core reads from and publishes to.

use async_trait::async_trait;
use bitcoin::{FeeRate, Transaction, Txid};
use chain_btc::utxo::UnspentOutput;
use thiserror::Error;

/// Failure reported by a [`BlockchainSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Connection or server trouble; the same request may succeed later.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Definitive answer, e.g. a transaction rejected by the network.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

/// Access to a Bitcoin node or indexer.
#[async_trait]
pub trait BlockchainSource: Send + Sync {
    /// Unspent outputs paying to `address`.
    async fn get_unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>, SourceError>;

    /// Current fee rate estimate.
    async fn get_fee_rate(&self) -> Result<FeeRate, SourceError>;

    /// Publish `tx`. `Ok(None)` means the request went through but no
    /// transaction id came back.
    async fn broadcast(&self, tx: &Transaction) -> Result<Option<Txid>, SourceError>;

    async fn get_transaction(&self, txid: &Txid) -> Result<Option<Transaction>, SourceError>;
}
