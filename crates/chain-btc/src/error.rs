use bitcoin::OutPoint;
use thiserror::Error;

/// Bitcoin chain operation errors.
#[derive(Debug, Error)]
pub enum BtcError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    #[error("malformed script: {0}")]
    MalformedScript(String),

    /// The amount, or the change it leaves behind, is below the dust
    /// threshold.
    #[error("insufficient amount: {amount} sat is below dust threshold {dust} sat")]
    InsufficientAmount { amount: u64, dust: u64 },

    #[error("insufficient funds: need {needed} sat, have {available} sat")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("transaction verification failed: {}", .0.join("; "))]
    TransactionVerification(Vec<String>),

    #[error("no matching input for coin {0}")]
    NoMatchingInput(OutPoint),

    #[error("transaction is immutable once broadcast")]
    TransactionImmutable,

    #[error(
        "invalid refund lock time: lock time {lock_time} leaves less than {minimum}s after swap timestamp {swap_timestamp}"
    )]
    InvalidRefundLockTime {
        lock_time: u32,
        swap_timestamp: u64,
        minimum: u64,
    },

    #[error("invalid swap payment amount: output holds {value} sat, required {required} sat")]
    InvalidSwapPaymentAmount { value: u64, required: u64 },
}

impl BtcError {
    pub(crate) fn verification(reason: impl Into<String>) -> Self {
        BtcError::TransactionVerification(vec![reason.into()])
    }
}

impl From<crypto_utils::CryptoError> for BtcError {
    fn from(e: crypto_utils::CryptoError) -> Self {
        BtcError::InvalidArgument(e.to_string())
    }
}
