//! # swap-core
//!
//! Asynchronous orchestration of BTC atomic swaps on top of `chain-btc`:
//! coin lookup and broadcast through a [`BlockchainSource`], signing through
//! a [`SigningOracle`], retries with cooperative cancellation, configuration
//! and logging setup.

pub mod config;
pub mod error;
pub mod logging;
pub mod oracle;
pub mod retry;
pub mod service;
pub mod source;

pub use config::SwapConfig;
pub use error::SwapError;
pub use oracle::{LocalKeyOracle, SigningOracle};
pub use service::{FundingAddress, SwapService, SwapTerms};
pub use source::{BlockchainSource, SourceError};
