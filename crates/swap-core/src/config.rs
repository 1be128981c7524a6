//! Swap settings, loaded from JSON. Missing fields take their defaults.

use std::path::Path;
use std::time::Duration;

use bitcoin::{Amount, FeeRate};
use chain_btc::fee::DEFAULT_DUST_THRESHOLD;
use chain_btc::script::SwapOutputKind;
use chain_btc::selection::FeePolicy;
use chain_btc::send::DustUsagePolicy;
use chain_btc::BtcNetwork;
use serde::{Deserialize, Serialize};

use crate::error::SwapError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeMode {
    /// Pay per virtual byte.
    #[default]
    Rate,
    /// Pay a constant fee.
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    pub mode: FeeMode,
    /// Rate in sat/vB; `None` asks the blockchain source for an estimate.
    pub sat_per_vbyte: Option<u64>,
    pub fixed_fee_sat: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            mode: FeeMode::Rate,
            sat_per_vbyte: None,
            fixed_fee_sat: 1_000,
        }
    }
}

impl FeeConfig {
    /// Fee policy when it does not depend on a live estimate.
    pub fn static_policy(&self) -> Option<FeePolicy> {
        match self.mode {
            FeeMode::Fixed => Some(FeePolicy::Fixed(Amount::from_sat(self.fixed_fee_sat))),
            FeeMode::Rate => self
                .sat_per_vbyte
                .and_then(FeeRate::from_sat_per_vb)
                .map(FeePolicy::Rate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: usize,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 500,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    pub network: BtcNetwork,
    pub dust_threshold_sat: u64,
    pub fee: FeeConfig,
    pub output_kind: SwapOutputKind,
    /// Minimum distance between the swap start and the counterparty's
    /// refund lock time.
    pub min_refund_lock_time_secs: u64,
    pub dust_policy: DustUsagePolicy,
    pub retry: RetryConfig,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            network: BtcNetwork::Testnet,
            dust_threshold_sat: DEFAULT_DUST_THRESHOLD.to_sat(),
            fee: FeeConfig::default(),
            output_kind: SwapOutputKind::P2sh,
            min_refund_lock_time_secs: 12 * 60 * 60,
            dust_policy: DustUsagePolicy::Warning,
            retry: RetryConfig::default(),
        }
    }
}

impl SwapConfig {
    pub fn from_json(json: &str) -> Result<Self, SwapError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SwapError::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SwapError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SwapError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), SwapError> {
        if self.dust_threshold_sat == 0 {
            return Err(SwapError::Config("dust_threshold_sat must be positive".into()));
        }
        if self.retry.attempts == 0 {
            return Err(SwapError::Config("retry.attempts must be at least 1".into()));
        }
        if self.fee.mode == FeeMode::Rate && self.fee.sat_per_vbyte == Some(0) {
            return Err(SwapError::Config("fee.sat_per_vbyte must be positive".into()));
        }
        Ok(())
    }

    pub fn dust(&self) -> Amount {
        Amount::from_sat(self.dust_threshold_sat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = SwapConfig::from_json("{}").unwrap();
        assert_eq!(config, SwapConfig::default());
        assert_eq!(config.dust(), Amount::from_sat(546));
        assert_eq!(config.fee.static_policy(), None);
    }

    #[test]
    fn partial_config_overrides_fields() {
        let config = SwapConfig::from_json(
            r#"{
                "network": "regtest",
                "output_kind": "p2wsh",
                "dust_policy": "add_to_fee",
                "fee": { "mode": "fixed", "fixed_fee_sat": 2500 },
                "retry": { "attempts": 5 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.network, BtcNetwork::Regtest);
        assert_eq!(config.output_kind, SwapOutputKind::P2wsh);
        assert_eq!(config.dust_policy, DustUsagePolicy::AddToFee);
        assert_eq!(config.fee.static_policy(), Some(FeePolicy::Fixed(Amount::from_sat(2_500))));
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.delay_ms, 500);
    }

    #[test]
    fn configured_rate_becomes_a_rate_policy() {
        let config = SwapConfig::from_json(r#"{ "fee": { "sat_per_vbyte": 7 } }"#).unwrap();
        assert_eq!(
            config.fee.static_policy(),
            Some(FeePolicy::Rate(FeeRate::from_sat_per_vb(7).unwrap()))
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            SwapConfig::from_json(r#"{ "retry": { "attempts": 0 } }"#),
            Err(SwapError::Config(_))
        ));
        assert!(matches!(
            SwapConfig::from_json(r#"{ "dust_threshold_sat": 0 }"#),
            Err(SwapError::Config(_))
        ));
        assert!(matches!(
            SwapConfig::from_json(r#"{ "network": "moon" }"#),
            Err(SwapError::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(matches!(
            SwapConfig::load("/nonexistent/swap.json"),
            Err(SwapError::Config(_))
        ));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = SwapConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(SwapConfig::from_json(&json).unwrap(), config);
    }
}
