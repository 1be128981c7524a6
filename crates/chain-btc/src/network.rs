use bitcoin::Network;
use serde::{Deserialize, Serialize};

/// Supported Bitcoin networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BtcNetwork {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl BtcNetwork {
    /// Convert to the `bitcoin` crate's `Network` type.
    pub fn to_bitcoin_network(self) -> Network {
        match self {
            BtcNetwork::Mainnet => Network::Bitcoin,
            BtcNetwork::Testnet => Network::Testnet,
            BtcNetwork::Signet => Network::Signet,
            BtcNetwork::Regtest => Network::Regtest,
        }
    }

    /// Version byte of legacy pay-to-pubkey-hash addresses on this network.
    pub fn pubkey_address_prefix(self) -> u8 {
        match self {
            BtcNetwork::Mainnet => 0x00,
            BtcNetwork::Testnet | BtcNetwork::Signet | BtcNetwork::Regtest => 0x6f,
        }
    }

    /// Version byte of pay-to-script-hash addresses on this network.
    pub fn script_address_prefix(self) -> u8 {
        match self {
            BtcNetwork::Mainnet => 0x05,
            BtcNetwork::Testnet | BtcNetwork::Signet | BtcNetwork::Regtest => 0xc4,
        }
    }
}

impl std::fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BtcNetwork::Mainnet => write!(f, "mainnet"),
            BtcNetwork::Testnet => write!(f, "testnet"),
            BtcNetwork::Signet => write!(f, "signet"),
            BtcNetwork::Regtest => write!(f, "regtest"),
        }
    }
}

impl std::str::FromStr for BtcNetwork {
    type Err = crate::error::BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" | "bitcoin" => Ok(BtcNetwork::Mainnet),
            "testnet" => Ok(BtcNetwork::Testnet),
            "signet" => Ok(BtcNetwork::Signet),
            "regtest" => Ok(BtcNetwork::Regtest),
            other => Err(crate::error::BtcError::InvalidNetwork(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_converts_to_bitcoin_network() {
        assert_eq!(BtcNetwork::Mainnet.to_bitcoin_network(), Network::Bitcoin);
    }

    #[test]
    fn regtest_converts_to_bitcoin_network() {
        assert_eq!(BtcNetwork::Regtest.to_bitcoin_network(), Network::Regtest);
    }

    #[test]
    fn address_prefixes() {
        assert_eq!(BtcNetwork::Mainnet.pubkey_address_prefix(), 0x00);
        assert_eq!(BtcNetwork::Mainnet.script_address_prefix(), 0x05);
        assert_eq!(BtcNetwork::Testnet.pubkey_address_prefix(), 0x6f);
        assert_eq!(BtcNetwork::Testnet.script_address_prefix(), 0xc4);
    }

    #[test]
    fn display_and_parse_roundtrip() {
        for net in [
            BtcNetwork::Mainnet,
            BtcNetwork::Testnet,
            BtcNetwork::Signet,
            BtcNetwork::Regtest,
        ] {
            assert_eq!(net.to_string().parse::<BtcNetwork>().unwrap(), net);
        }
    }

    #[test]
    fn parse_unknown_network_fails() {
        assert!("litecoin".parse::<BtcNetwork>().is_err());
    }
}
