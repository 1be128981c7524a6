use bitcoin::address::{Address, NetworkUnchecked};
use bitcoin::hashes::Hash;
use bitcoin::script::{Script, ScriptBuf};
use bitcoin::{CompressedPublicKey, PubkeyHash, ScriptHash, WPubkeyHash, WScriptHash};
use serde::{Deserialize, Serialize};

use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::script::SwapOutputKind;

/// Address flavours the codec can encode a hash into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    /// Base58 pay-to-pubkey-hash.
    Legacy,
    /// Base58 pay-to-script-hash.
    ScriptHash,
    /// Bech32 segwit v0 (P2WPKH for 20-byte hashes, P2WSH for 32-byte hashes).
    Segwit,
}

/// Parse `address` and require it to belong to `network`.
pub fn parse_address(address: &str, network: BtcNetwork) -> Result<Address, BtcError> {
    address
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BtcError::InvalidAddress(format!("failed to parse address {address}: {e}")))?
        .require_network(network.to_bitcoin_network())
        .map_err(|e| BtcError::InvalidAddress(format!("address {address} wrong network: {e}")))
}

/// Locking script paying to `address`.
pub fn script_pubkey_for(address: &str, network: BtcNetwork) -> Result<ScriptBuf, BtcError> {
    Ok(parse_address(address, network)?.script_pubkey())
}

/// An address taken apart into its hash and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAddress {
    pub kind: AddressKind,
    /// Base58 version byte for legacy and script-hash addresses, witness
    /// version for segwit addresses.
    pub version: u8,
    /// Public key hash or script hash the address locks to.
    pub hash: Vec<u8>,
}

/// Decode `address` into its locking-script hash and version byte.
pub fn decode_address(address: &str, network: BtcNetwork) -> Result<DecodedAddress, BtcError> {
    let script = script_pubkey_for(address, network)?;
    let bytes = script.as_bytes();

    let (kind, version, hash) = if script.is_p2pkh() {
        (AddressKind::Legacy, network.pubkey_address_prefix(), &bytes[3..23])
    } else if script.is_p2sh() {
        (AddressKind::ScriptHash, network.script_address_prefix(), &bytes[2..22])
    } else if script.is_p2wpkh() || script.is_p2wsh() {
        (AddressKind::Segwit, 0, &bytes[2..])
    } else {
        return Err(BtcError::InvalidAddress(format!(
            "address {address} has no supported hash form"
        )));
    };

    Ok(DecodedAddress {
        kind,
        version,
        hash: hash.to_vec(),
    })
}

/// Decode an address into the 20-byte public key hash it locks to.
///
/// Accepts legacy P2PKH and native segwit P2WPKH addresses; both commit to
/// HASH160 of the owner's compressed public key.
pub fn decode_pubkey_hash(address: &str, network: BtcNetwork) -> Result<[u8; 20], BtcError> {
    let decoded = decode_address(address, network)?;
    match decoded.kind {
        AddressKind::Legacy | AddressKind::Segwit if decoded.hash.len() == 20 => to_array(&decoded.hash),
        _ => Err(BtcError::InvalidAddress(format!(
            "address {address} does not lock to a public key hash"
        ))),
    }
}

/// Decode a P2SH (20-byte) or P2WSH (32-byte) address into its script hash.
pub fn decode_script_hash(address: &str, network: BtcNetwork) -> Result<Vec<u8>, BtcError> {
    let decoded = decode_address(address, network)?;
    match decoded.kind {
        AddressKind::ScriptHash => Ok(decoded.hash),
        AddressKind::Segwit if decoded.hash.len() == 32 => Ok(decoded.hash),
        _ => Err(BtcError::InvalidAddress(format!(
            "address {address} does not lock to a script hash"
        ))),
    }
}

/// Encode a hash back into an address string of the given kind.
pub fn encode_hash(hash: &[u8], network: BtcNetwork, kind: AddressKind) -> Result<String, BtcError> {
    let script = match (kind, hash.len()) {
        (AddressKind::Legacy, 20) => ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(to_array(hash)?)),
        (AddressKind::ScriptHash, 20) => {
            ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(to_array(hash)?))
        }
        (AddressKind::Segwit, 20) => {
            ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(to_array(hash)?))
        }
        (AddressKind::Segwit, 32) => {
            ScriptBuf::new_p2wsh(&WScriptHash::from_byte_array(to_array(hash)?))
        }
        (kind, len) => {
            return Err(BtcError::InvalidArgument(format!(
                "cannot encode a {len}-byte hash as a {kind:?} address"
            )))
        }
    };

    address_from_script(&script, network)
}

/// Address of the output locking to `redeem_script` in the given wrapping.
pub fn redeem_script_address(
    redeem_script: &Script,
    network: BtcNetwork,
    kind: SwapOutputKind,
) -> Result<String, BtcError> {
    address_from_script(&kind.script_pubkey(redeem_script), network)
}

/// Address for a locking script, if the script has a standard address form.
pub fn address_from_script(script: &Script, network: BtcNetwork) -> Result<String, BtcError> {
    Address::from_script(script, network.to_bitcoin_network())
        .map(|a| a.to_string())
        .map_err(|e| BtcError::InvalidAddress(format!("script has no address form: {e}")))
}

/// Derive an address from a 33-byte compressed secp256k1 public key.
///
/// `Legacy` yields `1...`/`m...` P2PKH addresses, `Segwit` yields
/// `bc1q...`/`tb1q...` P2WPKH addresses.
pub fn pubkey_address(
    pubkey_bytes: &[u8],
    network: BtcNetwork,
    kind: AddressKind,
) -> Result<String, BtcError> {
    let compressed_pk = CompressedPublicKey::from_slice(pubkey_bytes).map_err(|e| {
        BtcError::InvalidPublicKey(format!("failed to parse compressed public key: {e}"))
    })?;
    let net = network.to_bitcoin_network();

    let address = match kind {
        AddressKind::Legacy => Address::p2pkh(compressed_pk, net),
        AddressKind::Segwit => Address::p2wpkh(&compressed_pk, net),
        AddressKind::ScriptHash => {
            return Err(BtcError::InvalidArgument(
                "a public key has no script-hash address".into(),
            ))
        }
    };

    Ok(address.to_string())
}

fn to_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], BtcError> {
    bytes
        .try_into()
        .map_err(|_| BtcError::InvalidArgument(format!("expected {N} bytes, got {}", bytes.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERATOR_PUBKEY: &str =
        "0279BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798";
    const GENERATOR_HASH160: &str = "751e76e8199196d454941c45d1b3a323f1433bd6";

    #[test]
    fn p2wpkh_mainnet_test_vector() {
        let pubkey = hex::decode(GENERATOR_PUBKEY).unwrap();
        let address = pubkey_address(&pubkey, BtcNetwork::Mainnet, AddressKind::Segwit).unwrap();
        assert_eq!(address, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
    }

    #[test]
    fn p2pkh_mainnet_test_vector() {
        let pubkey = hex::decode(GENERATOR_PUBKEY).unwrap();
        let address = pubkey_address(&pubkey, BtcNetwork::Mainnet, AddressKind::Legacy).unwrap();
        assert_eq!(address, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
    }

    #[test]
    fn invalid_pubkey_returns_error() {
        let result = pubkey_address(&[0u8; 33], BtcNetwork::Mainnet, AddressKind::Segwit);
        assert!(matches!(result, Err(BtcError::InvalidPublicKey(_))));
    }

    #[test]
    fn decode_pubkey_hash_from_segwit_and_legacy() {
        let from_segwit = decode_pubkey_hash(
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            BtcNetwork::Mainnet,
        )
        .unwrap();
        let from_legacy =
            decode_pubkey_hash("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH", BtcNetwork::Mainnet)
                .unwrap();
        assert_eq!(hex::encode(from_segwit), GENERATOR_HASH160);
        assert_eq!(from_segwit, from_legacy);
    }

    #[test]
    fn decode_pubkey_hash_rejects_wrong_network() {
        let result = decode_pubkey_hash(
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            BtcNetwork::Testnet,
        );
        assert!(matches!(result, Err(BtcError::InvalidAddress(_))));
    }

    #[test]
    fn decode_pubkey_hash_rejects_script_hash_address() {
        let p2sh = encode_hash(&[0x22; 20], BtcNetwork::Mainnet, AddressKind::ScriptHash).unwrap();
        assert!(p2sh.starts_with('3'));
        assert!(decode_pubkey_hash(&p2sh, BtcNetwork::Mainnet).is_err());
        assert_eq!(
            decode_script_hash(&p2sh, BtcNetwork::Mainnet).unwrap(),
            vec![0x22; 20]
        );
    }

    #[test]
    fn encode_decode_hash_roundtrip() {
        let hash: [u8; 20] = hex::decode(GENERATOR_HASH160).unwrap().try_into().unwrap();
        for kind in [AddressKind::Legacy, AddressKind::Segwit] {
            let address = encode_hash(&hash, BtcNetwork::Testnet, kind).unwrap();
            assert_eq!(decode_pubkey_hash(&address, BtcNetwork::Testnet).unwrap(), hash);
        }
    }

    #[test]
    fn encode_p2wsh_from_32_byte_hash() {
        let address = encode_hash(&[0x33; 32], BtcNetwork::Testnet, AddressKind::Segwit).unwrap();
        assert!(address.starts_with("tb1q"));
        assert_eq!(
            decode_script_hash(&address, BtcNetwork::Testnet).unwrap(),
            vec![0x33; 32]
        );
    }

    #[test]
    fn encode_rejects_mismatched_length() {
        assert!(encode_hash(&[0u8; 32], BtcNetwork::Mainnet, AddressKind::Legacy).is_err());
        assert!(encode_hash(&[0u8; 19], BtcNetwork::Mainnet, AddressKind::Segwit).is_err());
    }

    #[test]
    fn decode_address_reports_version_bytes() {
        let legacy = decode_address("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH", BtcNetwork::Mainnet).unwrap();
        assert_eq!(legacy.kind, AddressKind::Legacy);
        assert_eq!(legacy.version, 0x00);
        assert_eq!(hex::encode(&legacy.hash), GENERATOR_HASH160);

        let p2sh = encode_hash(&[0x22; 20], BtcNetwork::Testnet, AddressKind::ScriptHash).unwrap();
        let decoded = decode_address(&p2sh, BtcNetwork::Testnet).unwrap();
        assert_eq!(decoded.kind, AddressKind::ScriptHash);
        assert_eq!(decoded.version, 0xc4);

        let segwit = decode_address("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4", BtcNetwork::Mainnet).unwrap();
        assert_eq!(segwit.kind, AddressKind::Segwit);
        assert_eq!(segwit.version, 0);
    }

    #[test]
    fn garbage_address_is_rejected() {
        assert!(matches!(
            decode_address("notanaddress!!!", BtcNetwork::Mainnet),
            Err(BtcError::InvalidAddress(_))
        ));
    }

    #[test]
    fn redeem_script_address_commits_to_the_script() {
        let redeem = ScriptBuf::from_bytes(vec![0x51]);
        let p2sh = redeem_script_address(&redeem, BtcNetwork::Testnet, SwapOutputKind::P2sh).unwrap();
        assert_eq!(
            decode_script_hash(&p2sh, BtcNetwork::Testnet).unwrap(),
            redeem.script_hash().to_byte_array().to_vec()
        );
        let p2wsh = redeem_script_address(&redeem, BtcNetwork::Testnet, SwapOutputKind::P2wsh).unwrap();
        assert_eq!(
            decode_script_hash(&p2wsh, BtcNetwork::Testnet).unwrap(),
            redeem.wscript_hash().to_byte_array().to_vec()
        );
    }
}
