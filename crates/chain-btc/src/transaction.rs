use std::collections::HashSet;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::{deserialize, serialize};
use bitcoin::hashes::Hash;
use bitcoin::script::{Instruction, Script, ScriptBuf};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, BlockHash, CompressedPublicKey, OutPoint, PublicKey, Sequence, Transaction, TxIn, TxOut,
    Txid, Weight, Witness,
};
use tracing::debug;

use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::script::{self, SwapOutputKind, UnlockData};
use crate::signer::{self, HashSigner};
use crate::utxo::{multisig_threshold, OutputType, UnspentOutput};

/// Where a transaction is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxState {
    /// Built locally, may still be signed or modified.
    #[default]
    Pending,
    /// Broadcast, not yet in a block.
    Unconfirmed,
    Confirmed,
}

/// Block a confirmed transaction was mined in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: u32,
    pub block_hash: BlockHash,
    pub timestamp: u64,
}

/// A Bitcoin transaction together with its network and lifecycle state.
///
/// Signing and unlock installation mutate the transaction in place and are
/// refused once it has been broadcast; take [`BtcTransaction::to_pending`]
/// to keep working on a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcTransaction {
    tx: Transaction,
    network: BtcNetwork,
    state: TxState,
    block: Option<BlockInfo>,
    fee: Option<Amount>,
}

impl BtcTransaction {
    pub fn new(tx: Transaction, network: BtcNetwork) -> Self {
        Self {
            tx,
            network,
            state: TxState::Pending,
            block: None,
            fee: None,
        }
    }

    /// Unsigned version 2 transaction spending `spent` in order.
    pub fn unsigned(
        spent: &[UnspentOutput],
        outputs: Vec<TxOut>,
        lock_time: LockTime,
        sequence: Sequence,
        network: BtcNetwork,
    ) -> Self {
        let input = spent
            .iter()
            .map(|coin| TxIn {
                previous_output: coin.outpoint(),
                script_sig: ScriptBuf::new(),
                sequence,
                witness: Witness::default(),
            })
            .collect();

        Self::new(
            Transaction {
                version: Version::TWO,
                lock_time,
                input,
                output: outputs,
            },
            network,
        )
    }

    pub fn from_bytes(bytes: &[u8], network: BtcNetwork) -> Result<Self, BtcError> {
        let tx: Transaction = deserialize(bytes)
            .map_err(|e| BtcError::TransactionBuildError(format!("failed to decode transaction: {e}")))?;
        Ok(Self::new(tx, network))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serialize(&self.tx)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn txid(&self) -> Txid {
        self.tx.compute_txid()
    }

    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn into_inner(self) -> Transaction {
        self.tx
    }

    pub fn network(&self) -> BtcNetwork {
        self.network
    }

    pub fn weight(&self) -> Weight {
        self.tx.weight()
    }

    pub fn vsize(&self) -> usize {
        self.tx.vsize()
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn block(&self) -> Option<&BlockInfo> {
        self.block.as_ref()
    }

    pub fn is_mutable(&self) -> bool {
        self.state == TxState::Pending
    }

    pub fn mark_broadcast(&mut self) {
        self.state = TxState::Unconfirmed;
    }

    pub fn mark_confirmed(&mut self, block: BlockInfo) {
        self.state = TxState::Confirmed;
        self.block = Some(block);
    }

    /// Copy that can be modified again, with state and block info reset.
    pub fn to_pending(&self) -> Self {
        Self {
            state: TxState::Pending,
            block: None,
            ..self.clone()
        }
    }

    /// Fee recorded when the transaction was built, if known.
    pub fn known_fee(&self) -> Option<Amount> {
        self.fee
    }

    pub fn set_known_fee(&mut self, fee: Amount) {
        self.fee = Some(fee);
    }

    /// `sum(spent values) - sum(output values)`.
    pub fn fee(&self, spent: &[UnspentOutput]) -> Result<Amount, BtcError> {
        let mut total_in = Amount::ZERO;
        for input in &self.tx.input {
            let coin = find_coin(spent, input.previous_output).ok_or_else(|| {
                BtcError::InvalidArgument(format!("spent output {} not provided", input.previous_output))
            })?;
            total_in = total_in
                .checked_add(coin.value)
                .ok_or_else(|| BtcError::InvalidArgument("input value overflow".into()))?;
        }

        let total_out = self
            .tx
            .output
            .iter()
            .try_fold(Amount::ZERO, |acc, out| acc.checked_add(out.value))
            .ok_or_else(|| BtcError::InvalidArgument("output value overflow".into()))?;

        total_in.checked_sub(total_out).ok_or_else(|| {
            BtcError::InvalidArgument(format!("outputs ({total_out}) exceed inputs ({total_in})"))
        })
    }

    /// Index of the input spending `outpoint`.
    pub fn input_index(&self, outpoint: OutPoint) -> Result<usize, BtcError> {
        self.tx
            .input
            .iter()
            .position(|input| input.previous_output == outpoint)
            .ok_or(BtcError::NoMatchingInput(outpoint))
    }

    /// Digest to sign for the input spending `output`.
    ///
    /// With a `redeem_script` the coin is a script coin: the digest commits
    /// to the redeem (or witness) script, which must be the one `output`
    /// pays to.
    pub fn signature_hash(
        &self,
        output: &UnspentOutput,
        redeem_script: Option<&Script>,
        sighash_type: EcdsaSighashType,
    ) -> Result<[u8; 32], BtcError> {
        let index = self.input_index(output.outpoint())?;
        let script_pubkey = &output.script_pubkey;
        let mut cache = SighashCache::new(&self.tx);

        let output_type = output.output_type();
        if let Some(redeem) = redeem_script {
            if SwapOutputKind::detect(script_pubkey, redeem).is_none() {
                return Err(BtcError::InvalidArgument(
                    "redeem script does not match the spent output".into(),
                ));
            }
        }

        let digest = match (output_type, redeem_script) {
            (OutputType::P2wpkh, _) => cache
                .p2wpkh_signature_hash(index, script_pubkey, output.value, sighash_type)
                .map_err(sighash_error)?
                .to_byte_array(),
            (OutputType::P2sh, Some(redeem)) if redeem.is_p2wpkh() => cache
                .p2wpkh_signature_hash(index, redeem, output.value, sighash_type)
                .map_err(sighash_error)?
                .to_byte_array(),
            (OutputType::P2wsh, Some(witness_script)) => cache
                .p2wsh_signature_hash(index, witness_script, output.value, sighash_type)
                .map_err(sighash_error)?
                .to_byte_array(),
            (OutputType::P2sh, Some(redeem)) => cache
                .legacy_signature_hash(index, redeem, sighash_type.to_u32())
                .map_err(sighash_error)?
                .to_byte_array(),
            (OutputType::P2sh | OutputType::P2wsh, None) => {
                return Err(BtcError::InvalidArgument(format!(
                    "{output_type:?} output needs its redeem script to be signed"
                )))
            }
            (_, _) => cache
                .legacy_signature_hash(index, script_pubkey, sighash_type.to_u32())
                .map_err(sighash_error)?
                .to_byte_array(),
        };

        Ok(digest)
    }

    /// Sign the input spending a standard single-key `output`
    /// (P2PK, P2PKH, P2WPKH or nested P2SH-P2WPKH) with SIGHASH_ALL.
    pub fn sign<S: HashSigner + ?Sized>(
        &mut self,
        signer: &S,
        key_path: &str,
        output: &UnspentOutput,
    ) -> Result<(), BtcError> {
        self.ensure_mutable()?;
        let pubkey = signer.public_key(key_path)?;
        let sighash = self.single_key_signature_hash(output, &pubkey)?;
        let der = signer.sign_hash(&sighash, key_path)?;
        self.install_single_key_signature(output, &der, &pubkey)
    }

    /// Digest the key behind `pubkey` signs to spend a single-key `output`.
    pub fn single_key_signature_hash(&self, output: &UnspentOutput, pubkey: &[u8]) -> Result<[u8; 32], BtcError> {
        let nested = single_key_program(output, pubkey)?;
        let redeem = match output.output_type() {
            OutputType::P2sh => nested.as_deref(),
            _ => None,
        };
        self.signature_hash(output, redeem, EcdsaSighashType::All)
    }

    /// Check a DER signature from `pubkey` against the input spending
    /// `output` and install the matching script-sig or witness.
    pub fn install_single_key_signature(
        &mut self,
        output: &UnspentOutput,
        der_signature: &[u8],
        pubkey: &[u8],
    ) -> Result<(), BtcError> {
        self.ensure_mutable()?;
        let index = self.input_index(output.outpoint())?;
        let nested = single_key_program(output, pubkey)?;
        let sighash = self.single_key_signature_hash(output, pubkey)?;
        signer::verify_signature(&sighash, der_signature, pubkey)?;
        let sig = signer::encode_signature(der_signature, EcdsaSighashType::All)?;

        let output_type = output.output_type();
        let input = &mut self.tx.input[index];
        match (output_type, nested) {
            (OutputType::P2pk, _) => input.script_sig = script::push_only(&[sig.as_slice()])?,
            (OutputType::P2pkh, _) => input.script_sig = script::push_only(&[sig.as_slice(), pubkey])?,
            (OutputType::P2wpkh, _) => input.witness = Witness::from_slice(&[sig.as_slice(), pubkey]),
            (_, Some(program)) => {
                input.script_sig = script::push_only(&[program.as_bytes()])?;
                input.witness = Witness::from_slice(&[sig.as_slice(), pubkey]);
            }
            _ => {}
        }

        debug!(input = index, ?output_type, "signed input");
        Ok(())
    }

    /// Install a precomputed unlocking script or witness on the input
    /// spending `output`.
    pub fn set_signature(&mut self, unlock: UnlockData, output: &UnspentOutput) -> Result<(), BtcError> {
        self.ensure_mutable()?;
        let index = self.input_index(output.outpoint())?;
        let input = &mut self.tx.input[index];
        match unlock {
            UnlockData::ScriptSig(script_sig) => {
                input.script_sig = script_sig;
                input.witness = Witness::default();
            }
            UnlockData::Witness(witness) => {
                input.script_sig = ScriptBuf::new();
                input.witness = witness;
            }
        }
        Ok(())
    }

    /// Run consensus script verification of every input against the
    /// outputs it spends.
    ///
    /// `check_script_pubkey` additionally requires spent scripts and
    /// revealed redeem scripts to be standard templates; swap spends must
    /// pass `false`.
    pub fn verify(&self, spent: &[UnspentOutput], check_script_pubkey: bool) -> Result<(), BtcError> {
        let bytes = serialize(&self.tx);
        let mut violations = Vec::new();

        for (index, input) in self.tx.input.iter().enumerate() {
            let Some(coin) = find_coin(spent, input.previous_output) else {
                violations.push(format!(
                    "input {index}: spent output {} not provided",
                    input.previous_output
                ));
                continue;
            };

            if check_script_pubkey {
                if let Some(reason) = nonstandard_spend(coin, input) {
                    violations.push(format!("input {index}: {reason}"));
                }
            }

            if let Err(e) = coin.script_pubkey.verify(index, coin.value, &bytes) {
                violations.push(format!("input {index}: script verification failed: {e}"));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(BtcError::TransactionVerification(violations))
        }
    }

    /// Structural sanity: inputs and outputs present, values within the
    /// money range, no input spent twice, and serialization round-trips.
    pub fn check(&self) -> Result<(), BtcError> {
        let mut violations = Vec::new();

        if self.tx.input.is_empty() {
            violations.push("transaction has no inputs".to_string());
        }
        if self.tx.output.is_empty() {
            violations.push("transaction has no outputs".to_string());
        }

        let mut total = Amount::ZERO;
        for (index, out) in self.tx.output.iter().enumerate() {
            if out.value > Amount::MAX_MONEY {
                violations.push(format!("output {index}: value {} exceeds max money", out.value));
            }
            match total.checked_add(out.value) {
                Some(sum) if sum <= Amount::MAX_MONEY => total = sum,
                _ => {
                    violations.push("total output value exceeds max money".to_string());
                    break;
                }
            }
        }

        let mut seen = HashSet::new();
        for input in &self.tx.input {
            if !seen.insert(input.previous_output) {
                violations.push(format!("outpoint {} spent twice", input.previous_output));
            }
            if !self.tx.is_coinbase() && input.previous_output.is_null() {
                violations.push("null outpoint in non-coinbase transaction".to_string());
            }
        }

        match deserialize::<Transaction>(&serialize(&self.tx)) {
            Ok(decoded) if decoded == self.tx => {}
            _ => violations.push("serialization does not round-trip".to_string()),
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(BtcError::TransactionVerification(violations))
        }
    }

    fn ensure_mutable(&self) -> Result<(), BtcError> {
        if self.is_mutable() {
            Ok(())
        } else {
            Err(BtcError::TransactionImmutable)
        }
    }
}

fn find_coin(spent: &[UnspentOutput], outpoint: OutPoint) -> Option<&UnspentOutput> {
    spent.iter().find(|coin| coin.outpoint() == outpoint)
}

/// Check that `pubkey` alone controls `output`; for P2WPKH and nested
/// P2SH-P2WPKH outputs, return the key's witness program.
fn single_key_program(output: &UnspentOutput, pubkey_bytes: &[u8]) -> Result<Option<ScriptBuf>, BtcError> {
    let pubkey = PublicKey::from_slice(pubkey_bytes)
        .map_err(|e| BtcError::InvalidPublicKey(format!("signer returned a bad public key: {e}")))?;

    let output_type = output.output_type();
    let nested = match output_type {
        OutputType::P2sh | OutputType::P2wpkh => {
            let compressed = CompressedPublicKey::try_from(pubkey).map_err(|e| {
                BtcError::SigningError(format!("segwit spends need a compressed key: {e}"))
            })?;
            Some(ScriptBuf::new_p2wpkh(&compressed.wpubkey_hash()))
        }
        _ => None,
    };

    let expected = match (output_type, &nested) {
        (OutputType::P2pk, _) => ScriptBuf::new_p2pk(&pubkey),
        (OutputType::P2pkh, _) => ScriptBuf::new_p2pkh(&pubkey.pubkey_hash()),
        (OutputType::P2wpkh, Some(program)) => program.clone(),
        (OutputType::P2sh, Some(program)) => program.to_p2sh(),
        (other, _) => {
            return Err(BtcError::SigningError(format!(
                "cannot sign a {other:?} output with a single key"
            )))
        }
    };
    if expected != output.script_pubkey {
        return Err(BtcError::SigningError(format!(
            "key {} does not control output {}",
            hex::encode(pubkey_bytes),
            output.outpoint()
        )));
    }
    Ok(nested)
}

fn sighash_error(e: impl std::fmt::Display) -> BtcError {
    BtcError::SigningError(format!("sighash computation failed: {e}"))
}

/// Why spending `coin` with `input` is non-standard, if it is.
fn nonstandard_spend(coin: &UnspentOutput, input: &TxIn) -> Option<String> {
    match coin.output_type() {
        OutputType::NonStandard => Some("spent output script is non-standard".into()),
        OutputType::P2sh => {
            let redeem = match input.script_sig.instructions().last() {
                Some(Ok(Instruction::PushBytes(data))) => data.as_bytes().to_vec(),
                _ => return Some("script-sig reveals no redeem script".into()),
            };
            let redeem = Script::from_bytes(&redeem);
            (!redeem.is_p2wpkh() && multisig_threshold(redeem).is_none())
                .then(|| "redeem script is non-standard".into())
        }
        OutputType::P2wsh => match input.witness.last() {
            Some(ws) if multisig_threshold(Script::from_bytes(ws)).is_some() => None,
            _ => Some("witness script is non-standard".into()),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::PrivateKeySigner;
    use bitcoin::hashes::Hash;

    const KEY_PATH: &str = "m/0";

    fn signer() -> PrivateKeySigner {
        PrivateKeySigner::new().with_key(KEY_PATH, &[0x42; 32]).unwrap()
    }

    fn compressed(signer: &PrivateKeySigner) -> CompressedPublicKey {
        CompressedPublicKey::from_slice(&signer.public_key(KEY_PATH).unwrap()).unwrap()
    }

    fn coin(script_pubkey: ScriptBuf, value: u64) -> UnspentOutput {
        UnspentOutput::new(Txid::from_byte_array([0xab; 32]), 1, Amount::from_sat(value), script_pubkey)
    }

    fn spend(coin: &UnspentOutput, out_value: u64) -> BtcTransaction {
        let out = TxOut {
            value: Amount::from_sat(out_value),
            script_pubkey: ScriptBuf::new_p2wpkh(&bitcoin::WPubkeyHash::all_zeros()),
        };
        BtcTransaction::unsigned(
            std::slice::from_ref(coin),
            vec![out],
            LockTime::ZERO,
            Sequence::ENABLE_RBF_NO_LOCKTIME,
            BtcNetwork::Testnet,
        )
    }

    #[test]
    fn sign_and_verify_p2wpkh() {
        let signer = signer();
        let coin = coin(ScriptBuf::new_p2wpkh(&compressed(&signer).wpubkey_hash()), 100_000);
        let mut tx = spend(&coin, 90_000);

        tx.sign(&signer, KEY_PATH, &coin).unwrap();
        assert_eq!(tx.tx().input[0].witness.len(), 2);
        tx.verify(std::slice::from_ref(&coin), true).unwrap();
        tx.check().unwrap();
        assert_eq!(tx.fee(std::slice::from_ref(&coin)).unwrap(), Amount::from_sat(10_000));
    }

    #[test]
    fn sign_and_verify_p2pkh() {
        let signer = signer();
        let pk = PublicKey::from_slice(&signer.public_key(KEY_PATH).unwrap()).unwrap();
        let coin = coin(ScriptBuf::new_p2pkh(&pk.pubkey_hash()), 50_000);
        let mut tx = spend(&coin, 40_000);

        tx.sign(&signer, KEY_PATH, &coin).unwrap();
        assert!(tx.tx().input[0].witness.is_empty());
        tx.verify(&[coin], true).unwrap();
    }

    #[test]
    fn sign_and_verify_nested_p2wpkh() {
        let signer = signer();
        let program = ScriptBuf::new_p2wpkh(&compressed(&signer).wpubkey_hash());
        let coin = coin(program.to_p2sh(), 50_000);
        let mut tx = spend(&coin, 40_000);

        tx.sign(&signer, KEY_PATH, &coin).unwrap();
        tx.verify(&[coin], true).unwrap();
    }

    #[test]
    fn tampered_output_fails_verification() {
        let signer = signer();
        let coin = coin(ScriptBuf::new_p2wpkh(&compressed(&signer).wpubkey_hash()), 100_000);
        let mut tx = spend(&coin, 90_000);
        tx.sign(&signer, KEY_PATH, &coin).unwrap();

        let mut raw = tx.clone().into_inner();
        raw.output[0].value = Amount::from_sat(95_000);
        let tampered = BtcTransaction::new(raw, BtcNetwork::Testnet);
        assert!(matches!(
            tampered.verify(&[coin], false),
            Err(BtcError::TransactionVerification(_))
        ));
    }

    #[test]
    fn missing_spent_output_is_a_violation() {
        let coin = coin(ScriptBuf::new_p2wpkh(&bitcoin::WPubkeyHash::all_zeros()), 1_000);
        let tx = spend(&coin, 500);
        match tx.verify(&[], false) {
            Err(BtcError::TransactionVerification(v)) => assert!(v[0].contains("not provided")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn wrong_key_is_refused() {
        let coin = coin(ScriptBuf::new_p2wpkh(&bitcoin::WPubkeyHash::all_zeros()), 1_000);
        let mut tx = spend(&coin, 500);
        assert!(matches!(
            tx.sign(&signer(), KEY_PATH, &coin),
            Err(BtcError::SigningError(_))
        ));
    }

    #[test]
    fn signature_hash_requires_matching_input() {
        let coin = coin(ScriptBuf::new_p2wpkh(&bitcoin::WPubkeyHash::all_zeros()), 1_000);
        let tx = spend(&coin, 500);
        let other = UnspentOutput::new(Txid::all_zeros(), 7, Amount::from_sat(1_000), coin.script_pubkey.clone());
        assert!(matches!(
            tx.signature_hash(&other, None, EcdsaSighashType::All),
            Err(BtcError::NoMatchingInput(op)) if op == other.outpoint()
        ));
    }

    #[test]
    fn script_coin_needs_redeem_script() {
        let redeem = ScriptBuf::from_bytes(vec![0x51]);
        let coin = coin(redeem.to_p2sh(), 1_000);
        let tx = spend(&coin, 500);
        assert!(tx.signature_hash(&coin, None, EcdsaSighashType::All).is_err());
        assert!(tx.signature_hash(&coin, Some(&redeem), EcdsaSighashType::All).is_ok());

        let wrong = ScriptBuf::from_bytes(vec![0x52]);
        assert!(tx.signature_hash(&coin, Some(&wrong), EcdsaSighashType::All).is_err());
    }

    #[test]
    fn redeem_script_changes_the_digest() {
        let redeem = ScriptBuf::from_bytes(vec![0x51]);
        let p2sh = coin(redeem.to_p2sh(), 1_000);
        let p2wsh = coin(redeem.to_p2wsh(), 1_000);
        let legacy = spend(&p2sh, 500).signature_hash(&p2sh, Some(&redeem), EcdsaSighashType::All).unwrap();
        let segwit = spend(&p2wsh, 500).signature_hash(&p2wsh, Some(&redeem), EcdsaSighashType::All).unwrap();
        assert_ne!(legacy, segwit);
    }

    #[test]
    fn broadcast_transaction_is_immutable() {
        let signer = signer();
        let coin = coin(ScriptBuf::new_p2wpkh(&compressed(&signer).wpubkey_hash()), 100_000);
        let mut tx = spend(&coin, 90_000);
        tx.mark_broadcast();
        assert_eq!(tx.state(), TxState::Unconfirmed);
        assert!(matches!(
            tx.sign(&signer, KEY_PATH, &coin),
            Err(BtcError::TransactionImmutable)
        ));
        assert!(matches!(
            tx.set_signature(UnlockData::ScriptSig(ScriptBuf::new()), &coin),
            Err(BtcError::TransactionImmutable)
        ));

        let mut copy = tx.to_pending();
        copy.sign(&signer, KEY_PATH, &coin).unwrap();
        assert!(tx.tx().input[0].witness.is_empty());
    }

    #[test]
    fn confirmation_records_block() {
        let coin = coin(ScriptBuf::new_p2wpkh(&bitcoin::WPubkeyHash::all_zeros()), 1_000);
        let mut tx = spend(&coin, 500);
        tx.mark_broadcast();
        tx.mark_confirmed(BlockInfo {
            height: 100,
            block_hash: BlockHash::all_zeros(),
            timestamp: 1_700_000_000,
        });
        assert_eq!(tx.state(), TxState::Confirmed);
        assert_eq!(tx.block().unwrap().height, 100);
        assert!(tx.to_pending().block().is_none());
    }

    #[test]
    fn check_rejects_duplicate_inputs_and_empty_outputs() {
        let c = coin(ScriptBuf::new_p2wpkh(&bitcoin::WPubkeyHash::all_zeros()), 1_000);
        let tx = BtcTransaction::unsigned(
            &[c.clone(), c],
            vec![],
            LockTime::ZERO,
            Sequence::MAX,
            BtcNetwork::Testnet,
        );
        match tx.check() {
            Err(BtcError::TransactionVerification(v)) => {
                assert!(v.iter().any(|r| r.contains("no outputs")));
                assert!(v.iter().any(|r| r.contains("spent twice")));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn fee_rejects_overspending() {
        let coin = coin(ScriptBuf::new_p2wpkh(&bitcoin::WPubkeyHash::all_zeros()), 1_000);
        let tx = spend(&coin, 2_000);
        assert!(tx.fee(&[coin]).is_err());
    }

    #[test]
    fn bytes_roundtrip() {
        let coin = coin(ScriptBuf::new_p2wpkh(&bitcoin::WPubkeyHash::all_zeros()), 1_000);
        let tx = spend(&coin, 500);
        let decoded = BtcTransaction::from_bytes(&tx.to_bytes(), BtcNetwork::Testnet).unwrap();
        assert_eq!(decoded.txid(), tx.txid());
        assert_eq!(hex::decode(tx.to_hex()).unwrap(), tx.to_bytes());
        assert!(BtcTransaction::from_bytes(&[0x01, 0x02], BtcNetwork::Testnet).is_err());
    }
}
