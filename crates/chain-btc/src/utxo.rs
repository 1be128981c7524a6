use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_1, OP_PUSHNUM_16};
use bitcoin::script::{Instruction, Script, ScriptBuf};
use bitcoin::{Amount, OutPoint, TxIn, TxOut, Txid, WPubkeyHash, Weight, Witness};

use crate::error::BtcError;
use crate::script::{self, SwapOutputKind, UnlockData};

/// Signature length assumed when estimating unlocking data: a 71-byte DER
/// signature plus the sighash type byte.
pub const ESTIMATED_SIGNATURE_LEN: usize = 72;

/// Compressed secp256k1 public key length.
pub const COMPRESSED_PUBKEY_LEN: usize = 33;

/// Shape of a locking script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputType {
    NonStandard,
    /// Bare `m <pk>... n CHECKMULTISIG`.
    MultiSig,
    /// P2WSH whose witness script is a multisig.
    WitnessMultiSig,
    P2pk,
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
}

impl OutputType {
    /// Classify a locking script purely from its bytes.
    pub fn classify(script_pubkey: &Script) -> Self {
        if script_pubkey.is_p2pkh() {
            OutputType::P2pkh
        } else if script_pubkey.is_p2sh() {
            OutputType::P2sh
        } else if script_pubkey.is_p2wpkh() {
            OutputType::P2wpkh
        } else if script_pubkey.is_p2wsh() {
            OutputType::P2wsh
        } else if script_pubkey.is_p2pk() {
            OutputType::P2pk
        } else if multisig_threshold(script_pubkey).is_some() {
            OutputType::MultiSig
        } else {
            OutputType::NonStandard
        }
    }

    /// Classify a script-hash output once its redeem or witness script is known.
    pub fn classify_with_script(script_pubkey: &Script, inner: &Script) -> Self {
        match Self::classify(script_pubkey) {
            OutputType::P2wsh if multisig_threshold(inner).is_some() => OutputType::WitnessMultiSig,
            other => other,
        }
    }

    pub fn is_segwit(self) -> bool {
        matches!(
            self,
            OutputType::P2wpkh | OutputType::P2wsh | OutputType::WitnessMultiSig
        )
    }
}

/// `(m, n)` of a bare `m <pk1>..<pkn> n CHECKMULTISIG` script.
pub fn multisig_threshold(script: &Script) -> Option<(usize, usize)> {
    let ops = script.instructions().collect::<Result<Vec<_>, _>>().ok()?;
    let (first, rest) = ops.split_first()?;
    let (last, rest) = rest.split_last()?;
    let (n_op, keys) = rest.split_last()?;

    if *last != Instruction::Op(OP_CHECKMULTISIG) {
        return None;
    }
    let m = small_int(first)?;
    let n = small_int(n_op)?;
    let keys_ok = keys
        .iter()
        .all(|k| matches!(k, Instruction::PushBytes(pk) if pk.len() == 33 || pk.len() == 65));

    (keys_ok && keys.len() == n && m <= n && m > 0).then_some((m, n))
}

fn small_int(instruction: &Instruction<'_>) -> Option<usize> {
    match instruction {
        Instruction::Op(op) => {
            let code = op.to_u8();
            (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8())
                .contains(&code)
                .then(|| usize::from(code - OP_PUSHNUM_1.to_u8() + 1))
        }
        Instruction::PushBytes(_) => None,
    }
}

/// Input of a later transaction that spent an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpentPoint {
    pub txid: Txid,
    pub input_index: u32,
}

/// A previous transaction output observed on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub txid: Txid,
    pub vout: u32,
    pub value: Amount,
    pub script_pubkey: ScriptBuf,
    /// Set once a scan finds the transaction spending this output.
    pub spent_by: Option<SpentPoint>,
}

impl UnspentOutput {
    pub fn new(txid: Txid, vout: u32, value: Amount, script_pubkey: ScriptBuf) -> Self {
        Self {
            txid,
            vout,
            value,
            script_pubkey,
            spent_by: None,
        }
    }

    /// Build from the `vout`-th output of a transaction.
    pub fn from_tx_out(txid: Txid, vout: u32, out: &TxOut) -> Self {
        Self::new(txid, vout, out.value, out.script_pubkey.clone())
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }

    pub fn tx_out(&self) -> TxOut {
        TxOut {
            value: self.value,
            script_pubkey: self.script_pubkey.clone(),
        }
    }

    pub fn output_type(&self) -> OutputType {
        OutputType::classify(&self.script_pubkey)
    }

    pub fn is_segwit(&self) -> bool {
        self.script_pubkey.is_witness_program()
    }

    pub fn is_spent(&self) -> bool {
        self.spent_by.is_some()
    }

    pub fn mark_spent(&mut self, by: SpentPoint) {
        self.spent_by = Some(by);
    }

    /// Bare P2PKH swap payment locked directly in the output script.
    pub fn is_p2pkh_swap_payment(&self) -> bool {
        script::is_p2pkh_swap_payment(&self.script_pubkey)
    }

    /// Bare HTLC swap payment locked directly in the output script.
    pub fn is_htlc_p2pkh_swap_payment(&self) -> bool {
        script::is_htlc_p2pkh_swap_payment(&self.script_pubkey)
    }

    /// Whether this output pays to the script hash of `redeem_script` and
    /// that script is a swap payment.
    pub fn is_swap_payment_to(&self, redeem_script: &Script) -> bool {
        self.swap_output_kind(redeem_script).is_some() && script::is_swap_payment(redeem_script)
    }

    /// P2SH or P2WSH wrapping of `redeem_script` used by this output.
    pub fn swap_output_kind(&self, redeem_script: &Script) -> Option<SwapOutputKind> {
        SwapOutputKind::detect(&self.script_pubkey, redeem_script)
    }
}

/// Branch of a swap payment script an input unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapSpend {
    /// Refund branch: multisig for P2PK/P2PKH swaps, single key after the lock
    /// time for HTLC swaps.
    Refund,
    /// Redeem branch, revealing a secret of `secret_size` bytes.
    Redeem { secret_size: usize },
}

/// An output selected for spending, with the weight its input will have
/// once signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputToSign {
    pub output: UnspentOutput,
    signed_weight: Weight,
    has_witness: bool,
}

impl InputToSign {
    /// Estimate for outputs a single-key wallet can sign: P2PK, P2PKH,
    /// P2WPKH and P2SH (assumed nested P2WPKH).
    pub fn new(output: UnspentOutput) -> Result<Self, BtcError> {
        let dummy_sig = [0u8; ESTIMATED_SIGNATURE_LEN];
        let dummy_pk = [0u8; COMPRESSED_PUBKEY_LEN];

        let unlock = match output.output_type() {
            OutputType::P2pk => UnlockData::ScriptSig(script::push_only(&[&dummy_sig[..]])?),
            OutputType::P2pkh => UnlockData::ScriptSig(script::push_only(&[&dummy_sig[..], &dummy_pk[..]])?),
            OutputType::P2wpkh => UnlockData::Witness(Witness::from_slice(&[&dummy_sig[..], &dummy_pk[..]])),
            OutputType::P2sh => {
                // OP_0 <20-byte key hash>
                let nested = ScriptBuf::new_p2wpkh(&WPubkeyHash::all_zeros());
                let mut input = dummy_input(UnlockData::ScriptSig(script::push_only(&[nested.as_bytes()])?));
                input.witness = Witness::from_slice(&[&dummy_sig[..], &dummy_pk[..]]);
                return Ok(Self::from_dummy(output, &input));
            }
            OutputType::MultiSig => {
                let (m, _) = multisig_threshold(&output.script_pubkey).unwrap_or((1, 1));
                UnlockData::ScriptSig(multisig_unlock(m)?)
            }
            other => {
                return Err(BtcError::InvalidArgument(format!(
                    "cannot estimate signed size of a {other:?} output without its script"
                )))
            }
        };

        Ok(Self::from_dummy(output, &dummy_input(unlock)))
    }

    /// Estimate for a P2SH/P2WSH output whose redeem or witness script is a
    /// multisig.
    pub fn with_multisig_script(output: UnspentOutput, inner: &Script) -> Result<Self, BtcError> {
        let (m, _) = multisig_threshold(inner)
            .ok_or_else(|| BtcError::InvalidArgument("script is not a multisig".into()))?;
        let kind = SwapOutputKind::detect(&output.script_pubkey, inner)
            .ok_or_else(|| BtcError::InvalidArgument("output does not commit to script".into()))?;
        let unlock = script::wrap_unlock(&multisig_unlock(m)?, inner, kind)?;
        Ok(Self::from_dummy(output, &dummy_input(unlock)))
    }

    /// Exact estimate for an output locked to a swap payment script.
    pub fn for_swap(output: UnspentOutput, redeem_script: &Script, spend: SwapSpend) -> Result<Self, BtcError> {
        let kind = SwapOutputKind::detect(&output.script_pubkey, redeem_script).ok_or_else(|| {
            BtcError::InvalidArgument("output does not pay to the swap redeem script".into())
        })?;

        let sig = [0u8; ESTIMATED_SIGNATURE_LEN];
        let pk = [0u8; COMPRESSED_PUBKEY_LEN];
        let unlock = match spend {
            SwapSpend::Refund if script::is_htlc_p2pkh_swap_payment(redeem_script) => {
                script::build_htlc_swap_refund(&sig, &pk)?
            }
            SwapSpend::Refund if script::is_swap_payment(redeem_script) => script::build_swap_refund(&sig, &sig)?,
            SwapSpend::Redeem { secret_size } if script::is_p2pk_swap_payment(redeem_script) => {
                script::build_p2pk_swap_redeem(&sig, &vec![0u8; secret_size.max(1)])?
            }
            SwapSpend::Redeem { secret_size } if script::is_swap_payment(redeem_script) => {
                script::build_p2pkh_swap_redeem(&sig, &pk, &vec![0u8; secret_size.max(1)])?
            }
            _ => {
                return Err(BtcError::MalformedScript(
                    "redeem script is not a swap payment".into(),
                ))
            }
        };

        let unlock = script::wrap_unlock(&unlock, redeem_script, kind)?;
        Ok(Self::from_dummy(output, &dummy_input(unlock)))
    }

    fn from_dummy(output: UnspentOutput, input: &TxIn) -> Self {
        let has_witness = !input.witness.is_empty();
        let base = input.base_size();
        let witness = if has_witness { input.witness.size() } else { 0 };
        Self {
            output,
            signed_weight: Weight::from_wu((base * 4 + witness) as u64),
            has_witness,
        }
    }

    pub fn value(&self) -> Amount {
        self.output.value
    }

    /// Weight of the signed input, excluding the per-transaction segwit
    /// marker and flag.
    pub fn signed_weight(&self) -> Weight {
        self.signed_weight
    }

    pub fn has_witness(&self) -> bool {
        self.has_witness
    }
}

fn dummy_input(unlock: UnlockData) -> TxIn {
    let mut input = TxIn::default();
    match unlock {
        UnlockData::ScriptSig(script_sig) => input.script_sig = script_sig,
        UnlockData::Witness(witness) => input.witness = witness,
    }
    input
}

/// `0 <sig>...` with `m` signatures. An empty push encodes as OP_0.
fn multisig_unlock(m: usize) -> Result<ScriptBuf, BtcError> {
    let sig = [0u8; ESTIMATED_SIGNATURE_LEN];
    let mut items: Vec<&[u8]> = vec![&[]];
    items.extend(std::iter::repeat(&sig[..]).take(m));
    script::push_only(&items)
}
