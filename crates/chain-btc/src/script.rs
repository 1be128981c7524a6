//! Atomic-swap script templates.
//!
//! Builders emit the exact opcode sequences for swap payments and their
//! refund/redeem unlocking scripts. Recognizers and extractors re-check every
//! opcode position of the same templates, so a script that was not produced
//! here is never mistaken for a swap script.
//!
//! Payment templates (`<h>` is the secret hash, `HASH` one of HASH160,
//! HASH256 or SHA256 when recognizing; builders always emit HASH256):
//!
//! ```text
//! P2PK swap (13 ops):
//!   IF 2 <aliceRefundPk> <bobRefundPk> 2 CHECKMULTISIG
//!   ELSE HASH <h> EQUALVERIFY <bobPk> CHECKSIG ENDIF
//!
//! P2PKH swap (16 ops):
//!   IF 2 <aliceRefundPk> <bobRefundPk> 2 CHECKMULTISIG
//!   ELSE HASH <h> EQUALVERIFY DUP HASH160 <bobHash> EQUALVERIFY CHECKSIG ENDIF
//!
//! HTLC P2PKH swap (22 ops):
//!   IF <lockTime> CHECKLOCKTIMEVERIFY DROP DUP HASH160 <aliceHash> EQUALVERIFY CHECKSIG
//!   ELSE SIZE <secretSize> EQUALVERIFY HASH <h> EQUALVERIFY
//!        DUP HASH160 <bobHash> EQUALVERIFY CHECKSIG ENDIF
//! ```

use bitcoin::opcodes::all::{
    OP_CHECKMULTISIG, OP_CHECKSIG, OP_CLTV, OP_DROP, OP_DUP, OP_ELSE, OP_ENDIF, OP_EQUALVERIFY,
    OP_HASH160, OP_HASH256, OP_IF, OP_PUSHNUM_1, OP_PUSHNUM_16, OP_PUSHNUM_2, OP_SHA256, OP_SIZE,
};
use bitcoin::opcodes::Opcode;
use bitcoin::script::{Builder, Instruction, PushBytes, Script, ScriptBuf};
use bitcoin::Witness;
use crypto_utils::HashAlgorithm;
use serde::{Deserialize, Serialize};

use crate::address;
use crate::error::BtcError;
use crate::network::BtcNetwork;

/// Hash function emitted by the builders.
pub const SWAP_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Hash256;

/// BIP65: lock times below this value are block heights, above are Unix times.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

const P2PK_SWAP_PAYMENT_OPS: usize = 13;
const P2PKH_SWAP_PAYMENT_OPS: usize = 16;
const HTLC_P2PKH_SWAP_PAYMENT_OPS: usize = 22;

/// How a swap payment output commits to its redeem script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapOutputKind {
    /// Legacy pay-to-script-hash; unlocking data goes into the script-sig.
    #[default]
    P2sh,
    /// Segwit v0 pay-to-witness-script-hash; unlocking data goes into the witness.
    P2wsh,
}

impl SwapOutputKind {
    /// Locking script of an output paying to `redeem_script`.
    pub fn script_pubkey(self, redeem_script: &Script) -> ScriptBuf {
        match self {
            SwapOutputKind::P2sh => redeem_script.to_p2sh(),
            SwapOutputKind::P2wsh => redeem_script.to_p2wsh(),
        }
    }

    /// Which wrapping, if any, `script_pubkey` uses to commit to `redeem_script`.
    pub fn detect(script_pubkey: &Script, redeem_script: &Script) -> Option<Self> {
        [SwapOutputKind::P2sh, SwapOutputKind::P2wsh]
            .into_iter()
            .find(|kind| kind.script_pubkey(redeem_script).as_script() == script_pubkey)
    }
}

/// Opcode emitted for a swap hash algorithm.
pub fn hash_opcode(algorithm: HashAlgorithm) -> Opcode {
    match algorithm {
        HashAlgorithm::Sha256 => OP_SHA256,
        HashAlgorithm::Hash256 => OP_HASH256,
        HashAlgorithm::Hash160 => OP_HASH160,
    }
}

/// Hash algorithm behind a swap hash opcode, if `op` is one.
pub fn swap_hash_algorithm(op: Opcode) -> Option<HashAlgorithm> {
    if op == OP_SHA256 {
        Some(HashAlgorithm::Sha256)
    } else if op == OP_HASH256 {
        Some(HashAlgorithm::Hash256)
    } else if op == OP_HASH160 {
        Some(HashAlgorithm::Hash160)
    } else {
        None
    }
}

// ─── Builders ───────────────────────────────────────────────────────

/// `IF 2 <aliceRefundPk> <bobRefundPk> 2 CHECKMULTISIG ELSE HASH256 <h> EQUALVERIFY <bobPk> CHECKSIG ENDIF`
pub fn build_p2pk_swap_payment(
    alice_refund_pubkey: &[u8],
    bob_refund_pubkey: &[u8],
    bob_destination_pubkey: &[u8],
    secret_hash: &[u8],
) -> Result<ScriptBuf, BtcError> {
    check_secret_hash(secret_hash)?;

    Ok(Builder::new()
        .push_opcode(OP_IF)
        .push_int(2)
        .push_slice(non_empty_push(alice_refund_pubkey, "alice refund public key")?)
        .push_slice(non_empty_push(bob_refund_pubkey, "bob refund public key")?)
        .push_int(2)
        .push_opcode(OP_CHECKMULTISIG)
        .push_opcode(OP_ELSE)
        .push_opcode(hash_opcode(SWAP_HASH_ALGORITHM))
        .push_slice(non_empty_push(secret_hash, "secret hash")?)
        .push_opcode(OP_EQUALVERIFY)
        .push_slice(non_empty_push(bob_destination_pubkey, "bob destination public key")?)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ENDIF)
        .into_script())
}

/// Same refund branch as [`build_p2pk_swap_payment`], but the redeem branch
/// locks to the public key hash behind `bob_address`.
pub fn build_p2pkh_swap_payment(
    alice_refund_pubkey: &[u8],
    bob_refund_pubkey: &[u8],
    bob_address: &str,
    secret_hash: &[u8],
    network: BtcNetwork,
) -> Result<ScriptBuf, BtcError> {
    check_secret_hash(secret_hash)?;
    let bob_hash = address::decode_pubkey_hash(bob_address, network)?;

    Ok(Builder::new()
        .push_opcode(OP_IF)
        .push_int(2)
        .push_slice(non_empty_push(alice_refund_pubkey, "alice refund public key")?)
        .push_slice(non_empty_push(bob_refund_pubkey, "bob refund public key")?)
        .push_int(2)
        .push_opcode(OP_CHECKMULTISIG)
        .push_opcode(OP_ELSE)
        .push_opcode(hash_opcode(SWAP_HASH_ALGORITHM))
        .push_slice(non_empty_push(secret_hash, "secret hash")?)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(bob_hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ENDIF)
        .into_script())
}

/// Hashed time-locked payment: Alice may take the funds back after
/// `lock_time`, Bob may take them at any time by revealing a secret of
/// `secret_size` bytes that hashes to `secret_hash`.
pub fn build_htlc_p2pkh_swap_payment(
    alice_refund_address: &str,
    bob_address: &str,
    lock_time: u32,
    secret_hash: &[u8],
    secret_size: u32,
    network: BtcNetwork,
) -> Result<ScriptBuf, BtcError> {
    check_secret_hash(secret_hash)?;
    if secret_size == 0 {
        return Err(BtcError::InvalidArgument("secret size must be positive".into()));
    }
    if lock_time == 0 {
        return Err(BtcError::InvalidArgument("lock time must be positive".into()));
    }

    let alice_hash = address::decode_pubkey_hash(alice_refund_address, network)?;
    let bob_hash = address::decode_pubkey_hash(bob_address, network)?;

    Ok(Builder::new()
        .push_opcode(OP_IF)
        .push_int(i64::from(lock_time))
        .push_opcode(OP_CLTV)
        .push_opcode(OP_DROP)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(alice_hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ELSE)
        .push_opcode(OP_SIZE)
        .push_int(i64::from(secret_size))
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(hash_opcode(SWAP_HASH_ALGORITHM))
        .push_slice(non_empty_push(secret_hash, "secret hash")?)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_slice(bob_hash)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ENDIF)
        .into_script())
}

/// `0 <aliceSig> <bobSig> 1`: cooperative refund through the multisig branch.
/// The leading `0` is the dummy element CHECKMULTISIG consumes.
pub fn build_swap_refund(alice_sig: &[u8], bob_sig: &[u8]) -> Result<ScriptBuf, BtcError> {
    Ok(Builder::new()
        .push_int(0)
        .push_slice(non_empty_push(alice_sig, "alice signature")?)
        .push_slice(non_empty_push(bob_sig, "bob signature")?)
        .push_int(1)
        .into_script())
}

/// `<aliceSig> <alicePubKey> 1`: single-signer refund after the lock time.
pub fn build_htlc_swap_refund(alice_sig: &[u8], alice_pubkey: &[u8]) -> Result<ScriptBuf, BtcError> {
    Ok(Builder::new()
        .push_slice(non_empty_push(alice_sig, "alice signature")?)
        .push_slice(non_empty_push(alice_pubkey, "alice public key")?)
        .push_int(1)
        .into_script())
}

/// `<sig> <secret> 0`
pub fn build_p2pk_swap_redeem(sig: &[u8], secret: &[u8]) -> Result<ScriptBuf, BtcError> {
    Ok(Builder::new()
        .push_slice(non_empty_push(sig, "signature")?)
        .push_slice(non_empty_push(secret, "secret")?)
        .push_int(0)
        .into_script())
}

/// `<sig> <pubKey> <secret> 0`
pub fn build_p2pkh_swap_redeem(sig: &[u8], pubkey: &[u8], secret: &[u8]) -> Result<ScriptBuf, BtcError> {
    Ok(Builder::new()
        .push_slice(non_empty_push(sig, "signature")?)
        .push_slice(non_empty_push(pubkey, "public key")?)
        .push_slice(non_empty_push(secret, "secret")?)
        .push_int(0)
        .into_script())
}

/// Append the redeem script push that a P2SH spend reveals after the
/// unlocking data.
pub fn wrap_p2sh_unlock(unlock: &Script, redeem_script: &Script) -> Result<ScriptBuf, BtcError> {
    let mut script = unlock.to_owned();
    script.push_slice(push_bytes(redeem_script.as_bytes(), "redeem script")?);
    Ok(script)
}

/// Convert push-only unlocking data into a P2WSH witness stack ending with
/// the witness script.
pub fn unlock_to_witness(unlock: &Script, witness_script: &Script) -> Result<Witness, BtcError> {
    let mut witness = Witness::new();
    for instruction in unlock.instructions() {
        match instruction.map_err(|e| BtcError::MalformedScript(e.to_string()))? {
            Instruction::PushBytes(data) => witness.push(data.as_bytes()),
            Instruction::Op(op) => match small_int(op) {
                Some(n) => witness.push([n as u8]),
                None => {
                    return Err(BtcError::MalformedScript(format!(
                        "unlocking data is not push-only: {op}"
                    )))
                }
            },
        }
    }
    witness.push(witness_script.as_bytes());
    Ok(witness)
}

/// Wrap unlocking data for the given output kind.
pub fn wrap_unlock(
    unlock: &Script,
    redeem_script: &Script,
    kind: SwapOutputKind,
) -> Result<UnlockData, BtcError> {
    match kind {
        SwapOutputKind::P2sh => Ok(UnlockData::ScriptSig(wrap_p2sh_unlock(unlock, redeem_script)?)),
        SwapOutputKind::P2wsh => Ok(UnlockData::Witness(unlock_to_witness(unlock, redeem_script)?)),
    }
}

/// Unlocking data for one input: a script-sig for legacy spends, a witness
/// for segwit spends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockData {
    ScriptSig(ScriptBuf),
    Witness(Witness),
}

// ─── Recognizers ────────────────────────────────────────────────────

/// One position of a script template.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Op(Opcode),
    /// Non-empty data push.
    Data,
    /// Data push of exactly this many bytes.
    Hash(usize),
    /// Minimally or non-minimally encoded script number.
    Number,
    /// OP_0 / empty push.
    Zero,
    /// HASH160, HASH256 or SHA256.
    SwapHash,
}

const P2PK_SWAP_PAYMENT: [Slot; P2PK_SWAP_PAYMENT_OPS] = [
    Slot::Op(OP_IF),
    Slot::Op(OP_PUSHNUM_2),
    Slot::Data,
    Slot::Data,
    Slot::Op(OP_PUSHNUM_2),
    Slot::Op(OP_CHECKMULTISIG),
    Slot::Op(OP_ELSE),
    Slot::SwapHash,
    Slot::Data,
    Slot::Op(OP_EQUALVERIFY),
    Slot::Data,
    Slot::Op(OP_CHECKSIG),
    Slot::Op(OP_ENDIF),
];

const P2PKH_SWAP_PAYMENT: [Slot; P2PKH_SWAP_PAYMENT_OPS] = [
    Slot::Op(OP_IF),
    Slot::Op(OP_PUSHNUM_2),
    Slot::Data,
    Slot::Data,
    Slot::Op(OP_PUSHNUM_2),
    Slot::Op(OP_CHECKMULTISIG),
    Slot::Op(OP_ELSE),
    Slot::SwapHash,
    Slot::Data,
    Slot::Op(OP_EQUALVERIFY),
    Slot::Op(OP_DUP),
    Slot::Op(OP_HASH160),
    Slot::Hash(20),
    Slot::Op(OP_EQUALVERIFY),
    Slot::Op(OP_CHECKSIG),
    Slot::Op(OP_ENDIF),
];

const HTLC_P2PKH_SWAP_PAYMENT: [Slot; HTLC_P2PKH_SWAP_PAYMENT_OPS] = [
    Slot::Op(OP_IF),
    Slot::Number,
    Slot::Op(OP_CLTV),
    Slot::Op(OP_DROP),
    Slot::Op(OP_DUP),
    Slot::Op(OP_HASH160),
    Slot::Hash(20),
    Slot::Op(OP_EQUALVERIFY),
    Slot::Op(OP_CHECKSIG),
    Slot::Op(OP_ELSE),
    Slot::Op(OP_SIZE),
    Slot::Number,
    Slot::Op(OP_EQUALVERIFY),
    Slot::SwapHash,
    Slot::Data,
    Slot::Op(OP_EQUALVERIFY),
    Slot::Op(OP_DUP),
    Slot::Op(OP_HASH160),
    Slot::Hash(20),
    Slot::Op(OP_EQUALVERIFY),
    Slot::Op(OP_CHECKSIG),
    Slot::Op(OP_ENDIF),
];

const SWAP_REFUND: [Slot; 4] = [Slot::Zero, Slot::Data, Slot::Data, Slot::Op(OP_PUSHNUM_1)];
const HTLC_SWAP_REFUND: [Slot; 3] = [Slot::Data, Slot::Data, Slot::Op(OP_PUSHNUM_1)];
const P2PK_SWAP_REDEEM: [Slot; 3] = [Slot::Data, Slot::Data, Slot::Zero];
const P2PKH_SWAP_REDEEM: [Slot; 4] = [Slot::Data, Slot::Data, Slot::Data, Slot::Zero];

pub fn is_p2pk_swap_payment(script: &Script) -> bool {
    match_template(script, &P2PK_SWAP_PAYMENT).is_ok()
}

pub fn is_p2pkh_swap_payment(script: &Script) -> bool {
    match_template(script, &P2PKH_SWAP_PAYMENT).is_ok()
}

pub fn is_htlc_p2pkh_swap_payment(script: &Script) -> bool {
    match_template(script, &HTLC_P2PKH_SWAP_PAYMENT).is_ok()
}

/// Any of the swap payment templates.
pub fn is_swap_payment(script: &Script) -> bool {
    is_p2pk_swap_payment(script) || is_p2pkh_swap_payment(script) || is_htlc_p2pkh_swap_payment(script)
}

/// Cooperative multisig refund script-sig, bare or P2SH-wrapped.
pub fn is_swap_refund(script_sig: &Script) -> bool {
    match_unlock(script_sig, &SWAP_REFUND).is_ok()
}

pub fn is_htlc_swap_refund(script_sig: &Script) -> bool {
    match_unlock(script_sig, &HTLC_SWAP_REFUND).is_ok()
}

pub fn is_p2pk_swap_redeem(script_sig: &Script) -> bool {
    match_unlock(script_sig, &P2PK_SWAP_REDEEM).is_ok()
}

pub fn is_p2pkh_swap_redeem(script_sig: &Script) -> bool {
    match_unlock(script_sig, &P2PKH_SWAP_REDEEM).is_ok()
}

// ─── Extractors ─────────────────────────────────────────────────────

pub fn extract_secret_hash_from_p2pk_swap(script: &Script) -> Result<Vec<u8>, BtcError> {
    let ops = match_template(script, &P2PK_SWAP_PAYMENT)?;
    checked_secret_hash(&ops[7], &ops[8])
}

pub fn extract_secret_hash_from_p2pkh_swap(script: &Script) -> Result<Vec<u8>, BtcError> {
    let ops = match_template(script, &P2PKH_SWAP_PAYMENT)?;
    checked_secret_hash(&ops[7], &ops[8])
}

pub fn extract_target_hash_from_p2pkh_swap(script: &Script) -> Result<[u8; 20], BtcError> {
    let ops = match_template(script, &P2PKH_SWAP_PAYMENT)?;
    hash20(&ops[12])
}

/// CHECKLOCKTIMEVERIFY operand of an HTLC payment script.
pub fn extract_lock_time_from_htlc(script: &Script) -> Result<u32, BtcError> {
    let ops = match_template(script, &HTLC_P2PKH_SWAP_PAYMENT)?;
    let lock_time = script_number(&ops[1])
        .ok_or_else(|| BtcError::MalformedScript("lock time is not a script number".into()))?;
    u32::try_from(lock_time)
        .map_err(|_| BtcError::MalformedScript(format!("lock time {lock_time} out of range")))
}

pub fn extract_secret_size_from_htlc(script: &Script) -> Result<u32, BtcError> {
    let ops = match_template(script, &HTLC_P2PKH_SWAP_PAYMENT)?;
    let size = script_number(&ops[11])
        .ok_or_else(|| BtcError::MalformedScript("secret size is not a script number".into()))?;
    u32::try_from(size)
        .ok()
        .filter(|s| *s > 0)
        .ok_or_else(|| BtcError::MalformedScript(format!("secret size {size} out of range")))
}

pub fn extract_secret_hash_from_htlc(script: &Script) -> Result<Vec<u8>, BtcError> {
    let ops = match_template(script, &HTLC_P2PKH_SWAP_PAYMENT)?;
    checked_secret_hash(&ops[13], &ops[14])
}

/// Public key hash the redeem branch pays to.
pub fn extract_target_hash_from_htlc(script: &Script) -> Result<[u8; 20], BtcError> {
    let ops = match_template(script, &HTLC_P2PKH_SWAP_PAYMENT)?;
    hash20(&ops[18])
}

/// Public key hash the refund branch pays to.
pub fn extract_refund_hash_from_htlc(script: &Script) -> Result<[u8; 20], BtcError> {
    let ops = match_template(script, &HTLC_P2PKH_SWAP_PAYMENT)?;
    hash20(&ops[6])
}

/// Hash algorithm the HTLC redeem branch applies to the secret.
pub fn extract_hash_algorithm_from_htlc(script: &Script) -> Result<HashAlgorithm, BtcError> {
    let ops = match_template(script, &HTLC_P2PKH_SWAP_PAYMENT)?;
    hash_algorithm_at(&ops[13])
}

/// Secret revealed by a `<sig> <pubKey> <secret> 0 [<redeemScript>]` script-sig.
pub fn extract_secret_from_p2pkh_swap_redeem(script_sig: &Script) -> Result<Vec<u8>, BtcError> {
    let ops = match_unlock(script_sig, &P2PKH_SWAP_REDEEM)?;
    data(&ops[2])
}

/// Secret revealed by a `<sig> <secret> 0 [<redeemScript>]` script-sig.
pub fn extract_secret_from_p2pk_swap_redeem(script_sig: &Script) -> Result<Vec<u8>, BtcError> {
    let ops = match_unlock(script_sig, &P2PK_SWAP_REDEEM)?;
    data(&ops[1])
}

/// Secret revealed by a P2WSH redeem witness
/// `[<sig>, <pubKey>, <secret>, <empty>, <witnessScript>]`.
pub fn extract_secret_from_htlc_witness(witness: &Witness) -> Result<Vec<u8>, BtcError> {
    let witness_script = Script::from_bytes(witness.last().unwrap_or_default());
    if !is_htlc_p2pkh_swap_payment(witness_script) {
        return Err(BtcError::MalformedScript(
            "witness script is not an HTLC swap payment".into(),
        ));
    }
    extract_secret_from_swap_witness(witness)
}

/// Secret revealed by the P2WSH redeem witness of any swap payment:
/// `[<sig>, <pubKey>, <secret>, <empty>, <witnessScript>]` for P2PKH and
/// HTLC swaps, `[<sig>, <secret>, <empty>, <witnessScript>]` for P2PK swaps.
pub fn extract_secret_from_swap_witness(witness: &Witness) -> Result<Vec<u8>, BtcError> {
    let witness_script = Script::from_bytes(witness.last().unwrap_or_default());
    let (items, secret_at) = if is_htlc_p2pkh_swap_payment(witness_script) || is_p2pkh_swap_payment(witness_script) {
        (5, 2)
    } else if is_p2pk_swap_payment(witness_script) {
        (4, 1)
    } else {
        return Err(BtcError::MalformedScript(
            "witness script is not a swap payment".into(),
        ));
    };

    if witness.len() != items {
        return Err(BtcError::MalformedScript(format!(
            "expected {items} witness items, got {}",
            witness.len()
        )));
    }
    let selector = witness.nth(items - 2).unwrap_or_default();
    if !selector.is_empty() {
        return Err(BtcError::MalformedScript(
            "witness does not select the redeem branch".into(),
        ));
    }
    match witness.nth(secret_at) {
        Some(secret) if !secret.is_empty() => Ok(secret.to_vec()),
        _ => Err(BtcError::MalformedScript("witness carries no secret".into())),
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn check_secret_hash(secret_hash: &[u8]) -> Result<(), BtcError> {
    if secret_hash.is_empty() {
        return Err(BtcError::InvalidArgument("secret hash must not be empty".into()));
    }
    SWAP_HASH_ALGORITHM.check_len(secret_hash)?;
    Ok(())
}

/// Script made only of data pushes; an empty item encodes as OP_0.
pub(crate) fn push_only(items: &[&[u8]]) -> Result<ScriptBuf, BtcError> {
    let mut script = ScriptBuf::new();
    for item in items {
        script.push_slice(push_bytes(item, "script item")?);
    }
    Ok(script)
}

fn push_bytes<'a>(data: &'a [u8], what: &str) -> Result<&'a PushBytes, BtcError> {
    <&PushBytes>::try_from(data)
        .map_err(|_| BtcError::InvalidArgument(format!("{what} is too large to push")))
}

fn non_empty_push<'a>(data: &'a [u8], what: &str) -> Result<&'a PushBytes, BtcError> {
    if data.is_empty() {
        return Err(BtcError::InvalidArgument(format!("{what} must not be empty")));
    }
    push_bytes(data, what)
}

fn small_int(op: Opcode) -> Option<i64> {
    let code = op.to_u8();
    (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8())
        .contains(&code)
        .then(|| i64::from(code - OP_PUSHNUM_1.to_u8() + 1))
}

/// Decode a CScriptNum of at most 5 bytes (the CHECKLOCKTIMEVERIFY limit).
fn decode_script_num(bytes: &[u8]) -> Option<i64> {
    if bytes.len() > 5 {
        return None;
    }
    let Some((&last, _)) = bytes.split_last() else {
        return Some(0);
    };
    let mut value: i64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        value |= i64::from(*byte) << (8 * i);
    }
    if last & 0x80 != 0 {
        value &= !(0x80_i64 << (8 * (bytes.len() - 1)));
        value = -value;
    }
    Some(value)
}

fn script_number(instruction: &Instruction<'_>) -> Option<i64> {
    match instruction {
        Instruction::Op(op) => small_int(*op),
        Instruction::PushBytes(data) => decode_script_num(data.as_bytes()),
    }
}

fn slot_matches(slot: Slot, instruction: &Instruction<'_>) -> bool {
    match (slot, instruction) {
        (Slot::Op(expected), Instruction::Op(op)) => *op == expected,
        (Slot::Data, Instruction::PushBytes(data)) => !data.is_empty(),
        (Slot::Hash(len), Instruction::PushBytes(data)) => data.len() == len,
        (Slot::Zero, Instruction::PushBytes(data)) => data.is_empty(),
        (Slot::Number, instruction) => script_number(instruction).is_some(),
        (Slot::SwapHash, Instruction::Op(op)) => swap_hash_algorithm(*op).is_some(),
        _ => false,
    }
}

fn match_template<'a>(script: &'a Script, template: &[Slot]) -> Result<Vec<Instruction<'a>>, BtcError> {
    let ops = script
        .instructions()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BtcError::MalformedScript(e.to_string()))?;

    if ops.len() != template.len() {
        return Err(BtcError::MalformedScript(format!(
            "expected {} ops, got {}",
            template.len(),
            ops.len()
        )));
    }

    for (i, (slot, op)) in template.iter().zip(&ops).enumerate() {
        if !slot_matches(*slot, op) {
            return Err(BtcError::MalformedScript(format!("unexpected op at position {i}")));
        }
    }

    Ok(ops)
}

/// Match unlocking data either bare or followed by a P2SH redeem script push.
fn match_unlock<'a>(script_sig: &'a Script, template: &[Slot]) -> Result<Vec<Instruction<'a>>, BtcError> {
    match match_template(script_sig, template) {
        Ok(ops) => Ok(ops),
        Err(bare_err) => {
            let mut wrapped = template.to_vec();
            wrapped.push(Slot::Data);
            match_template(script_sig, &wrapped).map_err(|_| bare_err)
        }
    }
}

fn data(instruction: &Instruction<'_>) -> Result<Vec<u8>, BtcError> {
    match instruction {
        Instruction::PushBytes(data) => Ok(data.as_bytes().to_vec()),
        Instruction::Op(op) => Err(BtcError::MalformedScript(format!("expected data push, got {op}"))),
    }
}

fn hash20(instruction: &Instruction<'_>) -> Result<[u8; 20], BtcError> {
    data(instruction)?
        .try_into()
        .map_err(|_| BtcError::MalformedScript("expected a 20-byte hash".into()))
}

fn hash_algorithm_at(instruction: &Instruction<'_>) -> Result<HashAlgorithm, BtcError> {
    match instruction {
        Instruction::Op(op) => swap_hash_algorithm(*op)
            .ok_or_else(|| BtcError::MalformedScript(format!("{op} is not a swap hash opcode"))),
        Instruction::PushBytes(_) => Err(BtcError::MalformedScript("expected a hash opcode".into())),
    }
}

/// The pushed secret hash, required to have the digest length of the hash
/// opcode preceding it.
fn checked_secret_hash(hash_op: &Instruction<'_>, hash: &Instruction<'_>) -> Result<Vec<u8>, BtcError> {
    let algorithm = hash_algorithm_at(hash_op)?;
    let hash = data(hash)?;
    algorithm
        .check_len(&hash)
        .map_err(|e| BtcError::MalformedScript(format!("{algorithm} secret hash: {e}")))?;
    Ok(hash)
}
