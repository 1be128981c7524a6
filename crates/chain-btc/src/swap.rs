//! Swap transaction factory: builds the payment that locks funds into a
//! swap script and the refund/redeem transactions that spend it.
//!
//! Construction is split from signing. `create_*` functions return unsigned
//! transactions; `install_*` functions take signatures produced elsewhere
//! (e.g. by an asynchronous signing oracle) and put the unlocking data in
//! place; `sign_*` functions do both with a local [`HashSigner`].

use bitcoin::absolute::LockTime;
use bitcoin::script::{Script, ScriptBuf};
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::{Amount, OutPoint, Sequence, Transaction, TxOut};
use tracing::{debug, warn};

use crate::address;
use crate::error::BtcError;
use crate::fee;
use crate::network::BtcNetwork;
use crate::script::{self, SwapOutputKind, LOCKTIME_THRESHOLD, SWAP_HASH_ALGORITHM};
use crate::selection::{self, Destination, FeePolicy, TransactionParams};
use crate::signer::{self, HashSigner};
use crate::transaction::BtcTransaction;
use crate::utxo::{InputToSign, SwapSpend, UnspentOutput};

/// Terms of an HTLC swap payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPaymentRequest {
    pub amount: Amount,
    /// Address whose key may refund after `lock_time`.
    pub refund_address: String,
    /// Address whose key may redeem with the secret.
    pub to_address: String,
    /// Address receiving change from the funding inputs.
    pub change_address: String,
    pub lock_time: u32,
    pub secret_hash: Vec<u8>,
    pub secret_size: u32,
    pub output_kind: SwapOutputKind,
}

/// An unsigned swap payment and the redeem script it locks to.
///
/// The redeem script cannot be recovered from a P2SH/P2WSH output and must
/// be kept by the caller to refund or redeem later.
#[derive(Debug, Clone)]
pub struct SwapPayment {
    pub tx: BtcTransaction,
    pub redeem_script: ScriptBuf,
    pub output_kind: SwapOutputKind,
    /// Address of the swap output, for the counterparty to watch.
    pub swap_address: String,
    /// Index of the swap output in `tx`.
    pub swap_vout: u32,
    pub params: TransactionParams,
}

impl SwapPayment {
    /// The swap output as a coin the refund or redeem transaction spends.
    /// The txid changes when legacy inputs are signed, so call this on the
    /// signed payment.
    pub fn swap_output(&self) -> Result<UnspentOutput, BtcError> {
        let out = self
            .tx
            .tx()
            .output
            .get(self.swap_vout as usize)
            .ok_or_else(|| BtcError::TransactionBuildError("swap output missing".into()))?;
        Ok(UnspentOutput::from_tx_out(self.tx.txid(), self.swap_vout, out))
    }

    /// Outputs spent by the payment's inputs, in input order.
    pub fn spent_outputs(&self) -> Vec<UnspentOutput> {
        self.params.inputs.iter().map(|i| i.output.clone()).collect()
    }
}

/// Build an unsigned payment locking `request.amount` into an HTLC swap
/// script, funded from `available`.
pub fn create_swap_payment_tx(
    available: &[InputToSign],
    request: &SwapPaymentRequest,
    fee_policy: FeePolicy,
    dust: Amount,
    network: BtcNetwork,
) -> Result<SwapPayment, BtcError> {
    if request.amount < dust {
        return Err(BtcError::InsufficientAmount {
            amount: request.amount.to_sat(),
            dust: dust.to_sat(),
        });
    }

    let redeem_script = script::build_htlc_p2pkh_swap_payment(
        &request.refund_address,
        &request.to_address,
        request.lock_time,
        &request.secret_hash,
        request.secret_size,
        network,
    )?;
    let lock_script = request.output_kind.script_pubkey(&redeem_script);
    let swap_address = address::redeem_script_address(&redeem_script, network, request.output_kind)?;
    let change_script = address::script_pubkey_for(&request.change_address, network)?;

    let destinations = [Destination::new(request.amount, lock_script)];
    let params = selection::select(available, &destinations, &change_script, fee_policy, dust)
        .ok_or_else(|| selection::insufficient_funds(available, &destinations, fee_policy))?;

    if params.dust_change > Amount::ZERO {
        warn!(dust_change = %params.dust_change, "swap payment folds dust change into fee");
    }

    let tx = build_from_params(&params, &destinations, network);
    debug!(
        txid = %tx.txid(),
        amount = %request.amount,
        fee = %params.fee,
        inputs = params.inputs.len(),
        %swap_address,
        "created swap payment"
    );

    Ok(SwapPayment {
        tx,
        redeem_script,
        output_kind: request.output_kind,
        swap_address,
        swap_vout: 0,
        params,
    })
}

/// Unsigned transaction paying `destinations` then the change output, if any.
pub(crate) fn build_from_params(
    params: &TransactionParams,
    destinations: &[Destination],
    network: BtcNetwork,
) -> BtcTransaction {
    let mut outputs: Vec<TxOut> = destinations.iter().map(Destination::tx_out).collect();
    outputs.extend(params.change_output());

    let spent: Vec<UnspentOutput> = params.inputs.iter().map(|i| i.output.clone()).collect();
    let mut tx = BtcTransaction::unsigned(
        &spent,
        outputs,
        LockTime::ZERO,
        Sequence::ENABLE_RBF_NO_LOCKTIME,
        network,
    );
    tx.set_known_fee(params.fee);
    tx
}

/// Unsigned refund of a swap output to `to_address`.
///
/// For HTLC scripts `lock_time` must be at or past the embedded lock time
/// and of the same kind (block height or Unix time).
pub fn create_swap_refund_tx(
    payment_output: &UnspentOutput,
    redeem_script: &Script,
    to_address: &str,
    lock_time: u32,
    fee_policy: FeePolicy,
    dust: Amount,
    network: BtcNetwork,
) -> Result<BtcTransaction, BtcError> {
    if script::is_htlc_p2pkh_swap_payment(redeem_script) {
        let embedded = script::extract_lock_time_from_htlc(redeem_script)?;
        if lock_time < embedded {
            return Err(BtcError::InvalidArgument(format!(
                "refund lock time {lock_time} is before the script lock time {embedded}"
            )));
        }
        if (lock_time < LOCKTIME_THRESHOLD) != (embedded < LOCKTIME_THRESHOLD) {
            return Err(BtcError::InvalidArgument(
                "refund lock time and script lock time use different units".into(),
            ));
        }
    }

    let sequence = if lock_time > 0 {
        Sequence::ENABLE_LOCKTIME_NO_RBF
    } else {
        Sequence::MAX
    };

    let tx = spend_swap_output(
        payment_output,
        redeem_script,
        SwapSpend::Refund,
        to_address,
        LockTime::from_consensus(lock_time),
        sequence,
        fee_policy,
        dust,
        network,
    )?;
    debug!(txid = %tx.txid(), lock_time, "created swap refund");
    Ok(tx)
}

/// Unsigned redeem of a swap output to `to_address` with a secret of
/// `secret_size` bytes.
pub fn create_swap_redeem_tx(
    payment_output: &UnspentOutput,
    redeem_script: &Script,
    to_address: &str,
    secret_size: usize,
    fee_policy: FeePolicy,
    dust: Amount,
    network: BtcNetwork,
) -> Result<BtcTransaction, BtcError> {
    if script::is_htlc_p2pkh_swap_payment(redeem_script) {
        let embedded = script::extract_secret_size_from_htlc(redeem_script)?;
        if secret_size != embedded as usize {
            return Err(BtcError::InvalidArgument(format!(
                "secret size {secret_size} does not match the script's {embedded}"
            )));
        }
    }

    let tx = spend_swap_output(
        payment_output,
        redeem_script,
        SwapSpend::Redeem { secret_size },
        to_address,
        LockTime::ZERO,
        Sequence::MAX,
        fee_policy,
        dust,
        network,
    )?;
    debug!(txid = %tx.txid(), "created swap redeem");
    Ok(tx)
}

#[allow(clippy::too_many_arguments)]
fn spend_swap_output(
    payment_output: &UnspentOutput,
    redeem_script: &Script,
    spend: SwapSpend,
    to_address: &str,
    lock_time: LockTime,
    sequence: Sequence,
    fee_policy: FeePolicy,
    dust: Amount,
    network: BtcNetwork,
) -> Result<BtcTransaction, BtcError> {
    let input = InputToSign::for_swap(payment_output.clone(), redeem_script, spend)?;
    let to_script = address::script_pubkey_for(to_address, network)?;

    let weight = fee::transaction_weight(
        std::slice::from_ref(&input),
        &[fee::output_weight(to_script.len())],
    );
    let fee = fee_policy.fee_for(weight);
    let value = payment_output
        .value
        .checked_sub(fee)
        .ok_or(BtcError::InsufficientFunds {
            needed: fee.to_sat(),
            available: payment_output.value.to_sat(),
        })?;
    if value < dust {
        return Err(BtcError::InsufficientAmount {
            amount: value.to_sat(),
            dust: dust.to_sat(),
        });
    }

    let out = TxOut {
        value,
        script_pubkey: to_script,
    };
    let mut tx = BtcTransaction::unsigned(
        std::slice::from_ref(payment_output),
        vec![out],
        lock_time,
        sequence,
        network,
    );
    tx.set_known_fee(fee);
    Ok(tx)
}

/// Digest both parties sign to spend a swap output.
pub fn swap_signature_hash(
    tx: &BtcTransaction,
    payment_output: &UnspentOutput,
    redeem_script: &Script,
) -> Result<[u8; 32], BtcError> {
    tx.signature_hash(payment_output, Some(redeem_script), EcdsaSighashType::All)
}

/// Install `<sig> <pubKey> 1` on an HTLC refund.
pub fn install_htlc_refund(
    tx: &mut BtcTransaction,
    payment_output: &UnspentOutput,
    redeem_script: &Script,
    der_signature: &[u8],
    pubkey: &[u8],
) -> Result<(), BtcError> {
    let sig = checked_signature(tx, payment_output, redeem_script, der_signature, pubkey)?;
    let unlock = script::build_htlc_swap_refund(&sig, pubkey)?;
    install(tx, payment_output, redeem_script, &unlock)
}

/// Install `0 <aliceSig> <bobSig> 1` on a cooperative multisig refund.
pub fn install_swap_refund(
    tx: &mut BtcTransaction,
    payment_output: &UnspentOutput,
    redeem_script: &Script,
    alice_der_signature: &[u8],
    bob_der_signature: &[u8],
) -> Result<(), BtcError> {
    let alice = signer::encode_signature(alice_der_signature, EcdsaSighashType::All)?;
    let bob = signer::encode_signature(bob_der_signature, EcdsaSighashType::All)?;
    let unlock = script::build_swap_refund(&alice, &bob)?;
    install(tx, payment_output, redeem_script, &unlock)
}

/// Install `<sig> <pubKey> <secret> 0` on a redeem of a P2PKH or HTLC swap.
pub fn install_p2pkh_redeem(
    tx: &mut BtcTransaction,
    payment_output: &UnspentOutput,
    redeem_script: &Script,
    der_signature: &[u8],
    pubkey: &[u8],
    secret: &[u8],
) -> Result<(), BtcError> {
    check_secret(redeem_script, secret)?;
    let sig = checked_signature(tx, payment_output, redeem_script, der_signature, pubkey)?;
    let unlock = script::build_p2pkh_swap_redeem(&sig, pubkey, secret)?;
    install(tx, payment_output, redeem_script, &unlock)
}

/// Install `<sig> <secret> 0` on a redeem of a P2PK swap.
pub fn install_p2pk_redeem(
    tx: &mut BtcTransaction,
    payment_output: &UnspentOutput,
    redeem_script: &Script,
    der_signature: &[u8],
    secret: &[u8],
) -> Result<(), BtcError> {
    check_secret(redeem_script, secret)?;
    let sig = signer::encode_signature(der_signature, EcdsaSighashType::All)?;
    let unlock = script::build_p2pk_swap_redeem(&sig, secret)?;
    install(tx, payment_output, redeem_script, &unlock)
}

/// Sign and install an HTLC refund with a local signer.
pub fn sign_htlc_refund<S: HashSigner + ?Sized>(
    tx: &mut BtcTransaction,
    payment_output: &UnspentOutput,
    redeem_script: &Script,
    signer: &S,
    key_path: &str,
) -> Result<(), BtcError> {
    let sighash = swap_signature_hash(tx, payment_output, redeem_script)?;
    let der = signer.sign_hash(&sighash, key_path)?;
    let pubkey = signer.public_key(key_path)?;
    install_htlc_refund(tx, payment_output, redeem_script, &der, &pubkey)
}

/// Sign and install a P2PKH/HTLC redeem with a local signer.
pub fn sign_p2pkh_redeem<S: HashSigner + ?Sized>(
    tx: &mut BtcTransaction,
    payment_output: &UnspentOutput,
    redeem_script: &Script,
    signer: &S,
    key_path: &str,
    secret: &[u8],
) -> Result<(), BtcError> {
    let sighash = swap_signature_hash(tx, payment_output, redeem_script)?;
    let der = signer.sign_hash(&sighash, key_path)?;
    let pubkey = signer.public_key(key_path)?;
    install_p2pkh_redeem(tx, payment_output, redeem_script, &der, &pubkey, secret)
}

/// Secret revealed by the input of `tx` spending `swap_outpoint`.
pub fn extract_secret_from_spend(tx: &Transaction, swap_outpoint: OutPoint) -> Result<Vec<u8>, BtcError> {
    let input = tx
        .input
        .iter()
        .find(|input| input.previous_output == swap_outpoint)
        .ok_or(BtcError::NoMatchingInput(swap_outpoint))?;

    if !input.witness.is_empty() {
        return script::extract_secret_from_swap_witness(&input.witness);
    }
    script::extract_secret_from_p2pkh_swap_redeem(&input.script_sig)
        .or_else(|_| script::extract_secret_from_p2pk_swap_redeem(&input.script_sig))
}

fn install(
    tx: &mut BtcTransaction,
    payment_output: &UnspentOutput,
    redeem_script: &Script,
    unlock: &Script,
) -> Result<(), BtcError> {
    let kind = payment_output.swap_output_kind(redeem_script).ok_or_else(|| {
        BtcError::InvalidArgument("output does not pay to the redeem script".into())
    })?;
    let data = script::wrap_unlock(unlock, redeem_script, kind)?;
    tx.set_signature(data, payment_output)
}

/// Verify a signature against the swap sighash before it goes on chain.
fn checked_signature(
    tx: &BtcTransaction,
    payment_output: &UnspentOutput,
    redeem_script: &Script,
    der_signature: &[u8],
    pubkey: &[u8],
) -> Result<Vec<u8>, BtcError> {
    let sighash = swap_signature_hash(tx, payment_output, redeem_script)?;
    signer::verify_signature(&sighash, der_signature, pubkey)?;
    signer::encode_signature(der_signature, EcdsaSighashType::All)
}

fn check_secret(redeem_script: &Script, secret: &[u8]) -> Result<(), BtcError> {
    let (algorithm, secret_hash) = if script::is_htlc_p2pkh_swap_payment(redeem_script) {
        (
            script::extract_hash_algorithm_from_htlc(redeem_script)?,
            script::extract_secret_hash_from_htlc(redeem_script)?,
        )
    } else if script::is_p2pkh_swap_payment(redeem_script) {
        (SWAP_HASH_ALGORITHM, script::extract_secret_hash_from_p2pkh_swap(redeem_script)?)
    } else {
        (SWAP_HASH_ALGORITHM, script::extract_secret_hash_from_p2pk_swap(redeem_script)?)
    };

    if algorithm.digest(secret) != secret_hash {
        return Err(BtcError::InvalidArgument(
            "secret does not match the script's secret hash".into(),
        ));
    }
    Ok(())
}
