//! Verification of a counterparty's swap payment before we commit funds of
//! our own against it.

use bitcoin::script::ScriptBuf;
use bitcoin::{Amount, Transaction};
use tracing::{debug, warn};

use crate::address;
use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::script::{self, SwapOutputKind};

/// What the counterparty's payment must look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyPaymentExpectations {
    /// Redeem script agreed for the swap.
    pub redeem_script: ScriptBuf,
    pub secret_hash: Vec<u8>,
    /// Our address, which the redeem branch must pay.
    pub target_address: String,
    pub required_amount: Amount,
    /// Unix time the swap was started.
    pub swap_timestamp: u64,
    /// Minimum time, in seconds, between the swap start and the refund lock
    /// time embedded in the script.
    pub min_refund_lock_time: u64,
    pub network: BtcNetwork,
}

/// Swap terms read back from a redeem script.
struct SwapTerms {
    secret_hash: Vec<u8>,
    target_hash: [u8; 20],
    lock_time: Option<u32>,
}

fn read_terms(redeem_script: &bitcoin::Script) -> Result<SwapTerms, BtcError> {
    if script::is_htlc_p2pkh_swap_payment(redeem_script) {
        Ok(SwapTerms {
            secret_hash: script::extract_secret_hash_from_htlc(redeem_script)?,
            target_hash: script::extract_target_hash_from_htlc(redeem_script)?,
            lock_time: Some(script::extract_lock_time_from_htlc(redeem_script)?),
        })
    } else if script::is_p2pkh_swap_payment(redeem_script) {
        Ok(SwapTerms {
            secret_hash: script::extract_secret_hash_from_p2pkh_swap(redeem_script)?,
            target_hash: script::extract_target_hash_from_p2pkh_swap(redeem_script)?,
            lock_time: None,
        })
    } else {
        Err(BtcError::MalformedScript("not a P2PKH or HTLC swap script".into()))
    }
}

/// Find the output of `tx` that pays the expected swap and check its terms.
///
/// Returns the index of the accepted output. Outputs that do not pay to the
/// redeem script, or whose script terms differ from the expectations, are
/// skipped rather than rejected, so a decoy output cannot mask the real one.
/// Every failure comes back as a structured [`BtcError`]: extraction errors
/// are reported as [`BtcError::TransactionVerification`].
pub fn verify_party_payment_tx(
    tx: &Transaction,
    expected: &PartyPaymentExpectations,
) -> Result<u32, BtcError> {
    let target_hash = address::decode_pubkey_hash(&expected.target_address, expected.network)
        .map_err(|e| BtcError::verification(format!("bad target address: {e}")))?;

    for (vout, output) in tx.output.iter().enumerate() {
        if SwapOutputKind::detect(&output.script_pubkey, &expected.redeem_script).is_none() {
            continue;
        }

        let terms = match read_terms(&expected.redeem_script) {
            Ok(terms) => terms,
            Err(e) => {
                warn!(vout, error = %e, "swap output has unreadable redeem script");
                continue;
            }
        };
        if terms.secret_hash != expected.secret_hash || terms.target_hash != target_hash {
            debug!(vout, "swap output terms do not match");
            continue;
        }

        if let Some(lock_time) = terms.lock_time {
            let delta = i128::from(lock_time) - i128::from(expected.swap_timestamp);
            if delta < i128::from(expected.min_refund_lock_time) {
                return Err(BtcError::InvalidRefundLockTime {
                    lock_time,
                    swap_timestamp: expected.swap_timestamp,
                    minimum: expected.min_refund_lock_time,
                });
            }
        }

        if output.value < expected.required_amount {
            return Err(BtcError::InvalidSwapPaymentAmount {
                value: output.value.to_sat(),
                required: expected.required_amount.to_sat(),
            });
        }

        debug!(txid = %tx.compute_txid(), vout, value = %output.value, "party payment verified");
        return Ok(vout as u32);
    }

    Err(BtcError::verification(format!(
        "no swap outputs for address {}",
        expected.target_address
    )))
}
