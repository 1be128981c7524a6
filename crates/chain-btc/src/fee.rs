//! Transaction size estimation and the fee/change decision.
//!
//! Sizes are tracked in weight units and converted to virtual bytes
//! (`ceil(weight / 4)`) only when a fee is charged, so segwit inputs get
//! their exact discount.

use bitcoin::{Amount, FeeRate, Weight};

use crate::utxo::InputToSign;

/// Default dust threshold for standard outputs, in satoshis.
pub const DEFAULT_DUST_THRESHOLD: Amount = Amount::from_sat(546);

/// version + locktime
const TX_FIXED_BYTES: u64 = 8;
/// Segwit marker and flag bytes, counted at witness weight.
const SEGWIT_MARKER_WEIGHT: u64 = 2;
/// value field of an output
const OUTPUT_VALUE_BYTES: u64 = 8;

/// Length of a Bitcoin compact-size integer.
pub fn varint_len(n: u64) -> u64 {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Weight of an output with a locking script of `script_len` bytes.
pub fn output_weight(script_len: usize) -> Weight {
    let len = script_len as u64;
    Weight::from_non_witness_data_size(OUTPUT_VALUE_BYTES + varint_len(len) + len)
}

/// Weight of a transaction spending `inputs` into outputs of the given
/// weights, including the segwit marker/flag when any input carries a
/// witness and the empty witness count each legacy input then needs.
pub fn transaction_weight(inputs: &[InputToSign], outputs: &[Weight]) -> Weight {
    let header = TX_FIXED_BYTES + varint_len(inputs.len() as u64) + varint_len(outputs.len() as u64);

    let mut wu = header * 4;
    wu += inputs.iter().map(|i| i.signed_weight().to_wu()).sum::<u64>();
    wu += outputs.iter().map(|o| o.to_wu()).sum::<u64>();

    if inputs.iter().any(InputToSign::has_witness) {
        let legacy_inputs = inputs.iter().filter(|i| !i.has_witness()).count() as u64;
        wu += SEGWIT_MARKER_WEIGHT + legacy_inputs;
    }

    Weight::from_wu(wu)
}

/// Weights of a transaction without and with an extra change output.
///
/// The second value accounts for the output count varint growing when the
/// change output crosses a compact-size boundary.
pub fn transaction_weights(inputs: &[InputToSign], outputs: &[Weight], change: Weight) -> (Weight, Weight) {
    let without = transaction_weight(inputs, outputs);
    let mut with_outputs = outputs.to_vec();
    with_outputs.push(change);
    (without, transaction_weight(inputs, &with_outputs))
}

/// `ceil(vsize * rate)` where `vsize = ceil(weight / 4)`.
pub fn fee_for_weight(weight: Weight, rate: FeeRate) -> Amount {
    fee_for_vsize(weight.to_vbytes_ceil(), rate)
}

/// `ceil(vsize * rate)`, computed in sat/kwu so fractional sat/vB rates
/// round up instead of truncating.
pub fn fee_for_vsize(vsize: u64, rate: FeeRate) -> Amount {
    let millisat = u128::from(vsize) * u128::from(rate.to_sat_per_kwu());
    let sat = millisat.div_ceil(250);
    Amount::from_sat(u64::try_from(sat).unwrap_or(u64::MAX))
}

/// Outcome of a fee/change decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeDecision {
    /// Total fee the transaction pays, including any folded change.
    pub fee: Amount,
    /// Whether a change output is emitted.
    pub use_change: bool,
    /// Value of the change output when `use_change` is set.
    pub change: Amount,
    /// Leftover folded into `fee` because a change output for it would be dust.
    pub dust_change: Amount,
}

impl FeeDecision {
    fn exact(fee: Amount) -> Self {
        Self {
            fee,
            use_change: false,
            change: Amount::ZERO,
            dust_change: Amount::ZERO,
        }
    }

    fn folded(fee: Amount, dust_change: Amount) -> Self {
        Self {
            fee: fee + dust_change,
            use_change: false,
            change: Amount::ZERO,
            dust_change,
        }
    }

    fn with_change(fee: Amount, change: Amount) -> Self {
        Self {
            fee,
            use_change: true,
            change,
            dust_change: Amount::ZERO,
        }
    }
}

/// Decide the fee and whether to emit a change output at a fee rate.
///
/// `size` and `size_with_change` are virtual sizes. Returns `None` when
/// `available` cannot cover `required` plus the fee.
///
/// # Panics
///
/// Panics if `size_with_change < size`.
pub fn calculate_fee(
    size: u64,
    size_with_change: u64,
    available: Amount,
    required: Amount,
    rate: FeeRate,
    dust: Amount,
) -> Option<FeeDecision> {
    assert!(
        size_with_change >= size,
        "size with change ({size_with_change}) is smaller than size without change ({size})"
    );

    if available < required {
        return None;
    }

    let fee = fee_for_vsize(size, rate);
    let change = available.checked_sub(required)?.checked_sub(fee)?;

    if change == Amount::ZERO {
        return Some(FeeDecision::exact(fee));
    }
    if change < dust {
        return Some(FeeDecision::folded(fee, change));
    }

    let fee_with_change = fee_for_vsize(size_with_change, rate);
    let change_after_output = available
        .checked_sub(required)
        .and_then(|left| left.checked_sub(fee_with_change));

    match change_after_output {
        // Adding the output would leave a dust change: keep the leftover as fee.
        Some(new_change) if new_change < dust => Some(FeeDecision::folded(fee, change)),
        Some(new_change) => Some(FeeDecision::with_change(fee_with_change, new_change)),
        // The change output is unaffordable; the shape without it is paid for.
        None => Some(FeeDecision::folded(fee, change)),
    }
}

/// Fixed-fee variant: change is emitted whenever the leftover reaches the
/// dust threshold, otherwise folded into the fee.
pub fn calculate_fixed_fee(available: Amount, required: Amount, fee: Amount, dust: Amount) -> Option<FeeDecision> {
    let change = available.checked_sub(required)?.checked_sub(fee)?;

    if change == Amount::ZERO {
        Some(FeeDecision::exact(fee))
    } else if change < dust {
        Some(FeeDecision::folded(fee, change))
    } else {
        Some(FeeDecision::with_change(fee, change))
    }
}
