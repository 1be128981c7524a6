//! Coin selection.
//!
//! Both modes run the same three passes over the inputs sorted by ascending
//! value:
//!
//! 1. the first single input that pays for everything;
//! 2. otherwise, accumulate economical inputs until the running set pays;
//! 3. then drop the smallest inputs while the remaining set still pays.
//!
//! Selection never fails loudly: `None` means the inputs cannot cover the
//! destinations plus the fee in any combination the passes consider.

use bitcoin::script::{Script, ScriptBuf};
use bitcoin::{Amount, FeeRate, TxOut, Weight};
use tracing::debug;

use crate::error::BtcError;
use crate::fee::{self, FeeDecision};
use crate::utxo::InputToSign;

/// How the fee of a transaction is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
    /// Charge `ceil(vsize * rate)`.
    Rate(FeeRate),
    /// Charge a constant fee regardless of size.
    Fixed(Amount),
}

impl FeePolicy {
    /// Fee charged for a transaction of `weight`.
    pub fn fee_for(self, weight: Weight) -> Amount {
        match self {
            FeePolicy::Rate(rate) => fee::fee_for_weight(weight, rate),
            FeePolicy::Fixed(fee) => fee,
        }
    }

    fn decide(
        self,
        weight: Weight,
        weight_with_change: Weight,
        available: Amount,
        required: Amount,
        dust: Amount,
    ) -> Option<FeeDecision> {
        match self {
            FeePolicy::Rate(rate) => fee::calculate_fee(
                weight.to_vbytes_ceil(),
                weight_with_change.to_vbytes_ceil(),
                available,
                required,
                rate,
                dust,
            ),
            FeePolicy::Fixed(fee) => fee::calculate_fixed_fee(available, required, fee, dust),
        }
    }

    /// Whether spending `input` costs less than it is worth.
    fn is_economical(self, input: &InputToSign) -> bool {
        match self {
            FeePolicy::Rate(rate) => fee::fee_for_weight(input.signed_weight(), rate) < input.value(),
            FeePolicy::Fixed(_) => true,
        }
    }
}

/// An output the transaction must create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub amount: Amount,
    pub script_pubkey: ScriptBuf,
}

impl Destination {
    pub fn new(amount: Amount, script_pubkey: ScriptBuf) -> Self {
        Self {
            amount,
            script_pubkey,
        }
    }

    /// Serialized weight of the output.
    pub fn weight(&self) -> Weight {
        fee::output_weight(self.script_pubkey.len())
    }

    pub fn tx_out(&self) -> TxOut {
        TxOut {
            value: self.amount,
            script_pubkey: self.script_pubkey.clone(),
        }
    }
}

/// A successful selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionParams {
    /// Chosen inputs, ascending by value.
    pub inputs: Vec<InputToSign>,
    /// Weight of the transaction without a change output.
    pub weight: Weight,
    /// Weight of the transaction with a change output.
    pub weight_with_change: Weight,
    /// Total fee, including any dust folded into it.
    pub fee: Amount,
    /// Sum of the destination amounts.
    pub required: Amount,
    pub change_script: ScriptBuf,
    pub use_change: bool,
    /// Change output value when `use_change` is set.
    pub change: Amount,
    /// Leftover counted in `fee` because a change output for it would be dust.
    pub dust_change: Amount,
}

impl TransactionParams {
    /// Total value of the chosen inputs.
    pub fn available(&self) -> Amount {
        total_value(&self.inputs)
    }

    /// Weight of the transaction as it will be built.
    pub fn final_weight(&self) -> Weight {
        if self.use_change {
            self.weight_with_change
        } else {
            self.weight
        }
    }

    /// Change output, if one is emitted.
    pub fn change_output(&self) -> Option<TxOut> {
        self.use_change.then(|| TxOut {
            value: self.change,
            script_pubkey: self.change_script.clone(),
        })
    }
}

/// Select inputs paying `destinations` at `rate`, sending change above
/// `dust` to `change_script`.
pub fn select_by_fee_rate(
    available: &[InputToSign],
    destinations: &[Destination],
    change_script: &Script,
    rate: FeeRate,
    dust: Amount,
) -> Option<TransactionParams> {
    select(available, destinations, change_script, FeePolicy::Rate(rate), dust)
}

/// Select inputs paying `destinations` plus a constant `fee`.
pub fn select_by_fee(
    available: &[InputToSign],
    destinations: &[Destination],
    change_script: &Script,
    fee: Amount,
    dust: Amount,
) -> Option<TransactionParams> {
    select(available, destinations, change_script, FeePolicy::Fixed(fee), dust)
}

/// Run selection under either fee policy.
pub fn select(
    available: &[InputToSign],
    destinations: &[Destination],
    change_script: &Script,
    policy: FeePolicy,
    dust: Amount,
) -> Option<TransactionParams> {
    let required = destinations
        .iter()
        .try_fold(Amount::ZERO, |acc, d| acc.checked_add(d.amount))?;
    if destinations.is_empty() || available.is_empty() {
        return None;
    }

    let ctx = Selector {
        output_weights: destinations.iter().map(Destination::weight).collect(),
        change_weight: fee::output_weight(change_script.len()),
        change_script,
        required,
        policy,
        dust,
    };

    let mut sorted = available.to_vec();
    sorted.sort_by_key(InputToSign::value);

    if let Some(params) = ctx.single_input(&sorted) {
        debug!(fee = %params.fee, use_change = params.use_change, "selected single input");
        return Some(params);
    }

    let (mut chosen, mut params) = ctx.accumulate(&sorted)?;
    let accumulated = chosen.len();
    ctx.reduce(&mut chosen, &mut params);

    debug!(
        inputs = params.inputs.len(),
        accumulated,
        fee = %params.fee,
        use_change = params.use_change,
        dust_change = %params.dust_change,
        "selected inputs"
    );
    Some(params)
}

/// Amount an error should report as needed when selection fails: the
/// destinations plus the fee of spending every available input.
pub fn insufficient_funds(
    available: &[InputToSign],
    destinations: &[Destination],
    policy: FeePolicy,
) -> BtcError {
    let outputs: Vec<Weight> = destinations.iter().map(Destination::weight).collect();
    let fee = policy.fee_for(fee::transaction_weight(available, &outputs));
    let required: u64 = destinations.iter().map(|d| d.amount.to_sat()).sum();
    BtcError::InsufficientFunds {
        needed: required.saturating_add(fee.to_sat()),
        available: total_value(available).to_sat(),
    }
}

fn total_value(inputs: &[InputToSign]) -> Amount {
    inputs
        .iter()
        .map(InputToSign::value)
        .fold(Amount::ZERO, |acc, v| acc.checked_add(v).unwrap_or(Amount::MAX_MONEY))
}

struct Selector<'a> {
    output_weights: Vec<Weight>,
    change_weight: Weight,
    change_script: &'a Script,
    required: Amount,
    policy: FeePolicy,
    dust: Amount,
}

impl Selector<'_> {
    fn evaluate(&self, inputs: &[InputToSign]) -> Option<TransactionParams> {
        let available = total_value(inputs);
        if available < self.required {
            return None;
        }

        let (weight, weight_with_change) =
            fee::transaction_weights(inputs, &self.output_weights, self.change_weight);
        let decision = self
            .policy
            .decide(weight, weight_with_change, available, self.required, self.dust)?;

        Some(TransactionParams {
            inputs: inputs.to_vec(),
            weight,
            weight_with_change,
            fee: decision.fee,
            required: self.required,
            change_script: self.change_script.to_owned(),
            use_change: decision.use_change,
            change: decision.change,
            dust_change: decision.dust_change,
        })
    }

    fn single_input(&self, sorted: &[InputToSign]) -> Option<TransactionParams> {
        sorted
            .iter()
            .filter(|input| input.value() >= self.required)
            .find_map(|input| self.evaluate(std::slice::from_ref(input)))
    }

    fn accumulate(&self, sorted: &[InputToSign]) -> Option<(Vec<InputToSign>, TransactionParams)> {
        let mut chosen = Vec::new();
        for input in sorted.iter().filter(|i| self.policy.is_economical(i)) {
            chosen.push(input.clone());
            if let Some(params) = self.evaluate(&chosen) {
                return Some((chosen, params));
            }
        }
        None
    }

    /// Drop inputs smallest first while the remaining set still pays.
    fn reduce(&self, chosen: &mut Vec<InputToSign>, params: &mut TransactionParams) {
        let mut i = 0;
        while i < chosen.len() && chosen.len() > 1 {
            let mut candidate = chosen.clone();
            candidate.remove(i);
            match self.evaluate(&candidate) {
                Some(reduced) => {
                    *chosen = candidate;
                    *params = reduced;
                }
                None => i += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fee::DEFAULT_DUST_THRESHOLD;
    use crate::utxo::UnspentOutput;
    use bitcoin::hashes::Hash;
    use bitcoin::{PubkeyHash, Txid, WPubkeyHash};
    use proptest::prelude::*;

    fn sat(n: u64) -> Amount {
        Amount::from_sat(n)
    }

    fn wpkh_script() -> ScriptBuf {
        ScriptBuf::new_p2wpkh(&WPubkeyHash::all_zeros())
    }

    fn input(vout: u32, value: u64) -> InputToSign {
        let txid = Txid::from_byte_array([vout as u8; 32]);
        InputToSign::new(UnspentOutput::new(txid, vout, sat(value), wpkh_script())).unwrap()
    }

    fn legacy_input(vout: u32, value: u64) -> InputToSign {
        let txid = Txid::from_byte_array([vout as u8; 32]);
        let script = ScriptBuf::new_p2pkh(&PubkeyHash::all_zeros());
        InputToSign::new(UnspentOutput::new(txid, vout, sat(value), script)).unwrap()
    }

    fn to(amount: u64) -> Vec<Destination> {
        vec![Destination::new(sat(amount), wpkh_script())]
    }

    fn rate(n: u64) -> FeeRate {
        FeeRate::from_sat_per_vb(n).unwrap()
    }

    fn values(params: &TransactionParams) -> Vec<u64> {
        params.inputs.iter().map(|i| i.value().to_sat()).collect()
    }

    #[test]
    fn single_input_scenario_exact_fee() {
        let params = select_by_fee(
            &[input(0, 100_000)],
            &to(90_000),
            &wpkh_script(),
            sat(10_000),
            DEFAULT_DUST_THRESHOLD,
        )
        .unwrap();
        assert_eq!(params.fee, sat(10_000));
        assert!(!params.use_change);
        assert_eq!(params.dust_change, Amount::ZERO);
    }

    #[test]
    fn single_input_scenario_dust_change() {
        let params = select_by_fee(
            &[input(0, 100_000)],
            &to(90_000),
            &wpkh_script(),
            sat(9_500),
            DEFAULT_DUST_THRESHOLD,
        )
        .unwrap();
        assert_eq!(params.fee, sat(10_000));
        assert_eq!(params.dust_change, sat(500));
        assert!(!params.use_change);
    }

    #[test]
    fn insufficient_funds_scenario() {
        let inputs = [input(0, 100_000)];
        let result = select_by_fee(&inputs, &to(90_001), &wpkh_script(), sat(10_000), DEFAULT_DUST_THRESHOLD);
        assert!(result.is_none());

        let err = insufficient_funds(&inputs, &to(90_001), FeePolicy::Fixed(sat(10_000)));
        assert!(matches!(
            err,
            BtcError::InsufficientFunds { needed: 100_001, available: 100_000 }
        ));
    }

    #[test]
    fn prefers_smallest_sufficient_single_input() {
        let inputs = [input(0, 500_000), input(1, 60_000), input(2, 40_000)];
        let params =
            select_by_fee_rate(&inputs, &to(50_000), &wpkh_script(), rate(1), DEFAULT_DUST_THRESHOLD).unwrap();
        assert_eq!(values(&params), vec![60_000]);
        assert!(params.use_change);
    }

    #[test]
    fn skips_single_input_that_cannot_pay_fee() {
        // 50_000 covers the amount but not the fee, so two inputs are needed.
        let inputs = [input(0, 50_000), input(1, 30_000)];
        let params =
            select_by_fee_rate(&inputs, &to(50_000), &wpkh_script(), rate(10), DEFAULT_DUST_THRESHOLD).unwrap();
        assert_eq!(params.inputs.len(), 2);
    }

    #[test]
    fn accumulation_skips_uneconomical_inputs() {
        // At 10 sat/vB a P2WPKH input costs 680 sat; the 500 sat input is never used.
        let inputs = [input(0, 500), input(1, 30_000), input(2, 30_000)];
        let params =
            select_by_fee_rate(&inputs, &to(50_000), &wpkh_script(), rate(10), DEFAULT_DUST_THRESHOLD).unwrap();
        assert_eq!(values(&params), vec![30_000, 30_000]);
    }

    #[test]
    fn reduction_drops_small_inputs() {
        // Accumulation needs all five inputs; reduction then drops the three small ones.
        let inputs = [input(0, 1_000), input(1, 2_000), input(2, 3_000), input(3, 48_000), input(4, 49_000)];
        let params =
            select_by_fee_rate(&inputs, &to(95_000), &wpkh_script(), rate(1), DEFAULT_DUST_THRESHOLD).unwrap();
        assert_eq!(values(&params), vec![48_000, 49_000]);
        assert!(params.available() >= params.required + params.fee);
    }

    #[test]
    fn change_output_uses_change_script() {
        let change = ScriptBuf::new_p2pkh(&PubkeyHash::all_zeros());
        let params = select_by_fee_rate(&[input(0, 100_000)], &to(10_000), &change, rate(2), DEFAULT_DUST_THRESHOLD)
            .unwrap();
        let out = params.change_output().unwrap();
        assert_eq!(out.script_pubkey, change);
        assert_eq!(params.available(), params.required + params.fee + out.value);
        assert_eq!(params.final_weight(), params.weight_with_change);
    }

    #[test]
    fn legacy_inputs_cost_more() {
        let segwit =
            select_by_fee_rate(&[input(0, 100_000)], &to(10_000), &wpkh_script(), rate(5), DEFAULT_DUST_THRESHOLD)
                .unwrap();
        let legacy = select_by_fee_rate(
            &[legacy_input(0, 100_000)],
            &to(10_000),
            &wpkh_script(),
            rate(5),
            DEFAULT_DUST_THRESHOLD,
        )
        .unwrap();
        assert!(legacy.fee > segwit.fee);
    }

    #[test]
    fn empty_inputs_or_destinations_select_nothing() {
        assert!(select_by_fee(&[], &to(1_000), &wpkh_script(), sat(100), DEFAULT_DUST_THRESHOLD).is_none());
        assert!(select_by_fee(&[input(0, 10_000)], &[], &wpkh_script(), sat(100), DEFAULT_DUST_THRESHOLD).is_none());
    }

    fn arb_inputs() -> impl Strategy<Value = Vec<u64>> {
        prop::collection::vec(1_000u64..2_000_000, 1..12)
    }

    proptest! {
        #[test]
        fn selection_is_sufficient_and_respects_dust(
            values in arb_inputs(),
            amount in 1_000u64..3_000_000,
            fee_rate in 1u64..50,
        ) {
            let inputs: Vec<_> = values.iter().enumerate().map(|(i, v)| input(i as u32, *v)).collect();
            let dust = DEFAULT_DUST_THRESHOLD;
            if let Some(params) = select_by_fee_rate(&inputs, &to(amount), &wpkh_script(), rate(fee_rate), dust) {
                let available = params.available();
                prop_assert!(available >= params.required + params.fee);

                let leftover = available - params.required - params.fee;
                if params.use_change {
                    prop_assert_eq!(leftover, params.change);
                    prop_assert!(params.change >= dust);
                } else {
                    prop_assert_eq!(leftover, Amount::ZERO);
                    prop_assert!(params.dust_change <= params.fee);
                    // Leftover is folded only when it is dust, or when paying
                    // for the change output would leave dust behind.
                    let change_output_cost = fee::fee_for_weight(fee::output_weight(wpkh_script().len()), rate(fee_rate));
                    prop_assert!(
                        params.dust_change < dust + change_output_cost,
                        "folded {} with dust {} and change output cost {}",
                        params.dust_change, dust, change_output_cost
                    );
                }
            }
        }

        #[test]
        fn fixed_fee_selection_is_sufficient(
            values in arb_inputs(),
            amount in 1_000u64..3_000_000,
            fixed in 0u64..50_000,
        ) {
            let inputs: Vec<_> = values.iter().enumerate().map(|(i, v)| input(i as u32, *v)).collect();
            if let Some(params) = select_by_fee(&inputs, &to(amount), &wpkh_script(), sat(fixed), DEFAULT_DUST_THRESHOLD) {
                prop_assert!(params.available() >= params.required + params.fee);
                prop_assert!(params.fee >= sat(fixed));
            }
        }

        #[test]
        fn reduction_never_grows_or_breaks_the_set(
            values in arb_inputs(),
            amount in 1_000u64..3_000_000,
            fee_rate in 1u64..20,
        ) {
            let mut inputs: Vec<_> = values.iter().enumerate().map(|(i, v)| input(i as u32, *v)).collect();
            inputs.sort_by_key(InputToSign::value);
            let change = wpkh_script();
            let ctx = Selector {
                output_weights: to(amount).iter().map(Destination::weight).collect(),
                change_weight: fee::output_weight(change.len()),
                change_script: &change,
                required: sat(amount),
                policy: FeePolicy::Rate(rate(fee_rate)),
                dust: DEFAULT_DUST_THRESHOLD,
            };
            if let Some((mut chosen, mut params)) = ctx.accumulate(&inputs) {
                let before = chosen.len();
                ctx.reduce(&mut chosen, &mut params);
                prop_assert!(chosen.len() <= before);
                prop_assert_eq!(chosen.len(), params.inputs.len());
                prop_assert!(params.available() >= params.required + params.fee);
            }
        }
    }
}
