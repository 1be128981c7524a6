//! Plain payments from the wallet, with the caller's choice of what to do
//! with change too small to keep.

use bitcoin::Amount;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::address;
use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::selection::{self, Destination, FeePolicy, TransactionParams};
use crate::swap::build_from_params;
use crate::transaction::BtcTransaction;
use crate::utxo::InputToSign;

/// What to do with leftover value below the dust threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DustUsagePolicy {
    /// Refuse the payment with [`BtcError::InsufficientAmount`] so the user
    /// can adjust the amount.
    #[default]
    Warning,
    /// Add the leftover to the destination output.
    AddToDestination,
    /// Leave the leftover to the miners.
    AddToFee,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub amount: Amount,
    pub to_address: String,
    pub change_address: String,
}

/// An unsigned payment ready for signing.
#[derive(Debug, Clone)]
pub struct PreparedSend {
    pub tx: BtcTransaction,
    /// Selection after the dust policy was applied.
    pub params: TransactionParams,
    /// Value of the destination output.
    pub destination_amount: Amount,
}

/// Build an unsigned payment of `request.amount` to `request.to_address`.
pub fn build_send_tx(
    available: &[InputToSign],
    request: &SendRequest,
    fee_policy: FeePolicy,
    dust: Amount,
    dust_policy: DustUsagePolicy,
    network: BtcNetwork,
) -> Result<PreparedSend, BtcError> {
    if request.amount < dust {
        return Err(BtcError::InsufficientAmount {
            amount: request.amount.to_sat(),
            dust: dust.to_sat(),
        });
    }

    let to_script = address::script_pubkey_for(&request.to_address, network)?;
    let change_script = address::script_pubkey_for(&request.change_address, network)?;

    let mut destinations = vec![Destination::new(request.amount, to_script)];
    let mut params = selection::select(available, &destinations, &change_script, fee_policy, dust)
        .ok_or_else(|| selection::insufficient_funds(available, &destinations, fee_policy))?;

    if params.dust_change > Amount::ZERO {
        match dust_policy {
            DustUsagePolicy::Warning => {
                return Err(BtcError::InsufficientAmount {
                    amount: params.dust_change.to_sat(),
                    dust: dust.to_sat(),
                })
            }
            DustUsagePolicy::AddToDestination => {
                let leftover = params.dust_change;
                destinations[0].amount += leftover;
                params.fee -= leftover;
                params.dust_change = Amount::ZERO;
                info!(%leftover, "dust change added to destination");
            }
            DustUsagePolicy::AddToFee => {
                info!(leftover = %params.dust_change, "dust change added to fee");
            }
        }
    }

    let tx = build_from_params(&params, &destinations, network);
    debug!(
        txid = %tx.txid(),
        amount = %destinations[0].amount,
        fee = %params.fee,
        use_change = params.use_change,
        "built payment"
    );

    Ok(PreparedSend {
        tx,
        destination_amount: destinations[0].amount,
        params,
    })
}
