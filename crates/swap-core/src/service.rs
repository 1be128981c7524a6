use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bitcoin::script::Script;
use bitcoin::{Amount, OutPoint, Transaction, Txid};
use chain_btc::selection::FeePolicy;
use chain_btc::send::{self, SendRequest};
use chain_btc::swap::{self, SwapPayment, SwapPaymentRequest};
use chain_btc::transaction::BtcTransaction;
use chain_btc::utxo::{InputToSign, UnspentOutput};
use chain_btc::verifier::{self, PartyPaymentExpectations};
use chain_btc::BtcError;
use crypto_utils::SwapSecret;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SwapConfig;
use crate::error::SwapError;
use crate::oracle::SigningOracle;
use crate::retry::retry_with_cancel;
use crate::source::{BlockchainSource, SourceError};

/// A wallet address and the key path the oracle signs its coins with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingAddress {
    pub address: String,
    pub key_path: String,
}

impl FundingAddress {
    pub fn new(address: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            key_path: key_path.into(),
        }
    }
}

/// Swap terms the caller negotiates; the output kind comes from the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapTerms {
    pub amount: Amount,
    pub refund_address: String,
    pub to_address: String,
    pub change_address: String,
    pub lock_time: u32,
    pub secret_hash: Vec<u8>,
    pub secret_size: u32,
}

/// Coins available for spending and the key path for each.
struct Funding {
    inputs: Vec<InputToSign>,
    key_paths: HashMap<OutPoint, String>,
}

/// Drives swap transactions from coin lookup to broadcast.
///
/// Every transaction is signed through the [`SigningOracle`] and checked
/// with consensus script verification before it is handed back. Wallet
/// spends are additionally held to standard scripts; swap spends reveal a
/// nonstandard redeem script and are not.
pub struct SwapService {
    config: SwapConfig,
    source: Arc<dyn BlockchainSource>,
    oracle: Arc<dyn SigningOracle>,
    cancel: CancellationToken,
}

impl SwapService {
    pub fn new(
        config: SwapConfig,
        source: Arc<dyn BlockchainSource>,
        oracle: Arc<dyn SigningOracle>,
    ) -> Result<Self, SwapError> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            oracle,
            cancel: CancellationToken::new(),
        })
    }

    /// Use `cancel` to abort pending fetches and broadcasts.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fee policy from the config, or the source's current estimate.
    pub async fn fee_policy(&self) -> Result<FeePolicy, SwapError> {
        if let Some(policy) = self.config.fee.static_policy() {
            return Ok(policy);
        }
        let source = &self.source;
        let rate = self.with_retry(|| async move { source.get_fee_rate().await }).await?;
        debug!(sat_per_kwu = rate.to_sat_per_kwu(), "using estimated fee rate");
        Ok(FeePolicy::Rate(rate))
    }

    /// Build, sign and verify a payment locking `terms.amount` into an HTLC.
    pub async fn create_swap_payment(
        &self,
        funding: &[FundingAddress],
        terms: &SwapTerms,
    ) -> Result<SwapPayment, SwapError> {
        let coins = self.collect_funding(funding).await?;
        let policy = self.fee_policy().await?;

        let request = SwapPaymentRequest {
            amount: terms.amount,
            refund_address: terms.refund_address.clone(),
            to_address: terms.to_address.clone(),
            change_address: terms.change_address.clone(),
            lock_time: terms.lock_time,
            secret_hash: terms.secret_hash.clone(),
            secret_size: terms.secret_size,
            output_kind: self.config.output_kind,
        };
        let mut payment = swap::create_swap_payment_tx(
            &coins.inputs,
            &request,
            policy,
            self.config.dust(),
            self.config.network,
        )?;

        self.sign_wallet_inputs(&mut payment.tx, &payment.params.inputs, &coins.key_paths)
            .await?;
        self_verify(&payment.tx, &payment.spent_outputs(), true)?;

        info!(
            txid = %payment.tx.txid(),
            amount = %terms.amount,
            swap_address = %payment.swap_address,
            "swap payment ready"
        );
        Ok(payment)
    }

    /// Build, sign and verify the refund of our own swap payment.
    pub async fn create_swap_refund(
        &self,
        payment_output: &UnspentOutput,
        redeem_script: &Script,
        to_address: &str,
        lock_time: u32,
        key_path: &str,
    ) -> Result<BtcTransaction, SwapError> {
        let policy = self.fee_policy().await?;
        let mut tx = swap::create_swap_refund_tx(
            payment_output,
            redeem_script,
            to_address,
            lock_time,
            policy,
            self.config.dust(),
            self.config.network,
        )?;

        let sighash = swap::swap_signature_hash(&tx, payment_output, redeem_script)?;
        let pubkey = self.oracle.public_key(key_path).await?;
        let signature = self.oracle.sign_hash(sighash, key_path).await?;
        swap::install_htlc_refund(&mut tx, payment_output, redeem_script, &signature, &pubkey)?;
        self_verify(&tx, std::slice::from_ref(payment_output), false)?;

        info!(txid = %tx.txid(), lock_time, "swap refund ready");
        Ok(tx)
    }

    /// Build, sign and verify a redeem of the counterparty's swap payment,
    /// revealing `secret`.
    pub async fn create_swap_redeem(
        &self,
        payment_output: &UnspentOutput,
        redeem_script: &Script,
        to_address: &str,
        secret: &SwapSecret,
        key_path: &str,
    ) -> Result<BtcTransaction, SwapError> {
        let policy = self.fee_policy().await?;
        let mut tx = swap::create_swap_redeem_tx(
            payment_output,
            redeem_script,
            to_address,
            secret.len(),
            policy,
            self.config.dust(),
            self.config.network,
        )?;

        let sighash = swap::swap_signature_hash(&tx, payment_output, redeem_script)?;
        let pubkey = self.oracle.public_key(key_path).await?;
        let signature = self.oracle.sign_hash(sighash, key_path).await?;
        swap::install_p2pkh_redeem(
            &mut tx,
            payment_output,
            redeem_script,
            &signature,
            &pubkey,
            secret.as_bytes(),
        )?;
        self_verify(&tx, std::slice::from_ref(payment_output), false)?;

        info!(txid = %tx.txid(), "swap redeem ready");
        Ok(tx)
    }

    /// Build, sign and verify a plain payment, applying the configured dust
    /// policy.
    pub async fn create_send(
        &self,
        funding: &[FundingAddress],
        request: &SendRequest,
    ) -> Result<BtcTransaction, SwapError> {
        let coins = self.collect_funding(funding).await?;
        let policy = self.fee_policy().await?;
        let mut prepared = send::build_send_tx(
            &coins.inputs,
            request,
            policy,
            self.config.dust(),
            self.config.dust_policy,
            self.config.network,
        )?;

        self.sign_wallet_inputs(&mut prepared.tx, &prepared.params.inputs, &coins.key_paths)
            .await?;
        let spent: Vec<UnspentOutput> = prepared.params.inputs.iter().map(|i| i.output.clone()).collect();
        self_verify(&prepared.tx, &spent, true)?;
        Ok(prepared.tx)
    }

    /// Check the counterparty's payment against the agreed swap terms.
    /// Returns the index of the swap output.
    pub fn verify_party_payment(
        &self,
        tx: &Transaction,
        redeem_script: &Script,
        secret_hash: &[u8],
        target_address: &str,
        required_amount: Amount,
        swap_timestamp: u64,
    ) -> Result<u32, SwapError> {
        let expected = PartyPaymentExpectations {
            redeem_script: redeem_script.to_owned(),
            secret_hash: secret_hash.to_vec(),
            target_address: target_address.to_string(),
            required_amount,
            swap_timestamp,
            min_refund_lock_time: self.config.min_refund_lock_time_secs,
            network: self.config.network,
        };
        Ok(verifier::verify_party_payment_tx(tx, &expected)?)
    }

    /// Fetch a transaction from the source.
    pub async fn get_transaction(&self, txid: &Txid) -> Result<Option<Transaction>, SwapError> {
        let source = &self.source;
        self.with_retry(|| async move { source.get_transaction(txid).await }).await
    }

    /// Read the secret the counterparty revealed when redeeming our payment.
    pub async fn find_revealed_secret(
        &self,
        redeem_txid: &Txid,
        swap_outpoint: OutPoint,
    ) -> Result<SwapSecret, SwapError> {
        let tx = self
            .get_transaction(redeem_txid)
            .await?
            .ok_or_else(|| SwapError::Source(SourceError::Rejected(format!("transaction {redeem_txid} not found"))))?;
        let secret = swap::extract_secret_from_spend(&tx, swap_outpoint)?;
        Ok(SwapSecret::from_bytes(&secret)?)
    }

    /// Publish a signed transaction and mark it immutable.
    ///
    /// Cancellation is checked before anything is sent.
    pub async fn broadcast(&self, tx: &mut BtcTransaction) -> Result<Txid, SwapError> {
        if self.cancel.is_cancelled() {
            return Err(SwapError::Cancelled);
        }
        tx.check()?;

        let source = &self.source;
        let raw = tx.tx();
        let returned = self
            .with_retry(|| async move { source.broadcast(raw).await })
            .await
            .map_err(|e| match e {
                SwapError::Source(SourceError::Rejected(reason)) => SwapError::TransactionBroadcast(reason),
                other => other,
            })?
            .ok_or_else(|| SwapError::TransactionBroadcast("no transaction id returned".into()))?;

        let txid = tx.txid();
        if returned != txid {
            warn!(%returned, expected = %txid, "source reported a different txid");
        }
        tx.mark_broadcast();
        info!(%txid, "transaction broadcast");
        Ok(txid)
    }

    async fn collect_funding(&self, funding: &[FundingAddress]) -> Result<Funding, SwapError> {
        let source = &self.source;
        let mut inputs = Vec::new();
        let mut key_paths = HashMap::new();

        for entry in funding {
            let address = entry.address.as_str();
            let outputs = self
                .with_retry(|| async move { source.get_unspent_outputs(address).await })
                .await?;
            for output in outputs.into_iter().filter(|o| !o.is_spent()) {
                match InputToSign::new(output.clone()) {
                    Ok(input) => {
                        key_paths.insert(output.outpoint(), entry.key_path.clone());
                        inputs.push(input);
                    }
                    Err(e) => warn!(outpoint = %output.outpoint(), error = %e, "skipping unspendable output"),
                }
            }
        }

        debug!(coins = inputs.len(), addresses = funding.len(), "collected funding");
        Ok(Funding { inputs, key_paths })
    }

    async fn sign_wallet_inputs(
        &self,
        tx: &mut BtcTransaction,
        inputs: &[InputToSign],
        key_paths: &HashMap<OutPoint, String>,
    ) -> Result<(), SwapError> {
        for input in inputs {
            if self.cancel.is_cancelled() {
                return Err(SwapError::Cancelled);
            }
            let output = &input.output;
            let key_path = key_paths.get(&output.outpoint()).ok_or_else(|| {
                SwapError::Oracle(format!("no key path for coin {}", output.outpoint()))
            })?;

            let pubkey = self.oracle.public_key(key_path).await?;
            let sighash = tx.single_key_signature_hash(output, &pubkey)?;
            let signature = self.oracle.sign_hash(sighash, key_path).await?;
            tx.install_single_key_signature(output, &signature, &pubkey)?;
        }
        Ok(())
    }

    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, SwapError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        retry_with_cancel(self.config.retry.attempts, self.config.retry.delay(), &self.cancel, || {
            let attempt = op();
            async move { attempt.await.map_err(SwapError::from) }
        })
        .await
    }
}

/// A signed transaction that fails its own script checks means the oracle
/// signed with the wrong key or over the wrong data.
fn self_verify(
    tx: &BtcTransaction,
    spent: &[UnspentOutput],
    check_script_pubkey: bool,
) -> Result<(), SwapError> {
    tx.verify(spent, check_script_pubkey).map_err(|e| match e {
        BtcError::TransactionVerification(violations) => SwapError::Btc(BtcError::SigningError(
            format!("self-verification failed: {}", violations.join("; ")),
        )),
        other => SwapError::Btc(other),
    })
}
