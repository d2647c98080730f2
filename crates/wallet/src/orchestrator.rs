//! Transaction orchestration on the Initiator side.
//!
//! `send` selects coins, builds the transaction, runs one two-party
//! signing exchange per input, verifies the result and broadcasts it.
//! Inputs are signed one after another.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::bip32::Xpriv;
use bitcoin::{Network, ScriptBuf};

use chains::bitcoin::{
    address_for_key, build_unsigned_transaction, combine_shares, derive_private_child,
    embed_signature, parse_address, parse_public_share, transaction_hex, verify_transaction,
    SpendInput,
};
use common::{
    BitcoinNetwork, PushTxRequest, PushTxResponse, ScriptType, UnspentsRequest, Utxo, WalletError,
};
use protocols::ecdsa::sign_digest;
use protocols::{ApiClient, SharedSigningParty};

use crate::ledger::Ledger;

// ============================================================================
// Wallet Backend
// ============================================================================

/// The ledger operations a send needs, wherever the ledger lives.
#[async_trait]
pub trait WalletBackend: Send + Sync {
    /// Coin selection covering `amount`.
    async fn unspents(&self, amount: u64) -> Result<Vec<Utxo>, WalletError>;

    /// Broadcast a signed transaction and return the chain's txid.
    async fn push_tx(&self, raw_tx_hex: &str) -> Result<String, WalletError>;
}

/// Type alias for shared backend reference.
pub type SharedBackend = Arc<dyn WalletBackend>;

/// Backend over an in-process ledger.
pub struct LocalBackend {
    ledger: Arc<Ledger>,
    uid: String,
}

impl LocalBackend {
    pub fn new(ledger: Arc<Ledger>, uid: &str) -> Self {
        Self {
            ledger,
            uid: uid.to_string(),
        }
    }
}

#[async_trait]
impl WalletBackend for LocalBackend {
    async fn unspents(&self, amount: u64) -> Result<Vec<Utxo>, WalletError> {
        self.ledger.unspents(&self.uid, amount)
    }

    async fn push_tx(&self, raw_tx_hex: &str) -> Result<String, WalletError> {
        self.ledger.push_tx(raw_tx_hex).await
    }
}

/// Backend over the server's `/api/wallet` routes.
pub struct HttpBackend {
    api: ApiClient,
}

impl HttpBackend {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl WalletBackend for HttpBackend {
    async fn unspents(&self, amount: u64) -> Result<Vec<Utxo>, WalletError> {
        self.api
            .post("/api/wallet/unspents", &UnspentsRequest { amount })
            .await
    }

    async fn push_tx(&self, raw_tx_hex: &str) -> Result<String, WalletError> {
        let response: PushTxResponse = self
            .api
            .post(
                "/api/wallet/push",
                &PushTxRequest {
                    tx_hex: raw_tx_hex.to_string(),
                },
            )
            .await?;
        Ok(response.txid)
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives a send for one client master share.
pub struct Orchestrator {
    network: Network,
    cli_master: Xpriv,
    backend: SharedBackend,
    party: SharedSigningParty,
}

impl Orchestrator {
    pub fn new(
        network: BitcoinNetwork,
        cli_master: Xpriv,
        backend: SharedBackend,
        party: SharedSigningParty,
    ) -> Self {
        Self {
            network: network.to_bitcoin_network(),
            cli_master,
            backend,
            party,
        }
    }

    /// Pay `amount` to `to_address` with an explicit `fee`; returns the txid.
    pub async fn send(&self, to_address: &str, amount: u64, fee: u64) -> Result<String, WalletError> {
        parse_address(to_address, self.network)?;

        let required = amount.checked_add(fee).ok_or_else(|| {
            WalletError::Protocol(format!("Amount {} plus fee {} overflows", amount, fee))
        })?;
        let utxos = self.backend.unspents(required).await?;
        tracing::info!(
            "Sending {} sat to {} (fee {}) from {} inputs",
            amount,
            to_address,
            fee,
            utxos.len()
        );

        let mut unsigned =
            build_unsigned_transaction(&utxos, to_address, amount, fee, self.network)?;

        for (index, utxo) in utxos.iter().enumerate() {
            let cli_child = derive_private_child(&self.cli_master, utxo.pos)?;
            let svr_child = parse_public_share(&utxo.svr_pub_key, self.network)?;
            let combined = combine_shares(&cli_child.private_key, &svr_child.public_key)?;

            let script = SpendInput::from(utxo).script()?;
            self.check_ownership(&script, &combined, utxo)?;

            let sighash = unsigned.sighash(index)?;
            let signature = sign_digest(
                self.party.as_ref(),
                utxo.pos,
                sighash,
                &cli_child.private_key,
                &svr_child.public_key,
            )
            .await?;

            embed_signature(&mut unsigned.tx, index, &script, &signature, &combined)?;
            tracing::debug!("Signed input {} ({}:{})", index, utxo.txid, utxo.vout);
        }

        verify_transaction(&unsigned.tx, &unsigned.inputs)?;

        let local = unsigned.tx.compute_txid().to_string();
        let remote = self.backend.push_tx(&transaction_hex(&unsigned.tx)).await?;
        if remote != local {
            tracing::warn!("Chain reported txid {} for local txid {}", remote, local);
            return Err(WalletError::TxIdMismatch { local, remote });
        }

        tracing::info!("Broadcast transaction {}", local);
        Ok(local)
    }

    /// The UTXO must be locked to the shared key at its position.
    fn check_ownership(
        &self,
        script: &ScriptBuf,
        combined: &bitcoin::CompressedPublicKey,
        utxo: &Utxo,
    ) -> Result<(), WalletError> {
        let owned = [ScriptType::P2pkh, ScriptType::P2wpkh]
            .iter()
            .any(|t| address_for_key(combined, self.network, *t).script_pubkey() == *script);
        if !owned {
            return Err(WalletError::Key(format!(
                "UTXO {}:{} is not locked to the shared key at pos {}",
                utxo.txid, utxo.vout, utxo.pos
            )));
        }
        Ok(())
    }
}
