//! Blockstream (Esplora) implementation of the `Chain` capability.
//!
//! Provides async access to:
//! - UTXOs (with their locking scripts)
//! - Address transaction history
//! - Fee estimation
//! - Transaction broadcasting
//! - Fiat price tickers (blockchain.info)

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use common::{BitcoinNetwork, Ticker, Tx, Unspent, WalletError};

use super::chain::{format_tx_link, Chain, TXID_PLACEHOLDER};

/// Ticker endpoint.
const TICKER_URL: &str = "https://blockchain.info/ticker";

// ============================================================================
// Esplora API Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EsploraStatus {
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u32>,
    #[serde(default)]
    pub block_time: Option<u32>,
}

/// A UTXO as returned by `/address/{address}/utxo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsploraUtxo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    #[serde(default)]
    pub status: EsploraStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsploraOutput {
    pub scriptpubkey: String,
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    #[serde(default)]
    pub scriptpubkey_type: String,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsploraInput {
    #[serde(default)]
    pub prevout: Option<EsploraOutput>,
}

/// A transaction as returned by `/tx/{txid}` and `/address/{address}/txs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsploraTx {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<EsploraInput>,
    #[serde(default)]
    pub vout: Vec<EsploraOutput>,
    #[serde(default)]
    pub fee: i64,
    #[serde(default)]
    pub status: EsploraStatus,
}

impl EsploraTx {
    /// Convert to a wallet `Tx` seen from `address`.
    ///
    /// `value` is received minus sent for that address; an OP_RETURN output
    /// contributes its payload as `data`.
    pub fn to_wallet_tx(&self, address: &str, link_template: &str) -> Tx {
        let sent: i64 = self
            .vin
            .iter()
            .filter_map(|vin| vin.prevout.as_ref())
            .filter(|prevout| prevout.scriptpubkey_address.as_deref() == Some(address))
            .map(|prevout| prevout.value as i64)
            .sum();

        let received: i64 = self
            .vout
            .iter()
            .filter(|out| out.scriptpubkey_address.as_deref() == Some(address))
            .map(|out| out.value as i64)
            .sum();

        let data = self
            .vout
            .iter()
            .filter(|out| out.scriptpubkey_type == "op_return")
            .filter_map(|out| op_return_payload(&out.scriptpubkey))
            .last()
            .unwrap_or_default();

        Tx {
            txid: self.txid.clone(),
            fee: self.fee,
            link: format_tx_link(link_template, &self.txid),
            value: received - sent,
            confirmed: self.status.confirmed,
            block_time: self.status.block_time.unwrap_or_default() as i64,
            block_height: self.status.block_height.unwrap_or_default() as i64,
            data,
        }
    }
}

/// Decode the payload of an OP_RETURN script (`6a` + push opcode + data).
fn op_return_payload(script_hex: &str) -> Option<String> {
    let bytes = hex::decode(script_hex).ok()?;
    if bytes.len() < 2 {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes[2..]).into_owned())
}

// ============================================================================
// Blockstream Client
// ============================================================================

/// Async client for the Esplora API.
pub struct BlockstreamChain {
    network: BitcoinNetwork,
    api_base: String,
    client: reqwest::Client,
}

impl BlockstreamChain {
    /// Create a client; every request carries `timeout`.
    pub fn new(network: BitcoinNetwork, timeout: Duration) -> Result<Self, WalletError> {
        Self::with_base_url(network, network.api_url(), timeout)
    }

    /// Create a client against a custom Esplora base URL.
    pub fn with_base_url(
        network: BitcoinNetwork,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::Configuration(format!("HTTP client: {}", e)))?;

        tracing::debug!("Blockstream chain client for {} at {}", network, api_base);
        Ok(Self {
            network,
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn network(&self) -> BitcoinNetwork {
        self.network
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, WalletError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            WalletError::ChainUnavailable(format!("API request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WalletError::ChainUnavailable(format!(
                "API error {} for {}: {}",
                status, url, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| WalletError::Serialization(format!("Failed to parse response: {}", e)))
    }

    /// Locking script of output `vout` of `txid`.
    async fn output_script(&self, txid: &str, vout: u32) -> Result<String, WalletError> {
        let url = format!("{}/tx/{}", self.api_base, txid);
        let tx: EsploraTx = self.get_json(&url).await?;
        tx.vout
            .get(vout as usize)
            .map(|out| out.scriptpubkey.clone())
            .ok_or_else(|| {
                WalletError::Serialization(format!("Transaction {} has no output {}", txid, vout))
            })
    }
}

#[async_trait]
impl Chain for BlockstreamChain {
    async fn get_utxos(&self, address: &str) -> Result<Vec<Unspent>, WalletError> {
        let url = format!("{}/address/{}/utxo", self.api_base, address);
        let utxos: Vec<EsploraUtxo> = self.get_json(&url).await?;

        let mut unspents = Vec::with_capacity(utxos.len());
        for utxo in utxos {
            let script_pubkey = match self.output_script(&utxo.txid, utxo.vout).await {
                Ok(script) => script,
                Err(e) => {
                    tracing::warn!("Skipping utxo {}:{}: {}", utxo.txid, utxo.vout, e);
                    continue;
                }
            };
            unspents.push(Unspent {
                txid: utxo.txid,
                vout: utxo.vout,
                value: utxo.value,
                confirmed: utxo.status.confirmed,
                block_time: utxo.status.block_time.unwrap_or_default(),
                block_height: utxo.status.block_height.unwrap_or_default(),
                script_pubkey,
            });
        }

        tracing::trace!("{} unspents for {}", unspents.len(), address);
        Ok(unspents)
    }

    async fn get_txs(&self, address: &str) -> Result<Vec<Tx>, WalletError> {
        let url = format!("{}/address/{}/txs", self.api_base, address);
        let txs: Vec<EsploraTx> = self.get_json(&url).await?;
        let template = self.tx_link();

        Ok(txs
            .iter()
            .map(|tx| tx.to_wallet_tx(address, &template))
            .collect())
    }

    async fn get_fees(&self) -> Result<HashMap<String, f64>, WalletError> {
        let url = format!("{}/fee-estimates", self.api_base);
        self.get_json(&url).await
    }

    async fn get_tickers(&self) -> Result<HashMap<String, Ticker>, WalletError> {
        self.get_json(TICKER_URL).await
    }

    async fn push_tx(&self, raw_tx_hex: &str) -> Result<String, WalletError> {
        let url = format!("{}/tx", self.api_base);
        tracing::info!("Broadcasting transaction to {}", url);

        let response = self
            .client
            .post(&url)
            .body(raw_tx_hex.to_string())
            .send()
            .await
            .map_err(|e| WalletError::ChainUnavailable(format!("Broadcast failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WalletError::ChainUnavailable(format!(
                "Broadcast error {}: {}",
                status, body
            )));
        }

        // Response is just the txid as plain text
        let txid = response
            .text()
            .await
            .map_err(|e| WalletError::Serialization(format!("Failed to read txid: {}", e)))?;
        tracing::info!("Broadcast accepted: {}", txid.trim());
        Ok(txid.trim().to_string())
    }

    fn tx_link(&self) -> String {
        format!("{}/tx/{}", self.network.explorer_url(), TXID_PLACEHOLDER)
    }
}

// ============================================================================
// Tests
// ============================================================================
