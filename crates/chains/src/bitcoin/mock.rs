//! In-memory `Chain` serving fixed testnet data.
//!
//! Used by unit tests and by the server's `--mock-chain` mode. Every
//! response can be replaced, delayed or turned into a `ChainUnavailable`
//! failure.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::consensus::deserialize;
use bitcoin::Transaction;

use common::{Ticker, Tx, Unspent, WalletError};

use super::chain::{format_tx_link, Chain};

/// Address holding the fixture UTXOs.
pub const MOCK_FUNDED_ADDRESS: &str = "mnBETqvxTqcFRSLnR3w2Tpe9Qu58EasQgU";

/// Txid returned by `push_tx` unless echo mode is on.
pub const MOCK_PUSH_TXID: &str =
    "e0c328bd49e9a1c2ef5f7a1c14f0f9893658f5673fb415ceec1125dcd6641993";

const MOCK_TX_LINK: &str = "https://blockstream.info/testnet/tx/{txid}";
const MOCK_SCRIPT: &str = "76a914490e0eebcc5d462221ea38d00a6aee1238db2a5788ac";

#[derive(Default)]
struct MockState {
    utxos: HashMap<String, Vec<Unspent>>,
    txs: HashMap<String, Vec<Tx>>,
    fees: HashMap<String, f64>,
    tickers: HashMap<String, Ticker>,
    failing_addresses: HashSet<String>,
    unavailable: bool,
    echo_txid: bool,
    delay: Option<Duration>,
    pushed: Vec<String>,
}

/// Fixture-backed chain.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    /// An empty chain: no funds, no fees, no tickers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Chain preloaded with the testnet fixture data.
    pub fn new() -> Self {
        let chain = Self::default();
        {
            let mut state = chain.lock();
            state
                .utxos
                .insert(MOCK_FUNDED_ADDRESS.to_string(), fixture_unspents());
            state.txs.insert(MOCK_FUNDED_ADDRESS.to_string(), fixture_txs());
            state.fees = [("2", 1.0), ("4", 0.8), ("6", 0.6), ("10", 0.1)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            state.tickers.insert("CNY".to_string(), ticker(73711.13, "¥"));
            state.tickers.insert("USD".to_string(), ticker(10721.13, "$"));
        }
        chain
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned mock only happens after a test already panicked.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_utxos(&self, address: &str, utxos: Vec<Unspent>) {
        self.lock().utxos.insert(address.to_string(), utxos);
    }

    pub fn set_txs(&self, address: &str, txs: Vec<Tx>) {
        self.lock().txs.insert(address.to_string(), txs);
    }

    pub fn set_fees(&self, fees: HashMap<String, f64>) {
        self.lock().fees = fees;
    }

    /// Make every query for `address` fail.
    pub fn fail_address(&self, address: &str) {
        self.lock().failing_addresses.insert(address.to_string());
    }

    /// Make every call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Return the txid of the pushed transaction instead of the fixed one.
    pub fn echo_txid(&self, echo: bool) {
        self.lock().echo_txid = echo;
    }

    /// Hold every call for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    /// Raw transactions received by `push_tx`.
    pub fn pushed(&self) -> Vec<String> {
        self.lock().pushed.clone()
    }

    async fn latency(&self) {
        let delay = self.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check(&self, state: &MockState, address: Option<&str>) -> Result<(), WalletError> {
        if state.unavailable {
            return Err(WalletError::ChainUnavailable("mock chain is down".to_string()));
        }
        if let Some(address) = address {
            if state.failing_addresses.contains(address) {
                return Err(WalletError::ChainUnavailable(format!(
                    "mock failure for {}",
                    address
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Chain for MockChain {
    async fn get_utxos(&self, address: &str) -> Result<Vec<Unspent>, WalletError> {
        self.latency().await;
        let state = self.lock();
        self.check(&state, Some(address))?;
        Ok(state.utxos.get(address).cloned().unwrap_or_default())
    }

    async fn get_txs(&self, address: &str) -> Result<Vec<Tx>, WalletError> {
        self.latency().await;
        let state = self.lock();
        self.check(&state, Some(address))?;
        Ok(state
            .txs
            .get(address)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|mut tx| {
                tx.link = format_tx_link(MOCK_TX_LINK, &tx.txid);
                tx
            })
            .collect())
    }

    async fn get_fees(&self) -> Result<HashMap<String, f64>, WalletError> {
        self.latency().await;
        let state = self.lock();
        self.check(&state, None)?;
        Ok(state.fees.clone())
    }

    async fn get_tickers(&self) -> Result<HashMap<String, Ticker>, WalletError> {
        self.latency().await;
        let state = self.lock();
        self.check(&state, None)?;
        Ok(state.tickers.clone())
    }

    async fn push_tx(&self, raw_tx_hex: &str) -> Result<String, WalletError> {
        self.latency().await;
        let mut state = self.lock();
        self.check(&state, None)?;
        state.pushed.push(raw_tx_hex.to_string());

        if !state.echo_txid {
            return Ok(MOCK_PUSH_TXID.to_string());
        }
        let bytes = hex::decode(raw_tx_hex)
            .map_err(|e| WalletError::ChainUnavailable(format!("bad tx hex: {}", e)))?;
        let tx: Transaction = deserialize(&bytes)
            .map_err(|e| WalletError::ChainUnavailable(format!("bad tx: {}", e)))?;
        Ok(tx.compute_txid().to_string())
    }

    fn tx_link(&self) -> String {
        MOCK_TX_LINK.to_string()
    }
}

// ============================================================================
// Fixture Data
// ============================================================================

fn fixture_unspents() -> Vec<Unspent> {
    vec![
        Unspent {
            txid: "0f8c5cdf448acb82969193452ac4bb7010c0890ceb96fa5e8c332378654459df".to_string(),
            vout: 0,
            value: 93266,
            confirmed: true,
            block_time: 1562492930,
            block_height: 1567884,
            script_pubkey: MOCK_SCRIPT.to_string(),
        },
        Unspent {
            txid: "2335b1b00d149907e0ce9eb349da87234d2c9bd0dfcc216cb251c3b21d63054a".to_string(),
            vout: 1,
            value: 10000,
            confirmed: true,
            block_time: 1562492930,
            block_height: 1567884,
            script_pubkey: MOCK_SCRIPT.to_string(),
        },
    ]
}

fn fixture_txs() -> Vec<Tx> {
    let tx = |txid: &str, value: i64, confirmed: bool, height: i64, time: i64| Tx {
        txid: txid.to_string(),
        fee: 1000,
        link: String::new(),
        value,
        confirmed,
        block_time: time,
        block_height: height,
        data: String::new(),
    };
    vec![
        tx(MOCK_PUSH_TXID, -93266, true, 1568858, 1563036674),
        tx(
            "0f8c5cdf448acb82969193452ac4bb7010c0890ceb96fa5e8c332378654459df",
            4569,
            false,
            0,
            0,
        ),
        tx(
            "2335b1b00d149907e0ce9eb349da87234d2c9bd0dfcc216cb251c3b21d63054a",
            1234,
            true,
            1567884,
            1562492930,
        ),
    ]
}

fn ticker(price: f64, symbol: &str) -> Ticker {
    Ticker {
        fifteen_min: price,
        last: price,
        buy: price,
        sell: price,
        symbol: symbol.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_data() {
        let chain = MockChain::new();
        let utxos = chain.get_utxos(MOCK_FUNDED_ADDRESS).await.unwrap();
        assert_eq!(utxos.iter().map(|u| u.value).sum::<u64>(), 103266);
        assert!(chain.get_utxos("mv7hzrEL4WYXvMzLawe82Mn82Mm7had4FY").await.unwrap().is_empty());

        let txs = chain.get_txs(MOCK_FUNDED_ADDRESS).await.unwrap();
        assert_eq!(txs.len(), 3);
        assert!(txs[0].link.ends_with(MOCK_PUSH_TXID));

        assert_eq!(chain.get_fees().await.unwrap()["4"], 0.8);
        assert_eq!(chain.get_tickers().await.unwrap()["USD"].symbol, "$");
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let chain = MockChain::new();
        chain.fail_address(MOCK_FUNDED_ADDRESS);
        assert!(matches!(
            chain.get_utxos(MOCK_FUNDED_ADDRESS).await,
            Err(WalletError::ChainUnavailable(_))
        ));
        assert!(chain.get_fees().await.is_ok());

        chain.set_unavailable(true);
        assert!(chain.get_fees().await.is_err());
        assert!(chain.push_tx("00").await.is_err());
    }

    #[tokio::test]
    async fn test_push_records_raw_tx() {
        let chain = MockChain::new();
        assert_eq!(chain.push_tx("abcd").await.unwrap(), MOCK_PUSH_TXID);
        assert_eq!(chain.pushed(), vec!["abcd".to_string()]);

        chain.echo_txid(true);
        assert!(chain.push_tx("abcd").await.is_err());
    }

    #[tokio::test]
    async fn test_delay_holds_every_call() {
        let chain = MockChain::new();
        chain.set_delay(Duration::from_millis(50));

        let started = std::time::Instant::now();
        assert_eq!(chain.get_fees().await.unwrap().len(), 4);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
