//! Background refresh of wallet state from the chain.
//!
//! Each tick:
//! 1. Refreshes the fee table and the price tickers (best-effort)
//! 2. Fetches UTXOs and history of every address of every wallet
//! 3. Applies the fetched views under the wallet lock and persists
//!
//! Network I/O never happens while a wallet lock is held. A failure for one
//! address is logged and that address keeps its previous cache.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use common::WalletError;

use crate::ledger::{AddressUpdate, Ledger};

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub wallets: usize,
    pub addresses_synced: usize,
    pub addresses_failed: usize,
    pub fees_refreshed: bool,
    pub tickers_refreshed: bool,
}

/// Periodic wallet syncer.
pub struct Syncer {
    ledger: Arc<Ledger>,
    interval: Duration,
    chain_timeout: Duration,
}

/// Handle to a running syncer task.
pub struct SyncerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncerHandle {
    /// Stop the loop and wait for the in-flight tick to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Syncer task ended abnormally: {}", e);
        }
        info!("Syncer stopped");
    }
}

impl Syncer {
    pub fn new(ledger: Arc<Ledger>, interval: Duration, chain_timeout: Duration) -> Self {
        Self {
            ledger,
            interval,
            chain_timeout,
        }
    }

    /// Spawn the sync loop. The first pass runs immediately.
    pub fn spawn(self) -> SyncerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        info!(
            "Starting wallet syncer (interval: {}ms, chain timeout: {}ms)",
            self.interval.as_millis(),
            self.chain_timeout.as_millis()
        );

        let task = tokio::spawn(async move {
            loop {
                if token.is_cancelled() {
                    break;
                }

                let report = self.sync_once().await;
                debug!("Sync pass finished: {:?}", report);

                tokio::select! {
                    _ = sleep(self.interval) => continue,
                    _ = token.cancelled() => {
                        debug!("Syncer cancelled during sleep");
                        break;
                    }
                }
            }
        });

        SyncerHandle { cancel, task }
    }

    /// Run one full pass.
    pub async fn sync_once(&self) -> SyncReport {
        let mut report = SyncReport {
            fees_refreshed: self.refresh_fees().await,
            tickers_refreshed: self.refresh_tickers().await,
            ..SyncReport::default()
        };

        let uids = match self.ledger.uids() {
            Ok(uids) => uids,
            Err(e) => {
                warn!("Syncer could not list wallets: {}", e);
                return report;
            }
        };

        for uid in uids {
            report.wallets += 1;
            let addresses = match self.ledger.wallet_addresses(&uid) {
                Ok(addresses) => addresses,
                Err(e) => {
                    warn!("Syncer skipping wallet {}: {}", uid, e);
                    continue;
                }
            };

            let mut updates = Vec::with_capacity(addresses.len());
            for address in addresses {
                match self.fetch_address(&address).await {
                    Ok(update) => {
                        report.addresses_synced += 1;
                        updates.push(update);
                    }
                    Err(e) => {
                        report.addresses_failed += 1;
                        warn!("Syncer skipping address {} of wallet {}: {}", address, uid, e);
                    }
                }
            }

            if let Err(e) = self.ledger.apply_sync(&uid, updates) {
                warn!("Syncer failed to persist wallet {}: {}", uid, e);
            }
        }

        report
    }

    async fn fetch_address(&self, address: &str) -> Result<AddressUpdate, WalletError> {
        let chain = self.ledger.chain();
        let unspents = self.bounded(chain.get_utxos(address)).await?;
        let txs = self.bounded(chain.get_txs(address)).await?;
        Ok(AddressUpdate {
            address: address.to_string(),
            unspents,
            txs,
        })
    }

    async fn refresh_fees(&self) -> bool {
        let fees = match self.bounded(self.ledger.chain().get_fees()).await {
            Ok(fees) => fees,
            Err(e) => {
                warn!("Fee refresh failed, keeping previous table: {}", e);
                return false;
            }
        };
        match self.ledger.update_fees(fees) {
            Ok(()) => true,
            Err(e) => {
                warn!("Fee table update failed: {}", e);
                false
            }
        }
    }

    async fn refresh_tickers(&self) -> bool {
        let tickers = match self.bounded(self.ledger.chain().get_tickers()).await {
            Ok(tickers) => tickers,
            Err(e) => {
                warn!("Ticker refresh failed, keeping previous snapshot: {}", e);
                return false;
            }
        };
        match self.ledger.update_tickers(tickers) {
            Ok(()) => true,
            Err(e) => {
                warn!("Ticker update failed: {}", e);
                false
            }
        }
    }

    /// Apply the chain timeout to one call. Expiry counts as unavailability.
    async fn bounded<T, F>(&self, call: F) -> Result<T, WalletError>
    where
        F: Future<Output = Result<T, WalletError>>,
    {
        timeout(self.chain_timeout, call).await.map_err(|_| {
            WalletError::ChainUnavailable(format!(
                "chain call timed out after {}ms",
                self.chain_timeout.as_millis()
            ))
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{mock_wallet, MOCK_UID};
    use chains::bitcoin::{MockChain, MOCK_FUNDED_ADDRESS};
    use common::BitcoinNetwork;

    fn setup() -> (Arc<MockChain>, Arc<Ledger>) {
        let chain = Arc::new(MockChain::new());
        let ledger = Ledger::in_memory(BitcoinNetwork::Testnet, chain.clone()).unwrap();
        let mut wallet = mock_wallet();
        for addr in wallet.addresses.values_mut() {
            addr.set_unspents(Vec::new());
        }
        ledger.insert_wallet(wallet).unwrap();
        (chain, Arc::new(ledger))
    }

    #[tokio::test]
    async fn test_sync_once_refreshes_everything() {
        let (_chain, ledger) = setup();
        let syncer = Syncer::new(ledger.clone(), Duration::from_secs(30), Duration::from_secs(5));

        let report = syncer.sync_once().await;
        assert_eq!(report.wallets, 1);
        assert_eq!(report.addresses_synced, 7);
        assert_eq!(report.addresses_failed, 0);
        assert!(report.fees_refreshed && report.tickers_refreshed);

        assert_eq!(ledger.balance(MOCK_UID).unwrap().all_balance, 103266);
        assert_eq!(ledger.txs(MOCK_UID, 0, 10).unwrap().len(), 3);
        assert_eq!(ledger.fees().unwrap()["2"], 1.0);
    }

    #[tokio::test]
    async fn test_failed_address_keeps_previous_cache() {
        let (chain, ledger) = setup();
        let syncer = Syncer::new(ledger.clone(), Duration::from_secs(30), Duration::from_secs(5));
        syncer.sync_once().await;

        chain.set_utxos(MOCK_FUNDED_ADDRESS, Vec::new());
        chain.fail_address(MOCK_FUNDED_ADDRESS);
        let report = syncer.sync_once().await;
        assert_eq!(report.addresses_failed, 1);
        assert_eq!(report.addresses_synced, 6);
        assert_eq!(ledger.balance(MOCK_UID).unwrap().all_balance, 103266);
    }

    #[tokio::test]
    async fn test_chain_down_keeps_fee_snapshot() {
        let (chain, ledger) = setup();
        let syncer = Syncer::new(ledger.clone(), Duration::from_secs(30), Duration::from_secs(5));
        syncer.sync_once().await;

        chain.set_unavailable(true);
        let report = syncer.sync_once().await;
        assert!(!report.fees_refreshed);
        assert_eq!(report.addresses_failed, 7);
        assert_eq!(ledger.fees().unwrap().len(), 4);
        assert_eq!(ledger.balance(MOCK_UID).unwrap().all_balance, 103266);
    }

    #[tokio::test]
    async fn test_slow_chain_counts_as_failure() {
        let (chain, ledger) = setup();
        let syncer = Syncer::new(ledger.clone(), Duration::from_secs(30), Duration::from_secs(5));
        syncer.sync_once().await;
        assert_eq!(ledger.balance(MOCK_UID).unwrap().all_balance, 103266);

        chain.set_utxos(MOCK_FUNDED_ADDRESS, Vec::new());
        chain.set_delay(Duration::from_millis(200));
        let impatient =
            Syncer::new(ledger.clone(), Duration::from_secs(30), Duration::from_millis(10));
        let report = impatient.sync_once().await;

        assert_eq!(report.addresses_failed, 7);
        assert_eq!(report.addresses_synced, 0);
        assert!(!report.fees_refreshed);
        assert!(!report.tickers_refreshed);
        assert_eq!(ledger.balance(MOCK_UID).unwrap().all_balance, 103266);
        assert_eq!(ledger.fees().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_spawn_and_stop() {
        let (_chain, ledger) = setup();
        let handle =
            Syncer::new(ledger.clone(), Duration::from_millis(20), Duration::from_secs(5)).spawn();

        for _ in 0..100 {
            if ledger.balance(MOCK_UID).unwrap().all_balance > 0 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        handle.stop().await;
        assert_eq!(ledger.balance(MOCK_UID).unwrap().all_balance, 103266);
    }
}
