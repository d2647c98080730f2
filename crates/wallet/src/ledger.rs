//! Wallet ledger: every account, keyed by uid.
//!
//! Locking follows two levels:
//! - `wallets` (coarse) guards only insert/lookup of wallet handles and is
//!   released before any wallet is touched.
//! - each wallet's own mutex guards every read-modify-write of its
//!   addresses, balances and position counter, including the store write
//!   that persists the mutation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use bitcoin::consensus::deserialize;
use bitcoin::Transaction;
use chrono::Utc;

use chains::bitcoin::{child_public_share, derive_private_child, generate_master_share, SharedChain};
use common::{
    AddressEntry, Backup, BackupStoreRequest, Balance, BitcoinNetwork, Config, FeeQuote,
    Portfolio, Priority, ScriptType, Ticker, Tx, Unspent, Utxo, WalletCheckResponse, WalletError,
};
use protocols::ecdsa::Responder;

use crate::model::{Address, Wallet};
use crate::store::WalletStore;

/// Estimated bytes per input of a send.
const INPUT_SIZE: u64 = 149;
/// Estimated bytes per output of a send.
const OUTPUT_SIZE: u64 = 34;
/// Sends always carry a payment and a change output.
const OUTPUT_COUNT: u64 = 2;
/// Version, locktime and counts.
const TX_OVERHEAD: u64 = 8;

/// A wallet shared between request handlers and the Syncer.
pub type SharedWallet = Arc<Mutex<Wallet>>;

/// Fresh chain view for one address, fetched by the Syncer.
#[derive(Debug, Clone)]
pub struct AddressUpdate {
    pub address: String,
    pub unspents: Vec<Unspent>,
    pub txs: Vec<Tx>,
}

/// All wallets of one deployment plus the global fee and ticker snapshots.
pub struct Ledger {
    network: BitcoinNetwork,
    store: WalletStore,
    wallets: RwLock<HashMap<String, SharedWallet>>,
    fees: RwLock<HashMap<String, f64>>,
    tickers: RwLock<HashMap<String, Ticker>>,
    chain: SharedChain,
}

impl Ledger {
    /// Open the ledger over the configured data directory and load every
    /// stored wallet into memory.
    pub fn open(config: &Config, chain: SharedChain) -> Result<Self, WalletError> {
        let store = WalletStore::open(config.wallet_db_path())?;
        Self::with_store(config.chainnet, store, chain)
    }

    /// A ledger backed by an in-memory database (for testing).
    pub fn in_memory(network: BitcoinNetwork, chain: SharedChain) -> Result<Self, WalletError> {
        Self::with_store(network, WalletStore::open_in_memory()?, chain)
    }

    fn with_store(
        network: BitcoinNetwork,
        store: WalletStore,
        chain: SharedChain,
    ) -> Result<Self, WalletError> {
        let mut wallets = HashMap::new();
        for wallet in store.load_all()? {
            if wallet.network != network {
                tracing::warn!(
                    "Skipping wallet {} stored for {} (ledger runs on {})",
                    wallet.uid,
                    wallet.network,
                    network
                );
                continue;
            }
            wallets.insert(wallet.uid.clone(), Arc::new(Mutex::new(wallet)));
        }
        tracing::info!("Loaded {} wallets from storage", wallets.len());

        Ok(Self {
            network,
            store,
            wallets: RwLock::new(wallets),
            fees: RwLock::new(HashMap::new()),
            tickers: RwLock::new(HashMap::new()),
            chain,
        })
    }

    pub fn network(&self) -> BitcoinNetwork {
        self.network
    }

    pub fn chain(&self) -> &SharedChain {
        &self.chain
    }

    // ========================================================================
    // Wallet Handles
    // ========================================================================

    /// Persist `wallet` and make it available under its uid.
    pub fn insert_wallet(&self, wallet: Wallet) -> Result<(), WalletError> {
        self.store.save_wallet(&wallet)?;
        let mut wallets = self
            .wallets
            .write()
            .map_err(|e| WalletError::Storage(format!("Lock error: {}", e)))?;
        wallets.insert(wallet.uid.clone(), Arc::new(Mutex::new(wallet)));
        Ok(())
    }

    fn wallet(&self, uid: &str) -> Result<SharedWallet, WalletError> {
        let wallets = self
            .wallets
            .read()
            .map_err(|e| WalletError::Storage(format!("Lock error: {}", e)))?;
        wallets
            .get(uid)
            .cloned()
            .ok_or_else(|| WalletError::WalletNotFound(uid.to_string()))
    }

    fn lock(wallet: &SharedWallet) -> Result<MutexGuard<'_, Wallet>, WalletError> {
        wallet
            .lock()
            .map_err(|e| WalletError::Storage(format!("Lock error: {}", e)))
    }

    /// Look up `uid` and require that `cli_master_pub_key` is its
    /// registered client share.
    pub fn authorize(&self, uid: &str, cli_master_pub_key: &str) -> Result<(), WalletError> {
        let wallet = self.wallet(uid)?;
        let guard = Self::lock(&wallet)?;
        guard.check(cli_master_pub_key)
    }

    /// Open the wallet for `uid`, creating it with a fresh server master
    /// share on first use. Returns whether the wallet was created.
    pub fn open_uid_wallet(&self, uid: &str, cli_master_pub_key: &str) -> Result<bool, WalletError> {
        if let Ok(existing) = self.wallet(uid) {
            Self::lock(&existing)?.check(cli_master_pub_key)?;
            return Ok(false);
        }

        // The client share must parse on our network before we bind to it.
        chains::bitcoin::parse_public_share(cli_master_pub_key, self.network.to_bitcoin_network())?;

        let mut wallets = self
            .wallets
            .write()
            .map_err(|e| WalletError::Storage(format!("Lock error: {}", e)))?;

        // Lost a race with another registration for the same uid.
        let raced = wallets.get(uid).cloned();
        if let Some(existing) = raced {
            drop(wallets);
            Self::lock(&existing)?.check(cli_master_pub_key)?;
            return Ok(false);
        }

        let master = generate_master_share(self.network.to_bitcoin_network())?;
        let wallet = Wallet::new(uid, self.network, cli_master_pub_key, &master.to_string());
        self.store.save_wallet(&wallet)?;
        wallets.insert(uid.to_string(), Arc::new(Mutex::new(wallet)));

        tracing::info!("Created wallet {} on {}", uid, self.network);
        Ok(true)
    }

    /// Registration and backup status of `uid`.
    pub fn wallet_check(&self, uid: &str) -> Result<WalletCheckResponse, WalletError> {
        let wallet = match self.wallet(uid) {
            Ok(wallet) => wallet,
            Err(WalletError::WalletNotFound(_)) => {
                return Ok(WalletCheckResponse {
                    user_exists: false,
                    backup_exists: false,
                    backup_timestamp: 0,
                    backup_cloud_service: String::new(),
                })
            }
            Err(e) => return Err(e),
        };

        let guard = Self::lock(&wallet)?;
        let backup = guard.backup.as_ref();
        Ok(WalletCheckResponse {
            user_exists: true,
            backup_exists: backup.is_some(),
            backup_timestamp: backup.map(|b| b.time).unwrap_or(0),
            backup_cloud_service: backup.map(|b| b.cloud_service.clone()).unwrap_or_default(),
        })
    }

    // ========================================================================
    // Addresses
    // ========================================================================

    /// Allocate the next shared address of `uid` and persist it.
    pub fn new_address(&self, uid: &str, script_type: ScriptType) -> Result<Address, WalletError> {
        let wallet = self.wallet(uid)?;
        let mut guard = Self::lock(&wallet)?;

        let record = guard.next_address(script_type)?;
        if let Err(e) = self.store.save_wallet(&guard) {
            guard.addresses.remove(&record.address);
            guard.last_pos = record.pos;
            return Err(e);
        }

        tracing::info!("Wallet {} new address at pos {}: {}", uid, record.pos, record.address);
        Ok(record)
    }

    /// Addresses sorted by descending position.
    pub fn addresses(
        &self,
        uid: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<AddressEntry>, WalletError> {
        let wallet = self.wallet(uid)?;
        let mut entries: Vec<AddressEntry> = {
            let guard = Self::lock(&wallet)?;
            guard
                .addresses
                .values()
                .map(|addr| AddressEntry {
                    pos: addr.pos,
                    address: addr.address.clone(),
                    balance: addr.balance,
                })
                .collect()
        };

        entries.sort_by(|a, b| b.pos.cmp(&a.pos));
        Ok(page(entries, offset, limit))
    }

    // ========================================================================
    // Balances and Coin Selection
    // ========================================================================

    pub fn balance(&self, uid: &str) -> Result<Balance, WalletError> {
        let wallet = self.wallet(uid)?;
        let guard = Self::lock(&wallet)?;
        Ok(guard.balance())
    }

    /// Select UTXOs whose sum exceeds `amount`, largest first.
    pub fn unspents(&self, uid: &str, amount: u64) -> Result<Vec<Utxo>, WalletError> {
        let wallet = self.wallet(uid)?;
        let guard = Self::lock(&wallet)?;
        select_unspents(&guard, amount)
    }

    /// Fee estimate for sending `send_value` at `priority`.
    pub fn send_fees(
        &self,
        uid: &str,
        priority: &str,
        send_value: u64,
    ) -> Result<FeeQuote, WalletError> {
        let rate = self.fee_rate(Priority::parse(priority))?;

        let wallet = self.wallet(uid)?;
        let guard = Self::lock(&wallet)?;

        let total_value = guard.balance().all_balance;
        let inputs = if send_value < total_value {
            select_unspents(&guard, send_value)?.len() as u64
        } else {
            guard.addresses.values().map(|a| a.unspents.len() as u64).sum()
        };
        drop(guard);

        let rate_per_kb = (rate * 1000.0).round() as u64;
        let size = INPUT_SIZE * inputs + OUTPUT_SIZE * OUTPUT_COUNT + TX_OVERHEAD;
        let fee = size * rate_per_kb / 1000;

        if fee >= total_value {
            return Err(WalletError::InsufficientFunds {
                balance: total_value,
                amount: fee,
            });
        }

        let sendable_value = if send_value.saturating_add(fee) > total_value {
            total_value - fee
        } else {
            send_value
        };

        tracing::debug!(
            "Wallet {} fee quote: {} inputs, {} sat/kB, fee {}",
            uid,
            inputs,
            rate_per_kb,
            fee
        );
        Ok(FeeQuote {
            fee,
            total_value,
            sendable_value,
        })
    }

    fn fee_rate(&self, priority: Priority) -> Result<f64, WalletError> {
        let fees = self
            .fees
            .read()
            .map_err(|e| WalletError::Storage(format!("Lock error: {}", e)))?;
        let rate = fees.get(priority.fee_target()).copied();
        rate.ok_or_else(|| WalletError::ChainUnavailable("fee table not loaded".to_string()))
    }

    // ========================================================================
    // History and Prices
    // ========================================================================

    /// Transaction history, unconfirmed first, then newest first.
    ///
    /// A transaction touching several addresses of the wallet appears once
    /// with the values of every address summed.
    pub fn txs(&self, uid: &str, offset: usize, limit: usize) -> Result<Vec<Tx>, WalletError> {
        let wallet = self.wallet(uid)?;
        let mut merged: HashMap<String, Tx> = HashMap::new();
        {
            let guard = Self::lock(&wallet)?;
            for addr in guard.addresses.values() {
                for tx in &addr.txs {
                    merged
                        .entry(tx.txid.clone())
                        .and_modify(|existing| existing.value += tx.value)
                        .or_insert_with(|| tx.clone());
                }
            }
        }

        let mut txs: Vec<Tx> = merged.into_values().collect();
        txs.sort_by(|a, b| {
            a.confirmed
                .cmp(&b.confirmed)
                .then(b.block_time.cmp(&a.block_time))
                .then(a.txid.cmp(&b.txid))
        });
        Ok(page(txs, offset, limit))
    }

    /// Coin price in the fiat currency `code`.
    pub fn portfolio(&self, code: &str) -> Result<Portfolio, WalletError> {
        let tickers = self
            .tickers
            .read()
            .map_err(|e| WalletError::Storage(format!("Lock error: {}", e)))?;
        let coin_symbol = self.network.coin_symbol().to_string();

        if tickers.is_empty() {
            return Ok(Portfolio {
                coin_symbol,
                fiat_symbol: String::new(),
                current_price: 0.0,
            });
        }

        let code = code.to_uppercase();
        let ticker = tickers
            .get(&code)
            .ok_or_else(|| WalletError::Protocol(format!("Unknown currency code: {}", code)))?;
        Ok(Portfolio {
            coin_symbol,
            fiat_symbol: ticker.symbol.clone(),
            current_price: ticker.last,
        })
    }

    // ========================================================================
    // Key Material and Backup
    // ========================================================================

    /// The server master private share of `uid`.
    pub fn master_prv_key(&self, uid: &str, cli_master_pub_key: &str) -> Result<String, WalletError> {
        let wallet = self.wallet(uid)?;
        let guard = Self::lock(&wallet)?;
        guard.check(cli_master_pub_key)?;
        Ok(guard.svr_master_prv_key.clone())
    }

    /// Replace the server master private share of `uid`.
    pub fn restore_master_prv_key(
        &self,
        uid: &str,
        cli_master_pub_key: &str,
        svr_master_prv_key: &str,
    ) -> Result<(), WalletError> {
        let wallet = self.wallet(uid)?;
        let mut guard = Self::lock(&wallet)?;
        guard.check(cli_master_pub_key)?;

        let previous = guard.svr_master_prv_key.clone();
        guard.set_svr_master(svr_master_prv_key)?;
        if let Err(e) = self.store.save_wallet(&guard) {
            guard.svr_master_prv_key = previous;
            return Err(e);
        }

        tracing::info!("Restored server master share of wallet {}", uid);
        Ok(())
    }

    /// Store the backup record of `uid`. A wallet holds at most one.
    pub fn store_backup(
        &self,
        uid: &str,
        cli_master_pub_key: &str,
        request: BackupStoreRequest,
    ) -> Result<Backup, WalletError> {
        let wallet = self.wallet(uid)?;
        let mut guard = Self::lock(&wallet)?;
        guard.check(cli_master_pub_key)?;

        if guard.backup.is_some() {
            return Err(WalletError::BackupExists(uid.to_string()));
        }

        let backup = Backup {
            time: Utc::now().timestamp(),
            email: request.email,
            device_id: request.device_id,
            cloud_service: request.cloud_service,
            encrypted_prv_key: request.encrypted_prv_key,
            encryption_pub_key: request.encryption_pub_key,
        };
        guard.backup = Some(backup.clone());
        if let Err(e) = self.store.save_wallet(&guard) {
            guard.backup = None;
            return Err(e);
        }

        tracing::info!("Stored backup for wallet {}", uid);
        Ok(backup)
    }

    pub fn get_backup(&self, uid: &str, cli_master_pub_key: &str) -> Result<Backup, WalletError> {
        let wallet = self.wallet(uid)?;
        let guard = Self::lock(&wallet)?;
        guard.check(cli_master_pub_key)?;
        guard
            .backup
            .clone()
            .ok_or_else(|| WalletError::Protocol(format!("No backup stored for wallet {}", uid)))
    }

    // ========================================================================
    // Signing and Broadcast
    // ========================================================================

    /// The Responder holding the server child share of `uid` at `pos`.
    ///
    /// Only positions already allocated can be signed for.
    pub fn responder(&self, uid: &str, pos: u32) -> Result<Responder, WalletError> {
        let wallet = self.wallet(uid)?;
        let master = {
            let guard = Self::lock(&wallet)?;
            if pos >= guard.last_pos {
                return Err(WalletError::Derivation(format!(
                    "Position {} not allocated (last_pos {})",
                    pos, guard.last_pos
                )));
            }
            guard.svr_master()?
        };

        let child = derive_private_child(&master, pos)?;
        Responder::from_secret_key(&child.private_key)
    }

    /// Forward a fully signed transaction to the chain.
    pub async fn push_tx(&self, raw_tx_hex: &str) -> Result<String, WalletError> {
        let bytes = hex::decode(raw_tx_hex.trim())
            .map_err(|e| WalletError::Protocol(format!("Invalid transaction hex: {}", e)))?;
        let tx: Transaction = deserialize(&bytes)
            .map_err(|e| WalletError::Protocol(format!("Invalid transaction: {}", e)))?;

        let txid = self.chain.push_tx(raw_tx_hex.trim()).await?;
        tracing::info!(
            "Pushed transaction {} ({} inputs, {} outputs)",
            txid,
            tx.input.len(),
            tx.output.len()
        );
        Ok(txid)
    }

    // ========================================================================
    // Sync Support
    // ========================================================================

    /// Every known uid.
    pub fn uids(&self) -> Result<Vec<String>, WalletError> {
        let wallets = self
            .wallets
            .read()
            .map_err(|e| WalletError::Storage(format!("Lock error: {}", e)))?;
        let mut uids: Vec<String> = wallets.keys().cloned().collect();
        uids.sort();
        Ok(uids)
    }

    /// Address strings of `uid`.
    pub fn wallet_addresses(&self, uid: &str) -> Result<Vec<String>, WalletError> {
        let wallet = self.wallet(uid)?;
        let guard = Self::lock(&wallet)?;
        Ok(guard.address_list())
    }

    /// Replace the cached chain view of the given addresses and persist.
    pub fn apply_sync(&self, uid: &str, updates: Vec<AddressUpdate>) -> Result<(), WalletError> {
        let wallet = self.wallet(uid)?;
        let mut guard = Self::lock(&wallet)?;

        for update in updates {
            // Addresses never disappear, but stay tolerant of a stale list.
            let Some(addr) = guard.addresses.get_mut(&update.address) else {
                continue;
            };
            addr.set_unspents(update.unspents);
            addr.txs = update.txs;
        }

        self.store.save_wallet(&guard)
    }

    pub fn update_fees(&self, fees: HashMap<String, f64>) -> Result<(), WalletError> {
        let mut current = self
            .fees
            .write()
            .map_err(|e| WalletError::Storage(format!("Lock error: {}", e)))?;
        *current = fees;
        Ok(())
    }

    pub fn update_tickers(&self, tickers: HashMap<String, Ticker>) -> Result<(), WalletError> {
        let mut current = self
            .tickers
            .write()
            .map_err(|e| WalletError::Storage(format!("Lock error: {}", e)))?;
        *current = tickers;
        Ok(())
    }

    /// Snapshot of the fee table.
    pub fn fees(&self) -> Result<HashMap<String, f64>, WalletError> {
        let fees = self
            .fees
            .read()
            .map_err(|e| WalletError::Storage(format!("Lock error: {}", e)))?;
        Ok(fees.clone())
    }
}

/// Greedy largest-first selection over every address of `wallet`.
fn select_unspents(wallet: &Wallet, amount: u64) -> Result<Vec<Utxo>, WalletError> {
    let balance = wallet.balance().all_balance;
    if balance <= amount {
        return Err(WalletError::InsufficientFunds { balance, amount });
    }

    let master = wallet.svr_master()?;
    let mut utxos = Vec::new();
    for addr in wallet.addresses.values() {
        if addr.unspents.is_empty() {
            continue;
        }
        let svr_pub_key = child_public_share(&master, addr.pos)?;
        for unspent in &addr.unspents {
            utxos.push(Utxo {
                pos: addr.pos,
                txid: unspent.txid.clone(),
                vout: unspent.vout,
                value: unspent.value,
                address: addr.address.clone(),
                confirmed: unspent.confirmed,
                svr_pub_key: svr_pub_key.clone(),
                script_pubkey: unspent.script_pubkey.clone(),
            });
        }
    }

    utxos.sort_by(|a, b| b.value.cmp(&a.value));

    let mut selected = Vec::new();
    let mut sum = 0u64;
    for utxo in utxos {
        sum += utxo.value;
        selected.push(utxo);
        if sum > amount {
            break;
        }
    }
    Ok(selected)
}

fn page<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    items.into_iter().skip(offset).take(limit).collect()
}
