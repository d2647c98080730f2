//! Persistent storage for wallets.
//!
//! Uses SQLite for durable storage of:
//! - Wallet rows (shares, position counter, backup record)
//! - Address rows (position, script type, cached unspents and history)
//!
//! A wallet is always written whole, inside one SQLite transaction.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqlResult};

use common::{Backup, BitcoinNetwork, ScriptType, WalletError};

use crate::model::{Address, Wallet};

/// Wallet row before its addresses are attached.
struct WalletRow {
    uid: String,
    network: String,
    cli_master_pub_key: String,
    svr_master_prv_key: String,
    last_pos: i64,
    backup: Option<String>,
    created_at: String,
}

struct AddressRow {
    address: String,
    pos: i64,
    script_type: String,
    unspents: String,
    txs: String,
}

/// SQLite-backed wallet storage.
pub struct WalletStore {
    conn: Mutex<Connection>,
}

impl WalletStore {
    /// Open or create a wallet store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    WalletError::Storage(format!("Failed to create data dir: {}", e))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| WalletError::Storage(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, WalletError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            WalletError::Storage(format!("Failed to open in-memory database: {}", e))
        })?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, WalletError> {
        self.conn
            .lock()
            .map_err(|e| WalletError::Storage(format!("Lock error: {}", e)))
    }

    fn init_schema(&self) -> Result<(), WalletError> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS wallets (
                uid TEXT PRIMARY KEY,
                network TEXT NOT NULL,
                cli_master_pub_key TEXT NOT NULL,
                svr_master_prv_key TEXT NOT NULL,
                last_pos INTEGER NOT NULL,
                backup TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS addresses (
                uid TEXT NOT NULL,
                address TEXT NOT NULL,
                pos INTEGER NOT NULL,
                script_type TEXT NOT NULL,
                unspents TEXT NOT NULL,
                txs TEXT NOT NULL,
                PRIMARY KEY (uid, address)
            );",
        )
        .map_err(|e| WalletError::Storage(format!("Failed to create schema: {}", e)))?;

        tracing::debug!("Wallet store schema initialized");
        Ok(())
    }

    /// Save a wallet and all of its addresses.
    pub fn save_wallet(&self, wallet: &Wallet) -> Result<(), WalletError> {
        let backup = wallet
            .backup
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| WalletError::Storage(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "INSERT OR REPLACE INTO wallets
                (uid, network, cli_master_pub_key, svr_master_prv_key, last_pos, backup, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                wallet.uid,
                wallet.network.to_string(),
                wallet.cli_master_pub_key,
                wallet.svr_master_prv_key,
                wallet.last_pos as i64,
                backup,
                wallet.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| WalletError::Storage(format!("Failed to save wallet: {}", e)))?;

        tx.execute("DELETE FROM addresses WHERE uid = ?1", params![wallet.uid])
            .map_err(|e| WalletError::Storage(format!("Failed to clear addresses: {}", e)))?;

        for addr in wallet.addresses.values() {
            tx.execute(
                "INSERT INTO addresses (uid, address, pos, script_type, unspents, txs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    wallet.uid,
                    addr.address,
                    addr.pos as i64,
                    addr.script_type.to_string(),
                    serde_json::to_string(&addr.unspents)?,
                    serde_json::to_string(&addr.txs)?,
                ],
            )
            .map_err(|e| WalletError::Storage(format!("Failed to save address: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| WalletError::Storage(format!("Failed to commit wallet: {}", e)))?;

        tracing::debug!(
            "Saved wallet {} ({} addresses) to storage",
            wallet.uid,
            wallet.addresses.len()
        );
        Ok(())
    }

    /// Get a wallet by uid.
    pub fn get_wallet(&self, uid: &str) -> Result<Option<Wallet>, WalletError> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                "SELECT uid, network, cli_master_pub_key, svr_master_prv_key, last_pos, backup, created_at
                 FROM wallets WHERE uid = ?1",
                params![uid],
                |row| {
                    Ok(WalletRow {
                        uid: row.get(0)?,
                        network: row.get(1)?,
                        cli_master_pub_key: row.get(2)?,
                        svr_master_prv_key: row.get(3)?,
                        last_pos: row.get(4)?,
                        backup: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(|e| WalletError::Storage(format!("Query error: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT address, pos, script_type, unspents, txs FROM addresses WHERE uid = ?1",
            )
            .map_err(|e| WalletError::Storage(format!("Query error: {}", e)))?;

        let address_rows = stmt
            .query_map(params![uid], |row| {
                Ok(AddressRow {
                    address: row.get(0)?,
                    pos: row.get(1)?,
                    script_type: row.get(2)?,
                    unspents: row.get(3)?,
                    txs: row.get(4)?,
                })
            })
            .map_err(|e| WalletError::Storage(format!("Query error: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| WalletError::Storage(format!("Query error: {}", e)))?;

        Ok(Some(assemble(row, address_rows)?))
    }

    /// All stored uids.
    pub fn list_uids(&self) -> Result<Vec<String>, WalletError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare("SELECT uid FROM wallets ORDER BY uid")
            .map_err(|e| WalletError::Storage(format!("Query error: {}", e)))?;

        let uids = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| WalletError::Storage(format!("Query error: {}", e)))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| WalletError::Storage(format!("Query error: {}", e)))?;

        Ok(uids)
    }

    /// Load every stored wallet.
    pub fn load_all(&self) -> Result<Vec<Wallet>, WalletError> {
        let mut wallets = Vec::new();
        for uid in self.list_uids()? {
            if let Some(wallet) = self.get_wallet(&uid)? {
                wallets.push(wallet);
            }
        }
        Ok(wallets)
    }

    pub fn wallet_count(&self) -> Result<usize, WalletError> {
        let conn = self.lock()?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM wallets", [], |row| row.get(0))
            .map_err(|e| WalletError::Storage(format!("Count error: {}", e)))?;

        Ok(count as usize)
    }
}

fn assemble(row: WalletRow, address_rows: Vec<AddressRow>) -> Result<Wallet, WalletError> {
    let network: BitcoinNetwork = row.network.parse()?;
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map_err(|e| {
            WalletError::Storage(format!("invalid timestamp '{}': {}", row.created_at, e))
        })?
        .with_timezone(&Utc);
    let backup: Option<Backup> = row
        .backup
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    let mut wallet = Wallet::new(
        &row.uid,
        network,
        &row.cli_master_pub_key,
        &row.svr_master_prv_key,
    );
    wallet.last_pos = to_pos(row.last_pos)?;
    wallet.backup = backup;
    wallet.created_at = created_at;

    for addr_row in address_rows {
        let script_type: ScriptType = addr_row
            .script_type
            .parse()
            .map_err(|e| WalletError::Storage(format!("invalid script type: {}", e)))?;
        let mut address = Address::new(to_pos(addr_row.pos)?, addr_row.address, script_type);
        address.set_unspents(serde_json::from_str(&addr_row.unspents)?);
        address.txs = serde_json::from_str(&addr_row.txs)?;
        wallet.addresses.insert(address.address.clone(), address);
    }

    Ok(wallet)
}

fn to_pos(value: i64) -> Result<u32, WalletError> {
    u32::try_from(value).map_err(|_| WalletError::Storage(format!("invalid position {}", value)))
}

// Extend the optional trait for rusqlite
trait OptionalExt<T> {
    fn optional(self) -> SqlResult<Option<T>>;
}

impl<T> OptionalExt<T> for SqlResult<T> {
    fn optional(self) -> SqlResult<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
