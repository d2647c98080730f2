//! Wallet and address records.
//!
//! A `Wallet` is plain data; callers wrap it in a mutex (see
//! [`crate::ledger::Ledger`]) and hold that lock for every
//! read-modify-write.

use std::collections::HashMap;
use bitcoin::bip32::{Xpriv, Xpub};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chains::bitcoin::{build_shared_address, parse_private_share, parse_public_share};
use common::{Backup, Balance, BitcoinNetwork, ScriptType, Tx, Unspent, WalletError};

// ============================================================================
// Address
// ============================================================================

/// One shared address and its cached chain view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub pos: u32,
    pub address: String,
    pub script_type: ScriptType,
    #[serde(default)]
    pub unspents: Vec<Unspent>,
    #[serde(default)]
    pub txs: Vec<Tx>,
    #[serde(default)]
    pub balance: Balance,
}

impl Address {
    pub fn new(pos: u32, address: String, script_type: ScriptType) -> Self {
        Self {
            pos,
            address,
            script_type,
            unspents: Vec::new(),
            txs: Vec::new(),
            balance: Balance::default(),
        }
    }

    /// Replace the unspent set wholesale and recompute the balance.
    pub fn set_unspents(&mut self, unspents: Vec<Unspent>) {
        self.balance = Balance::from_unspents(&unspents);
        self.unspents = unspents;
    }
}

// ============================================================================
// Wallet
// ============================================================================

/// Per-uid account state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub uid: String,
    pub network: BitcoinNetwork,
    /// Client master public share registered at creation.
    pub cli_master_pub_key: String,
    /// Server master private share.
    pub svr_master_prv_key: String,
    /// Next unused position.
    pub last_pos: u32,
    /// Address string to address record.
    pub addresses: HashMap<String, Address>,
    pub backup: Option<Backup>,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(
        uid: &str,
        network: BitcoinNetwork,
        cli_master_pub_key: &str,
        svr_master_prv_key: &str,
    ) -> Self {
        Self {
            uid: uid.to_string(),
            network,
            cli_master_pub_key: cli_master_pub_key.to_string(),
            svr_master_prv_key: svr_master_prv_key.to_string(),
            last_pos: 0,
            addresses: HashMap::new(),
            backup: None,
            created_at: Utc::now(),
        }
    }

    /// Reject a credential whose public share is not the registered one.
    pub fn check(&self, cli_master_pub_key: &str) -> Result<(), WalletError> {
        if self.cli_master_pub_key != cli_master_pub_key {
            tracing::warn!("Wallet {} presented an unregistered client share", self.uid);
            return Err(WalletError::InvalidKeyShare(self.uid.clone()));
        }
        Ok(())
    }

    pub fn svr_master(&self) -> Result<Xpriv, WalletError> {
        parse_private_share(&self.svr_master_prv_key, self.network.to_bitcoin_network())
    }

    pub fn cli_master(&self) -> Result<Xpub, WalletError> {
        parse_public_share(&self.cli_master_pub_key, self.network.to_bitcoin_network())
    }

    /// Sum of all cached address balances.
    pub fn balance(&self) -> Balance {
        self.addresses
            .values()
            .fold(Balance::default(), |mut total, addr| {
                total.all_balance += addr.balance.all_balance;
                total.unconfirmed_balance += addr.balance.unconfirmed_balance;
                total
            })
    }

    /// Allocate the address at `last_pos` and advance it.
    ///
    /// Must run under the wallet's lock.
    pub fn next_address(&mut self, script_type: ScriptType) -> Result<Address, WalletError> {
        let pos = self.last_pos;
        let next = pos
            .checked_add(1)
            .ok_or_else(|| WalletError::Derivation("Address positions exhausted".to_string()))?;

        let address = build_shared_address(
            pos,
            &self.svr_master()?,
            &self.cli_master()?,
            self.network.to_bitcoin_network(),
            script_type,
        )?;

        let record = Address::new(pos, address.clone(), script_type);
        self.addresses.insert(address, record.clone());
        self.last_pos = next;
        Ok(record)
    }

    /// Address strings, in no particular order.
    pub fn address_list(&self) -> Vec<String> {
        self.addresses.keys().cloned().collect()
    }

    /// Replace the server master share after checking it parses.
    pub fn set_svr_master(&mut self, encoded: &str) -> Result<(), WalletError> {
        let key = parse_private_share(encoded, self.network.to_bitcoin_network())?;
        self.svr_master_prv_key = key.to_string();
        Ok(())
    }
}
