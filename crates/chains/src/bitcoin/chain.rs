//! The `Chain` capability: everything the wallet needs from a blockchain
//! indexer.
//!
//! ```text
//! Ledger / Syncer / Orchestrator
//!     ↓
//! Chain trait (abstract)
//!     ├─ BlockstreamChain (Esplora over HTTP)
//!     └─ MockChain (fixture data for tests)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use common::{Ticker, Tx, Unspent, WalletError};

/// Placeholder substituted with the txid in a link template.
pub const TXID_PLACEHOLDER: &str = "{txid}";

/// Blockchain indexer capability.
///
/// Any HTTP indexer implementing these semantics is pluggable. Network
/// failures and timeouts surface as [`WalletError::ChainUnavailable`].
#[async_trait]
pub trait Chain: Send + Sync {
    /// Current unspent outputs of an address.
    async fn get_utxos(&self, address: &str) -> Result<Vec<Unspent>, WalletError>;

    /// Transaction history of an address.
    async fn get_txs(&self, address: &str) -> Result<Vec<Tx>, WalletError>;

    /// Fee rates in sat/byte keyed by confirmation target.
    async fn get_fees(&self) -> Result<HashMap<String, f64>, WalletError>;

    /// Fiat tickers keyed by currency code.
    async fn get_tickers(&self) -> Result<HashMap<String, Ticker>, WalletError>;

    /// Broadcast a raw transaction, returning the txid the chain reports.
    async fn push_tx(&self, raw_tx_hex: &str) -> Result<String, WalletError>;

    /// Explorer URL template containing [`TXID_PLACEHOLDER`].
    fn tx_link(&self) -> String;
}

/// Type alias for shared chain reference.
pub type SharedChain = Arc<dyn Chain>;

/// Substitute a txid into a link template.
pub fn format_tx_link(template: &str, txid: &str) -> String {
    template.replace(TXID_PLACEHOLDER, txid)
}
