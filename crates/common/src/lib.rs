//! Common types shared between two-party wallet components.

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use config::{Config, SpvProvider};
pub use error::WalletError;
pub use protocol::*;
pub use types::{
    Backup, Balance, BitcoinNetwork, FeeQuote, Portfolio, Priority, ScriptType, Ticker, Tx,
    Unspent, Utxo,
};
