//! Domain types shared between the ledger, the chain client and the API.

use serde::{Deserialize, Serialize};

use crate::WalletError;

// ============================================================================
// Network
// ============================================================================

/// Bitcoin network a deployment runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BitcoinNetwork {
    Mainnet,
    #[default]
    Testnet,
}

impl BitcoinNetwork {
    /// Get the Blockstream API base URL.
    pub fn api_url(&self) -> &'static str {
        match self {
            BitcoinNetwork::Mainnet => "https://blockstream.info/api",
            BitcoinNetwork::Testnet => "https://blockstream.info/testnet/api",
        }
    }

    /// Get the block explorer URL.
    pub fn explorer_url(&self) -> &'static str {
        match self {
            BitcoinNetwork::Mainnet => "https://blockstream.info",
            BitcoinNetwork::Testnet => "https://blockstream.info/testnet",
        }
    }

    /// Get the bitcoin crate Network type.
    pub fn to_bitcoin_network(&self) -> bitcoin::Network {
        match self {
            BitcoinNetwork::Mainnet => bitcoin::Network::Bitcoin,
            BitcoinNetwork::Testnet => bitcoin::Network::Testnet,
        }
    }

    /// Coin symbol shown next to balances.
    pub fn coin_symbol(&self) -> &'static str {
        match self {
            BitcoinNetwork::Mainnet => "BTC",
            BitcoinNetwork::Testnet => "tBTC",
        }
    }
}

impl std::fmt::Display for BitcoinNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BitcoinNetwork::Mainnet => write!(f, "mainnet"),
            BitcoinNetwork::Testnet => write!(f, "testnet"),
        }
    }
}

impl std::str::FromStr for BitcoinNetwork {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(BitcoinNetwork::Mainnet),
            "testnet" | "test" => Ok(BitcoinNetwork::Testnet),
            other => Err(WalletError::Configuration(format!(
                "Unknown chain network: '{}'. Must be mainnet or testnet",
                other
            ))),
        }
    }
}

// ============================================================================
// Address / Fee Options
// ============================================================================

/// Output script used for a shared address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    /// Legacy pay-to-pubkey-hash.
    P2pkh,
    /// Version-0 witness pubkey hash.
    #[default]
    P2wpkh,
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptType::P2pkh => write!(f, "p2pkh"),
            ScriptType::P2wpkh => write!(f, "p2wpkh"),
        }
    }
}

impl std::str::FromStr for ScriptType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "p2pkh" | "legacy" => Ok(ScriptType::P2pkh),
            "p2wpkh" | "segwit" | "" => Ok(ScriptType::P2wpkh),
            other => Err(WalletError::InvalidAddress(format!(
                "Unknown script type: {}",
                other
            ))),
        }
    }
}

/// Fee priority tier requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Fast,
    #[default]
    Normal,
    Slow,
}

impl Priority {
    /// Parse a priority label. Unknown labels fall back to `Normal`.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "fast" | "fastest" => Priority::Fast,
            "slow" | "economy" => Priority::Slow,
            _ => Priority::Normal,
        }
    }

    /// Key into the fee-estimate table (confirmation target in blocks).
    pub fn fee_target(&self) -> &'static str {
        match self {
            Priority::Fast => "2",
            Priority::Normal => "4",
            Priority::Slow => "6",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Fast => write!(f, "fast"),
            Priority::Normal => write!(f, "normal"),
            Priority::Slow => write!(f, "slow"),
        }
    }
}

// ============================================================================
// Chain Data
// ============================================================================

/// An unspent output owned by one shared address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unspent {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    pub confirmed: bool,
    #[serde(default)]
    pub block_time: u32,
    #[serde(default)]
    pub block_height: u32,
    /// Locking script of the output (hex).
    #[serde(rename = "scriptpubkey", alias = "Scriptpubkey")]
    pub script_pubkey: String,
}

/// A transaction touching one shared address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub txid: String,
    pub fee: i64,
    /// Explorer link for the transaction.
    #[serde(default)]
    pub link: String,
    /// Received minus sent, from the address's point of view.
    pub value: i64,
    pub confirmed: bool,
    #[serde(default)]
    pub block_time: i64,
    #[serde(default)]
    pub block_height: i64,
    /// OP_RETURN payload, if any.
    #[serde(default)]
    pub data: String,
}

/// Cached balance of an address or a whole wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Balance {
    pub all_balance: u64,
    pub unconfirmed_balance: u64,
}

impl Balance {
    /// Recompute from a full unspent set.
    pub fn from_unspents(unspents: &[Unspent]) -> Self {
        let mut balance = Balance::default();
        for unspent in unspents {
            balance.all_balance += unspent.value;
            if !unspent.confirmed {
                balance.unconfirmed_balance += unspent.value;
            }
        }
        balance
    }
}

/// Price ticker for one fiat currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Ticker {
    #[serde(rename = "15m")]
    pub fifteen_min: f64,
    pub last: f64,
    pub buy: f64,
    pub sell: f64,
    pub symbol: String,
}

/// Opaque backup record kept alongside a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Backup {
    /// Unix timestamp of the store.
    pub time: i64,
    pub email: String,
    pub device_id: String,
    #[serde(default)]
    pub cloud_service: String,
    /// Client key share, encrypted by the client.
    pub encrypted_prv_key: String,
    pub encryption_pub_key: String,
}

// ============================================================================
// Derived Views
// ============================================================================

/// An unspent output selected for spending, with what the signer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub pos: u32,
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    pub address: String,
    pub confirmed: bool,
    /// Extended public key of the server child at `pos`.
    pub svr_pub_key: String,
    /// Locking script of the output (hex).
    pub script_pubkey: String,
}

/// Fee estimate for a prospective send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub fee: u64,
    pub total_value: u64,
    pub sendable_value: u64,
}

/// Coin price in the requested fiat currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub coin_symbol: String,
    pub fiat_symbol: String,
    pub current_price: f64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parse() {
        assert_eq!(
            "testnet".parse::<BitcoinNetwork>().unwrap(),
            BitcoinNetwork::Testnet
        );
        assert_eq!(
            "MAINNET".parse::<BitcoinNetwork>().unwrap(),
            BitcoinNetwork::Mainnet
        );
        assert!("regtest".parse::<BitcoinNetwork>().is_err());
        assert_eq!(
            BitcoinNetwork::Testnet.to_bitcoin_network(),
            bitcoin::Network::Testnet
        );
    }

    #[test]
    fn test_priority_defaults_to_normal() {
        assert_eq!(Priority::parse("fast"), Priority::Fast);
        assert_eq!(Priority::parse("slow"), Priority::Slow);
        assert_eq!(Priority::parse("whatever"), Priority::Normal);
        assert_eq!(Priority::parse("whatever").fee_target(), "4");
    }

    #[test]
    fn test_script_type_parse() {
        assert_eq!("P2PKH".parse::<ScriptType>().unwrap(), ScriptType::P2pkh);
        assert_eq!("".parse::<ScriptType>().unwrap(), ScriptType::P2wpkh);
        assert!("p2tr".parse::<ScriptType>().is_err());
    }

    #[test]
    fn test_unspent_accepts_legacy_field_name() {
        let json = r#"{"txid":"ab","vout":1,"value":5,"confirmed":false,"Scriptpubkey":"76a9"}"#;
        let unspent: Unspent = serde_json::from_str(json).unwrap();
        assert_eq!(unspent.script_pubkey, "76a9");
        assert_eq!(unspent.block_height, 0);
    }

    #[test]
    fn test_balance_from_unspents() {
        let mk = |value, confirmed| Unspent {
            txid: "00".into(),
            vout: 0,
            value,
            confirmed,
            block_time: 0,
            block_height: 0,
            script_pubkey: String::new(),
        };
        let balance = Balance::from_unspents(&[mk(100, true), mk(50, false)]);
        assert_eq!(balance.all_balance, 150);
        assert_eq!(balance.unconfirmed_balance, 50);
    }

    #[test]
    fn test_ticker_field_names() {
        let json = r#"{"15m":1.5,"last":2.0,"buy":3.0,"sell":4.0,"symbol":"$"}"#;
        let ticker: Ticker = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.fifteen_min, 1.5);
        assert_eq!(ticker.symbol, "$");
    }
}
