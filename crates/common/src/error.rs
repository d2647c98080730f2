//! Error types for the two-party wallet.

use crate::protocol::ErrorDetail;

/// Error types for the two-party wallet system.
///
/// Derivation and protocol errors surface to the caller of the failing
/// operation. Nothing in the core retries on any of these.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// Bad position or malformed extended key encoding.
    #[error("Derivation error: {0}")]
    Derivation(String),

    /// A key share could not be turned into an address or signing key.
    #[error("Key error: {0}")]
    Key(String),

    /// The combined nonce point reported by the peer does not match ours.
    #[error("Share mismatch: {0}")]
    ShareMismatch(String),

    /// The assembled signature does not verify against the combined key.
    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("Insufficient funds: balance {balance}, requested {amount}")]
    InsufficientFunds { balance: u64, amount: u64 },

    /// The presented client master public share is not the registered one.
    #[error("Invalid key share for wallet {0}")]
    InvalidKeyShare(String),

    /// The chain accepted a transaction but reported a different txid.
    #[error("Txid mismatch: local {local}, chain {remote}")]
    TxIdMismatch { local: String, remote: String },

    #[error("Chain unavailable: {0}")]
    ChainUnavailable(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backup already exists for wallet {0}")]
    BackupExists(String),
}

impl WalletError {
    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            WalletError::Derivation(_) => "derivation",
            WalletError::Key(_) => "key",
            WalletError::ShareMismatch(_) => "share_mismatch",
            WalletError::SignatureVerification(_) => "signature_verification",
            WalletError::InsufficientFunds { .. } => "insufficient_funds",
            WalletError::InvalidKeyShare(_) => "invalid_key_share",
            WalletError::TxIdMismatch { .. } => "txid_mismatch",
            WalletError::ChainUnavailable(_) => "chain_unavailable",
            WalletError::WalletNotFound(_) => "wallet_not_found",
            WalletError::Protocol(_) => "protocol",
            WalletError::InvalidAddress(_) => "invalid_address",
            WalletError::Transport(_) => "transport",
            WalletError::Storage(_) => "storage",
            WalletError::Serialization(_) => "serialization",
            WalletError::Configuration(_) => "configuration",
            WalletError::BackupExists(_) => "backup_exists",
        }
    }

    /// Rebuild an error reported by a remote party.
    ///
    /// A structured kind whose payload is missing comes back as `Protocol`.
    pub fn from_remote(detail: ErrorDetail) -> Self {
        let ErrorDetail {
            kind,
            message,
            balance,
            amount,
            local,
            remote,
        } = detail;

        match kind.as_str() {
            "insufficient_funds" => match (balance, amount) {
                (Some(balance), Some(amount)) => WalletError::InsufficientFunds { balance, amount },
                _ => WalletError::Protocol(message),
            },
            "txid_mismatch" => match (local, remote) {
                (Some(local), Some(remote)) => WalletError::TxIdMismatch { local, remote },
                _ => WalletError::Protocol(message),
            },
            "derivation" => WalletError::Derivation(message),
            "key" => WalletError::Key(message),
            "share_mismatch" => WalletError::ShareMismatch(message),
            "signature_verification" => WalletError::SignatureVerification(message),
            "invalid_key_share" => WalletError::InvalidKeyShare(message),
            "chain_unavailable" => WalletError::ChainUnavailable(message),
            "wallet_not_found" => WalletError::WalletNotFound(message),
            "invalid_address" => WalletError::InvalidAddress(message),
            "storage" => WalletError::Storage(message),
            "serialization" => WalletError::Serialization(message),
            "configuration" => WalletError::Configuration(message),
            "backup_exists" => WalletError::BackupExists(message),
            "transport" => WalletError::Transport(message),
            _ => WalletError::Protocol(message),
        }
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = WalletError::InsufficientFunds {
            balance: 100,
            amount: 200,
        };
        assert_eq!(err.to_string(), "Insufficient funds: balance 100, requested 200");
        assert_eq!(err.kind(), "insufficient_funds");

        let err = WalletError::TxIdMismatch {
            local: "aa".into(),
            remote: "bb".into(),
        };
        assert!(err.to_string().contains("local aa"));
        assert!(err.to_string().contains("chain bb"));
    }

    #[test]
    fn test_from_remote_kind() {
        let detail = |kind: &str| ErrorDetail {
            kind: kind.to_string(),
            message: "remote".to_string(),
            ..ErrorDetail::default()
        };
        assert!(matches!(
            WalletError::from_remote(detail("share_mismatch")),
            WalletError::ShareMismatch(_)
        ));

        let insufficient = WalletError::InsufficientFunds {
            balance: 10,
            amount: 20,
        };
        let err = WalletError::from_remote(ErrorDetail::from(&insufficient));
        assert_eq!(err.kind(), "insufficient_funds");

        // Payload stripped in transit.
        assert_eq!(
            WalletError::from_remote(detail("insufficient_funds")).kind(),
            "protocol"
        );
    }

    #[test]
    fn test_from_serde_error() {
        let parse: Result<u32, _> = serde_json::from_str("not json");
        let err: WalletError = parse.unwrap_err().into();
        assert_eq!(err.kind(), "serialization");
    }
}
