//! Request and response types for client-server communication.
//!
//! Every request is bound to a wallet through the credential headers
//! [`UID_HEADER`] and [`PUBKEY_HEADER`]; the bodies below carry only the
//! operation arguments.

use serde::{Deserialize, Serialize};

use crate::{Balance, BitcoinNetwork, ScriptType, WalletError};

/// Header carrying the wallet uid.
pub const UID_HEADER: &str = "x-wallet-uid";

/// Header carrying the client's master public share.
pub const PUBKEY_HEADER: &str = "x-wallet-pubkey";

// ============================================================================
// Two-Party ECDSA Exchange
// ============================================================================

/// First Responder call: nonce exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdsaR2Request {
    pub pos: u32,
    /// Sighash being signed (hex, 32 bytes).
    pub hash: String,
    /// Initiator nonce point (hex, compressed).
    pub r1: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdsaR2Response {
    /// Responder nonce point (hex, compressed).
    pub r2: String,
    /// Combined nonce point `k2·R1` (hex, compressed).
    pub share_r: String,
}

/// Second Responder call: blind combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdsaS2Request {
    pub pos: u32,
    pub hash: String,
    pub r1: String,
    pub share_r: String,
    /// Paillier ciphertext of the Initiator's share (hex, big-endian).
    pub enc_pk1: String,
    /// Paillier modulus of the Initiator (hex, big-endian).
    pub enc_pub1: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdsaS2Response {
    /// Encrypted signature share (hex, big-endian).
    pub s2: String,
}

// ============================================================================
// Wallet API
// ============================================================================

/// Register (or log back into) a wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub uid: String,
    pub network: BitcoinNetwork,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletCheckResponse {
    pub user_exists: bool,
    pub backup_exists: bool,
    pub backup_timestamp: i64,
    pub backup_cloud_service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NewAddressRequest {
    #[serde(default)]
    pub script_type: ScriptType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAddressResponse {
    pub pos: u32,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnspentsRequest {
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendFeesRequest {
    #[serde(default)]
    pub priority: String,
    pub send_value: u64,
}

/// Pagination window for history and address listings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// One entry of the address listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub pos: u32,
    pub address: String,
    pub balance: Balance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRequest {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushTxRequest {
    pub tx_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushTxResponse {
    pub txid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupStoreRequest {
    pub email: String,
    pub device_id: String,
    #[serde(default)]
    pub cloud_service: String,
    pub encrypted_prv_key: String,
    pub encryption_pub_key: String,
}

// ============================================================================
// Errors
// ============================================================================

/// Wire form of a `WalletError`.
///
/// The optional fields carry the payload of the structured kinds
/// (`insufficient_funds`, `txid_mismatch`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

impl From<&WalletError> for ErrorDetail {
    fn from(err: &WalletError) -> Self {
        let mut detail = ErrorDetail {
            kind: err.kind().to_string(),
            message: err.to_string(),
            ..ErrorDetail::default()
        };
        match err {
            WalletError::InsufficientFunds { balance, amount } => {
                detail.balance = Some(*balance);
                detail.amount = Some(*amount);
            }
            WalletError::TxIdMismatch { local, remote } => {
                detail.local = Some(local.clone());
                detail.remote = Some(remote.clone());
            }
            _ => {}
        }
        detail
    }
}

/// Body of every non-2xx API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_default_limit() {
        let page: PageRequest = serde_json::from_str(r#"{"offset":3}"#).unwrap();
        assert_eq!(page.offset, 3);
        assert_eq!(page.limit, 20);
    }

    #[test]
    fn test_error_response_shape() {
        let body: ErrorResponse =
            serde_json::from_str(r#"{"error":{"type":"wallet_not_found","message":"10086"}}"#)
                .unwrap();
        assert_eq!(body.error.kind, "wallet_not_found");
        assert_eq!(body.error.balance, None);
    }

    #[test]
    fn test_structured_errors_survive_the_wire() {
        let sent = WalletError::InsufficientFunds {
            balance: 103266,
            amount: 200000,
        };
        let json = serde_json::to_string(&ErrorResponse {
            error: ErrorDetail::from(&sent),
        })
        .unwrap();
        let body: ErrorResponse = serde_json::from_str(&json).unwrap();
        match WalletError::from_remote(body.error) {
            WalletError::InsufficientFunds { balance, amount } => {
                assert_eq!((balance, amount), (103266, 200000));
            }
            other => panic!("expected InsufficientFunds, got {:?}", other),
        }

        let sent = WalletError::TxIdMismatch {
            local: "aa".into(),
            remote: "bb".into(),
        };
        let received = WalletError::from_remote(ErrorDetail::from(&sent));
        assert_eq!(received.kind(), "txid_mismatch");
        assert_eq!(received.to_string(), sent.to_string());
    }

    #[test]
    fn test_plain_error_detail_omits_payload() {
        let detail = ErrorDetail::from(&WalletError::WalletNotFound("10086".into()));
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["type"], "wallet_not_found");
        assert!(json.get("balance").is_none());
        assert!(json.get("local").is_none());
    }

    #[test]
    fn test_new_address_request_default_script() {
        let req: NewAddressRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.script_type, ScriptType::P2wpkh);
    }
}
