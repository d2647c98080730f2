//! Transport abstraction between the two signing parties.
//!
//! The Initiator drives the exchange through the `SigningParty` trait and
//! never sees how the Responder is reached.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator (client)
//!     ↓
//! SigningParty trait (abstract)
//!     ├─ HttpSigningParty (client binary: server's /api/ecdsa routes)
//!     └─ LedgerSigningParty (in-process: wallet ledger + Responder)
//! ```
//!
//! `ApiClient` is the shared HTTP plumbing: base URL, credential headers,
//! and mapping of `{error:{type,message}}` bodies back to `WalletError`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use common::{
    EcdsaR2Request, EcdsaR2Response, EcdsaS2Request, EcdsaS2Response, ErrorResponse, WalletError,
    PUBKEY_HEADER, UID_HEADER,
};

/// Error type for transport operations.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// Failed to reach the peer.
    ConnectionFailed(String),
    /// Request could not be sent.
    SendFailed(String),
    /// Response body could not be read.
    ReceiveFailed(String),
    /// Peer did not answer in time.
    Timeout(String),
    /// Peer answered with an error status and no structured body.
    Rejected { status: u16, body: String },
    /// Peer answered with a body we could not parse.
    InvalidMessage(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            Self::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            Self::ReceiveFailed(msg) => write!(f, "Receive failed: {}", msg),
            Self::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Self::Rejected { status, body } => write!(f, "Rejected ({}): {}", status, body),
            Self::InvalidMessage(msg) => write!(f, "Invalid message: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for WalletError {
    fn from(e: TransportError) -> Self {
        WalletError::Transport(e.to_string())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_decode() {
            TransportError::InvalidMessage(e.to_string())
        } else if e.is_connect() {
            TransportError::ConnectionFailed(e.to_string())
        } else if e.is_body() {
            TransportError::ReceiveFailed(e.to_string())
        } else {
            TransportError::SendFailed(e.to_string())
        }
    }
}

// ============================================================================
// Signing Party
// ============================================================================

/// The Responder half of the exchange, as seen by the Initiator.
#[async_trait]
pub trait SigningParty: Send + Sync {
    /// Respond phase: returns `R2` and `shareR`.
    async fn nonce_exchange(&self, request: EcdsaR2Request)
        -> Result<EcdsaR2Response, WalletError>;

    /// Blind-combine phase: returns the encrypted signature share.
    async fn blind_combine(&self, request: EcdsaS2Request)
        -> Result<EcdsaS2Response, WalletError>;
}

/// Type alias for shared signing party reference.
pub type SharedSigningParty = Arc<dyn SigningParty>;

// ============================================================================
// HTTP Client
// ============================================================================

/// Credentialed JSON client for the wallet server.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    server_url: String,
    uid: String,
    pubkey: String,
}

impl ApiClient {
    /// Create a client presenting `(uid, pubkey)` on every request.
    pub fn new(
        server_url: &str,
        uid: &str,
        pubkey: &str,
        timeout: Duration,
    ) -> Result<Self, WalletError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            uid: uid.to_string(),
            pubkey: pubkey.to_string(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// POST `body` to `path` and decode the JSON reply.
    pub async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, WalletError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.server_url, path);
        tracing::trace!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header(UID_HEADER, &self.uid)
            .header(PUBKEY_HEADER, &self.pubkey)
            .json(body)
            .send()
            .await
            .map_err(TransportError::from)?;

        Self::decode(response).await
    }

    async fn decode<Resp: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<Resp, WalletError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<Resp>()
                .await
                .map_err(|e| TransportError::InvalidMessage(e.to_string()).into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => Err(WalletError::from_remote(err.error)),
            Err(_) => Err(TransportError::Rejected {
                status: status.as_u16(),
                body,
            }
            .into()),
        }
    }
}

/// Remote Responder reached over the server's `/api/ecdsa` routes.
pub struct HttpSigningParty {
    api: ApiClient,
}

impl HttpSigningParty {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SigningParty for HttpSigningParty {
    async fn nonce_exchange(
        &self,
        request: EcdsaR2Request,
    ) -> Result<EcdsaR2Response, WalletError> {
        self.api.post("/api/ecdsa/r2", &request).await
    }

    async fn blind_combine(
        &self,
        request: EcdsaS2Request,
    ) -> Result<EcdsaS2Response, WalletError> {
        self.api.post("/api/ecdsa/s2", &request).await
    }
}
