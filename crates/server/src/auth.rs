//! Request credential: the `(uid, client master public share)` pair.
//!
//! Token issuance happens upstream; by the time a request reaches us the
//! pair travels in the `x-wallet-uid` / `x-wallet-pubkey` headers.

use axum::{extract::FromRequestParts, http::request::Parts};

use common::{WalletError, PUBKEY_HEADER, UID_HEADER};

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct Credential {
    pub uid: String,
    pub cli_master_pub_key: String,
}

fn header(parts: &Parts, name: &str) -> Result<String, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError(WalletError::InvalidKeyShare(format!("missing {} header", name))))
}

impl<S> FromRequestParts<S> for Credential
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Credential {
            uid: header(parts, UID_HEADER)?,
            cli_master_pub_key: header(parts, PUBKEY_HEADER)?,
        })
    }
}
