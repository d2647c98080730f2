//! Mapping of wallet errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use common::{ErrorDetail, ErrorResponse, WalletError};

/// Handler error: a `WalletError` rendered as `{error:{type,message}}`.
#[derive(Debug)]
pub struct ApiError(pub WalletError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            WalletError::InsufficientFunds { .. }
            | WalletError::InvalidAddress(_)
            | WalletError::Derivation(_) => StatusCode::BAD_REQUEST,
            WalletError::ShareMismatch(_) | WalletError::SignatureVerification(_) => {
                StatusCode::CONFLICT
            }
            WalletError::InvalidKeyShare(_) => StatusCode::UNAUTHORIZED,
            WalletError::WalletNotFound(_) => StatusCode::NOT_FOUND,
            WalletError::BackupExists(_) => StatusCode::CONFLICT,
            WalletError::ChainUnavailable(_) | WalletError::Transport(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<WalletError> for ApiError {
    fn from(e: WalletError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }

        let body = ErrorResponse {
            error: ErrorDetail::from(&self.0),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
