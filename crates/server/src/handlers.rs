//! HTTP handlers for the wallet server.
//!
//! Every handler authenticates through the [`Credential`] extractor and
//! delegates to the ledger. Registration is the only route that accepts an
//! unknown uid.

use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::{debug, info};

use common::{
    AddressEntry, Backup, BackupStoreRequest, Balance, EcdsaR2Request, EcdsaR2Response,
    EcdsaS2Request, EcdsaS2Response, FeeQuote, NewAddressRequest, NewAddressResponse, PageRequest,
    Portfolio, PortfolioRequest, PushTxRequest, PushTxResponse, RegisterResponse, SendFeesRequest,
    Tx, UnspentsRequest, Utxo, WalletCheckResponse,
};
use protocols::SigningParty;
use wallet::LedgerSigningParty;

use crate::auth::Credential;
use crate::error::ApiResult;
use crate::state::AppState;

// ============================================================================
// Health
// ============================================================================

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let wallets = state.ledger.uids().map(|uids| uids.len()).unwrap_or(0);
    Json(json!({
        "status": "healthy",
        "service": "wallet-server",
        "network": state.ledger.network(),
        "wallets": wallets,
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

// ============================================================================
// Wallet
// ============================================================================

/// Create the wallet on first contact, otherwise check the credential.
pub async fn register(State(state): State<AppState>, cred: Credential) -> ApiResult<RegisterResponse> {
    let created = state
        .ledger
        .open_uid_wallet(&cred.uid, &cred.cli_master_pub_key)?;
    if created {
        info!("Registered wallet {}", cred.uid);
    } else {
        debug!("Wallet {} logged in", cred.uid);
    }
    Ok(Json(RegisterResponse {
        uid: cred.uid,
        network: state.ledger.network(),
        created,
    }))
}

pub async fn wallet_check(
    State(state): State<AppState>,
    cred: Credential,
) -> ApiResult<WalletCheckResponse> {
    state.ledger.authorize(&cred.uid, &cred.cli_master_pub_key)?;
    Ok(Json(state.ledger.wallet_check(&cred.uid)?))
}

pub async fn new_address(
    State(state): State<AppState>,
    cred: Credential,
    Json(req): Json<NewAddressRequest>,
) -> ApiResult<NewAddressResponse> {
    state.ledger.authorize(&cred.uid, &cred.cli_master_pub_key)?;
    let address = state.ledger.new_address(&cred.uid, req.script_type)?;
    Ok(Json(NewAddressResponse {
        pos: address.pos,
        address: address.address,
    }))
}

pub async fn balance(State(state): State<AppState>, cred: Credential) -> ApiResult<Balance> {
    state.ledger.authorize(&cred.uid, &cred.cli_master_pub_key)?;
    Ok(Json(state.ledger.balance(&cred.uid)?))
}

pub async fn unspents(
    State(state): State<AppState>,
    cred: Credential,
    Json(req): Json<UnspentsRequest>,
) -> ApiResult<Vec<Utxo>> {
    state.ledger.authorize(&cred.uid, &cred.cli_master_pub_key)?;
    Ok(Json(state.ledger.unspents(&cred.uid, req.amount)?))
}

pub async fn send_fees(
    State(state): State<AppState>,
    cred: Credential,
    Json(req): Json<SendFeesRequest>,
) -> ApiResult<FeeQuote> {
    state.ledger.authorize(&cred.uid, &cred.cli_master_pub_key)?;
    Ok(Json(
        state
            .ledger
            .send_fees(&cred.uid, &req.priority, req.send_value)?,
    ))
}

pub async fn txs(
    State(state): State<AppState>,
    cred: Credential,
    Json(page): Json<PageRequest>,
) -> ApiResult<Vec<Tx>> {
    state.ledger.authorize(&cred.uid, &cred.cli_master_pub_key)?;
    Ok(Json(state.ledger.txs(&cred.uid, page.offset, page.limit)?))
}

pub async fn addresses(
    State(state): State<AppState>,
    cred: Credential,
    Json(page): Json<PageRequest>,
) -> ApiResult<Vec<AddressEntry>> {
    state.ledger.authorize(&cred.uid, &cred.cli_master_pub_key)?;
    Ok(Json(
        state
            .ledger
            .addresses(&cred.uid, page.offset, page.limit)?,
    ))
}

pub async fn portfolio(
    State(state): State<AppState>,
    cred: Credential,
    Json(req): Json<PortfolioRequest>,
) -> ApiResult<Portfolio> {
    state.ledger.authorize(&cred.uid, &cred.cli_master_pub_key)?;
    Ok(Json(state.ledger.portfolio(&req.code)?))
}

pub async fn push_tx(
    State(state): State<AppState>,
    cred: Credential,
    Json(req): Json<PushTxRequest>,
) -> ApiResult<PushTxResponse> {
    state.ledger.authorize(&cred.uid, &cred.cli_master_pub_key)?;
    let txid = state.ledger.push_tx(&req.tx_hex).await?;
    info!("Wallet {} pushed transaction {}", cred.uid, txid);
    Ok(Json(PushTxResponse { txid }))
}

// ============================================================================
// Two-Party ECDSA
// ============================================================================

fn responder(state: &AppState, cred: &Credential) -> LedgerSigningParty {
    LedgerSigningParty::new(state.ledger.clone(), &cred.uid, &cred.cli_master_pub_key)
}

pub async fn ecdsa_r2(
    State(state): State<AppState>,
    cred: Credential,
    Json(req): Json<EcdsaR2Request>,
) -> ApiResult<EcdsaR2Response> {
    Ok(Json(responder(&state, &cred).nonce_exchange(req).await?))
}

pub async fn ecdsa_s2(
    State(state): State<AppState>,
    cred: Credential,
    Json(req): Json<EcdsaS2Request>,
) -> ApiResult<EcdsaS2Response> {
    Ok(Json(responder(&state, &cred).blind_combine(req).await?))
}

// ============================================================================
// Backup
// ============================================================================

pub async fn backup_store(
    State(state): State<AppState>,
    cred: Credential,
    Json(req): Json<BackupStoreRequest>,
) -> ApiResult<Backup> {
    Ok(Json(
        state
            .ledger
            .store_backup(&cred.uid, &cred.cli_master_pub_key, req)?,
    ))
}

pub async fn backup_get(State(state): State<AppState>, cred: Credential) -> ApiResult<Backup> {
    Ok(Json(
        state
            .ledger
            .get_backup(&cred.uid, &cred.cli_master_pub_key)?,
    ))
}
