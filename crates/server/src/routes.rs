//! Router assembly and the endpoint table printed at startup.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::handlers;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Wallet
        .route("/api/wallet/register", post(handlers::register))
        .route("/api/wallet/check", post(handlers::wallet_check))
        .route("/api/wallet/newaddress", post(handlers::new_address))
        .route("/api/wallet/balance", post(handlers::balance))
        .route("/api/wallet/unspents", post(handlers::unspents))
        .route("/api/wallet/sendfees", post(handlers::send_fees))
        .route("/api/wallet/txs", post(handlers::txs))
        .route("/api/wallet/addresses", post(handlers::addresses))
        .route("/api/wallet/portfolio", post(handlers::portfolio))
        .route("/api/wallet/push", post(handlers::push_tx))
        // Two-party ECDSA
        .route("/api/ecdsa/r2", post(handlers::ecdsa_r2))
        .route("/api/ecdsa/s2", post(handlers::ecdsa_s2))
        // Backup
        .route("/api/backup/store", post(handlers::backup_store))
        .route("/api/backup/get", post(handlers::backup_get))
        .layer(cors)
        .with_state(state)
}

pub fn log_endpoints() {
    info!("Endpoints:");
    info!("  GET    /health                 - Health check");
    info!("  POST   /api/wallet/register    - Register or log in");
    info!("  POST   /api/wallet/check       - Wallet and backup status");
    info!("  POST   /api/wallet/newaddress  - Allocate next address");
    info!("  POST   /api/wallet/balance     - Wallet balance");
    info!("  POST   /api/wallet/unspents    - Coin selection");
    info!("  POST   /api/wallet/sendfees    - Fee estimate");
    info!("  POST   /api/wallet/txs         - Transaction history");
    info!("  POST   /api/wallet/addresses   - Address listing");
    info!("  POST   /api/wallet/portfolio   - Coin price");
    info!("  POST   /api/wallet/push        - Broadcast transaction");
    info!("  POST   /api/ecdsa/r2           - Signing nonce exchange");
    info!("  POST   /api/ecdsa/s2           - Signing blind combination");
    info!("  POST   /api/backup/store       - Store backup record");
    info!("  POST   /api/backup/get         - Fetch backup record");
}

#[cfg(test)]
mod tests {
    //! HTTP round trips against a server bound to an ephemeral port.

    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use bitcoin::bip32::Xpub;
    use bitcoin::secp256k1::Secp256k1;
    use serde_json::{json, Value};

    use chains::bitcoin::{generate_master_share, parse_address, MockChain};
    use common::{
        Balance, BitcoinNetwork, FeeQuote, NewAddressRequest, NewAddressResponse, PageRequest,
        RegisterResponse, ScriptType, Unspent, WalletError,
    };
    use protocols::{ApiClient, HttpSigningParty};
    use wallet::fixtures::{mock_fees, mock_wallet, MOCK_CLI_MASTER_PUB_KEY, MOCK_UID};
    use wallet::{HttpBackend, Ledger, Orchestrator, Syncer, WalletBackend};

    struct TestServer {
        url: String,
        chain: Arc<MockChain>,
        ledger: Arc<Ledger>,
    }

    async fn start(chain: MockChain) -> TestServer {
        let chain = Arc::new(chain);
        let ledger = Arc::new(Ledger::in_memory(BitcoinNetwork::Testnet, chain.clone()).unwrap());
        ledger.insert_wallet(mock_wallet()).unwrap();
        ledger.update_fees(mock_fees()).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let app = router(AppState::new(ledger.clone()));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer { url, chain, ledger }
    }

    fn client(server: &TestServer, uid: &str, pubkey: &str) -> ApiClient {
        ApiClient::new(&server.url, uid, pubkey, Duration::from_secs(10)).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let server = start(MockChain::new()).await;
        let body: Value = reqwest::get(format!("{}/health", server.url))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["wallets"], 1);
    }

    #[tokio::test]
    async fn test_fixture_wallet_queries() {
        let server = start(MockChain::new()).await;
        let api = client(&server, MOCK_UID, MOCK_CLI_MASTER_PUB_KEY);

        let balance: Balance = api.post("/api/wallet/balance", &json!({})).await.unwrap();
        assert_eq!(balance.all_balance, 103266);

        let quote: FeeQuote = api
            .post(
                "/api/wallet/sendfees",
                &json!({"priority": "normal", "send_value": 50000}),
            )
            .await
            .unwrap();
        assert_eq!(quote.fee, 180);

        let listing: Vec<common::AddressEntry> = api
            .post("/api/wallet/addresses", &PageRequest { offset: 0, limit: 3 })
            .await
            .unwrap();
        assert_eq!(listing.iter().map(|e| e.pos).collect::<Vec<_>>(), vec![6, 5, 4]);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let server = start(MockChain::new()).await;

        let stranger = client(&server, "nobody", MOCK_CLI_MASTER_PUB_KEY);
        let err = stranger
            .post::<_, Balance>("/api/wallet/balance", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::WalletNotFound(_)));

        let impostor = client(&server, MOCK_UID, "tpub-not-registered");
        let err = impostor
            .post::<_, Balance>("/api/wallet/balance", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidKeyShare(_)));

        let response = reqwest::Client::new()
            .post(format!("{}/api/wallet/balance", server.url))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
    }

    #[tokio::test]
    async fn test_insufficient_funds_keeps_its_kind() {
        let server = start(MockChain::new()).await;
        let backend = HttpBackend::new(client(&server, MOCK_UID, MOCK_CLI_MASTER_PUB_KEY));

        let err = backend.unspents(200_000).await.unwrap_err();
        match err {
            WalletError::InsufficientFunds { balance, amount } => {
                assert_eq!(balance, 103266);
                assert_eq!(amount, 200_000);
            }
            other => panic!("expected InsufficientFunds, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backup_store_once() {
        let server = start(MockChain::new()).await;
        let api = client(&server, MOCK_UID, MOCK_CLI_MASTER_PUB_KEY);
        let record = json!({
            "email": "user@example.com",
            "device_id": "device-1",
            "cloud_service": "icloud",
            "encrypted_prv_key": "c1f0",
            "encryption_pub_key": "02ab",
        });

        let stored: common::Backup = api.post("/api/backup/store", &record).await.unwrap();
        assert_eq!(stored.device_id, "device-1");

        let err = api
            .post::<_, common::Backup>("/api/backup/store", &record)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::BackupExists(_)));

        let fetched: common::Backup = api.post("/api/backup/get", &json!({})).await.unwrap();
        assert_eq!(fetched, stored);
    }

    #[tokio::test]
    async fn test_register_fund_and_send_over_http() {
        let chain = MockChain::new();
        chain.echo_txid(true);
        let server = start(chain).await;

        let cli_master = generate_master_share(bitcoin::Network::Testnet).unwrap();
        let cli_pub = Xpub::from_priv(&Secp256k1::new(), &cli_master).to_string();
        let api = client(&server, "40000", &cli_pub);

        let registered: RegisterResponse =
            api.post("/api/wallet/register", &json!({})).await.unwrap();
        assert!(registered.created);

        let address: NewAddressResponse = api
            .post(
                "/api/wallet/newaddress",
                &NewAddressRequest {
                    script_type: ScriptType::P2wpkh,
                },
            )
            .await
            .unwrap();
        assert_eq!(address.pos, 0);

        let script = parse_address(&address.address, bitcoin::Network::Testnet)
            .unwrap()
            .script_pubkey();
        server.chain.set_utxos(
            &address.address,
            vec![Unspent {
                txid: "cd".repeat(32),
                vout: 0,
                value: 80_000,
                confirmed: true,
                block_time: 1562492930,
                block_height: 1567884,
                script_pubkey: script.to_hex_string(),
            }],
        );
        Syncer::new(server.ledger.clone(), Duration::from_secs(30), Duration::from_secs(5))
            .sync_once()
            .await;

        let orchestrator = Orchestrator::new(
            BitcoinNetwork::Testnet,
            cli_master,
            Arc::new(HttpBackend::new(api.clone())),
            Arc::new(HttpSigningParty::new(api.clone())),
        );
        let txid = orchestrator
            .send("mv7hzrEL4WYXvMzLawe82Mn82Mm7had4FY", 50_000, 1_000)
            .await
            .unwrap();

        let pushed = server.chain.pushed();
        assert_eq!(pushed.len(), 1);
        let tx: bitcoin::Transaction =
            bitcoin::consensus::deserialize(&hex::decode(&pushed[0]).unwrap()).unwrap();
        assert_eq!(tx.compute_txid().to_string(), txid);
    }
}
