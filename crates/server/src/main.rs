//! Wallet Server
//!
//! The custodian side of the two-party wallet. It keeps the server master
//! share of every registered wallet, answers the Responder half of each
//! signing exchange, and serves balances, fee quotes and history from the
//! ledger while a background Syncer keeps that ledger fresh.

mod auth;
mod error;
mod handlers;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};

use chains::bitcoin::{BlockstreamChain, MockChain, SharedChain};
use common::{BitcoinNetwork, Config};
use wallet::fixtures::{mock_wallet, MOCK_UID};
use wallet::{Ledger, Syncer};

use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "wallet-server")]
#[command(about = "Custodian server for the two-party Bitcoin wallet")]
struct Args {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(short, long, env = "WALLET_CONFIG")]
    config: Option<PathBuf>,

    /// Serve fixture testnet data instead of querying Blockstream
    #[arg(long, env = "WALLET_MOCK_CHAIN")]
    mock_chain: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with RUST_LOG environment variable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().context("invalid log directive")?),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let args = Args::parse();

    info!("========================================");
    info!("  Wallet Server Starting");
    info!("========================================");

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if args.mock_chain && config.chainnet != BitcoinNetwork::Testnet {
        warn!("Mock chain serves testnet data, overriding chainnet {}", config.chainnet);
        config.chainnet = BitcoinNetwork::Testnet;
    }

    info!("Network:        {}", config.chainnet);
    info!("Data directory: {}", config.datadir);
    info!("SPV provider:   {:?}", config.spv_provider);
    info!("Sync interval:  {}ms", config.wallet_sync_interval_ms);
    info!("Chain timeout:  {}ms", config.chain_timeout_ms);

    let chain: SharedChain = if args.mock_chain {
        info!("Using fixture chain");
        Arc::new(MockChain::new())
    } else {
        Arc::new(BlockstreamChain::new(config.chainnet, config.chain_timeout())?)
    };

    debug!("Opening ledger at {}", config.wallet_db_path().display());
    let ledger = Arc::new(Ledger::open(&config, chain)?);
    if args.mock_chain && !ledger.uids()?.iter().any(|uid| uid == MOCK_UID) {
        ledger.insert_wallet(mock_wallet())?;
        info!("Installed fixture wallet {}", MOCK_UID);
    }

    let syncer = Syncer::new(ledger.clone(), config.sync_interval(), config.chain_timeout()).spawn();

    let app = routes::router(AppState::new(ledger));

    info!("Listening on {}", config.endpoint);
    routes::log_endpoints();
    info!("========================================");

    let listener = tokio::net::TcpListener::bind(&config.endpoint)
        .await
        .with_context(|| format!("failed to bind {}", config.endpoint))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    syncer.stop().await;
    info!("Wallet server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
