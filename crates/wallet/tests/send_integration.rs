//! End-to-end send tests.
//!
//! A freshly registered wallet is funded on the fixture chain, synced,
//! and spent through the Orchestrator with the ledger acting as the
//! Responder. These tests validate:
//! - Two-party signing of legacy and witness inputs in one transaction
//! - Broadcast txid agreement
//! - Txid mismatch detection
//! - Refusal to sign for a foreign credential

mod support;

use std::sync::Arc;
use std::time::Duration;

use bitcoin::consensus::deserialize;
use bitcoin::Transaction;

use chains::bitcoin::{MockChain, MOCK_PUSH_TXID};
use common::{BitcoinNetwork, ScriptType, WalletError};
use support::*;
use wallet::{Ledger, LedgerSigningParty, LocalBackend, Orchestrator, Syncer};

const UID: &str = "30000";
const DESTINATION: &str = "mv7hzrEL4WYXvMzLawe82Mn82Mm7had4FY";

struct Funded {
    chain: Arc<MockChain>,
    ledger: Arc<Ledger>,
    orchestrator: Orchestrator,
    first_address: String,
}

/// Register a wallet, fund a P2WPKH and a P2PKH address, sync.
async fn funded_wallet() -> Funded {
    let (chain, ledger) = empty_ledger();
    let (cli_master, cli_pub) = client_share();

    assert!(ledger.open_uid_wallet(UID, &cli_pub).unwrap());
    let segwit = ledger.new_address(UID, ScriptType::P2wpkh).unwrap();
    let legacy = ledger.new_address(UID, ScriptType::P2pkh).unwrap();

    chain.set_utxos(&segwit.address, vec![funding(&segwit.address, "aa", 0, 60_000)]);
    chain.set_utxos(&legacy.address, vec![funding(&legacy.address, "bb", 1, 40_000)]);
    Syncer::new(ledger.clone(), Duration::from_secs(30), Duration::from_secs(5))
        .sync_once()
        .await;
    assert_eq!(ledger.balance(UID).unwrap().all_balance, 100_000);

    let orchestrator = Orchestrator::new(
        BitcoinNetwork::Testnet,
        cli_master,
        Arc::new(LocalBackend::new(ledger.clone(), UID)),
        Arc::new(LedgerSigningParty::new(ledger.clone(), UID, &cli_pub)),
    );

    Funded {
        chain,
        ledger,
        orchestrator,
        first_address: segwit.address,
    }
}

#[tokio::test]
async fn test_send_signs_both_script_types() {
    let funded = funded_wallet().await;
    funded.chain.echo_txid(true);

    let txid = funded
        .orchestrator
        .send(DESTINATION, 70_000, 1_000)
        .await
        .unwrap();

    let pushed = funded.chain.pushed();
    assert_eq!(pushed.len(), 1);
    let tx: Transaction = deserialize(&hex::decode(&pushed[0]).unwrap()).unwrap();
    assert_eq!(tx.compute_txid().to_string(), txid);
    assert_eq!(tx.input.len(), 2);

    // Largest coin first: the witness input, then the legacy one.
    assert_eq!(tx.input[0].witness.len(), 2);
    assert!(tx.input[0].script_sig.is_empty());
    assert!(!tx.input[1].script_sig.is_empty());
    assert!(tx.input[1].witness.is_empty());

    // Payment plus change back to the first selected address.
    assert_eq!(tx.output.len(), 2);
    assert_eq!(tx.output[0].value.to_sat(), 70_000);
    assert_eq!(tx.output[1].value.to_sat(), 29_000);
    let change = chains::bitcoin::parse_address(&funded.first_address, bitcoin::Network::Testnet)
        .unwrap();
    assert_eq!(tx.output[1].script_pubkey, change.script_pubkey());
}

#[tokio::test]
async fn test_send_single_input() {
    let funded = funded_wallet().await;
    funded.chain.echo_txid(true);

    funded.orchestrator.send(DESTINATION, 10_000, 500).await.unwrap();

    let tx: Transaction =
        deserialize(&hex::decode(&funded.chain.pushed()[0]).unwrap()).unwrap();
    assert_eq!(tx.input.len(), 1);
    assert_eq!(tx.output[1].value.to_sat(), 49_500);
}

#[tokio::test]
async fn test_txid_mismatch_is_failure() {
    let funded = funded_wallet().await;

    let err = funded
        .orchestrator
        .send(DESTINATION, 10_000, 500)
        .await
        .unwrap_err();
    match err {
        WalletError::TxIdMismatch { local, remote } => {
            assert_eq!(remote, MOCK_PUSH_TXID);
            assert_ne!(local, remote);
        }
        other => panic!("expected txid mismatch, got {:?}", other),
    }
    assert_eq!(funded.chain.pushed().len(), 1);
}

#[tokio::test]
async fn test_foreign_credential_cannot_sign() {
    let funded = funded_wallet().await;
    let (intruder_master, intruder_pub) = client_share();

    let orchestrator = Orchestrator::new(
        BitcoinNetwork::Testnet,
        intruder_master,
        Arc::new(LocalBackend::new(funded.ledger.clone(), UID)),
        Arc::new(LedgerSigningParty::new(funded.ledger.clone(), UID, &intruder_pub)),
    );

    let err = orchestrator.send(DESTINATION, 10_000, 500).await.unwrap_err();
    assert!(matches!(err, WalletError::Key(_)), "got {:?}", err);
    assert!(funded.chain.pushed().is_empty());
}
