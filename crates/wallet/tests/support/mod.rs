//! Shared setup for wallet integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use bitcoin::bip32::{Xpriv, Xpub};
use bitcoin::secp256k1::Secp256k1;

use chains::bitcoin::{generate_master_share, parse_address, MockChain};
use common::{BitcoinNetwork, Unspent};
use wallet::fixtures::{mock_fees, mock_wallet};
use wallet::Ledger;

/// Ledger holding the fixture wallet and fee table, over the fixture chain.
pub fn fixture_ledger() -> (Arc<MockChain>, Arc<Ledger>) {
    let chain = Arc::new(MockChain::new());
    let ledger = Ledger::in_memory(BitcoinNetwork::Testnet, chain.clone()).unwrap();
    ledger.insert_wallet(mock_wallet()).unwrap();
    ledger.update_fees(mock_fees()).unwrap();
    (chain, Arc::new(ledger))
}

/// Empty ledger over an empty chain.
pub fn empty_ledger() -> (Arc<MockChain>, Arc<Ledger>) {
    let chain = Arc::new(MockChain::empty());
    let ledger = Ledger::in_memory(BitcoinNetwork::Testnet, chain.clone()).unwrap();
    (chain, Arc::new(ledger))
}

/// A fresh client master share and its public half.
pub fn client_share() -> (Xpriv, String) {
    let master = generate_master_share(bitcoin::Network::Testnet).unwrap();
    let public = Xpub::from_priv(&Secp256k1::new(), &master);
    (master, public.to_string())
}

/// A confirmed output of `value` locked to `address`.
pub fn funding(address: &str, txid_byte: &str, vout: u32, value: u64) -> Unspent {
    let script = parse_address(address, bitcoin::Network::Testnet)
        .unwrap()
        .script_pubkey();
    Unspent {
        txid: txid_byte.repeat(32),
        vout,
        value,
        confirmed: true,
        block_time: 1562492930,
        block_height: 1567884,
        script_pubkey: script.to_hex_string(),
    }
}
