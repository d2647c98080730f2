//! Fixture wallet for tests and the server's mock mode.
//!
//! Seven legacy testnet addresses at positions 0..6; position 2 holds the
//! two UTXOs served by [`chains::bitcoin::MockChain`].

use std::collections::HashMap;

use chrono::{TimeZone, Utc};

use common::{BitcoinNetwork, ScriptType, Unspent};

use crate::model::{Address, Wallet};

pub const MOCK_UID: &str = "10086";

pub const MOCK_SVR_MASTER_PRV_KEY: &str = "tprv8ZgxMBicQKsPfNhXDHV93ummM6rEzTmxHf96Mk3FnpgoaoNYPjfSCZyHFnFQnQDLAiMNsvJqEtvjCkvo5P3CPRHQx5GcZxPqRHy31q2oWXD";

pub const MOCK_CLI_MASTER_PRV_KEY: &str = "tprv8ZgxMBicQKsPeVfrhGFHCRu4cQBY1VFSogap4qSzmNTuow93Y1aeXTco2Vdw41VLUvPC4e3X1ZF9uoJEeRbUpLR4DqtzvLd3AQnQobNaGA4";

pub const MOCK_CLI_MASTER_PUB_KEY: &str = "tpubD6NzVbkrYhZ4XxheauusbqZBBRhUApSMNzBbMMVJBeGJeRPpAQQEhxEfCeLfmUyet3FXXybAoWhJ3uZe4fQvqgVCd8UPKX8sP4qAXKEHZGk";

const MOCK_ADDRESSES: [(u32, &str); 7] = [
    (0, "msV128vgApMNEFbTUy5wto12ucZNFdtKTA"),
    (1, "mv7hzrEL4WYXvMzLawe82Mn82Mm7had4FY"),
    (2, "mnBETqvxTqcFRSLnR3w2Tpe9Qu58EasQgU"),
    (3, "mmBRSnFG7o1BX5DaK8Da3xKxvjBh6fzNQq"),
    (4, "msYdTCo8sxSWNdgdNUsxMM1ghA44mNaksY"),
    (5, "muAK3ufJer1nSUerdf95r5As442DagfBXS"),
    (6, "miqi14i2nweWYkcAh49E8Zk6gVAta7ohqJ"),
];

const MOCK_SCRIPT: &str = "76a914490e0eebcc5d462221ea38d00a6aee1238db2a5788ac";

fn mock_unspent(txid: &str, vout: u32, value: u64) -> Unspent {
    Unspent {
        txid: txid.to_string(),
        vout,
        value,
        confirmed: true,
        block_time: 1562492930,
        block_height: 1567884,
        script_pubkey: MOCK_SCRIPT.to_string(),
    }
}

/// The fixture wallet, with UTXOs of 93266 and 10000 sat at position 2.
pub fn mock_wallet() -> Wallet {
    let mut addresses = HashMap::new();
    for (pos, address) in MOCK_ADDRESSES {
        let mut record = Address::new(pos, address.to_string(), ScriptType::P2pkh);
        if pos == 2 {
            record.set_unspents(vec![
                mock_unspent(
                    "0f8c5cdf448acb82969193452ac4bb7010c0890ceb96fa5e8c332378654459df",
                    0,
                    93266,
                ),
                mock_unspent(
                    "2335b1b00d149907e0ce9eb349da87234d2c9bd0dfcc216cb251c3b21d63054a",
                    1,
                    10000,
                ),
            ]);
        }
        addresses.insert(address.to_string(), record);
    }

    Wallet {
        uid: MOCK_UID.to_string(),
        network: BitcoinNetwork::Testnet,
        cli_master_pub_key: MOCK_CLI_MASTER_PUB_KEY.to_string(),
        svr_master_prv_key: MOCK_SVR_MASTER_PRV_KEY.to_string(),
        last_pos: 7,
        addresses,
        backup: None,
        created_at: Utc.timestamp_opt(1563033740, 0).single().unwrap_or_else(Utc::now),
    }
}

/// Fee table served by the fixture chain.
pub fn mock_fees() -> HashMap<String, f64> {
    [("2", 1.0), ("4", 0.8), ("6", 0.6), ("10", 0.1)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
