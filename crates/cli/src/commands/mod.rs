//! CLI command implementations.
//!
//! - `account`: registration and ledger queries
//! - `keys`: client master share generation and the key file
//! - `send`: two-party signed payments

pub mod account;
pub mod keys;
pub mod send;

pub use account::*;
pub use keys::*;
pub use send::*;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use protocols::ApiClient;

/// Timeout for every request to the wallet server.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Credentialed client for the wallet named by `key_file`.
pub(crate) fn session(server_url: &str, key_file: &Path) -> Result<(KeyFile, ApiClient)> {
    let keys = KeyFile::load(key_file)?;
    let api = ApiClient::new(server_url, &keys.uid, &keys.master_pub_key, REQUEST_TIMEOUT)?;
    Ok((keys, api))
}
