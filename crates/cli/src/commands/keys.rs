//! Client key file.
//!
//! The key file holds the client master share as an extended private key
//! together with the uid it is registered under. It never leaves the
//! client; only `master_pub_key` is sent to the server.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use bitcoin::bip32::{Xpriv, Xpub};
use bitcoin::secp256k1::Secp256k1;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use chains::bitcoin::{generate_master_share, parse_private_share};
use common::BitcoinNetwork;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFile {
    pub uid: String,
    pub network: BitcoinNetwork,
    pub master_prv_key: String,
    pub master_pub_key: String,
}

impl Drop for KeyFile {
    fn drop(&mut self) {
        self.master_prv_key.zeroize();
    }
}

impl KeyFile {
    /// A fresh client master share for `uid`.
    pub fn generate(uid: &str, network: BitcoinNetwork) -> Result<Self> {
        let master = generate_master_share(network.to_bitcoin_network())?;
        let public = Xpub::from_priv(&Secp256k1::new(), &master);
        Ok(Self {
            uid: uid.to_string(),
            network,
            master_prv_key: master.to_string(),
            master_pub_key: public.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read key file {}", path.display()))?;
        let keys: KeyFile = serde_json::from_str(&contents)
            .with_context(|| format!("invalid key file {}", path.display()))?;

        let public = Xpub::from_priv(&Secp256k1::new(), &keys.master()?);
        if public.to_string() != keys.master_pub_key {
            bail!("key file {} is inconsistent: public share does not match", path.display());
        }
        Ok(keys)
    }

    /// Write the key file, refusing to replace an existing one.
    pub fn save(&self, path: &Path) -> Result<()> {
        if path.exists() {
            bail!("key file {} already exists", path.display());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write key file {}", path.display()))?;
        Ok(())
    }

    /// The client master share on the key file's network.
    pub fn master(&self) -> Result<Xpriv> {
        Ok(parse_private_share(
            &self.master_prv_key,
            self.network.to_bitcoin_network(),
        )?)
    }
}

/// Generate a client master share and write it to `path`.
pub fn keygen(path: &Path, uid: &str, network: BitcoinNetwork) -> Result<()> {
    let keys = KeyFile::generate(uid, network)?;
    keys.save(path)?;

    println!("Client Key Generated");
    println!("====================");
    println!("  UID:        {}", keys.uid);
    println!("  Network:    {}", keys.network);
    println!("  Public key: {}", keys.master_pub_key);
    println!("  Key file:   {}", path.display());
    println!();
    println!("Register it with:");
    println!("  wallet-cli --key-file {} register", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keygen_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("alice.json");

        keygen(&path, "alice", BitcoinNetwork::Testnet).unwrap();
        let first = KeyFile::load(&path).unwrap();
        assert_eq!(first.uid, "alice");
        assert!(first.master_pub_key.starts_with("tpub"));

        assert!(keygen(&path, "alice", BitcoinNetwork::Testnet).is_err());
        assert_eq!(KeyFile::load(&path).unwrap().master_pub_key, first.master_pub_key);
    }

    #[test]
    fn test_load_rejects_tampered_public_share() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        let mut keys = KeyFile::generate("bob", BitcoinNetwork::Testnet).unwrap();
        keys.master_pub_key = KeyFile::generate("bob", BitcoinNetwork::Testnet)
            .unwrap()
            .master_pub_key
            .clone();
        keys.save(&path).unwrap();

        assert!(KeyFile::load(&path).is_err());
    }
}
