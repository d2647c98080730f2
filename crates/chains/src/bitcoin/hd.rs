//! BIP32 key-share derivation for the two-party wallet.
//!
//! The server holds an extended private master share per account, the
//! client registers only the matching extended public master share of its
//! own key. Both sides derive non-hardened children at the address
//! position, so public-side derivation never needs the private scalar.

use std::str::FromStr;

use bitcoin::bip32::{ChildNumber, Xpriv, Xpub};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::{Network, NetworkKind};
use rand::RngCore;
use zeroize::Zeroize;

use common::WalletError;

// ============================================================================
// Key Shares
// ============================================================================

/// One party's extended key share, private or public.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyShare {
    Private(Xpriv),
    Public(Xpub),
}

impl KeyShare {
    /// Parse a base58 extended key (`xprv`/`tprv`/`xpub`/`tpub`).
    pub fn parse(encoded: &str) -> Result<Self, WalletError> {
        let encoded = encoded.trim();
        if let Ok(xprv) = Xpriv::from_str(encoded) {
            return Ok(KeyShare::Private(xprv));
        }
        Xpub::from_str(encoded)
            .map(KeyShare::Public)
            .map_err(|e| WalletError::Derivation(format!("Malformed extended key: {}", e)))
    }

    /// Derive the child share at `pos`.
    ///
    /// Private shares yield private children and public shares yield public
    /// children. Positions at or above 2^31 are rejected.
    pub fn derive(&self, pos: u32) -> Result<Self, WalletError> {
        match self {
            KeyShare::Private(xprv) => derive_private_child(xprv, pos).map(KeyShare::Private),
            KeyShare::Public(xpub) => derive_public_child(xpub, pos).map(KeyShare::Public),
        }
    }

    /// The share's public point.
    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyShare::Private(xprv) => xprv.private_key.public_key(&Secp256k1::signing_only()),
            KeyShare::Public(xpub) => xpub.public_key,
        }
    }

    /// The share's private scalar, if this is a private share.
    pub fn secret_key(&self) -> Option<SecretKey> {
        match self {
            KeyShare::Private(xprv) => Some(xprv.private_key),
            KeyShare::Public(_) => None,
        }
    }

    /// Public counterpart of this share.
    pub fn to_public(&self) -> Xpub {
        match self {
            KeyShare::Private(xprv) => Xpub::from_priv(&Secp256k1::signing_only(), xprv),
            KeyShare::Public(xpub) => *xpub,
        }
    }

    pub fn network_kind(&self) -> NetworkKind {
        match self {
            KeyShare::Private(xprv) => xprv.network,
            KeyShare::Public(xpub) => xpub.network,
        }
    }
}

impl std::fmt::Display for KeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyShare::Private(xprv) => write!(f, "{}", xprv),
            KeyShare::Public(xpub) => write!(f, "{}", xpub),
        }
    }
}

// ============================================================================
// Derivation
// ============================================================================

fn child_number(pos: u32) -> Result<ChildNumber, WalletError> {
    ChildNumber::from_normal_idx(pos)
        .map_err(|e| WalletError::Derivation(format!("Position {} out of range: {}", pos, e)))
}

/// Derive the private child share at `pos`.
pub fn derive_private_child(master: &Xpriv, pos: u32) -> Result<Xpriv, WalletError> {
    let child = child_number(pos)?;
    tracing::trace!("Deriving private child at pos {}", pos);
    master
        .derive_priv(&Secp256k1::signing_only(), &[child])
        .map_err(|e| WalletError::Derivation(format!("Private derivation failed: {}", e)))
}

/// Derive the public child share at `pos`.
pub fn derive_public_child(master: &Xpub, pos: u32) -> Result<Xpub, WalletError> {
    let child = child_number(pos)?;
    tracing::trace!("Deriving public child at pos {}", pos);
    master
        .derive_pub(&Secp256k1::verification_only(), &[child])
        .map_err(|e| WalletError::Derivation(format!("Public derivation failed: {}", e)))
}

/// Extended public key of the private child at `pos`, base58 encoded.
pub fn child_public_share(master: &Xpriv, pos: u32) -> Result<String, WalletError> {
    let child = derive_private_child(master, pos)?;
    Ok(Xpub::from_priv(&Secp256k1::signing_only(), &child).to_string())
}

// ============================================================================
// Master Shares
// ============================================================================

/// Generate a fresh random master share for `network`.
pub fn generate_master_share(network: Network) -> Result<Xpriv, WalletError> {
    let mut seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    let master = Xpriv::new_master(network, &seed)
        .map_err(|e| WalletError::Derivation(format!("Master key generation failed: {}", e)));
    seed.zeroize();
    tracing::debug!("Generated new master share for {:?}", network);
    master
}

/// Parse an extended private master share and check its network.
pub fn parse_private_share(encoded: &str, network: Network) -> Result<Xpriv, WalletError> {
    match KeyShare::parse(encoded)? {
        KeyShare::Private(xprv) if xprv.network == NetworkKind::from(network) => Ok(xprv),
        KeyShare::Private(_) => Err(WalletError::Derivation(format!(
            "Private share is not for {:?}",
            network
        ))),
        KeyShare::Public(_) => Err(WalletError::Derivation(
            "Expected an extended private key".to_string(),
        )),
    }
}

/// Parse an extended public master share and check its network.
pub fn parse_public_share(encoded: &str, network: Network) -> Result<Xpub, WalletError> {
    match KeyShare::parse(encoded)? {
        KeyShare::Public(xpub) if xpub.network == NetworkKind::from(network) => Ok(xpub),
        KeyShare::Public(_) => Err(WalletError::Derivation(format!(
            "Public share is not for {:?}",
            network
        ))),
        KeyShare::Private(_) => Err(WalletError::Derivation(
            "Expected an extended public key".to_string(),
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SVR_TPRV: &str = "tprv8ZgxMBicQKsPfNhXDHV93ummM6rEzTmxHf96Mk3FnpgoaoNYPjfSCZyHFnFQnQDLAiMNsvJqEtvjCkvo5P3CPRHQx5GcZxPqRHy31q2oWXD";
    const CLI_TPRV: &str = "tprv8ZgxMBicQKsPeVfrhGFHCRu4cQBY1VFSogap4qSzmNTuow93Y1aeXTco2Vdw41VLUvPC4e3X1ZF9uoJEeRbUpLR4DqtzvLd3AQnQobNaGA4";
    const CLI_TPUB: &str = "tpubD6NzVbkrYhZ4XxheauusbqZBBRhUApSMNzBbMMVJBeGJeRPpAQQEhxEfCeLfmUyet3FXXybAoWhJ3uZe4fQvqgVCd8UPKX8sP4qAXKEHZGk";

    #[test]
    fn test_derivation_is_deterministic() {
        let share = KeyShare::parse(SVR_TPRV).unwrap();
        let a = share.derive(5).unwrap();
        let b = share.derive(5).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, share.derive(6).unwrap());
    }

    #[test]
    fn test_public_derivation_matches_private() {
        let private = KeyShare::parse(CLI_TPRV).unwrap();
        let public = KeyShare::parse(CLI_TPUB).unwrap();
        assert_eq!(private.to_public().to_string(), CLI_TPUB);

        for pos in [0u32, 1, 7, 1000] {
            let from_private = private.derive(pos).unwrap();
            let from_public = public.derive(pos).unwrap();
            assert!(matches!(from_public, KeyShare::Public(_)));
            assert_eq!(from_private.public_key(), from_public.public_key());
        }
    }

    #[test]
    fn test_out_of_range_position() {
        let share = KeyShare::parse(CLI_TPUB).unwrap();
        let err = share.derive(0x8000_0000).unwrap_err();
        assert!(matches!(err, WalletError::Derivation(_)));
    }

    #[test]
    fn test_malformed_key() {
        assert!(matches!(
            KeyShare::parse("tpub-not-a-key"),
            Err(WalletError::Derivation(_))
        ));
    }

    #[test]
    fn test_network_checks() {
        assert!(parse_private_share(SVR_TPRV, Network::Testnet).is_ok());
        assert!(parse_private_share(SVR_TPRV, Network::Bitcoin).is_err());
        assert!(parse_public_share(CLI_TPUB, Network::Testnet).is_ok());
        assert!(parse_public_share(SVR_TPRV, Network::Testnet).is_err());
    }

    #[test]
    fn test_generate_master_share() {
        let a = generate_master_share(Network::Testnet).unwrap();
        let b = generate_master_share(Network::Testnet).unwrap();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("tprv"));
        let main = generate_master_share(Network::Bitcoin).unwrap();
        assert!(main.to_string().starts_with("xprv"));
    }

    #[test]
    fn test_child_public_share() {
        let master = parse_private_share(SVR_TPRV, Network::Testnet).unwrap();
        let encoded = child_public_share(&master, 2).unwrap();
        assert!(encoded.starts_with("tpub"));

        let parsed = KeyShare::parse(&encoded).unwrap();
        let expected = KeyShare::Private(master).derive(2).unwrap();
        assert_eq!(parsed.public_key(), expected.public_key());
    }
}
