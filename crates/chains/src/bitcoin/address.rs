//! Shared address construction.
//!
//! The spendable key of a position is the scalar product of the server's
//! child private share and the client's child public share:
//! `P = d_server · Q_client = d_server · d_client · G`. Neither side ever
//! holds `d_server · d_client`.
//!
//! Supports:
//! - P2PKH (Legacy) addresses
//! - P2WPKH (Native SegWit) addresses

use std::str::FromStr;

use bitcoin::bip32::{Xpriv, Xpub};
use bitcoin::secp256k1::{PublicKey, SecretKey};
use bitcoin::{Address, CompressedPublicKey, Network};
use generic_ec::curves::Secp256k1;
use generic_ec::{Point, Scalar};
use zeroize::Zeroize;

use common::{ScriptType, WalletError};

use super::hd::{derive_private_child, derive_public_child};

// ============================================================================
// Key Combination
// ============================================================================

/// Multiply a peer's public point by our private scalar.
pub fn combine_shares(
    secret: &SecretKey,
    peer_public: &PublicKey,
) -> Result<CompressedPublicKey, WalletError> {
    let point = Point::<Secp256k1>::from_bytes(peer_public.serialize())
        .map_err(|_| WalletError::Key("Invalid peer public key".into()))?;

    let mut secret_bytes = secret.secret_bytes();
    let scalar = Scalar::<Secp256k1>::from_be_bytes(secret_bytes)
        .map_err(|_| WalletError::Key("Invalid private scalar".into()));
    secret_bytes.zeroize();

    let product = point * scalar?;
    if product.is_zero() {
        return Err(WalletError::Key("Combined key is the identity".into()));
    }

    let bytes = product.to_bytes(true);
    CompressedPublicKey::from_slice(&bytes)
        .map_err(|e| WalletError::Key(format!("Invalid combined key: {}", e)))
}

/// Combined public key at `pos` from the server's private master share and
/// the client's public master share.
pub fn shared_public_key(
    pos: u32,
    svr_master: &Xpriv,
    cli_master: &Xpub,
) -> Result<CompressedPublicKey, WalletError> {
    let svr_child = derive_private_child(svr_master, pos)
        .map_err(|e| WalletError::Key(format!("Server share at pos {}: {}", pos, e)))?;
    let cli_child = derive_public_child(cli_master, pos)
        .map_err(|e| WalletError::Key(format!("Client share at pos {}: {}", pos, e)))?;

    combine_shares(&svr_child.private_key, &cli_child.public_key)
}

// ============================================================================
// Address Encoding
// ============================================================================

/// Encode a public key as an address of the given script type.
pub fn address_for_key(
    key: &CompressedPublicKey,
    network: Network,
    script_type: ScriptType,
) -> Address {
    match script_type {
        ScriptType::P2pkh => Address::p2pkh(key.pubkey_hash(), network),
        ScriptType::P2wpkh => Address::p2wpkh(key, network),
    }
}

/// Build the shared address at `pos`.
///
/// Deterministic in `(pos, shares, network, script_type)`.
pub fn build_shared_address(
    pos: u32,
    svr_master: &Xpriv,
    cli_master: &Xpub,
    network: Network,
    script_type: ScriptType,
) -> Result<String, WalletError> {
    let key = shared_public_key(pos, svr_master, cli_master)?;
    let address = address_for_key(&key, network, script_type);

    tracing::debug!("Built {} shared address at pos {}: {}", script_type, pos, address);
    Ok(address.to_string())
}

/// Parse an address and require that it belongs to `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address, WalletError> {
    Address::from_str(address.trim())
        .map_err(|e| WalletError::InvalidAddress(format!("{}: {}", address, e)))?
        .require_network(network)
        .map_err(|e| WalletError::InvalidAddress(format!("{}: {}", address, e)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitcoin::hd::{parse_private_share, parse_public_share};
    use bitcoin::secp256k1::Secp256k1;

    const SVR_TPRV: &str = "tprv8ZgxMBicQKsPfNhXDHV93ummM6rEzTmxHf96Mk3FnpgoaoNYPjfSCZyHFnFQnQDLAiMNsvJqEtvjCkvo5P3CPRHQx5GcZxPqRHy31q2oWXD";
    const CLI_TPRV: &str = "tprv8ZgxMBicQKsPeVfrhGFHCRu4cQBY1VFSogap4qSzmNTuow93Y1aeXTco2Vdw41VLUvPC4e3X1ZF9uoJEeRbUpLR4DqtzvLd3AQnQobNaGA4";
    const CLI_TPUB: &str = "tpubD6NzVbkrYhZ4XxheauusbqZBBRhUApSMNzBbMMVJBeGJeRPpAQQEhxEfCeLfmUyet3FXXybAoWhJ3uZe4fQvqgVCd8UPKX8sP4qAXKEHZGk";

    fn keys() -> (Xpriv, Xpub) {
        (
            parse_private_share(SVR_TPRV, Network::Testnet).unwrap(),
            parse_public_share(CLI_TPUB, Network::Testnet).unwrap(),
        )
    }

    #[test]
    fn test_shared_address_deterministic() {
        let (svr, cli) = keys();
        for script_type in [ScriptType::P2pkh, ScriptType::P2wpkh] {
            let a = build_shared_address(3, &svr, &cli, Network::Testnet, script_type).unwrap();
            let b = build_shared_address(3, &svr, &cli, Network::Testnet, script_type).unwrap();
            assert_eq!(a, b);
        }
        let p0 = build_shared_address(0, &svr, &cli, Network::Testnet, ScriptType::P2pkh).unwrap();
        let p1 = build_shared_address(1, &svr, &cli, Network::Testnet, ScriptType::P2pkh).unwrap();
        assert_ne!(p0, p1);
    }

    #[test]
    fn test_known_testnet_addresses() {
        let expected = [
            "msV128vgApMNEFbTUy5wto12ucZNFdtKTA",
            "mv7hzrEL4WYXvMzLawe82Mn82Mm7had4FY",
            "mnBETqvxTqcFRSLnR3w2Tpe9Qu58EasQgU",
            "mmBRSnFG7o1BX5DaK8Da3xKxvjBh6fzNQq",
            "msYdTCo8sxSWNdgdNUsxMM1ghA44mNaksY",
            "muAK3ufJer1nSUerdf95r5As442DagfBXS",
            "miqi14i2nweWYkcAh49E8Zk6gVAta7ohqJ",
        ];
        let (svr, cli) = keys();
        for (pos, address) in expected.iter().enumerate() {
            let built =
                build_shared_address(pos as u32, &svr, &cli, Network::Testnet, ScriptType::P2pkh)
                    .unwrap();
            assert_eq!(built, *address, "pos {}", pos);
        }
    }

    #[test]
    fn test_network_specific_encodings() {
        let (svr, cli) = keys();
        let legacy_test =
            build_shared_address(2, &svr, &cli, Network::Testnet, ScriptType::P2pkh).unwrap();
        let legacy_main =
            build_shared_address(2, &svr, &cli, Network::Bitcoin, ScriptType::P2pkh).unwrap();
        let segwit_test =
            build_shared_address(2, &svr, &cli, Network::Testnet, ScriptType::P2wpkh).unwrap();
        let segwit_main =
            build_shared_address(2, &svr, &cli, Network::Bitcoin, ScriptType::P2wpkh).unwrap();

        assert!(legacy_test.starts_with('m') || legacy_test.starts_with('n'));
        assert!(legacy_main.starts_with('1'));
        assert!(segwit_test.starts_with("tb1q"));
        assert!(segwit_main.starts_with("bc1q"));
        assert_ne!(legacy_test, legacy_main);
        assert_ne!(segwit_test, segwit_main);
    }

    #[test]
    fn test_combination_is_symmetric() {
        // d_server · Q_client == d_client · Q_server
        let secp = Secp256k1::new();
        let (svr, cli) = keys();
        let cli_prv = parse_private_share(CLI_TPRV, Network::Testnet).unwrap();

        let svr_child = derive_private_child(&svr, 4).unwrap();
        let cli_child = derive_private_child(&cli_prv, 4).unwrap();

        let from_server =
            combine_shares(&svr_child.private_key, &cli_child.private_key.public_key(&secp))
                .unwrap();
        let from_client =
            combine_shares(&cli_child.private_key, &svr_child.private_key.public_key(&secp))
                .unwrap();
        assert_eq!(from_server, from_client);
        assert_eq!(shared_public_key(4, &svr, &cli).unwrap(), from_server);
    }

    #[test]
    fn test_out_of_range_position_is_key_error() {
        let (svr, cli) = keys();
        let err = build_shared_address(0x8000_0000, &svr, &cli, Network::Testnet, ScriptType::P2pkh)
            .unwrap_err();
        assert!(matches!(err, WalletError::Key(_)));
    }

    #[test]
    fn test_parse_address_network() {
        assert!(parse_address("mnBETqvxTqcFRSLnR3w2Tpe9Qu58EasQgU", Network::Testnet).is_ok());
        assert!(matches!(
            parse_address("mnBETqvxTqcFRSLnR3w2Tpe9Qu58EasQgU", Network::Bitcoin),
            Err(WalletError::InvalidAddress(_))
        ));
        assert!(parse_address("garbage", Network::Testnet).is_err());
    }
}
