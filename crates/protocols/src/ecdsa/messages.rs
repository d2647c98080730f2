//! Wire encodings for the signing exchange.
//!
//! Points travel as hex of the 33-byte compressed form, digests as 64 hex
//! characters. Any decoding failure aborts the exchange.

use generic_ec::curves::Secp256k1;
use generic_ec::Point;

use common::WalletError;

pub fn encode_point(point: &Point<Secp256k1>) -> String {
    hex::encode(&*point.to_bytes(true))
}

/// Decode a compressed point; the identity is rejected.
pub fn decode_point(encoded: &str) -> Result<Point<Secp256k1>, WalletError> {
    let bytes = hex::decode(encoded.trim())
        .map_err(|e| WalletError::Protocol(format!("Invalid point hex: {}", e)))?;
    if bytes.len() != 33 {
        return Err(WalletError::Protocol(format!(
            "Expected 33-byte compressed point, got {} bytes",
            bytes.len()
        )));
    }
    let point = Point::<Secp256k1>::from_bytes(&bytes)
        .map_err(|_| WalletError::Protocol("Point is not on secp256k1".to_string()))?;
    if point.is_zero() {
        return Err(WalletError::Protocol("Point is the identity".to_string()));
    }
    Ok(point)
}

pub fn encode_hash(hash: &[u8; 32]) -> String {
    hex::encode(hash)
}

pub fn decode_hash(encoded: &str) -> Result<[u8; 32], WalletError> {
    let bytes = hex::decode(encoded.trim())
        .map_err(|e| WalletError::Protocol(format!("Invalid hash hex: {}", e)))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        WalletError::Protocol(format!("Expected 32-byte hash, got {} bytes", bytes.len()))
    })
}
