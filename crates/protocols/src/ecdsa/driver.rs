//! Initiator-side driver: one full exchange for one digest.

use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{PublicKey, SecretKey};
use generic_ec::curves::Secp256k1;
use generic_ec::{Point, Scalar, SecretScalar};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use common::{EcdsaR2Request, EcdsaS2Request, WalletError};

use super::messages::{decode_point, encode_hash, encode_point};
use super::paillier::{decode_integer, encode_integer};
use super::party::InitiatorSession;
use crate::transport::SigningParty;

/// Convert a secp256k1 secret key into a protocol share.
pub fn secret_share(secret: &SecretKey) -> Result<SecretScalar<Secp256k1>, WalletError> {
    let mut bytes = secret.secret_bytes();
    let scalar = Scalar::<Secp256k1>::from_be_bytes(bytes);
    bytes.zeroize();
    let mut scalar = scalar.map_err(|_| WalletError::Key("Invalid private scalar".to_string()))?;
    Ok(SecretScalar::new(&mut scalar))
}

/// Convert a secp256k1 public key into a curve point.
pub fn public_point(public: &PublicKey) -> Result<Point<Secp256k1>, WalletError> {
    Point::<Secp256k1>::from_bytes(public.serialize())
        .map_err(|_| WalletError::Key("Invalid public key".to_string()))
}

/// Run Commit → Respond → Reconcile → Blind-Combine → Finalize for `hash`
/// at `pos` against a remote Responder.
///
/// Any failure ends the attempt; a retry must call this again, which
/// starts from fresh randomness.
pub async fn sign_digest(
    party: &dyn SigningParty,
    pos: u32,
    hash: [u8; 32],
    d1: &SecretKey,
    q2: &PublicKey,
) -> Result<Signature, WalletError> {
    let share = secret_share(d1)?;
    let peer = public_point(q2)?;

    // Paillier keygen is CPU-bound; keep it off the executor.
    let (session, commitment) = tokio::task::spawn_blocking(move || {
        InitiatorSession::commit(&mut OsRng, hash, &share, &peer)
    })
    .await
    .map_err(|e| WalletError::Protocol(format!("Commit task failed: {}", e)))??;

    let r1 = encode_point(&commitment.r1);
    let nonce = party
        .nonce_exchange(EcdsaR2Request {
            pos,
            hash: encode_hash(&hash),
            r1: r1.clone(),
        })
        .await?;
    let r2 = decode_point(&nonce.r2)?;
    let share_r = decode_point(&nonce.share_r)?;

    let session = session.reconcile(&r2, &share_r)?;

    let combined = party
        .blind_combine(EcdsaS2Request {
            pos,
            hash: encode_hash(&hash),
            r1,
            share_r: encode_point(session.share_r()),
            enc_pk1: encode_integer(&commitment.enc_pk1),
            enc_pub1: encode_integer(&commitment.enc_pub1),
        })
        .await?;
    let s2 = decode_integer(&combined.s2)?;

    let signature = session.finalize(&s2)?;
    tracing::debug!("Signed input at pos {}", pos);
    Ok(signature)
}
