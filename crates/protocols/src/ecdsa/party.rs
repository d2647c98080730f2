//! The two roles of the signing exchange.
//!
//! ```text
//! Initiator (d1, Paillier keys)                 Responder (d2)
//!   commit:    k1, R1 = k1·G, EncPK1 = Enc(d1)
//!              ---- pos, hash, R1 ---------------->  respond: R2 = k2·G, shareR = k2·R1
//!              <--- R2, shareR -------------------
//!   reconcile: k1·R2 == shareR
//!              ---- pos, hash, R1, shareR, ------->  blind_combine:
//!                   EncPK1, N                         S2 = Enc(k2⁻¹·h + ρ·n) ⊕ (k2⁻¹·r·d2) ⊗ EncPK1
//!              <--- S2 ---------------------------
//!   finalize:  s = k1⁻¹·Dec(S2) mod n, low-S, verify against d1·Q2
//! ```
//!
//! Initiator state is a value moved from phase to phase and dropped at the
//! end. The Responder keeps no state: `k2` is recomputed from its share,
//! the digest and `R1`, so both Responder calls of one exchange agree on
//! it while any change of digest or `R1` yields a different nonce.

use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1};
use generic_ec::curves::Secp256k1 as Curve;
use generic_ec::{Point, Scalar, SecretScalar};
use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use rug::integer::Order;
use rug::Integer;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use common::WalletError;

use super::driver::secret_share;
use super::paillier::{PaillierKeyPair, PaillierPublicKey};

/// Domain separator for the Responder nonce derivation.
const NONCE_DOMAIN: &[u8] = b"two-party-ecdsa/responder-nonce/v1";

// ============================================================================
// Helpers
// ============================================================================

fn curve_order() -> Integer {
    Integer::from_digits::<u8>(&bitcoin::secp256k1::constants::CURVE_ORDER[..], Order::Msf)
}

fn scalar_to_integer(scalar: &Scalar<Curve>) -> Integer {
    let bytes = scalar.to_be_bytes();
    Integer::from_digits::<u8>(&bytes[..], Order::Msf)
}

fn integer_to_scalar(value: &Integer) -> Scalar<Curve> {
    let reduced = value.clone().rem_euc(&curve_order());
    Scalar::from_be_bytes_mod_order(reduced.to_digits::<u8>(Order::Msf))
}

fn hash_scalar(hash: &[u8; 32]) -> Scalar<Curve> {
    Scalar::from_be_bytes_mod_order(hash)
}

/// `x(point) mod n`.
fn x_coordinate(point: &Point<Curve>) -> Result<Scalar<Curve>, WalletError> {
    if point.is_zero() {
        return Err(WalletError::Protocol("Nonce point is the identity".to_string()));
    }
    let bytes = point.to_bytes(true);
    let r = Scalar::from_be_bytes_mod_order(&bytes[1..33]);
    if r.is_zero() {
        return Err(WalletError::Protocol("Signature r is zero".to_string()));
    }
    Ok(r)
}

fn points_equal(a: &Point<Curve>, b: &Point<Curve>) -> bool {
    let a = a.to_bytes(true);
    let b = b.to_bytes(true);
    bool::from(a[..].ct_eq(&b[..]))
}

/// Uniform integer below `bound`, drawn with 128 bits of slack.
fn random_below<R: RngCore + CryptoRng>(rng: &mut R, bound: &Integer) -> Integer {
    let len = (bound.significant_bits() as usize + 128).div_ceil(8);
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    Integer::from_digits::<u8>(&bytes, Order::Msf).rem_euc(bound)
}

// ============================================================================
// Initiator
// ============================================================================

/// What the Initiator sends after Commit.
#[derive(Debug, Clone)]
pub struct Commitment {
    pub r1: Point<Curve>,
    pub enc_pk1: Integer,
    pub enc_pub1: Integer,
}

/// Initiator state between Commit and Reconcile.
pub struct InitiatorSession {
    hash: [u8; 32],
    k1: SecretScalar<Curve>,
    r1: Point<Curve>,
    paillier: PaillierKeyPair,
    enc_pk1: Integer,
    combined_key: Point<Curve>,
}

impl InitiatorSession {
    /// Commit phase: fresh nonce, Paillier key pair and encrypted share.
    ///
    /// `d1` is the Initiator's child share, `q2` the Responder's child
    /// public point; `d1·Q2` is kept to verify the final signature.
    pub fn commit<R: RngCore + CryptoRng>(
        rng: &mut R,
        hash: [u8; 32],
        d1: &SecretScalar<Curve>,
        q2: &Point<Curve>,
    ) -> Result<(Self, Commitment), WalletError> {
        let combined_key = q2 * d1;
        if combined_key.is_zero() {
            return Err(WalletError::Key("Combined key is the identity".to_string()));
        }

        let k1 = SecretScalar::<Curve>::random(rng);
        let r1 = Point::generator() * &k1;

        let paillier = PaillierKeyPair::generate(rng)?;
        let public = paillier.public_key();
        let d1_int = scalar_to_integer(d1.as_ref());
        let enc_pk1 = public.encrypt(rng, &d1_int)?;

        let commitment = Commitment {
            r1,
            enc_pk1: enc_pk1.clone(),
            enc_pub1: public.modulus().clone(),
        };

        tracing::trace!("Initiator committed nonce for digest {}", hex::encode(hash));
        Ok((
            Self {
                hash,
                k1,
                r1,
                paillier,
                enc_pk1,
                combined_key,
            },
            commitment,
        ))
    }

    pub fn r1(&self) -> &Point<Curve> {
        &self.r1
    }

    /// Reconcile phase: check `k1·R2` against the reported `shareR`.
    pub fn reconcile(
        self,
        r2: &Point<Curve>,
        share_r: &Point<Curve>,
    ) -> Result<ReconciledSession, WalletError> {
        let expected = r2 * &self.k1;
        if !points_equal(&expected, share_r) {
            tracing::warn!("Combined nonce mismatch for digest {}", hex::encode(self.hash));
            return Err(WalletError::ShareMismatch(
                "k1·R2 does not match the reported shareR".to_string(),
            ));
        }

        let r = x_coordinate(share_r)?;
        Ok(ReconciledSession {
            hash: self.hash,
            k1: self.k1,
            r1: self.r1,
            share_r: *share_r,
            r,
            paillier: self.paillier,
            enc_pk1: self.enc_pk1,
            combined_key: self.combined_key,
        })
    }
}

/// Initiator state between Reconcile and Finalize.
pub struct ReconciledSession {
    hash: [u8; 32],
    k1: SecretScalar<Curve>,
    r1: Point<Curve>,
    share_r: Point<Curve>,
    r: Scalar<Curve>,
    paillier: PaillierKeyPair,
    enc_pk1: Integer,
    combined_key: Point<Curve>,
}

impl ReconciledSession {
    pub fn r1(&self) -> &Point<Curve> {
        &self.r1
    }

    pub fn share_r(&self) -> &Point<Curve> {
        &self.share_r
    }

    pub fn enc_pk1(&self) -> &Integer {
        &self.enc_pk1
    }

    pub fn enc_pub1(&self) -> Integer {
        self.paillier.public_key().modulus().clone()
    }

    /// Finalize phase: decrypt `S2`, produce a low-S signature and verify it.
    pub fn finalize(self, s2: &Integer) -> Result<Signature, WalletError> {
        let public = self.paillier.public_key();
        public.validate_ciphertext(s2)?;

        let blinded = integer_to_scalar(&self.paillier.decrypt(s2)?);
        let k1_inv = self
            .k1
            .as_ref()
            .invert()
            .ok_or_else(|| WalletError::Protocol("Nonce is not invertible".to_string()))?;
        let s = k1_inv * blinded;
        if s.is_zero() {
            return Err(WalletError::SignatureVerification(
                "Signature s is zero".to_string(),
            ));
        }

        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&self.r.to_be_bytes());
        compact[32..].copy_from_slice(&s.to_be_bytes());
        let mut signature = Signature::from_compact(&compact)
            .map_err(|e| WalletError::SignatureVerification(format!("Bad signature: {}", e)))?;
        signature.normalize_s();

        verify_signature(&self.hash, &signature, &self.combined_key)?;
        tracing::debug!("Signature verified for digest {}", hex::encode(self.hash));
        Ok(signature)
    }
}

/// Verify `signature` over `hash` against a curve point.
pub fn verify_signature(
    hash: &[u8; 32],
    signature: &Signature,
    public_key: &Point<Curve>,
) -> Result<(), WalletError> {
    let key = PublicKey::from_slice(&public_key.to_bytes(true))
        .map_err(|e| WalletError::Key(format!("Invalid combined key: {}", e)))?;
    Secp256k1::verification_only()
        .verify_ecdsa(&Message::from_digest(*hash), signature, &key)
        .map_err(|e| WalletError::SignatureVerification(e.to_string()))
}

// ============================================================================
// Responder
// ============================================================================

/// Responder half, bound to one child share.
pub struct Responder {
    d2: SecretScalar<Curve>,
}

impl Responder {
    pub fn new(d2: SecretScalar<Curve>) -> Self {
        Self { d2 }
    }

    /// Build from a secp256k1 secret key.
    pub fn from_secret_key(secret: &bitcoin::secp256k1::SecretKey) -> Result<Self, WalletError> {
        secret_share(secret).map(Self::new)
    }

    /// `k2 = HMAC-SHA256(d2, domain ‖ hash ‖ R1) mod n`.
    fn nonce(&self, hash: &[u8; 32], r1: &Point<Curve>) -> Result<SecretScalar<Curve>, WalletError> {
        let mut key = [0u8; 32];
        key.copy_from_slice(&self.d2.as_ref().to_be_bytes());
        let mac = Hmac::<Sha256>::new_from_slice(&key);
        key.zeroize();
        let mut mac =
            mac.map_err(|e| WalletError::Protocol(format!("Nonce derivation: {}", e)))?;
        mac.update(NONCE_DOMAIN);
        mac.update(hash);
        mac.update(&r1.to_bytes(true));
        let digest = mac.finalize().into_bytes();

        let mut k2 = Scalar::<Curve>::from_be_bytes_mod_order(digest);
        if k2.is_zero() {
            return Err(WalletError::Protocol("Derived nonce is zero".to_string()));
        }
        Ok(SecretScalar::new(&mut k2))
    }

    /// Respond phase: `(R2, shareR)`.
    ///
    /// `k2` depends only on `(d2, hash, R1)`. Two blind-combine answers for
    /// the same `(hash, R1)` under different `EncPK1` reuse `k2`, and a
    /// client that picks both `EncPK1` values can solve for `d2`. The
    /// initiator draws a fresh `R1` per attempt; the responder does not
    /// enforce this and trusts the authenticated client.
    pub fn respond(
        &self,
        hash: &[u8; 32],
        r1: &Point<Curve>,
    ) -> Result<(Point<Curve>, Point<Curve>), WalletError> {
        if r1.is_zero() {
            return Err(WalletError::Protocol("R1 is the identity".to_string()));
        }
        let k2 = self.nonce(hash, r1)?;
        let r2 = Point::generator() * &k2;
        let share_r = r1 * &k2;
        Ok((r2, share_r))
    }

    /// Blind-combine phase: the encrypted signature share `S2`.
    pub fn blind_combine<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        hash: &[u8; 32],
        r1: &Point<Curve>,
        share_r: &Point<Curve>,
        enc_pk1: &Integer,
        enc_pub1: Integer,
    ) -> Result<Integer, WalletError> {
        let (_, expected) = self.respond(hash, r1)?;
        if !points_equal(&expected, share_r) {
            return Err(WalletError::ShareMismatch(
                "shareR does not match this exchange".to_string(),
            ));
        }

        let paillier = PaillierPublicKey::from_modulus(enc_pub1)?;
        paillier.validate_ciphertext(enc_pk1)?;

        let k2 = self.nonce(hash, r1)?;
        let k2_inv = k2
            .as_ref()
            .invert()
            .ok_or_else(|| WalletError::Protocol("Nonce is not invertible".to_string()))?;
        let r = x_coordinate(share_r)?;

        let a = k2_inv * hash_scalar(hash);
        let b = k2_inv * r * self.d2.as_ref();

        let n = curve_order();
        let n_squared = Integer::from(&n * &n);
        let rho = random_below(rng, &n_squared);
        let masked = scalar_to_integer(&a) + rho * &n;

        let c1 = paillier.encrypt(rng, &masked)?;
        let c2 = paillier.mul(&scalar_to_integer(&b), enc_pk1)?;
        paillier.add(&c1, &c2)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    struct Setup {
        d1: SecretScalar<Curve>,
        responder: Responder,
        q2: Point<Curve>,
    }

    fn setup() -> Setup {
        let d1 = SecretScalar::<Curve>::random(&mut OsRng);
        let d2 = SecretScalar::<Curve>::random(&mut OsRng);
        let q2 = Point::generator() * &d2;
        Setup {
            d1,
            responder: Responder::new(d2),
            q2,
        }
    }

    #[test]
    fn test_honest_run_verifies() {
        let s = setup();
        let hash = [0x42u8; 32];

        let (session, commitment) =
            InitiatorSession::commit(&mut OsRng, hash, &s.d1, &s.q2).unwrap();
        let (r2, share_r) = s.responder.respond(&hash, &commitment.r1).unwrap();
        let session = session.reconcile(&r2, &share_r).unwrap();
        let s2 = s
            .responder
            .blind_combine(
                &mut OsRng,
                &hash,
                &commitment.r1,
                &share_r,
                &commitment.enc_pk1,
                commitment.enc_pub1.clone(),
            )
            .unwrap();
        let signature = session.finalize(&s2).unwrap();

        // Low-S form
        let mut normalized = signature;
        normalized.normalize_s();
        assert_eq!(normalized, signature);

        let combined = s.q2 * &s.d1;
        verify_signature(&hash, &signature, &combined).unwrap();
    }

    #[test]
    fn test_tampered_r2_is_share_mismatch() {
        let s = setup();
        let hash = [1u8; 32];
        let (session, commitment) =
            InitiatorSession::commit(&mut OsRng, hash, &s.d1, &s.q2).unwrap();
        let (r2, share_r) = s.responder.respond(&hash, &commitment.r1).unwrap();

        let tampered = r2 + Point::generator() * Scalar::<Curve>::one();
        let err = session.reconcile(&tampered, &share_r).err().unwrap();
        assert!(matches!(err, WalletError::ShareMismatch(_)));
    }

    #[test]
    fn test_responder_nonce_is_per_digest() {
        let s = setup();
        let r1 = Point::generator() * &SecretScalar::<Curve>::random(&mut OsRng);
        let (a, _) = s.responder.respond(&[1u8; 32], &r1).unwrap();
        let (b, _) = s.responder.respond(&[1u8; 32], &r1).unwrap();
        let (c, _) = s.responder.respond(&[2u8; 32], &r1).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_retried_commit_moves_responder_nonce() {
        let s = setup();
        let hash = [9u8; 32];
        let (_, first) = InitiatorSession::commit(&mut OsRng, hash, &s.d1, &s.q2).unwrap();
        let (_, second) = InitiatorSession::commit(&mut OsRng, hash, &s.d1, &s.q2).unwrap();
        assert_ne!(first.r1, second.r1);

        let (r2_first, _) = s.responder.respond(&hash, &first.r1).unwrap();
        let (r2_second, _) = s.responder.respond(&hash, &second.r1).unwrap();
        assert_ne!(r2_first, r2_second);
    }

    #[test]
    fn test_blind_combine_rejects_foreign_share_r() {
        let s = setup();
        let hash = [3u8; 32];
        let (_, commitment) = InitiatorSession::commit(&mut OsRng, hash, &s.d1, &s.q2).unwrap();
        let bogus = Point::generator() * &SecretScalar::<Curve>::random(&mut OsRng);
        let err = s
            .responder
            .blind_combine(
                &mut OsRng,
                &hash,
                &commitment.r1,
                &bogus,
                &commitment.enc_pk1,
                commitment.enc_pub1.clone(),
            )
            .err()
            .unwrap();
        assert!(matches!(err, WalletError::ShareMismatch(_)));
    }

    #[test]
    fn test_blind_combine_rejects_small_modulus() {
        let s = setup();
        let hash = [4u8; 32];
        let (_, commitment) = InitiatorSession::commit(&mut OsRng, hash, &s.d1, &s.q2).unwrap();
        let (_, share_r) = s.responder.respond(&hash, &commitment.r1).unwrap();
        let small = Integer::from(1_000_003);
        let err = s
            .responder
            .blind_combine(&mut OsRng, &hash, &commitment.r1, &share_r, &Integer::from(5), small)
            .err()
            .unwrap();
        assert!(matches!(err, WalletError::Protocol(_)));
    }

    #[test]
    fn test_wrong_responder_share_fails_verification() {
        let s = setup();
        let other = Responder::new(SecretScalar::<Curve>::random(&mut OsRng));
        let hash = [5u8; 32];

        let (session, commitment) =
            InitiatorSession::commit(&mut OsRng, hash, &s.d1, &s.q2).unwrap();
        let (r2, share_r) = other.respond(&hash, &commitment.r1).unwrap();
        let session = session.reconcile(&r2, &share_r).unwrap();
        let s2 = other
            .blind_combine(
                &mut OsRng,
                &hash,
                &commitment.r1,
                &share_r,
                &commitment.enc_pk1,
                commitment.enc_pub1.clone(),
            )
            .unwrap();
        let err = session.finalize(&s2).err().unwrap();
        assert!(matches!(err, WalletError::SignatureVerification(_)));
    }
}
