//! Paillier encryption for the blind-combine step.
//!
//! Thin layer over `fast-paillier`: key generation from two random primes,
//! modulus and ciphertext validation for keys received from a peer, and
//! the hex encoding used on the wire.

use fast_paillier::{DecryptionKey, EncryptionKey};
use rand::{CryptoRng, RngCore};
use rug::integer::Order;
use rug::Integer;

use common::WalletError;

/// Bit length of each Paillier prime.
pub const PAILLIER_PRIME_BITS: u32 = 1024;

/// Smallest modulus accepted from a peer.
pub const MIN_MODULUS_BITS: u32 = 2047;

// ============================================================================
// Key Pair
// ============================================================================

/// Paillier key pair owned by one signing session.
pub struct PaillierKeyPair {
    dk: DecryptionKey,
}

impl PaillierKeyPair {
    /// Generate a fresh key pair from two random primes.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, WalletError> {
        let p = random_prime(rng, PAILLIER_PRIME_BITS);
        let mut q = random_prime(rng, PAILLIER_PRIME_BITS);
        while q == p {
            q = random_prime(rng, PAILLIER_PRIME_BITS);
        }

        let dk = DecryptionKey::from_primes(p, q)
            .map_err(|e| WalletError::Protocol(format!("Paillier key generation: {:?}", e)))?;
        tracing::trace!(
            "Generated {}-bit Paillier key",
            dk.encryption_key().n().significant_bits()
        );
        Ok(Self { dk })
    }

    pub fn public_key(&self) -> PaillierPublicKey {
        PaillierPublicKey {
            ek: self.dk.encryption_key().clone(),
        }
    }

    /// Decrypt a ciphertext into a non-negative plaintext below `N`.
    pub fn decrypt(&self, ciphertext: &Integer) -> Result<Integer, WalletError> {
        let plaintext = self
            .dk
            .decrypt(ciphertext)
            .map_err(|e| WalletError::Protocol(format!("Paillier decryption: {:?}", e)))?;
        Ok(plaintext.rem_euc(self.dk.encryption_key().n()))
    }
}

fn random_prime<R: RngCore + CryptoRng>(rng: &mut R, bits: u32) -> Integer {
    let mut bytes = vec![0u8; (bits / 8) as usize];
    rng.fill_bytes(&mut bytes);
    let mut candidate = Integer::from_digits::<u8>(&bytes, Order::Msf);
    // Top two bits keep the product at full length.
    candidate.set_bit(bits - 1, true);
    candidate.set_bit(bits - 2, true);
    candidate.set_bit(0, true);
    candidate.next_prime()
}

// ============================================================================
// Public Key
// ============================================================================

/// Paillier public key, possibly received from a peer.
#[derive(Clone)]
pub struct PaillierPublicKey {
    ek: EncryptionKey,
}

impl PaillierPublicKey {
    /// Accept a peer modulus, rejecting short or even values.
    pub fn from_modulus(n: Integer) -> Result<Self, WalletError> {
        if n.significant_bits() < MIN_MODULUS_BITS {
            return Err(WalletError::Protocol(format!(
                "Paillier modulus too short: {} bits",
                n.significant_bits()
            )));
        }
        if n.is_even() {
            return Err(WalletError::Protocol("Paillier modulus is even".to_string()));
        }
        Ok(Self {
            ek: EncryptionKey::from_n(n),
        })
    }

    pub fn modulus(&self) -> &Integer {
        self.ek.n()
    }

    /// Check that `c` lies in `Z*_{N²}`.
    pub fn validate_ciphertext(&self, c: &Integer) -> Result<(), WalletError> {
        if *c <= 0 || c >= self.ek.nn() {
            return Err(WalletError::Protocol(
                "Ciphertext outside Z_N^2".to_string(),
            ));
        }
        if c.clone().gcd(self.ek.n()) != 1 {
            return Err(WalletError::Protocol(
                "Ciphertext not invertible mod N^2".to_string(),
            ));
        }
        Ok(())
    }

    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        plaintext: &Integer,
    ) -> Result<Integer, WalletError> {
        let (ciphertext, _nonce) = self
            .ek
            .encrypt_with_random(rng, plaintext)
            .map_err(|e| WalletError::Protocol(format!("Paillier encryption: {:?}", e)))?;
        Ok(ciphertext)
    }

    /// Homomorphic addition of two plaintexts.
    pub fn add(&self, a: &Integer, b: &Integer) -> Result<Integer, WalletError> {
        self.ek
            .oadd(a, b)
            .map_err(|e| WalletError::Protocol(format!("Paillier addition: {:?}", e)))
    }

    /// Homomorphic multiplication of a plaintext by `scalar`.
    pub fn mul(&self, scalar: &Integer, c: &Integer) -> Result<Integer, WalletError> {
        self.ek
            .omul(scalar, c)
            .map_err(|e| WalletError::Protocol(format!("Paillier multiplication: {:?}", e)))
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Big-endian hex of a non-negative integer.
pub fn encode_integer(value: &Integer) -> String {
    hex::encode(value.to_digits::<u8>(Order::Msf))
}

pub fn decode_integer(encoded: &str) -> Result<Integer, WalletError> {
    let bytes = hex::decode(encoded.trim())
        .map_err(|e| WalletError::Protocol(format!("Invalid integer hex: {}", e)))?;
    if bytes.is_empty() {
        return Err(WalletError::Protocol("Empty integer encoding".to_string()));
    }
    Ok(Integer::from_digits::<u8>(&bytes, Order::Msf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_homomorphic_operations() {
        let keys = PaillierKeyPair::generate(&mut OsRng).unwrap();
        let public = keys.public_key();
        assert!(public.modulus().significant_bits() >= MIN_MODULUS_BITS);

        let a = public.encrypt(&mut OsRng, &Integer::from(1234)).unwrap();
        let b = public.encrypt(&mut OsRng, &Integer::from(4321)).unwrap();
        public.validate_ciphertext(&a).unwrap();

        let sum = public.add(&a, &b).unwrap();
        assert_eq!(keys.decrypt(&sum).unwrap(), 5555);

        let scaled = public.mul(&Integer::from(3), &a).unwrap();
        assert_eq!(keys.decrypt(&scaled).unwrap(), 3702);
    }

    #[test]
    fn test_rejects_short_modulus() {
        let short = Integer::from(1) << 1024u32;
        let err = PaillierPublicKey::from_modulus(short + 1).err().unwrap();
        assert!(matches!(err, WalletError::Protocol(_)));
    }

    #[test]
    fn test_rejects_ciphertext_out_of_range() {
        let keys = PaillierKeyPair::generate(&mut OsRng).unwrap();
        let public = keys.public_key();
        assert!(public.validate_ciphertext(&Integer::from(0)).is_err());
        let nn = Integer::from(public.modulus() * public.modulus());
        assert!(public.validate_ciphertext(&nn).is_err());
        assert!(public.validate_ciphertext(public.modulus()).is_err());
    }

    #[test]
    fn test_integer_encoding() {
        let value = Integer::from(0x01_02_03u32);
        assert_eq!(encode_integer(&value), "010203");
        assert_eq!(decode_integer("010203").unwrap(), value);
        assert!(decode_integer("").is_err());
        assert!(decode_integer("xyz").is_err());
    }
}
