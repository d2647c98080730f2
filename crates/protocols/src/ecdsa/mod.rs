//! Two-party ECDSA signing.
//!
//! - `paillier`: encryption layer for the blind-combine step
//! - `party`: Initiator session values and the stateless Responder
//! - `messages`: wire encodings of points and digests
//! - `driver`: runs one complete exchange against a `SigningParty`

pub mod driver;
pub mod messages;
pub mod paillier;
pub mod party;

pub use driver::{public_point, secret_share, sign_digest};
pub use messages::{decode_hash, decode_point, encode_hash, encode_point};
pub use paillier::{decode_integer, encode_integer, PaillierKeyPair, PaillierPublicKey};
pub use party::{verify_signature, Commitment, InitiatorSession, ReconciledSession, Responder};
