//! Two-party signing protocol for the wallet.
//!
//! The client (Initiator) and the server (Responder) each hold one
//! multiplicative share of every address key and jointly produce ECDSA
//! signatures without either side learning the other's share.

pub mod ecdsa;
pub mod transport;

pub use transport::{ApiClient, HttpSigningParty, SharedSigningParty, SigningParty, TransportError};
