//! Bitcoin support for the two-party wallet.
//!
//! Includes:
//! - BIP32 key-share derivation
//! - Shared P2PKH / P2WPKH address construction
//! - Transaction building, sighashes and signature embedding
//! - The `Chain` capability with Esplora and fixture implementations

pub mod address;
pub mod chain;
pub mod client;
pub mod hd;
pub mod mock;
pub mod transaction;

pub use address::*;
pub use chain::*;
pub use client::*;
pub use hd::*;
pub use mock::*;
pub use transaction::*;
