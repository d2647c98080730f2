//! Blockchain support for the two-party wallet.
//!
//! This crate provides blockchain-specific functionality:
//! - Key-share derivation and shared addresses
//! - Transaction building
//! - Blockchain API clients

pub mod bitcoin;
