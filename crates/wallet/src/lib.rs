//! Server-side wallet state for the two-party wallet.
//!
//! - `ledger`: per-uid wallets, coin selection, fee quotes, history
//! - `store`: SQLite persistence of wallets and addresses
//! - `syncer`: background refresh from the chain
//! - `signer`: ledger-backed Responder
//! - `orchestrator`: per-input signing and broadcast of a send

pub mod fixtures;
pub mod ledger;
pub mod model;
pub mod orchestrator;
pub mod signer;
pub mod store;
pub mod syncer;

pub use ledger::{AddressUpdate, Ledger, SharedWallet};
pub use model::{Address, Wallet};
pub use orchestrator::{HttpBackend, LocalBackend, Orchestrator, SharedBackend, WalletBackend};
pub use signer::LedgerSigningParty;
pub use store::WalletStore;
pub use syncer::{SyncReport, Syncer, SyncerHandle};
