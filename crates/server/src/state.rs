//! Application state for the wallet server.

use std::sync::Arc;
use std::time::Instant;

use wallet::Ledger;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            started_at: Instant::now(),
        }
    }
}
