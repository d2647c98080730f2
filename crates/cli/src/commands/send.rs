//! Two-party signed payments.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use protocols::HttpSigningParty;
use wallet::{HttpBackend, Orchestrator};

use super::account::{fee_quote, format_sat};
use super::session;

/// Pay `amount` sat to `to`.
///
/// Without an explicit `fee` the server's quote at `priority` is used.
pub async fn send(
    server_url: &str,
    key_file: &Path,
    to: &str,
    amount: u64,
    fee: Option<u64>,
    priority: &str,
) -> Result<()> {
    let (keys, api) = session(server_url, key_file)?;

    let fee = match fee {
        Some(fee) => fee,
        None => {
            let quote = fee_quote(&api, priority, amount).await?;
            info!("Using {} priority fee of {} sat", priority, quote.fee);
            quote.fee
        }
    };

    let orchestrator = Orchestrator::new(
        keys.network,
        keys.master()?,
        Arc::new(HttpBackend::new(api.clone())),
        Arc::new(HttpSigningParty::new(api)),
    );

    println!(
        "Sending {} {} to {} (fee {} sat)...",
        format_sat(amount),
        keys.network.coin_symbol(),
        to,
        fee
    );
    let txid = orchestrator.send(to, amount, fee).await?;

    println!();
    println!("Transaction broadcast");
    println!("  TXID: {}", txid);
    println!("  {}/tx/{}", keys.network.explorer_url(), txid);
    Ok(())
}
