//! Registration and ledger query commands.

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use common::{
    AddressEntry, Balance, FeeQuote, NewAddressRequest, NewAddressResponse, PageRequest,
    Portfolio, PortfolioRequest, RegisterResponse, ScriptType, SendFeesRequest, Tx,
};

use super::session;

/// Satoshis as a decimal coin amount.
pub(crate) fn format_sat(value: u64) -> String {
    format!("{}.{:08}", value / 100_000_000, value % 100_000_000)
}

/// Register the key file's public share with the server.
pub async fn register(server_url: &str, key_file: &Path) -> Result<()> {
    let (keys, api) = session(server_url, key_file)?;
    let response: RegisterResponse = api.post("/api/wallet/register", &json!({})).await?;

    if response.network != keys.network {
        anyhow::bail!(
            "server runs on {}, key file is for {}",
            response.network,
            keys.network
        );
    }

    if response.created {
        println!("Wallet {} registered on {}", response.uid, response.network);
    } else {
        println!("Wallet {} already registered on {}", response.uid, response.network);
    }
    Ok(())
}

pub async fn new_address(server_url: &str, key_file: &Path, script_type: ScriptType) -> Result<()> {
    let (_, api) = session(server_url, key_file)?;
    let response: NewAddressResponse = api
        .post("/api/wallet/newaddress", &NewAddressRequest { script_type })
        .await?;

    println!("New {} address at position {}:", script_type, response.pos);
    println!("  {}", response.address);
    Ok(())
}

pub async fn balance(server_url: &str, key_file: &Path) -> Result<()> {
    let (keys, api) = session(server_url, key_file)?;
    let balance: Balance = api.post("/api/wallet/balance", &json!({})).await?;
    let symbol = keys.network.coin_symbol();

    println!("Wallet Balance");
    println!("==============");
    println!("  Total:       {} {}", format_sat(balance.all_balance), symbol);
    println!(
        "  Unconfirmed: {} {}",
        format_sat(balance.unconfirmed_balance),
        symbol
    );
    Ok(())
}

pub async fn addresses(server_url: &str, key_file: &Path, page: PageRequest) -> Result<()> {
    let (_, api) = session(server_url, key_file)?;
    let entries: Vec<AddressEntry> = api.post("/api/wallet/addresses", &page).await?;

    if entries.is_empty() {
        println!("No addresses. Create one with `wallet-cli newaddress`.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "  [{:>4}] {:<62} {}",
            entry.pos,
            entry.address,
            format_sat(entry.balance.all_balance)
        );
    }
    Ok(())
}

pub async fn txs(server_url: &str, key_file: &Path, page: PageRequest) -> Result<()> {
    let (_, api) = session(server_url, key_file)?;
    let txs: Vec<Tx> = api.post("/api/wallet/txs", &page).await?;

    if txs.is_empty() {
        println!("No transactions.");
        return Ok(());
    }
    for tx in txs {
        let sign = if tx.value < 0 { "-" } else { "+" };
        let status = if tx.confirmed {
            format!("block {}", tx.block_height)
        } else {
            "unconfirmed".to_string()
        };
        println!();
        println!("  {}", tx.txid);
        println!(
            "    {}{}  fee {}  {}",
            sign,
            format_sat(tx.value.unsigned_abs()),
            tx.fee,
            status
        );
        if !tx.data.is_empty() {
            println!("    data: {}", tx.data);
        }
        println!("    {}", tx.link);
    }
    Ok(())
}

pub async fn fees(server_url: &str, key_file: &Path, priority: &str, amount: u64) -> Result<()> {
    let (_, api) = session(server_url, key_file)?;
    let quote = fee_quote(&api, priority, amount).await?;

    println!("Fee Estimate ({})", priority);
    println!("  Fee:      {} sat", quote.fee);
    println!("  Balance:  {} sat", quote.total_value);
    println!("  Sendable: {} sat", quote.sendable_value);
    Ok(())
}

pub(crate) async fn fee_quote(
    api: &protocols::ApiClient,
    priority: &str,
    send_value: u64,
) -> Result<FeeQuote> {
    Ok(api
        .post(
            "/api/wallet/sendfees",
            &SendFeesRequest {
                priority: priority.to_string(),
                send_value,
            },
        )
        .await?)
}

pub async fn portfolio(server_url: &str, key_file: &Path, code: &str) -> Result<()> {
    let (_, api) = session(server_url, key_file)?;
    let portfolio: Portfolio = api
        .post(
            "/api/wallet/portfolio",
            &PortfolioRequest {
                code: code.to_string(),
            },
        )
        .await?;

    println!(
        "1 {} = {}{:.2} {}",
        portfolio.coin_symbol,
        portfolio.fiat_symbol,
        portfolio.current_price,
        code.to_uppercase()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sat() {
        assert_eq!(format_sat(0), "0.00000000");
        assert_eq!(format_sat(103266), "0.00103266");
        assert_eq!(format_sat(2_100_000_000_000_000), "21000000.00000000");
    }
}
