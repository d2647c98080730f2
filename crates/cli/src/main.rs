//! Wallet CLI
//!
//! Client side of the two-party wallet: holds the client master share,
//! queries the server's ledger and co-signs payments with it.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

use common::{BitcoinNetwork, PageRequest, ScriptType};

/// Two-party Bitcoin wallet client.
#[derive(Parser, Debug)]
#[command(name = "wallet-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Wallet server URL.
    #[arg(long, env = "WALLET_SERVER", default_value = "http://localhost:9099", global = true)]
    server: String,

    /// Key file holding the client master share.
    #[arg(short, long, env = "WALLET_KEY_FILE", default_value = "wallet-key.json", global = true)]
    key_file: PathBuf,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NetworkArg {
    Mainnet,
    Testnet,
}

impl From<NetworkArg> for BitcoinNetwork {
    fn from(arg: NetworkArg) -> Self {
        match arg {
            NetworkArg::Mainnet => BitcoinNetwork::Mainnet,
            NetworkArg::Testnet => BitcoinNetwork::Testnet,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScriptTypeArg {
    P2pkh,
    P2wpkh,
}

impl From<ScriptTypeArg> for ScriptType {
    fn from(arg: ScriptTypeArg) -> Self {
        match arg {
            ScriptTypeArg::P2pkh => ScriptType::P2pkh,
            ScriptTypeArg::P2wpkh => ScriptType::P2wpkh,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a client master share and write the key file.
    Keygen {
        /// Account uid to register under.
        #[arg(short, long, env = "WALLET_UID")]
        uid: String,

        #[arg(short, long, value_enum, default_value = "testnet")]
        network: NetworkArg,
    },

    /// Register the key file with the server (or check an existing registration).
    Register,

    /// Allocate the next receive address.
    Newaddress {
        #[arg(short = 't', long, value_enum, default_value = "p2pkh")]
        script_type: ScriptTypeArg,
    },

    /// Show the wallet balance.
    Balance,

    /// List addresses, newest first.
    Addresses {
        #[arg(long, default_value = "0")]
        offset: usize,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show transaction history, newest first.
    Txs {
        #[arg(long, default_value = "0")]
        offset: usize,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Estimate the fee for sending an amount.
    Fees {
        /// Amount in satoshis.
        #[arg(short, long)]
        amount: u64,

        /// fast, normal or slow.
        #[arg(short, long, default_value = "normal")]
        priority: String,
    },

    /// Show the coin price in a fiat currency.
    Portfolio {
        /// Currency code, e.g. USD.
        #[arg(short, long, default_value = "USD")]
        code: String,
    },

    /// Send bitcoin to an address.
    Send {
        /// Destination address.
        #[arg(short, long)]
        to: String,

        /// Amount in satoshis.
        #[arg(short, long)]
        amount: u64,

        /// Absolute fee in satoshis (quoted by the server when omitted).
        #[arg(short, long)]
        fee: Option<u64>,

        #[arg(short, long, default_value = "normal")]
        priority: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .init();

    let server = cli.server.as_str();
    let key_file = cli.key_file.as_path();

    match cli.command {
        Commands::Keygen { uid, network } => {
            commands::keygen(key_file, &uid, network.into())?;
        }
        Commands::Register => {
            commands::register(server, key_file).await?;
        }
        Commands::Newaddress { script_type } => {
            commands::new_address(server, key_file, script_type.into()).await?;
        }
        Commands::Balance => {
            commands::balance(server, key_file).await?;
        }
        Commands::Addresses { offset, limit } => {
            commands::addresses(server, key_file, PageRequest { offset, limit }).await?;
        }
        Commands::Txs { offset, limit } => {
            commands::txs(server, key_file, PageRequest { offset, limit }).await?;
        }
        Commands::Fees { amount, priority } => {
            commands::fees(server, key_file, &priority, amount).await?;
        }
        Commands::Portfolio { code } => {
            commands::portfolio(server, key_file, &code).await?;
        }
        Commands::Send {
            to,
            amount,
            fee,
            priority,
        } => {
            commands::send(server, key_file, &to, amount, fee, &priority).await?;
        }
    }

    Ok(())
}
