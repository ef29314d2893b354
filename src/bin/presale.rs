use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sra_presale::config::LoggingConfig;
use sra_presale::presale::ContractSnapshot;
use sra_presale::units;
use sra_presale::wallet::host::LocalHost;
use sra_presale::{
    Address, ClaimOutcome, ConnectOutcome, LocalSigner, NotificationKind, Notifier,
    PresaleClient, PresaleClientBuilder, PresaleConfig, RpcWallet, WalletProvider,
};

#[derive(Parser)]
#[command(
    name = "sra-presale",
    version,
    about = "SRA token presale client for BNB Smart Chain",
    long_about = "\
Reads the SRA presale contract, buys tokens and claims vested tokens.\n\
\n\
The signing account comes from SRA_WALLET_MNEMONIC (account index from\n\
SRA_ACCOUNT_INDEX, default 0). SRA_WATCH_ADDRESS exposes an account for\n\
read-only commands. A .env file in the working directory is honoured.\n\
\n\
Examples:\n\
  sra-presale info\n\
  sra-presale estimate 0.5\n\
  sra-presale buy 0.5\n\
  sra-presale claim\n\
  sra-presale --rpc-url https://bsc-dataseed1.binance.org watch"
)]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the chain's RPC endpoint
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print machine-readable output
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Show the sale status and limits
    Info,

    /// Show the connected account's vesting schedule
    Vesting,

    /// Show the connected account's BNB balance
    Balance,

    /// Validate an amount and estimate tokens and fees without sending
    Estimate { amount: String },

    /// Buy tokens for the given BNB amount
    Buy { amount: String },

    /// Claim unlocked tokens
    Claim,

    /// Poll the contract and print updates until interrupted
    Watch,

    /// Print the effective configuration, or write it to a file
    Config {
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PresaleConfig::load_from(path)?,
        None => PresaleConfig::load()?,
    };
    if let Some(url) = &cli.rpc_url {
        config.chain.rpc_urls = vec![url.clone()];
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.validate()?;
    init_tracing(&config.logging);

    if let Cmd::Config { save } = &cli.command {
        match save {
            Some(path) => {
                config.save_to_file(path)?;
                println!("Configuration written to {}", path.display());
            }
            None => println!("{}", toml::to_string_pretty(&config)?),
        }
        return Ok(());
    }

    let wallet: Arc<dyn WalletProvider> = Arc::new(build_wallet(&config)?);
    let client = PresaleClientBuilder::new()
        .with_config(config)
        .with_host(Arc::new(LocalHost::new(Some(wallet.clone()))))
        .with_read_provider(wallet)
        .build()?;

    let printer = print_notifications(client.notifier());
    let result = run(&client, cli.command, cli.json).await;
    printer.abort();
    result
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sra_presale={},warn", logging.level)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = match logging.format.as_str() {
        "pretty" => builder.pretty().try_init(),
        "json" => builder.json().try_init(),
        _ => builder.compact().try_init(),
    };
}

fn build_wallet(config: &PresaleConfig) -> anyhow::Result<RpcWallet> {
    let mut wallet = RpcWallet::new(config.chain.clone(), &config.wallet)?;

    if let Ok(phrase) = env::var("SRA_WALLET_MNEMONIC") {
        let index = match env::var("SRA_ACCOUNT_INDEX") {
            Ok(value) => value
                .parse::<u32>()
                .context("SRA_ACCOUNT_INDEX must be a non-negative integer")?,
            Err(_) => 0,
        };
        let signer = LocalSigner::from_mnemonic(&SecretString::new(phrase), index)?;
        info!("Signing as {}", signer.address());
        wallet = wallet.with_signer(signer);
    } else if let Ok(value) = env::var("SRA_WATCH_ADDRESS") {
        let address: Address = value
            .parse()
            .context("SRA_WATCH_ADDRESS is not a valid address")?;
        wallet = wallet.with_watch_address(address);
    }

    Ok(wallet)
}

fn print_notifications(notifier: &Notifier) -> JoinHandle<()> {
    let mut notifications = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => {
                    let label = match notification.kind {
                        NotificationKind::Info => "info",
                        NotificationKind::Success => "ok",
                        NotificationKind::Error => "error",
                    };
                    println!("[{}] {}", label, notification.message);
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn connect(client: &PresaleClient) -> anyhow::Result<Address> {
    let outcome = client
        .connect()
        .await
        .context("Set SRA_WALLET_MNEMONIC or SRA_WATCH_ADDRESS to use an account")?;
    match outcome {
        ConnectOutcome::Connected(account) | ConnectOutcome::AlreadyConnected(account) => {
            Ok(account)
        }
        other => bail!("Wallet connection did not complete: {:?}", other),
    }
}

async fn run(client: &PresaleClient, command: Cmd, json: bool) -> anyhow::Result<()> {
    let digits = client.config().display.max_fraction_digits;
    let token = client.config().display.token_symbol.clone();
    let native = client.config().display.native_symbol.clone();

    match command {
        Cmd::Info => {
            let sale = client
                .reader()
                .refresh_sale()
                .await?
                .context("No contract data available")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&client.get_summary())?);
                return Ok(());
            }
            print_sale(&sale, digits, &token, &native);
            match client.reader().token_price().await {
                Ok(Some(price)) => println!(
                    "  Price:         {} {} per {}",
                    units::format_display(price, 8),
                    native,
                    token
                ),
                Ok(None) => {}
                Err(e) => warn!("Token price unavailable: {}", e),
            }
            let config = client.config();
            if let Some(url) = config.chain.explorer_address_url(&config.contract_address) {
                println!("  Contract:      {}", url);
            }
        }

        Cmd::Vesting => {
            let account = connect(client).await?;
            let record = client.reader().refresh_vesting().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&client.get_summary())?);
                return Ok(());
            }
            println!("Account:     {}", units::format_address(&account));
            match record {
                Some(record) if !record.is_empty() => {
                    println!("Total:       {} {}", units::format_display(record.total_amount, digits), token);
                    println!("Claimed:     {} {}", units::format_display(record.claimed_amount, digits), token);
                    println!("Claimable:   {} {}", units::format_display(record.claimable_now, digits), token);
                    println!("Remaining:   {} {}", units::format_display(record.remaining_amount, digits), token);
                    println!(
                        "Next unlock: {}",
                        units::format_unlock_time(record.next_unlock_time)
                            .unwrap_or_else(|| units::PLACEHOLDER.to_string())
                    );
                }
                _ => println!("No vested tokens for this account"),
            }
        }

        Cmd::Balance => {
            let account = connect(client).await?;
            let balance = client
                .reader()
                .refresh_balance()
                .await?
                .context("Balance unavailable")?;
            println!(
                "{}: {} {}",
                units::format_address(&account),
                units::format_display(balance, digits),
                native
            );
        }

        Cmd::Estimate { amount } => {
            connect(client).await?;
            client.refresh().await?;
            let purchase = client.purchase();
            let value = purchase.validate(&amount).await?;
            println!("Amount:  {} {}", units::format_display(value, digits), native);
            if let Some(tokens) = purchase.estimate_tokens(&amount) {
                println!("Receive: ~{} {}", units::format_display(tokens, digits), token);
            }
            println!("{}", purchase.estimate_cost(&amount).await);
        }

        Cmd::Buy { amount } => {
            connect(client).await?;
            client.refresh().await?;
            let purchase = client.purchase();
            purchase.set_amount(amount.clone());
            println!("{}", purchase.estimate_cost(&amount).await);

            let receipt = purchase.submit(&amount).await?;
            println!("Transaction: {}", receipt.hash);
            if let Some(url) = client.config().chain.explorer_tx_url(&receipt.hash) {
                println!("Explorer:    {}", url);
            }
        }

        Cmd::Claim => {
            connect(client).await?;
            client.reader().refresh_vesting().await?;
            match client.claim().claim().await? {
                ClaimOutcome::Claimed(receipt) => {
                    println!("Transaction: {}", receipt.hash);
                    if let Some(url) = client.config().chain.explorer_tx_url(&receipt.hash) {
                        println!("Explorer:    {}", url);
                    }
                }
                ClaimOutcome::NothingToClaim => println!("Nothing to claim yet"),
            }
        }

        Cmd::Watch => {
            if let Err(e) = connect(client).await {
                warn!("Watching without an account: {:#}", e);
            }
            let session = client.start();
            let mut sale = client.reader().subscribe_sale();

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = sale.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if json {
                            println!("{}", serde_json::to_string(&client.get_summary())?);
                        } else if let Some(snapshot) = sale.borrow_and_update().clone() {
                            print_sale(&snapshot, digits, &token, &native);
                        }
                    }
                }
            }

            session.stop().await;
        }

        Cmd::Config { .. } => unreachable!("handled before the client is built"),
    }

    Ok(())
}

fn print_sale(sale: &ContractSnapshot, digits: usize, token: &str, native: &str) {
    let status = if sale.emergency_mode {
        "paused (emergency mode)"
    } else if sale.sale_active {
        "active"
    } else {
        "inactive"
    };
    println!("[{}] Sale {}", sale.fetched_at.format("%H:%M:%S"), status);
    println!("  Remaining:     {} {}", units::format_display(sale.remaining_tokens, digits), token);
    println!("  Rate:          {} {} per {}", units::format_display(sale.tokens_per_bnb, digits), token, native);
    println!(
        "  Contribution:  {} - {} {}",
        units::format_display(sale.min_contribution, digits),
        units::format_display(sale.max_contribution, digits),
        native
    );
}
