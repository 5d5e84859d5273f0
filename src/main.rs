//! Swap desk CLI
//!
//! Runs the conversational desk on the console, or answers one-off quote and
//! token inspection requests against the configured chain.

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use swap_desk::chain::{ChainGateway, RpcGateway};
use swap_desk::custody::Slippage;
use swap_desk::market::{ExplorerHolderLookup, HolderLookup, Market, NoHolderLookup};
use swap_desk::tokens::{abbreviate_opt, to_decimal, to_raw, NATIVE_DECIMALS};
use swap_desk::transport::ConsoleTransport;
use swap_desk::{BotRunner, Config, Error, Result, RpcConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "swap-desk")]
#[command(about = "Conversational AMM swap desk with custodial wallets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the desk on the console (`/btn <code>` presses a button)
    Run {
        /// User id the console session acts as
        #[arg(long, default_value_t = 1)]
        user: i64,
    },

    /// Quote buying a token with native currency
    Quote {
        /// Token contract address
        #[arg(long)]
        token: String,

        /// Native amount to spend, in whole units (e.g. 0.1)
        #[arg(long)]
        amount: Decimal,

        /// Slippage tolerance in percent
        #[arg(long, default_value_t = 3)]
        slippage: u8,
    },

    /// Show a token snapshot and the round-trip risk estimate
    Inspect {
        /// Token contract address
        #[arg(long)]
        token: String,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { user } => run_desk(&config, user).await,
        Commands::Quote {
            token,
            amount,
            slippage,
        } => run_quote(&config, &token, amount, slippage).await,
        Commands::Inspect { token } => run_inspect(&config, &token).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("RPC endpoints: {}", RpcConfig::from_env().urls().join(", "));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Logs go to stderr so the console session stays readable
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

async fn run_desk(config: &Config, user: i64) -> Result<()> {
    let transport = Arc::new(ConsoleTransport::new(user));
    let runner = BotRunner::from_config(config, &RpcConfig::from_env(), transport).await?;
    println!("Swap desk running. Type /start, or /btn <code> to press a button.");
    runner.run().await
}

async fn market(config: &Config) -> Result<(Arc<dyn ChainGateway>, Market)> {
    let poll = Duration::from_millis(config.trading.approval_poll_ms);
    let gateway: Arc<dyn ChainGateway> =
        Arc::new(RpcGateway::connect(&RpcConfig::from_env(), &config.chain, poll).await?);
    let holders: Arc<dyn HolderLookup> = if config.holders.enabled {
        Arc::new(ExplorerHolderLookup::new(&config.holders)?)
    } else {
        Arc::new(NoHolderLookup)
    };
    let market = Market::new(config, gateway.clone(), holders)?;
    Ok((gateway, market))
}

fn parse_token(raw: &str) -> Result<Address> {
    raw.trim()
        .parse()
        .map_err(|e| Error::Validation(format!("{} is not an address: {}", raw, e)))
}

async fn run_quote(config: &Config, token: &str, amount: Decimal, slippage: u8) -> Result<()> {
    let token = parse_token(token)?;
    let slippage = Slippage::from_percent(slippage)?;
    let native_in = to_raw(amount, NATIVE_DECIMALS)
        .filter(|raw| !raw.is_zero())
        .ok_or_else(|| Error::Validation(format!("{} is not a positive amount", amount)))?;

    let (gateway, market) = market(config).await?;
    let meta = gateway
        .token_meta(token)
        .await
        .map_err(|e| Error::BadToken(format!("{}: {}", token, e)))?;
    let route = market.resolver.resolve(token).await?;
    let quote = market.quotes.quote_buy(native_in, &route, slippage).await?;

    println!("Route:    {}", route.describe());
    println!("Spend:    {} {}", amount, config.chain.native_symbol);
    println!(
        "Expected: {} {}",
        abbreviate_opt(to_decimal(quote.expected_out, meta.decimals)),
        meta.symbol
    );
    println!(
        "Minimum:  {} {} ({}% slippage)",
        abbreviate_opt(to_decimal(quote.min_out, meta.decimals)),
        meta.symbol,
        slippage.percent().normalize()
    );
    Ok(())
}

async fn run_inspect(config: &Config, token: &str) -> Result<()> {
    let token = parse_token(token)?;
    let (_, market) = market(config).await?;

    let snapshot = market.snapshots.snapshot(token).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    match &snapshot.route {
        Some(route) => match market.risk.assess(route).await.outcome() {
            Ok((loss_percent, level)) => {
                println!("Risk: {} (round-trip loss {:.2}%)", level.label(), loss_percent)
            }
            Err(e) => println!("{}", e),
        },
        None => println!("Risk check failed: no route to the native asset"),
    }
    Ok(())
}
