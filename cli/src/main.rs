//! StreamLedger CLI — reconcile streaming history and estimate balances
//! from an exported event dump.
//!
//! # Commands
//! ```text
//! streamledger estimate --events <file.json> --user <id> [--chain-id 1]
//!                       [--squeezes <file.json>] [--now <unix>] [--config <file.json>]
//! streamledger ledger   --events <file.json> --user <id> [--token <address>]
//! streamledger info     [--config <file.json>]
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use streamledger_account::{AccountEstimator, EstimatorBuilder, MemoryEventSource};
use streamledger_core::amount::{AMT_PER_SEC_EXTRA_DECIMALS, AMT_PER_SEC_MULTIPLIER};
use streamledger_core::{EstimatorConfig, SqueezeRecord};

mod logging;

#[derive(Parser)]
#[command(
    name = "streamledger",
    about = "Reconstruct token streaming accounts and project their balances",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate streamed amounts and balances for every token of a user
    Estimate {
        /// JSON array of configuration events
        #[arg(short, long)]
        events: PathBuf,
        /// Account id whose streams to estimate
        #[arg(short, long)]
        user: String,
        /// Chain id selecting the cycle length
        #[arg(long, default_value_t = 1)]
        chain_id: u64,
        /// JSON array of squeezes to exclude from the current cycle
        #[arg(long)]
        squeezes: Option<PathBuf>,
        /// Unix timestamp to estimate at (defaults to now)
        #[arg(long)]
        now: Option<i64>,
        /// Estimator configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the reconstructed ledger of a user
    Ledger {
        #[arg(short, long)]
        events: PathBuf,
        #[arg(short, long)]
        user: String,
        /// Only print this token's ledger
        #[arg(short, long)]
        token: Option<String>,
    },
    /// Show configuration info
    Info {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(&logging::LogConfig::from_flags(cli.verbose, cli.json_logs));

    match cli.command {
        Commands::Estimate {
            events,
            user,
            chain_id,
            squeezes,
            now,
            config,
        } => {
            cmd_estimate(&events, &user, chain_id, squeezes.as_deref(), now, config.as_deref())
                .await
        }
        Commands::Ledger {
            events,
            user,
            token,
        } => cmd_ledger(&events, &user, token.as_deref()).await,
        Commands::Info { config } => cmd_info(config.as_deref()),
    }
}

async fn cmd_estimate(
    events: &Path,
    user: &str,
    chain_id: u64,
    squeezes: Option<&Path>,
    now: Option<i64>,
    config: Option<&Path>,
) -> Result<()> {
    let mut estimator = open(events, load_config(config)?)?;
    let squeezes: Vec<SqueezeRecord> = match squeezes {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let now = match now {
        Some(ts) => DateTime::from_timestamp(ts, 0)
            .with_context(|| format!("timestamp {ts} is out of range"))?,
        None => Utc::now(),
    };

    let estimates = estimator
        .estimate_at(user, chain_id, Some(&squeezes), now)
        .await
        .with_context(|| format!("estimating account {user}"))?;

    // Tokens that failed are reported in place, next to the healthy ones.
    let report = estimates
        .into_iter()
        .map(|(token, result)| -> Result<(String, serde_json::Value)> {
            let value = match result {
                Ok(estimate) => serde_json::to_value(estimate)?,
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            };
            Ok((token, value))
        })
        .collect::<Result<serde_json::Map<String, serde_json::Value>>>()?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_ledger(events: &Path, user: &str, token: Option<&str>) -> Result<()> {
    let mut estimator = open(events, EstimatorConfig::default())?;
    let snapshot = estimator
        .refresh(user)
        .await
        .with_context(|| format!("loading history of {user}"))?;

    let json = match token {
        Some(token) => serde_json::to_string_pretty(&snapshot.ledger(token)?)?,
        None => serde_json::to_string_pretty(&snapshot.ledgers()?)?,
    };
    println!("{json}");
    Ok(())
}

fn cmd_info(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    println!("StreamLedger v{}", env!("CARGO_PKG_VERSION"));
    println!("  Page size: {} events/request", config.page_size);
    println!(
        "  Fixed-point base: {} extra decimals (x{})",
        AMT_PER_SEC_EXTRA_DECIMALS, AMT_PER_SEC_MULTIPLIER
    );
    println!("  Networks:");
    for n in &config.networks {
        println!("    {:>10}  {:<12} cycle {}s", n.chain_id, n.name, n.cycle_secs);
    }
    Ok(())
}

fn open(events: &Path, config: EstimatorConfig) -> Result<AccountEstimator<MemoryEventSource>> {
    let raw = std::fs::read_to_string(events)
        .with_context(|| format!("reading {}", events.display()))?;
    let source = MemoryEventSource::from_json(&raw)
        .with_context(|| format!("parsing events in {}", events.display()))?;
    tracing::debug!(events = source.len(), path = %events.display(), "Loaded event dump");
    Ok(EstimatorBuilder::from_config(config).build(source)?)
}

fn load_config(path: Option<&Path>) -> Result<EstimatorConfig> {
    match path {
        Some(path) => read_json(path),
        None => Ok(EstimatorConfig::default()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}
