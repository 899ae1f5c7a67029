use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mempool_arb::config::{self, Config};
use mempool_arb::mempool::{MempoolScanner, Transaction};
use mempool_arb::monitoring::journal::JOURNAL_FILE;
use mempool_arb::monitoring::{
    init_logging, LogFormat, Reporters, TelegramNotifier, TracingReporter, TradeJournal,
};
use mempool_arb::security::pow::{PuzzleSolver, DEFAULT_DIFFICULTY, DEFAULT_MAX_ATTEMPTS};
use mempool_arb::trading::{ArbitrageExecutor, FixedDelay, HttpVenue, SimulatedVenue, Venue};
use mempool_arb::TransactionDispatcher;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "ARB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume the mempool feed and execute arbitrage trades
    Start {
        /// Log orders instead of sending them to the venue
        #[arg(long)]
        sim: bool,
    },
    /// Validate configuration and the encryption key
    Check,
    /// Solve a single PoW challenge
    Solve {
        challenge: String,
        #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
        difficulty: u32,
    },
    /// Summarise the trade journal
    History,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    // Config comes first so it can pick the log format and directory
    let config = config::load_config(cli.config.as_deref()).await?;
    let log_dir = match cli.command {
        Some(Commands::Start { .. }) => Some(config.journal_dir.as_path()),
        _ => None,
    };
    init_logging(LogFormat::from_str_lossy(&config.log_format), log_dir)?;
    if let Some(path) = &cli.config {
        info!("Configuration read from {}", path.display());
    }

    match cli.command {
        Some(Commands::Start { sim }) => {
            info!("Starting mempool arbitrage bot");
            run_bot(config, sim).await?;
        }
        Some(Commands::Check) => {
            let exec = config.execution_config().context("Invalid configuration")?;
            info!(?config, "Configuration is valid");
            info!(
                min_amount = %exec.min_amount,
                difficulty = exec.difficulty,
                max_attempts = exec.max_attempts,
                "Derived execution settings"
            );
        }
        Some(Commands::Solve {
            challenge,
            difficulty,
        }) => {
            let solver = PuzzleSolver::new(difficulty, DEFAULT_MAX_ATTEMPTS)?;
            let solution = tokio::task::spawn_blocking(move || solver.solve(&challenge)).await??;
            println!("nonce:    {}", solution.nonce);
            println!("digest:   {}", hex::encode(solution.digest));
            println!("attempts: {}", solution.attempts);
        }
        Some(Commands::History) => {
            print_history(&config)?;
        }
        None => {
            info!("No command specified. Use --help for available commands.");
        }
    }

    Ok(())
}

async fn run_bot(config: Config, simulation_mode: bool) -> Result<()> {
    let exec_config = config
        .execution_config()
        .context("Invalid configuration")?;
    let shutdown = CancellationToken::new();

    let venue: Arc<dyn Venue> = match (&config.venue_url, simulation_mode) {
        (Some(url), false) => {
            info!(%url, "Submitting orders to venue");
            Arc::new(
                HttpVenue::new(url.as_str(), config.venue_timeout())
                    .context("Failed to build venue client")?,
            )
        }
        (None, false) => {
            warn!("VENUE_URL not set, falling back to simulation mode");
            Arc::new(SimulatedVenue)
        }
        (_, true) => {
            info!("Running in SIMULATION mode - no real orders will be submitted");
            Arc::new(SimulatedVenue)
        }
    };

    let journal = TradeJournal::new(&config.journal_dir).context("Failed to open trade journal")?;
    info!(path = %journal.path().display(), "Trade journal ready");
    let reporter = Reporters::new()
        .with(Arc::new(TracingReporter))
        .with(Arc::new(journal))
        .with(Arc::new(TelegramNotifier::new(
            config.telegram_bot_token.clone(),
            config.telegram_chat_id.clone(),
            config.environment.clone(),
        )));

    let executor = ArbitrageExecutor::new(
        &exec_config,
        venue,
        Arc::new(FixedDelay(config.settlement_delay())),
        Arc::new(reporter),
    )?
    .with_sell_grace(config.sell_grace());
    let dispatcher =
        TransactionDispatcher::new(Arc::new(executor), config.max_in_flight, shutdown.clone());

    let (tx_sender, tx_receiver) = mpsc::channel::<Transaction>(config.max_in_flight);
    let scanner = MempoolScanner::new(config.feed_url.clone(), tx_sender);
    let scanner_shutdown = shutdown.clone();
    let scanner_handle =
        tokio::spawn(async move { scanner.start_scanning(scanner_shutdown).await });

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, abandoning in-flight trades");
            signal_shutdown.cancel();
        }
    });

    info!(
        environment = %config.environment,
        "Bot is running. Monitoring for arbitrage opportunities..."
    );
    let summary = dispatcher.run(tx_receiver).await;
    shutdown.cancel();

    info!(?summary, "Transaction processing finished");

    match scanner_handle.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!("Mempool scanner error: {}", e);
            Err(e.into())
        }
        Err(e) => Err(anyhow::anyhow!("Mempool scanner task failed: {}", e)),
    }
}

fn print_history(config: &Config) -> Result<()> {
    let path = config.journal_dir.join(JOURNAL_FILE);
    let records = TradeJournal::read_history(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if records.is_empty() {
        println!("No trades recorded in {}", path.display());
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {:<20} y={:<12} pow={:<8} {}",
            record.timestamp.to_rfc3339(),
            record.state.to_string(),
            record.amount_y,
            record.pow_nonce.as_deref().unwrap_or("-"),
            record.error.as_deref().unwrap_or(""),
        );
    }
    let open = records.iter().filter(|r| r.open_position).count();
    println!("{} trades, {} open positions", records.len(), open);
    Ok(())
}
