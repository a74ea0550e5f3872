//! Volume Spike Trader - Main Entry Point
//!
//! Paper trading by default; `--live` (or `LIVE_TRADING=true`) places real orders.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;
use volume_spike_trader::config::Config;
use volume_spike_trader::error::EngineError;
use volume_spike_trader::exchange::{BinanceClient, MockExchange, TradingApi};
use volume_spike_trader::market::TradeBuffer;
use volume_spike_trader::TradingEngine;

/// Starting quote balance for paper trading.
const PAPER_BALANCE: Decimal = dec!(1000);

/// Volume Spike Trader CLI
#[derive(Parser)]
#[command(name = "volume-spike-trader")]
#[command(version, about = "Volume spike detection and TP/SL trading on Binance spot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream trades and trade on volume spikes (default)
    Run {
        /// Place real orders instead of paper trading
        #[arg(long)]
        live: bool,
    },

    /// Print the effective configuration and exit
    Config,
}

/// Trading mode: Live (real money) or Mock (paper trading).
#[derive(Debug, Clone, Copy, PartialEq)]
enum TradingMode {
    Live,
    Mock,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize comprehensive logging
    init_logging()?;

    let live_flag = match cli.command {
        Some(Commands::Config) => return show_config(),
        Some(Commands::Run { live }) => live,
        None => false,
    };

    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║            Volume Spike Trader v{}                      ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");

    // Determine trading mode from flag or environment
    let trading_mode =
        if live_flag || std::env::var("LIVE_TRADING").unwrap_or_default() == "true" {
            warn!("⚠️  LIVE TRADING MODE - Real money at risk!");
            TradingMode::Live
        } else {
            info!("📝 MOCK TRADING MODE - Paper trading enabled");
            TradingMode::Mock
        };

    // Load configuration
    let config = Config::load()?;
    config.validate()?;
    log_config(&config);

    let buffer = Arc::new(TradeBuffer::new(config.strategy.historical_window()));

    let api: Arc<dyn TradingApi> = match trading_mode {
        TradingMode::Live => {
            if !config.binance.has_credentials() {
                error!("❌ No API keys provided");
                return Err(EngineError::MissingCredentials.into());
            }

            let client = BinanceClient::new(
                &config.binance,
                std::time::Duration::from_secs(config.engine.http_timeout_secs),
            )?;

            // Warm the LOT_SIZE cache so the first order doesn't pay for it
            let symbol = config.strategy.exchange_symbol();
            match client.lot_size(&symbol).await {
                Ok(Some(lot)) => info!(
                    "✅ [INIT] {} lot size: step {} min {}",
                    symbol, lot.step_size, lot.min_qty
                ),
                Ok(None) => warn!("⚠️  [INIT] No LOT_SIZE filter for {}", symbol),
                Err(e) => warn!("⚠️  [INIT] Failed to load exchange info: {}", e),
            }

            Arc::new(client)
        }
        TradingMode::Mock => {
            info!("💵 Paper balance: ${}", PAPER_BALANCE);
            Arc::new(MockExchange::new(PAPER_BALANCE).with_price_feed(buffer.clone()))
        }
    };

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received");
        shutdown_tx.send(true).ok();
    });

    info!("🚀 Starting ingestion and decision loops...");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let engine = TradingEngine::with_buffer(config, buffer, api);
    if let Err(e) = engine.run(shutdown_rx).await {
        error!("❌ Engine stopped: {:#}", e);
        return Err(e);
    }

    info!("👋 Shutdown complete");
    Ok(())
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // File appender for detailed logs
    let file_appender = tracing_appender::rolling::hourly("logs", "volume-spike-trader.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("volume_spike_trader=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

fn log_config(config: &Config) {
    let s = &config.strategy;
    info!("📋 Configuration:");
    info!("   Symbol: {} (stream {})", s.symbol, s.stream_name());
    info!("   Trade Amount: ${}", s.trade_amount_usdt);
    info!(
        "   Windows: {}s recent / {}s historical",
        s.volume_window_secs, s.historical_window_secs
    );
    info!("   Spike Threshold: {}x baseline", s.spike_threshold);
    info!("   Take Profit: {:.2}%", s.take_profit * dec!(100));
    info!("   Stop Loss: {:.2}%", s.stop_loss * dec!(100));
    info!(
        "   Decision Interval: {}s",
        config.engine.decision_interval_secs
    );
    info!(
        "   Exchange: {}",
        if config.binance.testnet { "testnet" } else { "production" }
    );
}

fn show_config() -> Result<()> {
    let mut config = Config::load()?;
    config.validate()?;

    // Never print secrets
    if !config.binance.api_key.is_empty() {
        config.binance.api_key = "********".to_string();
    }
    if !config.binance.secret_key.is_empty() {
        config.binance.secret_key = "********".to_string();
    }

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
