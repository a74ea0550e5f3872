//! Configuration management for the volume spike trader.
//!
//! Loads settings from an optional config file, `.env`, and environment variables.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Binance API credentials and endpoints
    #[serde(default)]
    pub binance: BinanceConfig,
    /// Signal and position thresholds
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Loop cadence and transport settings
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Secret key for signing requests
    #[serde(default)]
    pub secret_key: String,
    /// Trade against the spot testnet instead of production
    #[serde(default = "default_testnet")]
    pub testnet: bool,
    /// Websocket base URL for the public trade stream
    #[serde(default = "default_market_data_url")]
    pub market_data_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Instrument in `BASE/QUOTE` form (e.g., "DOGE/USDT")
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Fixed notional per entry, in quote currency
    #[serde(default = "default_trade_amount_usdt")]
    pub trade_amount_usdt: Decimal,
    /// Short ("recent") volume window in seconds
    #[serde(default = "default_volume_window_secs")]
    pub volume_window_secs: u64,
    /// Baseline window in seconds; also the trade buffer's retention horizon
    #[serde(default = "default_historical_window_secs")]
    pub historical_window_secs: u64,
    /// Recent volume must exceed `threshold * baseline` to count as a spike
    #[serde(default = "default_spike_threshold")]
    pub spike_threshold: Decimal,
    /// Close when price is up this fraction from entry (0.05 = 5%)
    #[serde(default = "default_take_profit")]
    pub take_profit: Decimal,
    /// Close when price is down this fraction from entry (0.03 = 3%)
    #[serde(default = "default_stop_loss")]
    pub stop_loss: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between decision cycles
    #[serde(default = "default_decision_interval")]
    pub decision_interval_secs: u64,
    /// Websocket keepalive ping interval
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Connection is considered dead when nothing arrives for this long after a ping
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
    /// Reconnect attempts before the ingestion task gives up
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Upper bound for the reconnect backoff
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_secs: u64,
    /// Log an engine status summary every N decision cycles (0 = never)
    #[serde(default = "default_status_log_cycles")]
    pub status_log_cycles: u64,
    /// REST request timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

// Default value functions
fn default_testnet() -> bool {
    true
}

fn default_market_data_url() -> String {
    "wss://stream.binance.com:9443".to_string()
}

fn default_symbol() -> String {
    "DOGE/USDT".to_string()
}

fn default_trade_amount_usdt() -> Decimal {
    Decimal::new(5, 1) // 0.5 USDT
}

fn default_volume_window_secs() -> u64 {
    30
}

fn default_historical_window_secs() -> u64 {
    300
}

fn default_spike_threshold() -> Decimal {
    Decimal::new(30, 1) // 3.0x baseline
}

fn default_take_profit() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_stop_loss() -> Decimal {
    Decimal::new(3, 2) // 0.03
}

fn default_decision_interval() -> u64 {
    2
}

fn default_ping_interval() -> u64 {
    20
}

fn default_pong_timeout() -> u64 {
    10
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_max_reconnect_delay() -> u64 {
    60
}

fn default_status_log_cycles() -> u64 {
    30 // once a minute at the default cadence
}

fn default_http_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from environment variables and config files.
    ///
    /// `BINANCE_APIKEY` / `BINANCE_SECRET` take precedence over any configured keys.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("VST"))
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if let Ok(key) = std::env::var("BINANCE_APIKEY") {
            config.binance.api_key = key;
        }
        if let Ok(secret) = std::env::var("BINANCE_SECRET") {
            config.binance.secret_key = secret;
        }

        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let s = &self.strategy;

        anyhow::ensure!(
            s.symbol.split('/').filter(|part| !part.is_empty()).count() == 2,
            "symbol must look like BASE/QUOTE, got {:?}",
            s.symbol
        );

        anyhow::ensure!(
            s.trade_amount_usdt > Decimal::ZERO,
            "trade_amount_usdt must be positive"
        );

        anyhow::ensure!(
            s.volume_window_secs > 0 && s.historical_window_secs >= s.volume_window_secs,
            "windows must satisfy 0 < volume_window_secs <= historical_window_secs"
        );

        anyhow::ensure!(
            s.spike_threshold > Decimal::ZERO,
            "spike_threshold must be positive"
        );

        anyhow::ensure!(
            s.take_profit > Decimal::ZERO && s.take_profit < Decimal::ONE,
            "take_profit must be between 0 and 1"
        );

        anyhow::ensure!(
            s.stop_loss > Decimal::ZERO && s.stop_loss < Decimal::ONE,
            "stop_loss must be between 0 and 1"
        );

        anyhow::ensure!(
            self.engine.decision_interval_secs > 0,
            "decision_interval_secs must be at least 1"
        );

        Ok(())
    }
}

impl BinanceConfig {
    /// Both halves of the API credential pair are present.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty()
    }
}

impl StrategyConfig {
    /// Exchange-native symbol ("DOGE/USDT" -> "DOGEUSDT").
    pub fn exchange_symbol(&self) -> String {
        self.symbol.replace('/', "").to_uppercase()
    }

    /// Raw trade stream name ("DOGE/USDT" -> "dogeusdt@trade").
    pub fn stream_name(&self) -> String {
        format!("{}@trade", self.exchange_symbol().to_lowercase())
    }

    pub fn volume_window(&self) -> Duration {
        Duration::from_secs(self.volume_window_secs)
    }

    pub fn historical_window(&self) -> Duration {
        Duration::from_secs(self.historical_window_secs)
    }
}

impl EngineConfig {
    pub fn decision_interval(&self) -> Duration {
        Duration::from_secs(self.decision_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binance: BinanceConfig::default(),
            strategy: StrategyConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            testnet: default_testnet(),
            market_data_url: default_market_data_url(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            trade_amount_usdt: default_trade_amount_usdt(),
            volume_window_secs: default_volume_window_secs(),
            historical_window_secs: default_historical_window_secs(),
            spike_threshold: default_spike_threshold(),
            take_profit: default_take_profit(),
            stop_loss: default_stop_loss(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decision_interval_secs: default_decision_interval(),
            ping_interval_secs: default_ping_interval(),
            pong_timeout_secs: default_pong_timeout(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            max_reconnect_delay_secs: default_max_reconnect_delay(),
            status_log_cycles: default_status_log_cycles(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}
