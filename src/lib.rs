//! # Volume Spike Trader
//!
//! Streams trades for one Binance spot symbol, keeps a rolling window of
//! notional volume, and opens a fixed-size position when short-window volume
//! spikes above its historical baseline. Open positions are closed on
//! take-profit or stop-loss.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `market`: Trade events, the shared time-bounded buffer, volume aggregation
//! - `strategy`: Spike detection and the flat/open position state machine
//! - `engine`: Ingestion and decision tasks and the context that runs them
//! - `exchange`: Binance REST + WebSocket clients and a paper-trading mock
//! - `error`: Typed exchange and engine errors
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod market;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use engine::TradingEngine;
