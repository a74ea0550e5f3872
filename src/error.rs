//! Typed errors for the exchange boundary and the engine lifecycle.
//!
//! Plumbing code returns `anyhow::Result`; these variants are the failures
//! callers want to match on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Binance answered with a `{code, msg}` error body.
    #[error("Binance API error {code}: {msg}")]
    Api { code: i64, msg: String },

    /// The order was accepted but did not execute.
    #[error("Order not filled (status: {status})")]
    OrderNotFilled { status: String },

    /// A price or computed quantity was zero or negative.
    #[error("Invalid price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: String },

    /// The symbol is not listed in exchange info.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The market data feed ended; no further trades will be recorded.
    #[error("Ingestion stopped: {0}")]
    IngestionStopped(String),

    /// Live trading was requested without API credentials.
    #[error("Missing API credentials: set BINANCE_APIKEY and BINANCE_SECRET")]
    MissingCredentials,
}
