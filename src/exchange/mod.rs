//! Exchange integrations for the volume spike trader.
//!
//! ## Binance
//! - REST: latest price, LOT_SIZE rules, signed market orders
//! - WebSocket: public `<symbol>@trade` stream with keepalive and reconnect
//!
//! ## Mock
//! Paper-trading fills against a simulated spot account.

mod client;
pub mod mock;
mod traits;
mod types;
mod websocket;

pub use client::BinanceClient;
pub use mock::MockExchange;
pub use traits::{OrderAmount, OrderFill, TradingApi};
#[cfg(test)]
pub use traits::MockTradingApi;
pub use types::*;
pub use websocket::{BinanceTradeStream, RawFrame};
