//! Type definitions for Binance spot API responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Latest traded price for a symbol.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerPrice {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
}

/// Exchange information for spot symbols.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotExchangeInfo {
    pub symbols: Vec<SpotSymbolInfo>,
}

/// Symbol information for spot.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotSymbolInfo {
    pub symbol: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

impl SpotSymbolInfo {
    /// Quantity step from the LOT_SIZE filter.
    pub fn lot_size(&self) -> Option<LotSize> {
        self.filters.iter().find_map(|f| match f {
            SymbolFilter::LotSize {
                min_qty, step_size, ..
            } => Some(LotSize {
                min_qty: *min_qty,
                step_size: *step_size,
            }),
            SymbolFilter::Other => None,
        })
    }
}

/// Trading rule attached to a symbol. Only LOT_SIZE is decoded.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SymbolFilter {
    #[serde(rename_all = "camelCase")]
    LotSize {
        #[serde(with = "rust_decimal::serde::str")]
        min_qty: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        max_qty: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        step_size: Decimal,
    },
    #[serde(other)]
    Other,
}

/// Quantity precision rule for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotSize {
    pub min_qty: Decimal,
    pub step_size: Decimal,
}

/// The parts of a symbol's exchange info that order handling needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRules {
    pub base_asset: String,
    pub lot_size: Option<LotSize>,
}

impl From<&SpotSymbolInfo> for SymbolRules {
    fn from(info: &SpotSymbolInfo) -> Self {
        Self {
            base_asset: info.base_asset.clone(),
            lot_size: info.lot_size(),
        }
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    StopLoss,
    StopLossLimit,
    TakeProfit,
    TakeProfitLimit,
    LimitMaker,
}

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
    ExpiredInMatch,
}

/// Order response from the exchange (`newOrderRespType=FULL`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub symbol: String,
    pub order_id: i64,
    pub client_order_id: String,
    pub transact_time: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub orig_qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub executed_qty: Decimal,
    /// Quote amount spent or received (Binance's spelling)
    #[serde(rename = "cummulativeQuoteQty", with = "rust_decimal::serde::str")]
    pub cumulative_quote_qty: Decimal,
    pub status: OrderStatus,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: OrderSide,
    #[serde(default)]
    pub fills: Vec<OrderFillDetail>,
}

impl OrderResponse {
    /// Total commission charged in `asset` across all fills.
    pub fn commission_in(&self, asset: &str) -> Decimal {
        self.fills
            .iter()
            .filter(|f| f.commission_asset == asset)
            .map(|f| f.commission)
            .sum()
    }
}

/// One execution within an order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFillDetail {
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub commission: Decimal,
    pub commission_asset: String,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}
