//! Venue-agnostic trading interface used by the position manager.
//!
//! Implemented by the live Binance client and by the paper-trading mock.

use super::types::{OrderResponse, OrderSide, OrderStatus};
use crate::utils::decimal::{safe_div, weighted_average};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// How much to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAmount {
    /// Quote-currency amount, converted to quantity at the live price
    Notional(Decimal),
    /// Base-asset quantity
    Quantity(Decimal),
}

/// Normalized result of an executed market order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFill {
    pub order_id: i64,
    pub status: OrderStatus,
    /// Volume-weighted execution price, when the venue reports one
    pub average_fill_price: Option<Decimal>,
    /// Price the order was sized with
    pub quoted_price: Option<Decimal>,
    pub filled_quantity: Decimal,
}

impl OrderFill {
    /// Normalize a Binance order response.
    ///
    /// Average price comes from `cummulativeQuoteQty / executedQty`, falling back
    /// to the quantity-weighted fill prices.
    pub fn from_response(response: &OrderResponse, quoted_price: Option<Decimal>) -> Self {
        let average = safe_div(response.cumulative_quote_qty, response.executed_qty);
        let average_fill_price = if average > Decimal::ZERO {
            Some(average)
        } else {
            let fills: Vec<(Decimal, Decimal)> =
                response.fills.iter().map(|f| (f.price, f.qty)).collect();
            Some(weighted_average(&fills)).filter(|p| *p > Decimal::ZERO)
        };

        Self {
            order_id: response.order_id,
            status: response.status,
            average_fill_price,
            quoted_price,
            filled_quantity: response.executed_qty,
        }
    }

    /// Best known execution price: average fill, then the quote.
    pub fn execution_price(&self) -> Option<Decimal> {
        self.average_fill_price.or(self.quoted_price)
    }

    /// Reduce the filled quantity by a commission taken from it.
    pub fn net_of(mut self, commission: Decimal) -> Self {
        self.filled_quantity = (self.filled_quantity - commission).max(Decimal::ZERO);
        self
    }
}

/// Market-order access to a single venue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradingApi: Send + Sync {
    /// Latest traded price for `symbol` (exchange-native, e.g. "DOGEUSDT").
    async fn fetch_current_price(&self, symbol: &str) -> anyhow::Result<Decimal>;

    /// Place a market order and wait for the exchange's execution report.
    async fn place_market_order(
        &self,
        side: OrderSide,
        symbol: &str,
        amount: OrderAmount,
    ) -> anyhow::Result<OrderFill>;
}
