//! Mock trading client for paper trading and tests.

use super::traits::{OrderAmount, OrderFill, TradingApi};
use super::types::*;
use crate::error::ExchangeError;
use crate::market::TradeBuffer;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A simulated execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockOrder {
    pub order_id: i64,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
}

/// Simulated spot account.
#[derive(Debug, Clone)]
pub struct MockAccountState {
    pub initial_balance: Decimal,
    /// Quote currency (USDT) available
    pub quote_balance: Decimal,
    /// Base asset holdings per symbol
    pub holdings: HashMap<String, Decimal>,
    pub total_trading_fees: Decimal,
    pub orders: Vec<MockOrder>,
}

impl MockAccountState {
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

/// Mock client that simulates instant market fills.
pub struct MockExchange {
    state: Arc<RwLock<MockAccountState>>,
    order_id_counter: AtomicI64,
    /// Explicit prices per symbol
    prices: Arc<RwLock<HashMap<String, Decimal>>>,
    /// Fallback price source: last trade in the live buffer
    price_feed: Option<Arc<TradeBuffer>>,
    /// Orders to reject before filling again
    pending_failures: AtomicU32,
    /// Trading fee rate (0.1% spot taker)
    fee_rate: Decimal,
}

impl MockExchange {
    /// Create a new mock client with an initial quote balance.
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            state: Arc::new(RwLock::new(MockAccountState {
                initial_balance,
                quote_balance: initial_balance,
                holdings: HashMap::new(),
                total_trading_fees: Decimal::ZERO,
                orders: Vec::new(),
            })),
            order_id_counter: AtomicI64::new(1),
            prices: Arc::new(RwLock::new(HashMap::new())),
            price_feed: None,
            pending_failures: AtomicU32::new(0),
            fee_rate: dec!(0.001),
        }
    }

    /// Price symbols without an explicit price from the buffer's last trade.
    pub fn with_price_feed(mut self, buffer: Arc<TradeBuffer>) -> Self {
        self.price_feed = Some(buffer);
        self
    }

    /// Set the simulated price for a symbol.
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// Reject the next `count` orders.
    pub fn fail_next_orders(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Get current mock state for logging.
    pub async fn get_state(&self) -> MockAccountState {
        self.state.read().await.clone()
    }

    fn next_order_id(&self) -> i64 {
        self.order_id_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn price_for(&self, symbol: &str) -> Option<Decimal> {
        if let Some(price) = self.prices.read().await.get(symbol) {
            return Some(*price);
        }
        match &self.price_feed {
            Some(buffer) => buffer.last_price().await,
            None => None,
        }
    }
}

#[async_trait]
impl TradingApi for MockExchange {
    async fn fetch_current_price(&self, symbol: &str) -> Result<Decimal> {
        match self.price_for(symbol).await {
            Some(price) if price > Decimal::ZERO => Ok(price),
            other => Err(ExchangeError::InvalidPrice {
                symbol: symbol.to_string(),
                price: other.map(|p| p.to_string()).unwrap_or_else(|| "none".to_string()),
            }
            .into()),
        }
    }

    async fn place_market_order(
        &self,
        side: OrderSide,
        symbol: &str,
        amount: OrderAmount,
    ) -> Result<OrderFill> {
        if self.take_failure() {
            warn!(%symbol, %side, "Mock order rejected (injected failure)");
            return Err(ExchangeError::Api {
                code: -2010,
                msg: "Mock rejection".to_string(),
            }
            .into());
        }

        let price = self.fetch_current_price(symbol).await?;
        let quantity = match amount {
            OrderAmount::Notional(usdt) => (usdt / price).round_dp(8),
            OrderAmount::Quantity(qty) => qty,
        };
        anyhow::ensure!(quantity > Decimal::ZERO, "Order quantity must be positive");

        let notional = quantity * price;
        let fee = notional * self.fee_rate;

        let mut state = self.state.write().await;
        let held = state.holdings.get(symbol).copied().unwrap_or(Decimal::ZERO);
        match side {
            OrderSide::Buy => {
                anyhow::ensure!(
                    state.quote_balance >= notional + fee,
                    "Insufficient quote balance: {} < {}",
                    state.quote_balance,
                    notional + fee
                );
                state.quote_balance -= notional + fee;
                state.holdings.insert(symbol.to_string(), held + quantity);
            }
            OrderSide::Sell => {
                anyhow::ensure!(
                    held >= quantity,
                    "Insufficient {} holdings: {} < {}",
                    symbol,
                    held,
                    quantity
                );
                state.quote_balance += notional - fee;
                state.holdings.insert(symbol.to_string(), held - quantity);
            }
        }
        state.total_trading_fees += fee;

        let order_id = self.next_order_id();
        state.orders.push(MockOrder {
            order_id,
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            fee,
        });

        info!(
            order_id,
            %symbol,
            %side,
            quantity = %quantity,
            price = %price,
            fee = %fee,
            "Mock spot order executed"
        );
        debug!(quote_balance = %state.quote_balance, "Mock account updated");

        Ok(OrderFill {
            order_id,
            status: OrderStatus::Filled,
            average_fill_price: Some(price),
            quoted_price: Some(price),
            filled_quantity: quantity,
        })
    }
}
