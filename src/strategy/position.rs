//! Two-state (flat/open) position management with take-profit and stop-loss exits.

use crate::config::StrategyConfig;
use crate::exchange::{OrderAmount, OrderSide, TradingApi};
use crate::utils::decimal::fractional_change;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The single open trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub entry_price: Decimal,
    pub size: Decimal,
    pub opened_at: DateTime<Utc>,
    pub order_id: i64,
}

impl Position {
    /// Unrealized P/L in quote currency at `price`.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "take-profit"),
            ExitReason::StopLoss => write!(f, "stop-loss"),
        }
    }
}

/// Exit check for an open position; both thresholds are inclusive.
pub fn exit_signal(
    entry_price: Decimal,
    current_price: Decimal,
    take_profit: Decimal,
    stop_loss: Decimal,
) -> Option<ExitReason> {
    let change = fractional_change(entry_price, current_price);
    if change >= take_profit {
        Some(ExitReason::TakeProfit)
    } else if change <= -stop_loss {
        Some(ExitReason::StopLoss)
    } else {
        None
    }
}

/// What one evaluation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Flat and no spike
    Idle,
    /// Spike acted on; now open
    Opened(Position),
    /// Spike seen but the buy did not happen; still flat
    EntryFailed(String),
    /// Open, inside the TP/SL band
    Holding {
        price: Decimal,
        change: Decimal,
        spike_ignored: bool,
    },
    /// Exit executed; now flat
    Closed {
        position: Position,
        exit_price: Decimal,
        reason: ExitReason,
        pnl: Decimal,
    },
    /// Exit triggered but the sell failed; still open
    ExitFailed { reason: ExitReason, error: String },
    /// Open but the live price could not be read
    PriceUnavailable(String),
}

/// Flat/open state machine driving fixed-notional entries.
pub struct PositionManager {
    api: Arc<dyn TradingApi>,
    symbol: String,
    trade_amount: Decimal,
    take_profit: Decimal,
    stop_loss: Decimal,
    position: Option<Position>,
}

impl PositionManager {
    /// Create a flat manager for the configured symbol.
    pub fn new(api: Arc<dyn TradingApi>, config: &StrategyConfig) -> Self {
        Self {
            api,
            symbol: config.exchange_symbol(),
            trade_amount: config.trade_amount_usdt,
            take_profit: config.take_profit,
            stop_loss: config.stop_loss,
            position: None,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }

    /// Run one decision step.
    ///
    /// Flat: a spike triggers a buy of the configured notional.
    /// Open: the live price is checked against TP/SL; spikes are ignored.
    pub async fn evaluate(&mut self, spike: bool) -> CycleOutcome {
        match self.position.clone() {
            None if spike => self.try_enter().await,
            None => CycleOutcome::Idle,
            Some(position) => self.check_exit(position, spike).await,
        }
    }

    async fn try_enter(&mut self) -> CycleOutcome {
        info!(symbol = %self.symbol, amount = %self.trade_amount, "Volume spike - buying");

        // The venue sizes the order from its own quote and reports it back
        let fill = match self
            .api
            .place_market_order(
                OrderSide::Buy,
                &self.symbol,
                OrderAmount::Notional(self.trade_amount),
            )
            .await
        {
            Ok(fill) => fill,
            Err(e) => {
                error!(symbol = %self.symbol, error = %e, "Buy order failed");
                return CycleOutcome::EntryFailed(e.to_string());
            }
        };

        if fill.filled_quantity <= Decimal::ZERO {
            warn!(symbol = %self.symbol, status = ?fill.status, "Buy order executed nothing");
            return CycleOutcome::EntryFailed(format!("nothing filled (status {:?})", fill.status));
        }

        let entry_price = match fill.execution_price() {
            Some(price) => price,
            None => match self.api.fetch_current_price(&self.symbol).await {
                Ok(price) => price,
                Err(e) => {
                    error!(
                        symbol = %self.symbol,
                        order_id = fill.order_id,
                        size = %fill.filled_quantity,
                        error = %e,
                        "Buy filled without a usable price; position left untracked"
                    );
                    return CycleOutcome::EntryFailed(e.to_string());
                }
            },
        };

        let position = Position {
            entry_price,
            size: fill.filled_quantity,
            opened_at: Utc::now(),
            order_id: fill.order_id,
        };

        info!(
            symbol = %self.symbol,
            order_id = position.order_id,
            quoted_price = ?fill.quoted_price,
            entry_price = %position.entry_price,
            size = %position.size,
            take_profit = %(position.entry_price * (Decimal::ONE + self.take_profit)),
            stop_loss = %(position.entry_price * (Decimal::ONE - self.stop_loss)),
            "Position opened"
        );

        self.position = Some(position.clone());
        CycleOutcome::Opened(position)
    }

    async fn check_exit(&mut self, position: Position, spike: bool) -> CycleOutcome {
        if spike {
            debug!(symbol = %self.symbol, "Spike ignored while a position is open");
        }

        let price = match self.api.fetch_current_price(&self.symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Failed to fetch price for open position");
                return CycleOutcome::PriceUnavailable(e.to_string());
            }
        };

        let change = fractional_change(position.entry_price, price);
        let Some(reason) = exit_signal(position.entry_price, price, self.take_profit, self.stop_loss)
        else {
            debug!(
                symbol = %self.symbol,
                %price,
                change_pct = %(change * Decimal::ONE_HUNDRED).round_dp(3),
                "Holding position"
            );
            return CycleOutcome::Holding {
                price,
                change,
                spike_ignored: spike,
            };
        };

        info!(
            symbol = %self.symbol,
            %reason,
            %price,
            entry_price = %position.entry_price,
            change_pct = %(change * Decimal::ONE_HUNDRED).round_dp(3),
            "Exit triggered - selling"
        );

        let fill = match self
            .api
            .place_market_order(
                OrderSide::Sell,
                &self.symbol,
                OrderAmount::Quantity(position.size),
            )
            .await
        {
            Ok(fill) => fill,
            Err(e) => {
                error!(symbol = %self.symbol, %reason, error = %e, "Sell order failed, position stays open");
                return CycleOutcome::ExitFailed {
                    reason,
                    error: e.to_string(),
                };
            }
        };

        if fill.filled_quantity < position.size {
            warn!(
                symbol = %self.symbol,
                filled = %fill.filled_quantity,
                size = %position.size,
                "Exit filled less than the position size"
            );
        }

        let exit_price = fill.execution_price().unwrap_or(price);
        let pnl = position.pnl_at(exit_price);
        info!(
            symbol = %self.symbol,
            %reason,
            entry_price = %position.entry_price,
            %exit_price,
            pnl = %pnl.round_dp(8),
            held_secs = (Utc::now() - position.opened_at).num_seconds(),
            "Position closed"
        );

        self.position = None;
        CycleOutcome::Closed {
            position,
            exit_price,
            reason,
            pnl,
        }
    }
}
