//! Running counters for the decision loop.

use crate::strategy::{CycleOutcome, Position};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

/// Decision-loop counters since startup, logged as a periodic status line.
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub start_time: DateTime<Utc>,
    pub cycles: u64,
    pub spikes_detected: u64,
    pub spikes_ignored: u64,
    pub positions_entered: u64,
    pub positions_exited: u64,
    pub order_failures: u64,
    pub price_failures: u64,
    pub realized_pnl: Decimal,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self {
            start_time: Utc::now(),
            cycles: 0,
            spikes_detected: 0,
            spikes_ignored: 0,
            positions_entered: 0,
            positions_exited: 0,
            order_failures: 0,
            price_failures: 0,
            realized_pnl: Decimal::ZERO,
        }
    }
}

impl EngineMetrics {
    /// Fold one cycle's result into the counters.
    pub fn record(&mut self, spike: bool, outcome: &CycleOutcome) {
        self.cycles += 1;
        if spike {
            self.spikes_detected += 1;
        }

        // Only flat cycles end in these; a spike with any other outcome arrived while open
        let was_flat = matches!(
            outcome,
            CycleOutcome::Idle | CycleOutcome::Opened(_) | CycleOutcome::EntryFailed(_)
        );
        if spike && !was_flat {
            self.spikes_ignored += 1;
        }

        match outcome {
            CycleOutcome::Idle | CycleOutcome::Holding { .. } => {}
            CycleOutcome::Opened(_) => self.positions_entered += 1,
            CycleOutcome::EntryFailed(_) | CycleOutcome::ExitFailed { .. } => {
                self.order_failures += 1
            }
            CycleOutcome::Closed { pnl, .. } => {
                self.positions_exited += 1;
                self.realized_pnl += *pnl;
            }
            CycleOutcome::PriceUnavailable(_) => self.price_failures += 1,
        }
    }

    /// Log a status summary.
    pub fn log_status(&self, position: Option<&Position>, buffered_trades: usize) {
        let uptime = Utc::now() - self.start_time;
        info!(
            uptime_mins = uptime.num_minutes(),
            cycles = self.cycles,
            buffered_trades,
            spikes = self.spikes_detected,
            spikes_ignored = self.spikes_ignored,
            entries = self.positions_entered,
            exits = self.positions_exited,
            order_failures = self.order_failures,
            price_failures = self.price_failures,
            realized_pnl = %self.realized_pnl.round_dp(8),
            "Engine status"
        );
        if let Some(p) = position {
            info!(
                entry_price = %p.entry_price,
                size = %p.size,
                opened_at = %p.opened_at,
                "Open position"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ExitReason;
    use rust_decimal_macros::dec;

    #[test]
    fn test_record_counts_outcomes() {
        let mut metrics = EngineMetrics::default();
        let position = Position {
            entry_price: dec!(1),
            size: dec!(10),
            opened_at: Utc::now(),
            order_id: 1,
        };

        metrics.record(false, &CycleOutcome::Idle);
        metrics.record(true, &CycleOutcome::Opened(position.clone()));
        metrics.record(
            true,
            &CycleOutcome::Holding {
                price: dec!(1.01),
                change: dec!(0.01),
                spike_ignored: true,
            },
        );
        metrics.record(
            false,
            &CycleOutcome::ExitFailed {
                reason: ExitReason::TakeProfit,
                error: "timeout".to_string(),
            },
        );
        metrics.record(
            false,
            &CycleOutcome::Closed {
                position,
                exit_price: dec!(1.05),
                reason: ExitReason::TakeProfit,
                pnl: dec!(0.5),
            },
        );

        assert_eq!(metrics.cycles, 5);
        assert_eq!(metrics.spikes_detected, 2);
        assert_eq!(metrics.spikes_ignored, 1);
        assert_eq!(metrics.positions_entered, 1);
        assert_eq!(metrics.positions_exited, 1);
        assert_eq!(metrics.order_failures, 1);
        assert_eq!(metrics.realized_pnl, dec!(0.5));
    }

    #[test]
    fn test_spikes_while_open_count_as_ignored_for_every_outcome() {
        let mut metrics = EngineMetrics::default();
        let position = Position {
            entry_price: dec!(1),
            size: dec!(10),
            opened_at: Utc::now(),
            order_id: 1,
        };

        metrics.record(
            true,
            &CycleOutcome::Closed {
                position,
                exit_price: dec!(0.97),
                reason: ExitReason::StopLoss,
                pnl: dec!(-0.3),
            },
        );
        metrics.record(
            true,
            &CycleOutcome::ExitFailed {
                reason: ExitReason::StopLoss,
                error: "timeout".to_string(),
            },
        );
        metrics.record(true, &CycleOutcome::PriceUnavailable("reset".to_string()));
        metrics.record(true, &CycleOutcome::EntryFailed("rejected".to_string()));

        assert_eq!(metrics.spikes_detected, 4);
        assert_eq!(metrics.spikes_ignored, 3);
        assert_eq!(metrics.price_failures, 1);
        assert_eq!(metrics.order_failures, 2);
    }
}
