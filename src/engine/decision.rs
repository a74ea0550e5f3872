//! Decision loop: volumes -> spike detector -> position manager, on a fixed cadence.

use super::metrics::EngineMetrics;
use crate::error::EngineError;
use crate::market::{VolumeAggregator, VolumeReading};
use crate::strategy::{CycleOutcome, PositionManager, SpikeDetector, SpikeSignal};
use anyhow::Result;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Everything one cycle observed and did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub reading: VolumeReading,
    pub signal: SpikeSignal,
    pub outcome: CycleOutcome,
}

/// Single sequential decision context; owns the position.
pub struct DecisionLoop {
    aggregator: VolumeAggregator,
    detector: SpikeDetector,
    positions: PositionManager,
    interval: Duration,
    status_log_cycles: u64,
    metrics: EngineMetrics,
}

impl DecisionLoop {
    pub fn new(
        aggregator: VolumeAggregator,
        detector: SpikeDetector,
        positions: PositionManager,
        interval: Duration,
    ) -> Self {
        Self {
            aggregator,
            detector,
            positions,
            interval,
            status_log_cycles: 0,
            metrics: EngineMetrics::default(),
        }
    }

    /// Log a status summary every `cycles` cycles (0 disables).
    pub fn with_status_log(mut self, cycles: u64) -> Self {
        self.status_log_cycles = cycles;
        self
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    /// One cycle against the wall clock.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.run_cycle_at(Utc::now().timestamp_millis()).await
    }

    /// One cycle with volumes measured at `now_ms`.
    pub async fn run_cycle_at(&mut self, now_ms: i64) -> CycleReport {
        let reading = self
            .aggregator
            .volumes_at(
                self.detector.recent_window(),
                self.detector.historical_window(),
                now_ms,
            )
            .await;
        let signal = self.detector.evaluate(&reading);

        debug!(
            recent = %reading.recent.round_dp(4),
            historical = %reading.historical.round_dp(4),
            baseline = %signal.baseline.round_dp(4),
            ratio = %signal.ratio.round_dp(2),
            spike = signal.is_spike,
            "Decision cycle"
        );

        if signal.is_spike {
            info!(
                recent = %reading.recent.round_dp(4),
                baseline = %signal.baseline.round_dp(4),
                ratio = %signal.ratio.round_dp(2),
                "Volume spike detected"
            );
        }

        let outcome = self.positions.evaluate(signal.is_spike).await;
        self.metrics.record(signal.is_spike, &outcome);

        CycleReport {
            reading,
            signal,
            outcome,
        }
    }

    /// Run cycles until shutdown or until the ingestion task ends.
    ///
    /// A slow cycle delays the next tick rather than bunching ticks up.
    /// Returns an error when ingestion stops, since decisions would run on stale data.
    pub async fn run(
        &mut self,
        ingestion: &mut JoinHandle<Result<()>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs_f64(), "Decision loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                    if self.status_log_cycles > 0 && self.metrics.cycles % self.status_log_cycles == 0 {
                        let buffered = self.aggregator.buffered_trades().await;
                        self.metrics.log_status(self.positions.position(), buffered);
                    }
                }
                joined = &mut *ingestion => {
                    self.warn_if_open("ingestion stopped");
                    return Err(match joined {
                        Ok(Ok(())) => EngineError::IngestionStopped("ingestion task exited".to_string()).into(),
                        Ok(Err(e)) => e,
                        Err(e) => EngineError::IngestionStopped(format!("ingestion task panicked: {}", e)).into(),
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(cycles = self.metrics.cycles, "Decision loop stopping");
                        self.warn_if_open("shutdown");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Positions are not persisted; an open one is left on the exchange.
    fn warn_if_open(&self, why: &str) {
        if let Some(position) = self.positions.position() {
            warn!(
                reason = why,
                entry_price = %position.entry_price,
                size = %position.size,
                opened_at = %position.opened_at,
                "Abandoning open position"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::exchange::{MockExchange, TradingApi};
    use crate::market::{TradeBuffer, TradeEvent};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000_000;

    async fn setup() -> (Arc<TradeBuffer>, Arc<MockExchange>, DecisionLoop) {
        let config = StrategyConfig {
            trade_amount_usdt: dec!(10),
            ..StrategyConfig::default()
        };
        let buffer = Arc::new(TradeBuffer::new(config.historical_window()));
        let exchange = Arc::new(MockExchange::new(dec!(1000)));
        exchange.set_price("DOGEUSDT", dec!(1.00)).await;

        let api: Arc<dyn TradingApi> = exchange.clone();
        let decision = DecisionLoop::new(
            VolumeAggregator::new(buffer.clone()),
            SpikeDetector::from_config(&config),
            PositionManager::new(api, &config),
            Duration::from_millis(20),
        );
        (buffer, exchange, decision)
    }

    /// 1000 notional spread over the baseline, plus `recent` in the last 30s.
    async fn seed(buffer: &TradeBuffer, recent: Decimal) {
        for i in 0..10 {
            buffer
                .record_at(TradeEvent::new(NOW - 290_000 + i * 25_000, dec!(100), dec!(1)), NOW)
                .await;
        }
        buffer
            .record_at(TradeEvent::new(NOW - 1_000, recent, dec!(1)), NOW)
            .await;
    }

    #[tokio::test]
    async fn test_quiet_market_stays_flat() {
        let (buffer, exchange, mut decision) = setup().await;
        seed(&buffer, dec!(50)).await;

        let report = decision.run_cycle_at(NOW).await;

        assert!(!report.signal.is_spike);
        assert_eq!(report.outcome, CycleOutcome::Idle);
        assert_eq!(exchange.get_state().await.order_count(), 0);
    }

    #[tokio::test]
    async fn test_spike_opens_then_take_profit_closes() {
        let (buffer, exchange, mut decision) = setup().await;
        seed(&buffer, dec!(1000)).await;

        let report = decision.run_cycle_at(NOW).await;
        assert!(report.signal.is_spike);
        assert!(matches!(report.outcome, CycleOutcome::Opened(_)));
        assert!(decision.positions().is_open());

        exchange.set_price("DOGEUSDT", dec!(1.05)).await;
        let report = decision.run_cycle_at(NOW).await;
        assert!(matches!(report.outcome, CycleOutcome::Closed { .. }));
        assert!(!decision.positions().is_open());

        assert_eq!(exchange.get_state().await.order_count(), 2);
        assert_eq!(decision.metrics().positions_exited, 1);
    }

    #[tokio::test]
    async fn test_run_surfaces_ingestion_failure() {
        let (_buffer, _exchange, mut decision) = setup().await;
        let (_tx, shutdown) = watch::channel(false);

        let mut ingestion: JoinHandle<Result<()>> = tokio::spawn(async {
            Err(EngineError::IngestionStopped("feed closed".to_string()).into())
        });

        let err = decision.run(&mut ingestion, shutdown).await.unwrap_err();
        assert!(err.downcast_ref::<EngineError>().is_some());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_buffer, _exchange, mut decision) = setup().await;
        let (tx, shutdown) = watch::channel(false);

        let mut ingestion: JoinHandle<Result<()>> = tokio::spawn(async {
            std::future::pending::<()>().await;
            Ok(())
        });

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(true).ok();
        });

        decision.run(&mut ingestion, shutdown).await.unwrap();
        assert!(decision.metrics().cycles >= 1);
        ingestion.abort();
    }
}
