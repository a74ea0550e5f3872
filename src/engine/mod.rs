//! Engine wiring: the shared buffer, the ingestion task, and the decision loop.
//!
//! Two tasks run for the life of the process and share only the trade buffer:
//! - ingestion: transport frames -> `TradeBuffer::record`
//! - decision: volumes -> spike detector -> position manager, every interval
//!
//! The decision loop watches the ingestion task's handle, so a dead feed
//! ends `TradingEngine::run` with an error instead of trading on stale volume.

mod decision;
mod ingestion;
mod metrics;

pub use decision::{CycleReport, DecisionLoop};
pub use ingestion::{FrameOutcome, IngestionLoop, IngestionStats};
pub use metrics::EngineMetrics;

use crate::config::Config;
use crate::exchange::{BinanceTradeStream, RawFrame, TradingApi};
use crate::market::{TradeBuffer, VolumeAggregator};
use crate::strategy::{PositionManager, SpikeDetector};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;

const FRAME_CHANNEL_CAPACITY: usize = 4096;
const TRANSPORT_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Context object owning the shared trade buffer and the trading API handle.
pub struct TradingEngine {
    config: Config,
    buffer: Arc<TradeBuffer>,
    api: Arc<dyn TradingApi>,
}

impl TradingEngine {
    /// Create an engine with a fresh buffer sized to the historical window.
    pub fn new(config: Config, api: Arc<dyn TradingApi>) -> Self {
        let buffer = Arc::new(TradeBuffer::new(config.strategy.historical_window()));
        Self::with_buffer(config, buffer, api)
    }

    /// Create an engine around an existing buffer (e.g. one a paper exchange prices from).
    pub fn with_buffer(config: Config, buffer: Arc<TradeBuffer>, api: Arc<dyn TradingApi>) -> Self {
        Self {
            config,
            buffer,
            api,
        }
    }

    pub fn buffer(&self) -> Arc<TradeBuffer> {
        self.buffer.clone()
    }

    /// Subscribe to the Binance trade stream and trade until shutdown.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let stream = BinanceTradeStream::new(&self.config);
        info!(url = stream.url(), "Starting trade stream");

        let mut transport = tokio::spawn(stream.run(tx));
        let result = self.run_with_feed(rx, shutdown).await;

        // Report why the feed closed rather than just that it did.
        if result.is_err() {
            if let Ok(Ok(Err(e))) = tokio::time::timeout(TRANSPORT_JOIN_TIMEOUT, &mut transport).await {
                return Err(e).context("Trade stream failed");
            }
        }

        transport.abort();
        result
    }

    /// Trade on frames from any source until shutdown or until the feed closes.
    pub async fn run_with_feed(
        self,
        frames: mpsc::Receiver<RawFrame>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let ingestion = IngestionLoop::new(self.buffer.clone(), frames);
        let mut ingestion_handle = tokio::spawn(ingestion.run());

        let strategy = &self.config.strategy;
        let mut decision = DecisionLoop::new(
            VolumeAggregator::new(self.buffer.clone()),
            SpikeDetector::from_config(strategy),
            PositionManager::new(self.api.clone(), strategy),
            self.config.engine.decision_interval(),
        )
        .with_status_log(self.config.engine.status_log_cycles);

        let result = decision
            .run(&mut ingestion_handle, shutdown)
            .await
            .context("Decision loop stopped");

        ingestion_handle.abort();
        decision
            .metrics()
            .log_status(decision.positions().position(), self.buffer.len().await);
        result
    }
}
