//! Ingestion loop: raw frames in, trade events recorded.

use crate::error::EngineError;
use crate::exchange::RawFrame;
use crate::market::{TradeBuffer, TradeEvent, TradeMessage};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Recorded,
    /// Parsed, but quantity or price was not positive, or their product overflows
    Skipped,
    /// Not a JSON object
    Malformed,
}

#[derive(Debug, Clone, Default)]
pub struct IngestionStats {
    pub frames: u64,
    pub recorded: u64,
    pub skipped: u64,
    pub malformed: u64,
}

/// Drains the transport channel into the shared trade buffer.
pub struct IngestionLoop {
    buffer: Arc<TradeBuffer>,
    frames: mpsc::Receiver<RawFrame>,
    stats: IngestionStats,
}

impl IngestionLoop {
    pub fn new(buffer: Arc<TradeBuffer>, frames: mpsc::Receiver<RawFrame>) -> Self {
        Self {
            buffer,
            frames,
            stats: IngestionStats::default(),
        }
    }

    pub fn stats(&self) -> &IngestionStats {
        &self.stats
    }

    /// Record frames until the transport closes the channel.
    ///
    /// Never returns `Ok`: a closed feed means no more data, which is an error
    /// for the engine.
    pub async fn run(mut self) -> Result<()> {
        info!("Ingestion loop started");

        while let Some(frame) = self.frames.recv().await {
            self.handle_frame(&frame).await;

            if self.stats.frames % 10_000 == 0 {
                debug!(
                    frames = self.stats.frames,
                    recorded = self.stats.recorded,
                    skipped = self.stats.skipped,
                    malformed = self.stats.malformed,
                    "Ingestion progress"
                );
            }
        }

        warn!(frames = self.stats.frames, "Trade feed closed");
        Err(EngineError::IngestionStopped("trade feed closed".to_string()).into())
    }

    /// Parse one frame and record it if it carries volume.
    pub async fn handle_frame(&mut self, frame: &RawFrame) -> FrameOutcome {
        self.stats.frames += 1;

        let msg = match TradeMessage::parse(&frame.text) {
            Ok(msg) => msg,
            Err(e) => {
                self.stats.malformed += 1;
                warn!(error = %e, "Discarding unparseable frame");
                return FrameOutcome::Malformed;
            }
        };

        let event = TradeEvent::from_message(&msg, frame.received_at_ms);
        if !event.is_tradeable() {
            self.stats.skipped += 1;
            debug!(price = %event.price, quantity = %event.quantity, "Skipping untradeable trade");
            return FrameOutcome::Skipped;
        }

        self.buffer.record(event).await;
        self.stats.recorded += 1;
        FrameOutcome::Recorded
    }
}
