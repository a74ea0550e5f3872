//! Trailing-window notional volume over the trade buffer.

use super::buffer::TradeBuffer;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

/// Recent and baseline volume taken from the same buffer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeReading {
    pub recent: Decimal,
    pub historical: Decimal,
}

/// Computes summed `quantity * price` over trailing windows.
#[derive(Debug, Clone)]
pub struct VolumeAggregator {
    buffer: Arc<TradeBuffer>,
}

impl VolumeAggregator {
    pub fn new(buffer: Arc<TradeBuffer>) -> Self {
        Self { buffer }
    }

    /// Notional volume of trades with `timestamp >= now - window`.
    pub async fn volume(&self, window: Duration) -> Decimal {
        self.volume_at(window, Utc::now().timestamp_millis()).await
    }

    pub async fn volume_at(&self, window: Duration, now_ms: i64) -> Decimal {
        self.buffer
            .snapshot()
            .await
            .notional_since(window_start(window, now_ms))
    }

    /// Both window volumes from a single snapshot.
    pub async fn volumes(&self, recent: Duration, historical: Duration) -> VolumeReading {
        self.volumes_at(recent, historical, Utc::now().timestamp_millis())
            .await
    }

    pub async fn volumes_at(
        &self,
        recent: Duration,
        historical: Duration,
        now_ms: i64,
    ) -> VolumeReading {
        let snapshot = self.buffer.snapshot().await;
        VolumeReading {
            recent: snapshot.notional_since(window_start(recent, now_ms)),
            historical: snapshot.notional_since(window_start(historical, now_ms)),
        }
    }

    pub async fn buffered_trades(&self) -> usize {
        self.buffer.len().await
    }
}

fn window_start(window: Duration, now_ms: i64) -> i64 {
    now_ms - window.as_millis() as i64
}
