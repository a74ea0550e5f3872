//! Volume spike detection against a normalized historical baseline.

use crate::config::StrategyConfig;
use crate::market::VolumeReading;
use crate::utils::decimal::safe_div;
use rust_decimal::Decimal;
use std::time::Duration;

/// Result of one detector evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpikeSignal {
    pub is_spike: bool,
    /// Historical volume scaled down to one recent-window's worth
    pub baseline: Decimal,
    /// `recent / baseline`, zero when there is no baseline
    pub ratio: Decimal,
}

/// Average volume per recent window over the historical window.
///
/// `historical / max(1, historical_window / recent_window)`.
pub fn baseline(historical_volume: Decimal, recent_window: Duration, historical_window: Duration) -> Decimal {
    let windows = safe_div(
        Decimal::from(historical_window.as_millis() as u64),
        Decimal::from(recent_window.as_millis() as u64),
    );
    historical_volume / windows.max(Decimal::ONE)
}

/// True iff `baseline > 0` and `recent_volume > threshold * baseline`.
pub fn is_spike(
    recent_volume: Decimal,
    historical_volume: Decimal,
    recent_window: Duration,
    historical_window: Duration,
    threshold: Decimal,
) -> bool {
    let baseline = baseline(historical_volume, recent_window, historical_window);
    baseline > Decimal::ZERO
        && threshold
            .checked_mul(baseline)
            .is_some_and(|limit| recent_volume > limit)
}

/// Spike rule bound to configured windows and threshold.
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    recent_window: Duration,
    historical_window: Duration,
    threshold: Decimal,
}

impl SpikeDetector {
    pub fn new(recent_window: Duration, historical_window: Duration, threshold: Decimal) -> Self {
        Self {
            recent_window,
            historical_window,
            threshold,
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(
            config.volume_window(),
            config.historical_window(),
            config.spike_threshold,
        )
    }

    pub fn recent_window(&self) -> Duration {
        self.recent_window
    }

    pub fn historical_window(&self) -> Duration {
        self.historical_window
    }

    pub fn evaluate(&self, reading: &VolumeReading) -> SpikeSignal {
        let baseline = baseline(reading.historical, self.recent_window, self.historical_window);
        SpikeSignal {
            is_spike: is_spike(
                reading.recent,
                reading.historical,
                self.recent_window,
                self.historical_window,
                self.threshold,
            ),
            baseline,
            ratio: safe_div(reading.recent, baseline),
        }
    }
}
