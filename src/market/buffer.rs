//! Time-bounded trade buffer shared between ingestion and decision tasks.

use super::trade::TradeEvent;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::trace;

/// Recent trades ordered by timestamp, bounded by a retention horizon.
///
/// The sequence lives behind a single mutex; every read and write holds it
/// for the whole buffer access, so callers never see a half-applied update.
#[derive(Debug)]
pub struct TradeBuffer {
    retention: Duration,
    events: Mutex<VecDeque<TradeEvent>>,
}

/// Point-in-time copy of the buffer contents.
#[derive(Debug, Clone, Default)]
pub struct TradeSnapshot {
    events: Vec<TradeEvent>,
}

impl TradeBuffer {
    /// Create an empty buffer that keeps trades for `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Record a trade using the wall clock for eviction.
    pub async fn record(&self, event: TradeEvent) -> usize {
        self.record_at(event, Utc::now().timestamp_millis()).await
    }

    /// Append `event` and evict everything older than `now_ms - retention`.
    ///
    /// An event that is already outside the horizon is dropped instead of stored.
    /// A late event inside the horizon is inserted at its time-ordered position.
    /// Returns the number of events evicted or dropped.
    pub async fn record_at(&self, event: TradeEvent, now_ms: i64) -> usize {
        let cutoff = self.cutoff(now_ms);
        let mut events = self.events.lock().await;

        let mut removed = 0;
        while events.front().is_some_and(|e| e.timestamp_ms < cutoff) {
            events.pop_front();
            removed += 1;
        }

        if event.timestamp_ms < cutoff {
            trace!(ts = event.timestamp_ms, cutoff, "Dropping stale trade");
            return removed + 1;
        }

        match events.back() {
            Some(last) if last.timestamp_ms > event.timestamp_ms => {
                let idx = events.partition_point(|e| e.timestamp_ms <= event.timestamp_ms);
                events.insert(idx, event);
            }
            _ => events.push_back(event),
        }

        removed
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> TradeSnapshot {
        let events = self.events.lock().await;
        TradeSnapshot {
            events: events.iter().copied().collect(),
        }
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }

    /// Price of the most recent trade, if any.
    pub async fn last_price(&self) -> Option<Decimal> {
        self.events.lock().await.back().map(|e| e.price)
    }

    fn cutoff(&self, now_ms: i64) -> i64 {
        now_ms - self.retention.as_millis() as i64
    }
}

impl TradeSnapshot {
    pub fn events(&self) -> &[TradeEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Summed notional of trades at or after `cutoff_ms`.
    pub fn notional_since(&self, cutoff_ms: i64) -> Decimal {
        // Events are time ordered, so the qualifying ones form a suffix.
        let start = self.events.partition_point(|e| e.timestamp_ms < cutoff_ms);
        self.events[start..]
            .iter()
            .fold(Decimal::ZERO, |sum, e| sum.saturating_add(e.notional()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HORIZON: Duration = Duration::from_secs(300);

    fn trade(ts: i64) -> TradeEvent {
        TradeEvent::new(ts, dec!(1), dec!(2))
    }

    #[tokio::test]
    async fn test_record_evicts_outside_horizon() {
        let buffer = TradeBuffer::new(HORIZON);

        buffer.record_at(trade(0), 0).await;
        buffer.record_at(trade(100_000), 100_000).await;
        buffer.record_at(trade(200_000), 200_000).await;
        assert_eq!(buffer.len().await, 3);

        // cutoff = 350_000 - 300_000 = 50_000 evicts the first trade only
        let evicted = buffer.record_at(trade(350_000), 350_000).await;
        assert_eq!(evicted, 1);

        let snapshot = buffer.snapshot().await;
        let stamps: Vec<i64> = snapshot.events().iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(stamps, vec![100_000, 200_000, 350_000]);
    }

    #[tokio::test]
    async fn test_event_on_cutoff_is_retained() {
        let buffer = TradeBuffer::new(HORIZON);

        buffer.record_at(trade(1_000), 1_000).await;
        buffer.record_at(trade(301_000), 301_000).await;

        assert_eq!(buffer.len().await, 2);
    }

    #[tokio::test]
    async fn test_stale_event_is_dropped() {
        let buffer = TradeBuffer::new(HORIZON);

        let dropped = buffer.record_at(trade(10_000), 400_000).await;

        assert_eq!(dropped, 1);
        assert!(buffer.is_empty().await);
    }

    #[tokio::test]
    async fn test_late_event_keeps_time_order() {
        let buffer = TradeBuffer::new(HORIZON);

        buffer.record_at(trade(1_000), 5_000).await;
        buffer.record_at(trade(3_000), 5_000).await;
        buffer.record_at(trade(2_000), 5_000).await;

        let snapshot = buffer.snapshot().await;
        let stamps: Vec<i64> = snapshot.events().iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(stamps, vec![1_000, 2_000, 3_000]);
    }

    #[tokio::test]
    async fn test_invariant_holds_after_every_record() {
        let buffer = TradeBuffer::new(Duration::from_secs(10));

        for i in 0..100i64 {
            let now = i * 700;
            buffer.record_at(trade(now - (i % 3) * 100), now).await;

            let snapshot = buffer.snapshot().await;
            let cutoff = now - 10_000;
            assert!(snapshot.events().iter().all(|e| e.timestamp_ms >= cutoff));
            assert!(snapshot
                .events()
                .windows(2)
                .all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));
        }
    }

    #[tokio::test]
    async fn test_last_price() {
        let buffer = TradeBuffer::new(HORIZON);
        assert_eq!(buffer.last_price().await, None);

        buffer
            .record_at(TradeEvent::new(1, dec!(1), dec!(0.25)), 1)
            .await;
        assert_eq!(buffer.last_price().await, Some(dec!(0.25)));
    }

    #[test]
    fn test_notional_since_is_inclusive() {
        let snapshot = TradeSnapshot {
            events: vec![
                TradeEvent::new(100, dec!(1), dec!(10)),
                TradeEvent::new(200, dec!(2), dec!(10)),
                TradeEvent::new(300, dec!(3), dec!(10)),
            ],
        };

        assert_eq!(snapshot.notional_since(200), dec!(50));
        assert_eq!(snapshot.notional_since(301), Decimal::ZERO);
        assert_eq!(snapshot.notional_since(0), dec!(60));
    }

    #[test]
    fn test_notional_sum_saturates() {
        let huge = Decimal::MAX / dec!(2);
        let snapshot = TradeSnapshot {
            events: vec![
                TradeEvent::new(100, huge, dec!(1)),
                TradeEvent::new(200, huge, dec!(1)),
                TradeEvent::new(300, huge, dec!(1)),
            ],
        };

        assert_eq!(snapshot.notional_since(0), Decimal::MAX);
    }
}
