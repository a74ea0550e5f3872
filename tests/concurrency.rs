//! Concurrent ingestion and aggregation against one shared buffer.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use volume_spike_trader::market::{TradeBuffer, TradeEvent, VolumeAggregator};

const BASE: i64 = 1_700_000_000_000;
const WRITERS: i64 = 4;
const PER_WRITER: i64 = 500;
const NOW: i64 = BASE + WRITERS * PER_WRITER;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_records_and_reads_never_observe_torn_state() {
    let buffer = Arc::new(TradeBuffer::new(Duration::from_secs(300)));
    let aggregator = VolumeAggregator::new(buffer.clone());

    let mut writers = Vec::new();
    for w in 0..WRITERS {
        let buffer = buffer.clone();
        writers.push(tokio::spawn(async move {
            for i in 0..PER_WRITER {
                // Interleaved timestamps so writers land out of order
                let ts = BASE + i * WRITERS + w;
                buffer.record_at(TradeEvent::new(ts, dec!(1), dec!(1)), NOW).await;
                if i % 50 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..2 {
        let buffer = buffer.clone();
        let aggregator = aggregator.clone();
        readers.push(tokio::spawn(async move {
            let mut last_volume = Decimal::ZERO;
            for _ in 0..200 {
                let snapshot = buffer.snapshot().await;
                let events = snapshot.events();

                assert!(events.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
                let unique: HashSet<i64> = events.iter().map(|e| e.timestamp_ms).collect();
                assert_eq!(unique.len(), events.len());

                // Only appends happen, so volume can never go down
                let volume = aggregator.volume_at(Duration::from_secs(300), NOW).await;
                assert!(volume >= last_volume);
                last_volume = volume;

                tokio::task::yield_now().await;
            }
        }));
    }

    for handle in writers.into_iter().chain(readers) {
        handle.await.unwrap();
    }

    let snapshot = buffer.snapshot().await;
    assert_eq!(snapshot.len() as i64, WRITERS * PER_WRITER);

    let expected: Vec<i64> = (0..WRITERS * PER_WRITER).map(|i| BASE + i).collect();
    let actual: Vec<i64> = snapshot.events().iter().map(|e| e.timestamp_ms).collect();
    assert_eq!(actual, expected);

    let total = aggregator.volume_at(Duration::from_secs(300), NOW).await;
    assert_eq!(total, Decimal::from(WRITERS * PER_WRITER));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn eviction_under_concurrent_writes_respects_horizon() {
    let horizon = Duration::from_secs(10);
    let buffer = Arc::new(TradeBuffer::new(horizon));

    let writer = {
        let buffer = buffer.clone();
        tokio::spawn(async move {
            for i in 0..2_000i64 {
                let now = BASE + i * 100;
                buffer.record_at(TradeEvent::new(now, dec!(1), dec!(1)), now).await;
            }
        })
    };

    let reader = {
        let buffer = buffer.clone();
        tokio::spawn(async move {
            for _ in 0..500 {
                let snapshot = buffer.snapshot().await;
                if let (Some(first), Some(last)) = (snapshot.events().first(), snapshot.events().last()) {
                    // Everything retained lies within one horizon of the newest trade
                    assert!(last.timestamp_ms - first.timestamp_ms <= horizon.as_millis() as i64);
                }
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();

    // 10s horizon at 100ms spacing keeps the newest 101 trades
    assert_eq!(buffer.len().await, 101);
}
