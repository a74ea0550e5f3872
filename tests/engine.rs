//! End-to-end runs of the engine over an in-process trade feed and the paper exchange.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use volume_spike_trader::config::{Config, EngineConfig, StrategyConfig};
use volume_spike_trader::error::EngineError;
use volume_spike_trader::exchange::{MockExchange, OrderSide, RawFrame, TradingApi};
use volume_spike_trader::market::TradeBuffer;
use volume_spike_trader::TradingEngine;

fn test_config() -> Config {
    Config {
        strategy: StrategyConfig {
            trade_amount_usdt: dec!(10),
            ..StrategyConfig::default()
        },
        engine: EngineConfig {
            decision_interval_secs: 1,
            status_log_cycles: 0,
            ..EngineConfig::default()
        },
        ..Config::default()
    }
}

fn trade_frame(trade_time_ms: i64, quantity: &str, price: &str) -> RawFrame {
    RawFrame {
        text: format!(
            r#"{{"e":"trade","E":{t},"s":"DOGEUSDT","t":1,"p":"{p}","q":"{q}","T":{t},"m":false}}"#,
            t = trade_time_ms,
            p = price,
            q = quantity
        ),
        received_at_ms: Utc::now().timestamp_millis(),
    }
}

/// A quiet baseline over the last five minutes followed by a burst right now.
async fn send_spike(tx: &mpsc::Sender<RawFrame>) {
    let now = Utc::now().timestamp_millis();
    for i in 0..10 {
        tx.send(trade_frame(now - 290_000 + i * 25_000, "100", "1.00"))
            .await
            .unwrap();
    }
    for i in 0..10 {
        tx.send(trade_frame(now - 1_000 + i * 10, "100", "1.00"))
            .await
            .unwrap();
    }
}

async fn wait_for_orders(exchange: &MockExchange, count: usize) -> bool {
    for _ in 0..60 {
        if exchange.get_state().await.order_count() >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

fn setup() -> (Arc<TradeBuffer>, Arc<MockExchange>, TradingEngine) {
    let config = test_config();
    let buffer = Arc::new(TradeBuffer::new(config.strategy.historical_window()));
    let exchange = Arc::new(MockExchange::new(dec!(1000)).with_price_feed(buffer.clone()));
    let api: Arc<dyn TradingApi> = exchange.clone();
    let engine = TradingEngine::with_buffer(config, buffer.clone(), api);
    (buffer, exchange, engine)
}

#[tokio::test]
async fn spike_opens_one_position_and_shutdown_is_clean() {
    let (_buffer, exchange, engine) = setup();
    let (tx, rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    send_spike(&tx).await;
    let handle = tokio::spawn(engine.run_with_feed(rx, shutdown_rx));

    assert!(wait_for_orders(&exchange, 1).await);

    // Further spike cycles while holding place nothing
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let state = exchange.get_state().await;
    assert_eq!(state.order_count(), 1);
    assert_eq!(state.orders[0].side, OrderSide::Buy);
    assert_eq!(state.holdings["DOGEUSDT"], dec!(10));
    assert!(state.quote_balance < dec!(1000));
    drop(tx);
}

#[tokio::test]
async fn take_profit_closes_the_position() {
    let (_buffer, exchange, engine) = setup();
    let (tx, rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    send_spike(&tx).await;
    let handle = tokio::spawn(engine.run_with_feed(rx, shutdown_rx));
    assert!(wait_for_orders(&exchange, 1).await);

    // Paper prices follow the newest trade: +6% crosses the 5% take-profit
    tx.send(trade_frame(Utc::now().timestamp_millis(), "0.001", "1.06"))
        .await
        .unwrap();
    assert!(wait_for_orders(&exchange, 2).await);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let state = exchange.get_state().await;
    let exit = &state.orders[1];
    assert_eq!(exit.side, OrderSide::Sell);
    assert_eq!(exit.quantity, dec!(10));
    assert_eq!(exit.price, dec!(1.06));
}

#[tokio::test]
async fn closed_feed_stops_the_engine_with_an_error() {
    let (_buffer, exchange, engine) = setup();
    let (tx, rx) = mpsc::channel(64);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    drop(tx);
    let err = tokio::time::timeout(Duration::from_secs(5), engine.run_with_feed(rx, shutdown_rx))
        .await
        .expect("engine should stop on its own")
        .unwrap_err();

    assert!(err
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<EngineError>(), Some(EngineError::IngestionStopped(_)))));
    assert_eq!(exchange.get_state().await.order_count(), 0);
}

#[tokio::test]
async fn malformed_frames_do_not_stop_trading() {
    let (buffer, exchange, engine) = setup();
    let (tx, rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let now = Utc::now().timestamp_millis();
    for text in ["not json", "[1,2,3]", r#"{"result":null,"id":1}"#] {
        tx.send(RawFrame {
            text: text.to_string(),
            received_at_ms: now,
        })
        .await
        .unwrap();
    }
    send_spike(&tx).await;

    let handle = tokio::spawn(engine.run_with_feed(rx, shutdown_rx));
    assert!(wait_for_orders(&exchange, 1).await);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(buffer.len().await, 20);
    assert!(exchange.get_state().await.quote_balance < dec!(1000));
    assert!(buffer.last_price().await.unwrap_or(Decimal::ZERO) > Decimal::ZERO);
    drop(tx);
}
