//! Binance WebSocket client for the public trade stream.

use crate::config::Config;
use crate::error::EngineError;
use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// A text frame as received from the socket.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub text: String,
    /// Local receipt time in epoch milliseconds
    pub received_at_ms: i64,
}

/// Why a single connection ended without an error.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Nobody is consuming frames anymore
    ReceiverDropped,
    /// Server closed the socket or the stream ended
    Closed,
}

/// Reconnecting subscriber for `<symbol>@trade`.
pub struct BinanceTradeStream {
    url: String,
    ping_interval: Duration,
    pong_timeout: Duration,
    max_reconnect_attempts: u32,
    max_reconnect_delay: Duration,
}

impl BinanceTradeStream {
    /// Create a stream client for the configured symbol.
    pub fn new(config: &Config) -> Self {
        let url = format!(
            "{}/ws/{}",
            config.binance.market_data_url.trim_end_matches('/'),
            config.strategy.stream_name()
        );

        Self {
            url,
            ping_interval: Duration::from_secs(config.engine.ping_interval_secs.max(1)),
            pong_timeout: Duration::from_secs(config.engine.pong_timeout_secs),
            max_reconnect_attempts: config.engine.max_reconnect_attempts,
            max_reconnect_delay: Duration::from_secs(config.engine.max_reconnect_delay_secs),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forward text frames to `tx` until the receiver goes away.
    ///
    /// Reconnects with capped exponential backoff. The attempt counter resets
    /// whenever a connection delivered at least one frame. Returns an error
    /// once `max_reconnect_attempts` consecutive attempts have failed.
    pub async fn run(self, tx: mpsc::Sender<RawFrame>) -> Result<()> {
        let mut attempt = 0u32;

        loop {
            let mut frames = 0u64;
            match self.connect_once(&tx, &mut frames).await {
                Ok(SessionEnd::ReceiverDropped) => {
                    info!("Trade receiver dropped, stopping stream");
                    return Ok(());
                }
                Ok(SessionEnd::Closed) => {
                    warn!(frames, "Trade stream closed");
                }
                Err(e) => {
                    error!(error = %e, frames, "Trade stream connection error");
                }
            }

            if frames > 0 {
                attempt = 0;
            }

            if attempt >= self.max_reconnect_attempts {
                error!(max_attempts = self.max_reconnect_attempts, "Max reconnection attempts reached");
                return Err(EngineError::IngestionStopped(format!(
                    "trade stream gave up after {} reconnect attempts",
                    attempt
                ))
                .into());
            }

            let delay = reconnect_delay(attempt, self.max_reconnect_delay);
            attempt += 1;
            warn!(
                delay_secs = delay.as_secs(),
                attempt,
                max = self.max_reconnect_attempts,
                "Reconnecting"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = tx.closed() => return Ok(()),
            }
        }
    }

    /// Run one connection until it closes, fails, or the receiver drops.
    async fn connect_once(&self, tx: &mpsc::Sender<RawFrame>, frames: &mut u64) -> Result<SessionEnd> {
        info!("Connecting to WebSocket: {}", self.url);

        let (ws_stream, _) = connect_async(&self.url)
            .await
            .context("Failed to connect to WebSocket")?;

        let (mut write, mut read) = ws_stream.split();
        info!("WebSocket connected");

        let mut ping = tokio::time::interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_seen = Instant::now();
                            *frames += 1;
                            let frame = RawFrame {
                                text: text.to_string(),
                                received_at_ms: Utc::now().timestamp_millis(),
                            };
                            if tx.send(frame).await.is_err() {
                                return Ok(SessionEnd::ReceiverDropped);
                            }
                        }
                        Some(Ok(Message::Ping(_))) => {
                            last_seen = Instant::now();
                            debug!("Received ping, sending pong");
                            // Pong is handled automatically by tungstenite
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_seen = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("WebSocket closed by server");
                            return Ok(SessionEnd::Closed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(e).context("WebSocket read failed");
                        }
                        None => return Ok(SessionEnd::Closed),
                    }
                }
                _ = ping.tick() => {
                    let silent = last_seen.elapsed();
                    anyhow::ensure!(
                        silent <= self.ping_interval + self.pong_timeout,
                        "No traffic for {:?}, connection presumed dead",
                        silent
                    );
                    write
                        .send(Message::Ping(Vec::new().into()))
                        .await
                        .context("Ping failed")?;
                }
                _ = tx.closed() => return Ok(SessionEnd::ReceiverDropped),
            }
        }
    }
}

/// `2^attempt` seconds, capped at `max`.
fn reconnect_delay(attempt: u32, max: Duration) -> Duration {
    let secs = 2u64.saturating_pow(attempt.min(32));
    Duration::from_secs(secs).min(max)
}
