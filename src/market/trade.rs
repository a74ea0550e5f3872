//! Trade payload schema and the normalized trade event.

use anyhow::{Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// How far ahead of local receipt a trade time may be before it is distrusted.
pub const MAX_FUTURE_SKEW_MS: i64 = 5_000;

/// A single executed trade, normalized for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeEvent {
    /// Trade time in epoch milliseconds
    pub timestamp_ms: i64,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl TradeEvent {
    pub fn new(timestamp_ms: i64, quantity: Decimal, price: Decimal) -> Self {
        Self {
            timestamp_ms,
            quantity,
            price,
        }
    }

    /// Build an event from a decoded message.
    ///
    /// Missing fields default to zero. A missing trade time, or one more than
    /// `MAX_FUTURE_SKEW_MS` ahead of `received_at_ms`, becomes `received_at_ms`.
    pub fn from_message(msg: &TradeMessage, received_at_ms: i64) -> Self {
        let timestamp_ms = msg
            .trade_time_ms
            .filter(|ts| *ts <= received_at_ms.saturating_add(MAX_FUTURE_SKEW_MS))
            .unwrap_or(received_at_ms);

        Self {
            timestamp_ms,
            quantity: msg.quantity.unwrap_or(Decimal::ZERO),
            price: msg.price.unwrap_or(Decimal::ZERO),
        }
    }

    /// Quote-currency value of the trade (quantity x price), saturating at `Decimal::MAX`.
    pub fn notional(&self) -> Decimal {
        self.checked_notional().unwrap_or(Decimal::MAX)
    }

    /// `None` when quantity x price does not fit in a `Decimal`.
    pub fn checked_notional(&self) -> Option<Decimal> {
        self.quantity.checked_mul(self.price)
    }

    /// Quantity and price are positive and their product is representable.
    pub fn is_tradeable(&self) -> bool {
        self.quantity > Decimal::ZERO
            && self.price > Decimal::ZERO
            && self.checked_notional().is_some()
    }
}

/// Binance `<symbol>@trade` payload.
///
/// Only the fields the aggregator needs are decoded. Each accepts a JSON
/// string or number; anything unparseable decodes to `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TradeMessage {
    #[serde(rename = "p", default, deserialize_with = "lenient_decimal")]
    pub price: Option<Decimal>,
    #[serde(rename = "q", default, deserialize_with = "lenient_decimal")]
    pub quantity: Option<Decimal>,
    /// Trade time; zero or negative values are treated as absent
    #[serde(rename = "T", default, deserialize_with = "lenient_millis")]
    pub trade_time_ms: Option<i64>,
}

/// Raw and combined (`{"stream": .., "data": ..}`) frames carry the same payload.
#[derive(Deserialize)]
#[serde(untagged)]
enum StreamFrame {
    Combined { data: TradeMessage },
    Raw(TradeMessage),
}

impl TradeMessage {
    /// Decode a text frame. Fails only when the frame is not a JSON object.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).context("Trade frame is not valid JSON")?;
        anyhow::ensure!(value.is_object(), "Trade frame is not a JSON object");
        let frame = StreamFrame::deserialize(value).context("Trade frame has an unexpected shape")?;

        Ok(match frame {
            StreamFrame::Combined { data } => data,
            StreamFrame::Raw(msg) => msg,
        })
    }
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Decimal::from(i)),
            None => n.as_f64().and_then(Decimal::from_f64),
        },
        _ => None,
    }))
}

fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let millis = value.and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    });
    Ok(millis.filter(|ms| *ms > 0))
}
