//! Market data: trade events, the shared trade buffer, and volume aggregation.

mod aggregator;
mod buffer;
mod trade;

pub use aggregator::{VolumeAggregator, VolumeReading};
pub use buffer::{TradeBuffer, TradeSnapshot};
pub use trade::{TradeEvent, TradeMessage};
